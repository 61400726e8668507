//! Shared fixtures and instrumented collaborators.

// std
use std::{
	collections::HashMap,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use async_trait::async_trait;
use oidc_provider_metadata::{
	Cache, CacheKey, CachedDocument, Error, Identity, IdentityHint, IdentityService,
	InMemoryKeyResolver, KeyMaterial, KeyResolver, ProviderConfig, Result, Tenant,
};

pub const RSA_PRIMARY_PUBLIC: &str = include_str!("../fixtures/rsa_primary_public.pem");
pub const RSA_PRIMARY_PRIVATE: &str = include_str!("../fixtures/rsa_primary_private.pem");
pub const RSA_ROTATED_PUBLIC: &str = include_str!("../fixtures/rsa_rotated_public.pem");
pub const EC_P256_PUBLIC: &str = include_str!("../fixtures/ec_p256_public.pem");
pub const EC_P256_PRIVATE: &str = include_str!("../fixtures/ec_p256_private.pem");

pub const RSA_PRIMARY_KID: &str = "EFTpZoVJtIV09EFT4xKjhkJ0_ohBNgSTRTG3k7wjYqs";
pub const RSA_ROTATED_KID: &str = "0VIW28ar0KIxBYzfHuzCAnE5ELRKkWbSgVqHi2OdfAY";
pub const EC_P256_KID: &str = "8ltCK8MuJTIFrAuYnua2IpGcrfgDuOqEFdp64AxUugc";

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn global_config() -> ProviderConfig {
	ProviderConfig::new("https://idp.example.com")
		.expect("valid issuer")
		.with_scopes(["openid", "profile"])
}

pub fn tenant(identity: &str) -> Tenant {
	Tenant::Identity(Identity::new(identity).expect("valid identity"))
}

/// Identity service that records how often it is consulted.
///
/// Identities mapped to `None` resolve but carry no configuration.
#[derive(Default)]
pub struct CountingIdentityService {
	tenants: HashMap<Identity, Option<Arc<ProviderConfig>>>,
	resolve_calls: AtomicUsize,
	config_calls: AtomicUsize,
}
impl CountingIdentityService {
	pub fn with_tenant(mut self, identity: &str, config: Option<ProviderConfig>) -> Self {
		self.tenants
			.insert(Identity::new(identity).expect("valid identity"), config.map(Arc::new));

		self
	}

	pub fn resolve_calls(&self) -> usize {
		self.resolve_calls.load(Ordering::SeqCst)
	}

	pub fn config_calls(&self) -> usize {
		self.config_calls.load(Ordering::SeqCst)
	}
}
#[async_trait]
impl IdentityService for CountingIdentityService {
	async fn resolve(&self, hint: &IdentityHint) -> Result<Option<Identity>> {
		self.resolve_calls.fetch_add(1, Ordering::SeqCst);

		let Some(identity) = hint.value().and_then(|value| Identity::new(value).ok()) else {
			return Ok(None);
		};

		Ok(self.tenants.contains_key(&identity).then_some(identity))
	}

	async fn config(&self, identity: &Identity) -> Result<Option<Arc<ProviderConfig>>> {
		self.config_calls.fetch_add(1, Ordering::SeqCst);

		Ok(self.tenants.get(identity).cloned().flatten())
	}
}

/// Key resolver wrapper that records how often it is consulted.
#[derive(Default)]
pub struct CountingKeyResolver {
	pub inner: InMemoryKeyResolver,
	calls: AtomicUsize,
}
impl CountingKeyResolver {
	pub async fn with_key(self, tenant: Tenant, material: KeyMaterial) -> Self {
		self.inner.register(tenant, material).await;

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
#[async_trait]
impl KeyResolver for CountingKeyResolver {
	async fn resolve(&self, tenant: &Tenant) -> Result<Option<Vec<KeyMaterial>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		self.inner.resolve(tenant).await
	}
}

/// Cache whose backing store is permanently down.
pub struct UnreachableCache;
#[async_trait]
impl Cache for UnreachableCache {
	async fn get(&self, _: &CacheKey) -> Result<Option<CachedDocument>> {
		Err(Error::Cache("connection refused".into()))
	}

	async fn put(&self, _: CacheKey, _: CachedDocument) -> Result<()> {
		Err(Error::Cache("connection refused".into()))
	}

	async fn invalidate(&self, _: &CacheKey) -> Result<()> {
		Err(Error::Cache("connection refused".into()))
	}

	async fn invalidate_prefix(&self, _: &str) -> Result<usize> {
		Err(Error::Cache("connection refused".into()))
	}

	async fn clear(&self) -> Result<()> {
		Err(Error::Cache("connection refused".into()))
	}
}
