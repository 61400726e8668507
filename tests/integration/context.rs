//! Context wiring: default cache, concurrent readers, atomic replacement, and failure policy.

// std
use std::sync::Arc;
// crates.io
use async_trait::async_trait;
use oidc_provider_metadata::{
	CacheKey, ClientDetail, DiscoveryRequest, Error, Identity, IdentityFailurePolicy, IdentityHint,
	IdentityService, InMemoryCache, InMemoryClientRegistry, InMemoryUserDirectory, ProviderConfig,
	ProviderContext, Result, SharedContext, Tenant, User,
};
use url::Url;
// self
use crate::common;

struct OfflineIdentityService;
#[async_trait]
impl IdentityService for OfflineIdentityService {
	async fn resolve(&self, _: &IdentityHint) -> Result<Option<Identity>> {
		Err(Error::CollaboratorUnavailable { service: "identity_service", reason: "offline".into() })
	}

	async fn config(&self, _: &Identity) -> Result<Option<Arc<ProviderConfig>>> {
		Err(Error::CollaboratorUnavailable { service: "identity_service", reason: "offline".into() })
	}
}

#[tokio::test]
async fn fresh_context_has_usable_cache() -> Result<()> {
	let context = ProviderContext::builder().build();
	let key = CacheKey::jwks(context.generation(), &Tenant::Global);

	assert!(context.cache().get(&key).await?.is_none());

	context.cache().clear().await?;

	Ok(())
}

#[tokio::test]
async fn wired_services_answer_lookups() -> Result<()> {
	let config = common::global_config();
	let clients = Arc::new(InMemoryClientRegistry::new());
	let users = Arc::new(InMemoryUserDirectory::new());
	let client = ClientDetail {
		redirect_uris: vec![Url::parse("https://app.example.com/callback")?],
		scopes: vec!["openid".into()],
		grant_types: vec!["authorization_code".into()],
		response_types: vec!["code".into()],
		..ClientDetail::new("web-app")
	};

	clients.register(client, &config).await?;
	users
		.insert(User { email: Some("alice@example.com".into()), ..User::new("alice") })
		.await;

	let context = ProviderContext::builder()
		.config(config)
		.client_detail_service(clients)
		.user_service(users)
		.build();

	assert_eq!(context.client_detail("web-app").await?.response_types, vec!["code"]);
	assert_eq!(context.user("alice").await?.email.as_deref(), Some("alice@example.com"));
	assert!(matches!(context.user("bob").await, Err(Error::UserNotFound(_))));

	Ok(())
}

#[tokio::test]
async fn concurrent_requests_see_identical_documents() -> Result<()> {
	common::init_tracing();

	let context = Arc::new(ProviderContext::builder().config(common::global_config()).build());
	let handles = (0..32)
		.map(|_| {
			let context = context.clone();

			tokio::spawn(async move {
				let document = context.discovery_document(&DiscoveryRequest::new()).await?;

				Ok::<_, Error>(serde_json::to_vec(&*document)?)
			})
		})
		.collect::<Vec<_>>();
	let mut rendered = Vec::with_capacity(handles.len());

	for handle in handles {
		rendered.push(handle.await.expect("task completes")?);
	}

	assert!(rendered.windows(2).all(|pair| pair[0] == pair[1]));
	assert_eq!(context.metrics().snapshot().total_requests(), 32);

	Ok(())
}

#[tokio::test]
async fn replacement_is_atomic_and_clears_cache() -> Result<()> {
	common::init_tracing();

	let cache = Arc::new(InMemoryCache::new());
	let shared = SharedContext::new(
		ProviderContext::builder().config(common::global_config()).cache(cache.clone()).build(),
	);
	let reader = shared.current().await;
	let before = reader.discovery_document(&DiscoveryRequest::new()).await?;
	let replacement = ProviderContext::builder()
		.config(common::global_config().with_scopes(["openid"]))
		.cache(Arc::new(InMemoryCache::new()))
		.build();

	assert_eq!(cache.len().await, 1);

	let previous = shared.replace(replacement).await;

	assert!(Arc::ptr_eq(&previous, &reader));
	assert!(cache.is_empty().await);

	let after = shared.current().await.discovery_document(&DiscoveryRequest::new()).await?;

	// Readers holding the old snapshot keep a consistent view.
	assert_eq!(reader.discovery_document(&DiscoveryRequest::new()).await?, before);
	assert_eq!(before.scopes_supported, vec!["openid", "profile"]);
	assert_eq!(after.scopes_supported, vec!["openid"]);

	Ok(())
}

#[tokio::test]
async fn late_writes_from_replaced_context_stay_invisible() -> Result<()> {
	common::init_tracing();

	let cache = Arc::new(InMemoryCache::new());
	let shared = SharedContext::new(
		ProviderContext::builder().config(common::global_config()).cache(cache.clone()).build(),
	);
	let stale = shared.current().await;

	stale.discovery_document(&DiscoveryRequest::new()).await?;
	shared
		.replace(
			ProviderContext::builder()
				.config(common::global_config().with_scopes(["openid"]))
				.cache(cache.clone())
				.build(),
		)
		.await;

	assert!(cache.is_empty().await);

	// A request that started on the old snapshot finishes after the swap.
	let late = stale.discovery_document(&DiscoveryRequest::new()).await?;
	let current = shared.current().await;
	let fresh = current.discovery_document(&DiscoveryRequest::new()).await?;

	assert_eq!(late.scopes_supported, vec!["openid", "profile"]);
	assert_eq!(fresh.scopes_supported, vec!["openid"]);
	assert_ne!(stale.generation(), current.generation());
	assert_eq!(cache.len().await, 2);
	assert_eq!(current.metrics().snapshot().discovery.hits, 0);

	Ok(())
}

#[tokio::test]
async fn identity_outage_follows_policy() -> Result<()> {
	common::init_tracing();

	let request = DiscoveryRequest::new().with_hint(IdentityHint::Header("tenant-a".into()));
	let strict = ProviderContext::builder()
		.config(common::global_config())
		.identity_service(Arc::new(OfflineIdentityService))
		.build();
	let lenient = ProviderContext::builder()
		.config(common::global_config())
		.identity_service(Arc::new(OfflineIdentityService))
		.identity_failure_policy(IdentityFailurePolicy::FallBackToGlobal)
		.build();
	let err = strict.discovery_document(&request).await.expect_err("outage propagates");

	assert!(matches!(err, Error::CollaboratorUnavailable { .. }));
	assert!(!err.is_tenant_not_found());
	assert_eq!(lenient.discovery_document(&request).await?.issuer, "https://idp.example.com");

	Ok(())
}
