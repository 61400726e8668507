//! In-memory collaborators for embedding, development, and tests.

// std
use std::collections::HashMap;
// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	config::ProviderConfig,
	keys::{KeyMaterial, SigningKey},
	service::{
		ClientDetail, ClientDetailService, IdentityService, KeyResolver, User, UserService,
	},
	tenant::{Identity, IdentityHint, Tenant},
};

/// Client registry backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryClientRegistry {
	clients: RwLock<HashMap<String, ClientDetail>>,
}
impl InMemoryClientRegistry {
	/// Create an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a client after validating it against `config`.
	pub async fn register(&self, client: ClientDetail, config: &ProviderConfig) -> Result<()> {
		client.validate_against(config)?;

		tracing::debug!(client_id = %client.client_id, "client registered");

		self.clients.write().await.insert(client.client_id.clone(), client);

		Ok(())
	}

	/// Remove a client, returning whether it existed.
	pub async fn remove(&self, client_id: &str) -> bool {
		self.clients.write().await.remove(client_id).is_some()
	}
}
#[async_trait]
impl ClientDetailService for InMemoryClientRegistry {
	async fn find_by_client_id(&self, client_id: &str) -> Result<Option<ClientDetail>> {
		let clients = self.clients.read().await;

		Ok(clients.get(client_id).filter(|client| client.enabled).cloned())
	}
}

/// User directory backed by a map keyed by subject.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
	users: RwLock<HashMap<String, User>>,
}
impl InMemoryUserDirectory {
	/// Create an empty directory.
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or replace a user.
	pub async fn insert(&self, user: User) {
		self.users.write().await.insert(user.subject.clone(), user);
	}
}
#[async_trait]
impl UserService for InMemoryUserDirectory {
	async fn find_by_subject(&self, subject: &str) -> Result<Option<User>> {
		Ok(self.users.read().await.get(subject).cloned())
	}
}

/// Identity service serving a fixed set of tenants.
///
/// Hints that are not valid identities resolve to no tenant rather than an error.
#[derive(Debug, Default)]
pub struct StaticIdentityService {
	tenants: RwLock<HashMap<Identity, Arc<ProviderConfig>>>,
}
impl StaticIdentityService {
	/// Create a service with no tenants.
	pub fn new() -> Self {
		Self::default()
	}

	/// Add or replace a tenant after validating its configuration.
	pub async fn insert(&self, identity: Identity, config: ProviderConfig) -> Result<()> {
		config.validate()?;

		self.tenants.write().await.insert(identity, Arc::new(config));

		Ok(())
	}

	/// Remove a tenant, returning whether it existed.
	pub async fn remove(&self, identity: &Identity) -> bool {
		self.tenants.write().await.remove(identity).is_some()
	}
}
#[async_trait]
impl IdentityService for StaticIdentityService {
	async fn resolve(&self, hint: &IdentityHint) -> Result<Option<Identity>> {
		let Some(value) = hint.value().map(str::trim) else {
			return Ok(None);
		};
		let Ok(identity) = Identity::new(value) else {
			return Ok(None);
		};

		Ok(self.tenants.read().await.contains_key(&identity).then_some(identity))
	}

	async fn config(&self, identity: &Identity) -> Result<Option<Arc<ProviderConfig>>> {
		Ok(self.tenants.read().await.get(identity).cloned())
	}
}

/// Key resolver holding each tenant's key material in memory.
///
/// Keys are kept in registration order; the newest key by `created_at` is the active signer and
/// older keys stay published until retired.
#[derive(Debug, Default)]
pub struct InMemoryKeyResolver {
	keys: RwLock<HashMap<Tenant, Vec<KeyMaterial>>>,
}
impl InMemoryKeyResolver {
	/// Create a resolver with no tenants.
	pub fn new() -> Self {
		Self::default()
	}

	/// Register key material for a tenant, making the tenant known to the resolver.
	pub async fn register(&self, tenant: Tenant, material: KeyMaterial) {
		self.keys.write().await.entry(tenant).or_default().push(material);
	}

	/// Introduce a new key for `tenant` while keeping existing keys published.
	///
	/// The new key is stamped with the current time so it becomes the active signer.
	pub async fn rotate(&self, tenant: Tenant, material: KeyMaterial) -> Result<SigningKey> {
		let material = material.with_created_at(Utc::now());
		let key = SigningKey::parse(&material)?;

		tracing::info!(tenant = %tenant, kid = key.kid(), "signing key rotated");

		self.register(tenant, material).await;

		Ok(key)
	}

	/// Stop publishing the key with `kid`, returning whether a key was removed.
	pub async fn retire(&self, tenant: &Tenant, kid: &str) -> bool {
		let mut keys = self.keys.write().await;
		let Some(materials) = keys.get_mut(tenant) else {
			return false;
		};
		let before = materials.len();

		materials.retain(|material| {
			SigningKey::parse(material).map(|key| key.kid() != kid).unwrap_or(true)
		});

		let removed = materials.len() != before;

		if removed {
			tracing::info!(tenant = %tenant, kid, "signing key retired");
		}

		removed
	}

	/// Forget a tenant entirely.
	pub async fn remove_tenant(&self, tenant: &Tenant) -> bool {
		self.keys.write().await.remove(tenant).is_some()
	}

	/// Key currently used for signing: the newest parseable key.
	pub async fn active_key(&self, tenant: &Tenant) -> Result<Option<SigningKey>> {
		let keys = self.keys.read().await;
		let Some(materials) = keys.get(tenant) else {
			return Ok(None);
		};
		let mut active: Option<SigningKey> = None;

		for material in materials {
			let key = SigningKey::parse(material)?;

			if active.as_ref().is_none_or(|current| key.created_at() >= current.created_at()) {
				active = Some(key);
			}
		}

		Ok(active)
	}
}
#[async_trait]
impl KeyResolver for InMemoryKeyResolver {
	async fn resolve(&self, tenant: &Tenant) -> Result<Option<Vec<KeyMaterial>>> {
		Ok(self.keys.read().await.get(tenant).cloned())
	}
}
