//! Provider context: the immutable composition point for collaborators and configuration.
//!
//! A [`ProviderContext`] is assembled once through [`ProviderContextBuilder`]. Nothing is
//! validated at build time; a missing collaborator surfaces as
//! [`Error::ConfigurationInvalid`] from the first operation that needs it. Runtime
//! reconfiguration swaps the whole context through [`SharedContext`].

// std
use std::{
	fmt::{Debug, Formatter, Result as FmtResult},
	future::Future,
};
// crates.io
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	cache::{Cache, CacheKey, CachedDocument, DocumentKind, Generation, InMemoryCache},
	config::ProviderConfig,
	metrics::{self, ProviderMetrics},
	service::{ClientDetail, ClientDetailService, IdentityService, KeyResolver, User, UserService},
	tenant::{IdentityHint, Tenant},
};

/// What to do when the identity service fails (as opposed to answering "unknown tenant").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityFailurePolicy {
	/// Propagate the failure to the caller.
	#[default]
	Fail,
	/// Serve the global tenant instead.
	FallBackToGlobal,
}

/// Builder for [`ProviderContext`].
#[derive(Default)]
pub struct ProviderContextBuilder {
	cache: Option<Arc<dyn Cache>>,
	client_detail_service: Option<Arc<dyn ClientDetailService>>,
	user_service: Option<Arc<dyn UserService>>,
	identity_service: Option<Arc<dyn IdentityService>>,
	key_resolver: Option<Arc<dyn KeyResolver>>,
	config: Option<Arc<ProviderConfig>>,
	identity_failure_policy: IdentityFailurePolicy,
	collaborator_timeout: Option<Duration>,
}
impl ProviderContextBuilder {
	/// Create an empty builder.
	pub fn new() -> Self {
		Self::default()
	}

	/// Use `cache` instead of the default in-memory cache.
	pub fn cache<C>(mut self, cache: Arc<C>) -> Self
	where
		C: Cache + 'static,
	{
		self.cache = Some(cache);

		self
	}

	/// Wire the client registry.
	pub fn client_detail_service<S>(mut self, service: Arc<S>) -> Self
	where
		S: ClientDetailService + 'static,
	{
		self.client_detail_service = Some(service);

		self
	}

	/// Wire the user directory.
	pub fn user_service<S>(mut self, service: Arc<S>) -> Self
	where
		S: UserService + 'static,
	{
		self.user_service = Some(service);

		self
	}

	/// Wire the identity service that makes the provider multi-tenant.
	pub fn identity_service<S>(mut self, service: Arc<S>) -> Self
	where
		S: IdentityService + 'static,
	{
		self.identity_service = Some(service);

		self
	}

	/// Wire the signing key resolver.
	pub fn key_resolver<S>(mut self, resolver: Arc<S>) -> Self
	where
		S: KeyResolver + 'static,
	{
		self.key_resolver = Some(resolver);

		self
	}

	/// Configuration of the global tenant.
	pub fn config(mut self, config: ProviderConfig) -> Self {
		self.config = Some(Arc::new(config));

		self
	}

	/// Choose how identity service failures are handled.
	pub fn identity_failure_policy(mut self, policy: IdentityFailurePolicy) -> Self {
		self.identity_failure_policy = policy;

		self
	}

	/// Bound every collaborator call; elapsed calls fail with
	/// [`Error::CollaboratorUnavailable`].
	pub fn collaborator_timeout(mut self, timeout: Duration) -> Self {
		self.collaborator_timeout = Some(timeout);

		self
	}

	/// Finalise the context, resolving the default cache.
	pub fn build(self) -> ProviderContext {
		ProviderContext {
			cache: self.cache.unwrap_or_else(|| Arc::new(InMemoryCache::new())),
			client_detail_service: self.client_detail_service,
			user_service: self.user_service,
			identity_service: self.identity_service,
			key_resolver: self.key_resolver,
			config: self.config,
			identity_failure_policy: self.identity_failure_policy,
			collaborator_timeout: self.collaborator_timeout,
			generation: Generation::next(),
			metrics: ProviderMetrics::new(),
		}
	}
}

/// Immutable wiring of collaborators, shared by every in-flight request.
pub struct ProviderContext {
	cache: Arc<dyn Cache>,
	client_detail_service: Option<Arc<dyn ClientDetailService>>,
	user_service: Option<Arc<dyn UserService>>,
	identity_service: Option<Arc<dyn IdentityService>>,
	key_resolver: Option<Arc<dyn KeyResolver>>,
	config: Option<Arc<ProviderConfig>>,
	identity_failure_policy: IdentityFailurePolicy,
	collaborator_timeout: Option<Duration>,
	generation: Generation,
	metrics: Arc<ProviderMetrics>,
}
impl ProviderContext {
	/// Start building a context.
	pub fn builder() -> ProviderContextBuilder {
		ProviderContextBuilder::new()
	}

	/// Document cache; always present.
	pub fn cache(&self) -> &Arc<dyn Cache> {
		&self.cache
	}

	/// Client registry, if wired.
	pub fn client_detail_service(&self) -> Option<&Arc<dyn ClientDetailService>> {
		self.client_detail_service.as_ref()
	}

	/// User directory, if wired.
	pub fn user_service(&self) -> Option<&Arc<dyn UserService>> {
		self.user_service.as_ref()
	}

	/// Identity service, if wired.
	pub fn identity_service(&self) -> Option<&Arc<dyn IdentityService>> {
		self.identity_service.as_ref()
	}

	/// Key resolver, if wired.
	pub fn key_resolver(&self) -> Option<&Arc<dyn KeyResolver>> {
		self.key_resolver.as_ref()
	}

	/// Global tenant configuration, if set.
	pub fn config(&self) -> Option<&Arc<ProviderConfig>> {
		self.config.as_ref()
	}

	/// Identity failure policy.
	pub fn identity_failure_policy(&self) -> IdentityFailurePolicy {
		self.identity_failure_policy
	}

	/// Cache namespace of this context; unique per built context.
	pub fn generation(&self) -> Generation {
		self.generation
	}

	/// Telemetry accumulated by this context.
	pub fn metrics(&self) -> &Arc<ProviderMetrics> {
		&self.metrics
	}

	/// Turn a request hint into the tenant every later lookup is scoped to.
	///
	/// An empty hint selects the global tenant. A hint the identity service does not recognise
	/// fails with [`Error::TenantNotFound`]; an identity service failure is handled according to
	/// the [`IdentityFailurePolicy`].
	pub async fn resolve_tenant(&self, hint: &IdentityHint) -> Result<Tenant> {
		if hint.is_none() {
			return Ok(Tenant::Global);
		}

		let hinted = hint.value().unwrap_or_default().trim();
		let not_found = || Error::TenantNotFound { identity: hinted.to_owned() };
		let Some(service) = &self.identity_service else {
			return Err(not_found());
		};

		match self.call("identity_service", service.resolve(hint)).await {
			Ok(Some(identity)) => Ok(Tenant::Identity(identity)),
			Ok(None) => Err(not_found()),
			Err(err) => match self.identity_failure_policy {
				IdentityFailurePolicy::Fail => Err(err),
				IdentityFailurePolicy::FallBackToGlobal => {
					tracing::warn!(
						hint = hinted,
						error = %err,
						"identity resolution failed; serving global tenant"
					);

					Ok(Tenant::Global)
				},
			},
		}
	}

	/// Configuration of a resolved tenant.
	pub async fn tenant_config(&self, tenant: &Tenant) -> Result<Arc<ProviderConfig>> {
		match tenant {
			Tenant::Global => self.config.clone().ok_or_else(|| Error::ConfigurationInvalid {
				field: "config",
				reason: "No configuration is set for the global tenant.".into(),
			}),
			Tenant::Identity(identity) => {
				let service = self.identity_service.as_ref().ok_or_else(|| tenant.not_found())?;

				self.call("identity_service", service.config(identity))
					.await?
					.ok_or_else(|| tenant.not_found())
			},
		}
	}

	/// Look up an enabled client.
	pub async fn client_detail(&self, client_id: &str) -> Result<ClientDetail> {
		let service = self.client_detail_service.as_ref().ok_or_else(|| {
			Error::ConfigurationInvalid {
				field: "client_detail_service",
				reason: "No client registry is wired into the provider context.".into(),
			}
		})?;

		self.call("client_detail_service", service.find_by_client_id(client_id))
			.await?
			.filter(|client| client.enabled)
			.ok_or_else(|| Error::ClientNotFound(client_id.to_owned()))
	}

	/// Look up a user by subject.
	pub async fn user(&self, subject: &str) -> Result<User> {
		let service = self.user_service.as_ref().ok_or_else(|| Error::ConfigurationInvalid {
			field: "user_service",
			reason: "No user directory is wired into the provider context.".into(),
		})?;

		self.call("user_service", service.find_by_subject(subject))
			.await?
			.ok_or_else(|| Error::UserNotFound(subject.to_owned()))
	}

	/// Drop every cached document of `tenant` after its configuration changed.
	#[tracing::instrument(skip(self, tenant), fields(tenant = %tenant))]
	pub async fn invalidate_tenant(&self, tenant: &Tenant) -> Result<()> {
		let dropped = self
			.cache
			.invalidate_prefix(&CacheKey::discovery_prefix(self.generation, tenant))
			.await?;

		self.cache.invalidate(&CacheKey::jwks(self.generation, tenant)).await?;

		tracing::info!(dropped_discovery = dropped, "tenant cache invalidated");

		Ok(())
	}

	/// Drop the cached key set of `tenant` after its signing keys changed.
	#[tracing::instrument(skip(self, tenant), fields(tenant = %tenant))]
	pub async fn key_rotation_event(&self, tenant: &Tenant) -> Result<()> {
		self.cache.invalidate(&CacheKey::jwks(self.generation, tenant)).await?;

		tracing::info!("key set invalidated after rotation");

		Ok(())
	}

	pub(crate) async fn call<T, F>(&self, service: &'static str, call: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let Some(timeout) = self.collaborator_timeout else {
			return call.await;
		};

		tokio::time::timeout(timeout, call).await.map_err(|_| Error::CollaboratorUnavailable {
			service,
			reason: format!("No answer within {timeout:?}."),
		})?
	}

	/// Serve a document from the cache, building and storing it on a miss.
	///
	/// `lookup` keys are tried in order. The build decides which key its document is stored
	/// under. Cache backend failures degrade to a miss. Build failures are returned and nothing
	/// is stored.
	pub(crate) async fn serve_cached<F, Fut>(
		&self,
		tenant: &Tenant,
		kind: DocumentKind,
		lookup: &[CacheKey],
		build: F,
	) -> Result<CachedDocument>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<(CacheKey, CachedDocument)>>,
	{
		for key in lookup {
			match self.cache.get(key).await {
				Ok(Some(document)) if document.kind() == kind => {
					self.metrics.record_hit(kind);
					metrics::record_cache_hit(tenant, kind);

					tracing::debug!(key = %key, "served from cache");

					return Ok(document);
				},
				Ok(_) => {},
				Err(err) => tracing::warn!(key = %key, error = %err, "cache lookup failed; rebuilding"),
			}
		}

		self.metrics.record_miss(kind);
		metrics::record_cache_miss(tenant, kind);

		let started = Instant::now();

		match build().await {
			Ok((key, document)) => {
				let elapsed = started.elapsed();

				self.metrics.record_build_success(kind, elapsed);
				metrics::record_build_success(tenant, kind, elapsed);

				if let Err(err) = self.cache.put(key.clone(), document.clone()).await {
					tracing::warn!(key = %key, error = %err, "failed to store built document");
				}

				Ok(document)
			},
			Err(err) => {
				self.metrics.record_build_error(kind);
				metrics::record_build_error(tenant, kind, &err);

				tracing::debug!(
					tenant = %tenant,
					document = kind.as_str(),
					error = %err,
					"document build failed"
				);

				Err(err)
			},
		}
	}
}
impl Debug for ProviderContext {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ProviderContext")
			.field("client_detail_service", &self.client_detail_service.is_some())
			.field("user_service", &self.user_service.is_some())
			.field("identity_service", &self.identity_service.is_some())
			.field("key_resolver", &self.key_resolver.is_some())
			.field("config", &self.config)
			.field("identity_failure_policy", &self.identity_failure_policy)
			.field("collaborator_timeout", &self.collaborator_timeout)
			.field("generation", &self.generation)
			.finish_non_exhaustive()
	}
}

/// Atomically replaceable handle to the active [`ProviderContext`].
///
/// Readers take a snapshot with [`SharedContext::current`] and keep using it for the whole
/// request, so they never observe a half-updated context.
#[derive(Clone, Debug)]
pub struct SharedContext {
	inner: Arc<RwLock<Arc<ProviderContext>>>,
}
impl SharedContext {
	/// Publish an initial context.
	pub fn new(context: ProviderContext) -> Self {
		Self { inner: Arc::new(RwLock::new(Arc::new(context))) }
	}

	/// Snapshot of the active context.
	pub async fn current(&self) -> Arc<ProviderContext> {
		self.inner.read().await.clone()
	}

	/// Publish `context` and return the previous context.
	///
	/// Once the swap is visible, the previous generation's entries are dropped from its cache.
	/// Requests still running on the previous snapshot may write again afterwards, but their
	/// keys carry the old generation and never answer the new context.
	pub async fn replace(&self, context: ProviderContext) -> Arc<ProviderContext> {
		let previous = {
			let mut active = self.inner.write().await;

			std::mem::replace(&mut *active, Arc::new(context))
		};

		match previous.cache().invalidate_prefix(&previous.generation().prefix()).await {
			Ok(dropped) => tracing::info!(dropped, "provider context replaced"),
			Err(err) => tracing::warn!(error = %err, "provider context replaced; previous entries kept"),
		}

		previous
	}
}
