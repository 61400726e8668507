//! Discovery document behaviour across tenants, caching, and request derivation.

// std
use std::sync::Arc;
// crates.io
use http::{Request, StatusCode};
use oidc_provider_metadata::{
	DiscoveryRequest, Error, IdentityHint, InMemoryCache, ProviderConfig, ProviderContext,
	RequestPolicy, Result, render_json,
};
use url::Url;
// self
use crate::common::{self, CountingIdentityService, UnreachableCache};

#[tokio::test]
async fn global_document_matches_configuration() -> Result<()> {
	common::init_tracing();

	let context = ProviderContext::builder().config(common::global_config()).build();
	let document = context.discovery_document(&DiscoveryRequest::new()).await?;

	assert_eq!(document.issuer, "https://idp.example.com");
	assert_eq!(document.scopes_supported, vec!["openid", "profile"]);
	assert_eq!(document.jwks_uri, "https://idp.example.com/.well-known/jwks.json");

	for endpoint in [
		&document.authorization_endpoint,
		&document.token_endpoint,
		&document.userinfo_endpoint,
		&document.jwks_uri,
	] {
		assert!(endpoint.starts_with(&document.issuer));
		assert!(Url::parse(endpoint).is_ok());
	}

	Ok(())
}

#[tokio::test]
async fn unknown_tenant_fails_and_nothing_is_cached() {
	common::init_tracing();

	let cache = Arc::new(InMemoryCache::new());
	let identities = Arc::new(CountingIdentityService::default().with_tenant("tenant-a", None));
	let context = ProviderContext::builder()
		.config(common::global_config())
		.cache(cache.clone())
		.identity_service(identities.clone())
		.build();
	let request = DiscoveryRequest::new().with_hint(IdentityHint::explicit("tenant-a"));

	for _ in 0..2 {
		let err = context.discovery_document(&request).await.expect_err("tenant has no config");

		assert!(matches!(err, Error::TenantNotFound { ref identity } if identity == "tenant-a"));
	}

	assert!(cache.is_empty().await);
	assert_eq!(identities.config_calls(), 2);

	let unregistered = DiscoveryRequest::new().with_hint(IdentityHint::explicit("tenant-z"));

	assert!(context.discovery_document(&unregistered).await.is_err_and(|err| err.is_tenant_not_found()));
	assert!(cache.is_empty().await);
}

#[tokio::test]
async fn repeated_requests_are_byte_identical() -> Result<()> {
	let cache = Arc::new(InMemoryCache::new());
	let context =
		ProviderContext::builder().config(common::global_config()).cache(cache.clone()).build();
	let request = DiscoveryRequest::new();
	let first = serde_json::to_vec(&*context.discovery_document(&request).await?)?;
	let cached = serde_json::to_vec(&*context.discovery_document(&request).await?)?;

	context.invalidate_tenant(&oidc_provider_metadata::Tenant::Global).await?;

	let rebuilt = serde_json::to_vec(&*context.discovery_document(&request).await?)?;

	assert_eq!(first, cached);
	assert_eq!(first, rebuilt);

	Ok(())
}

#[tokio::test]
async fn cached_documents_skip_collaborators_until_invalidated() -> Result<()> {
	common::init_tracing();

	let tenant_config = ProviderConfig::new("https://idp.example.com")?.with_dynamic_issuer(true);
	let identities =
		Arc::new(CountingIdentityService::default().with_tenant("tenant-a", Some(tenant_config)));
	let context = ProviderContext::builder().identity_service(identities.clone()).build();
	let request = DiscoveryRequest::new().with_hint(IdentityHint::explicit("tenant-a"));
	let first = context.discovery_document(&request).await?;
	let second = context.discovery_document(&request).await?;

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(first.issuer, "https://idp.example.com/tenant-a");
	assert_eq!(identities.config_calls(), 1);
	assert_eq!(identities.resolve_calls(), 2);

	context.invalidate_tenant(&common::tenant("tenant-a")).await?;
	context.discovery_document(&request).await?;

	assert_eq!(identities.config_calls(), 2);
	assert_eq!(identities.resolve_calls(), 3);

	let snapshot = context.metrics().snapshot();

	assert_eq!(snapshot.discovery.requests, 3);
	assert_eq!(snapshot.discovery.hits, 1);
	assert_eq!(snapshot.discovery.builds, 2);
	assert_eq!(snapshot.jwks.requests, 0);

	Ok(())
}

#[tokio::test]
async fn tenants_do_not_share_documents() -> Result<()> {
	let identities = Arc::new(
		CountingIdentityService::default()
			.with_tenant("tenant-a", Some(ProviderConfig::new("https://a.example.com")?))
			.with_tenant("tenant-b", Some(ProviderConfig::new("https://b.example.com")?)),
	);
	let context = ProviderContext::builder()
		.config(common::global_config())
		.identity_service(identities)
		.build();
	let a = context
		.discovery_document(&DiscoveryRequest::new().with_hint(IdentityHint::explicit("tenant-a")))
		.await?;
	let b = context
		.discovery_document(&DiscoveryRequest::new().with_hint(IdentityHint::Header("tenant-b".into())))
		.await?;
	let global = context.discovery_document(&DiscoveryRequest::new()).await?;

	assert_eq!(a.issuer, "https://a.example.com");
	assert_eq!(b.issuer, "https://b.example.com");
	assert_eq!(global.issuer, "https://idp.example.com");

	Ok(())
}

#[tokio::test]
async fn request_derived_issuer_follows_host() -> Result<()> {
	let context = ProviderContext::builder().config(ProviderConfig::request_derived()).build();
	let policy = RequestPolicy::default().with_allowed_hosts(["example.com"]);
	let parts = |host: &str| {
		Request::builder()
			.uri("/.well-known/openid-configuration")
			.header("host", host)
			.body(())
			.expect("request")
			.into_parts()
			.0
	};
	let login = context.discovery_document(&policy.discovery_request(&parts("login.example.com"))?).await?;
	let sso = context.discovery_document(&policy.discovery_request(&parts("sso.example.com:8443"))?).await?;

	assert_eq!(login.issuer, "https://login.example.com");
	assert_eq!(sso.token_endpoint, "https://sso.example.com:8443/oauth/token");
	assert!(policy.discovery_request(&parts("attacker.test")).is_err());

	Ok(())
}

#[tokio::test]
async fn pinned_issuer_keeps_one_entry_across_hosts() -> Result<()> {
	let cache = Arc::new(InMemoryCache::new());
	let context =
		ProviderContext::builder().config(common::global_config()).cache(cache.clone()).build();
	let policy = RequestPolicy::default();

	for i in 0..50 {
		let parts = Request::builder()
			.uri("/.well-known/openid-configuration")
			.header("host", format!("h{i}.example.test"))
			.body(())
			.expect("request")
			.into_parts()
			.0;
		let document = context.discovery_document(&policy.discovery_request(&parts)?).await?;

		assert_eq!(document.issuer, "https://idp.example.com");
	}

	assert_eq!(cache.len().await, 1);
	assert_eq!(context.metrics().snapshot().discovery.builds, 1);

	Ok(())
}

#[tokio::test]
async fn unreachable_cache_degrades_to_live_build() -> Result<()> {
	common::init_tracing();

	let context = ProviderContext::builder()
		.config(common::global_config())
		.cache(Arc::new(UnreachableCache))
		.build();
	let document = context.discovery_document(&DiscoveryRequest::new()).await?;

	assert_eq!(document.issuer, "https://idp.example.com");

	Ok(())
}

#[tokio::test]
async fn failures_render_as_client_visible_errors() {
	let context = ProviderContext::builder().config(common::global_config()).build();
	let missing = context
		.discovery_document(&DiscoveryRequest::new().with_hint(IdentityHint::explicit("tenant-a")))
		.await;
	let response = render_json(missing);
	let body: serde_json::Value = serde_json::from_slice(response.body()).expect("json body");

	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "not_found");

	let unconfigured = ProviderContext::builder().build();
	let response = render_json(unconfigured.discovery_document(&DiscoveryRequest::new()).await);

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
