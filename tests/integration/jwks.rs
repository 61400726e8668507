//! Key set publication, rotation, and token verification against published keys.

// std
use std::sync::Arc;
// crates.io
use http::StatusCode;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, jwk::JwkSet};
use oidc_provider_metadata::{
	Error, IdentityHint, InMemoryCache, InMemoryKeyResolver, KeyMaterial, ProviderConfig,
	ProviderContext, Result, SigningKey, Tenant, tenant::GLOBAL_LABEL,
};
use serde::{Deserialize, Serialize};
// self
use crate::common::{self, CountingIdentityService, CountingKeyResolver};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Claims {
	sub: String,
	iss: String,
	exp: u64,
}

fn kids(set: &JwkSet) -> Vec<&str> {
	set.keys.iter().filter_map(|key| key.common.key_id.as_deref()).collect()
}

#[tokio::test]
async fn published_key_carries_required_members() -> Result<()> {
	common::init_tracing();

	let resolver = Arc::new(InMemoryKeyResolver::new());

	resolver.register(Tenant::Global, KeyMaterial::from_public_pem(common::RSA_PRIMARY_PUBLIC)).await;

	let context =
		ProviderContext::builder().config(common::global_config()).key_resolver(resolver).build();
	let jwks = context.jwks(&IdentityHint::None).await?;
	let json = serde_json::to_value(&*jwks)?;
	let key = &json["keys"][0];

	assert_eq!(json["keys"].as_array().map(Vec::len), Some(1));
	assert_eq!(key["kty"], "RSA");
	assert_eq!(key["use"], "sig");
	assert_eq!(key["alg"], "RS256");
	assert_eq!(key["kid"], common::RSA_PRIMARY_KID);
	assert_eq!(key["e"], "AQAB");
	assert!(key["n"].is_string());

	Ok(())
}

#[tokio::test]
async fn rotation_publishes_both_keys_until_retired() -> Result<()> {
	common::init_tracing();

	let resolver = Arc::new(InMemoryKeyResolver::new());
	let old_key = KeyMaterial::from_public_pem(common::RSA_PRIMARY_PUBLIC)
		.with_created_at(chrono::Utc::now() - chrono::Duration::days(30));

	resolver.register(Tenant::Global, old_key).await;

	let context = ProviderContext::builder()
		.config(common::global_config())
		.key_resolver(resolver.clone())
		.build();

	assert_eq!(kids(&*context.jwks(&IdentityHint::None).await?), vec![common::RSA_PRIMARY_KID]);

	resolver
		.rotate(Tenant::Global, KeyMaterial::from_public_pem(common::RSA_ROTATED_PUBLIC))
		.await?;

	// Still served from cache until the rotation event arrives.
	assert_eq!(kids(&*context.jwks(&IdentityHint::None).await?), vec![common::RSA_PRIMARY_KID]);

	context.key_rotation_event(&Tenant::Global).await?;

	assert_eq!(
		kids(&*context.jwks(&IdentityHint::None).await?),
		vec![common::RSA_ROTATED_KID, common::RSA_PRIMARY_KID]
	);

	assert!(resolver.retire(&Tenant::Global, common::RSA_PRIMARY_KID).await);

	context.key_rotation_event(&Tenant::Global).await?;

	assert_eq!(kids(&*context.jwks(&IdentityHint::None).await?), vec![common::RSA_ROTATED_KID]);

	Ok(())
}

#[tokio::test]
async fn unknown_identity_is_not_found_never_empty() {
	common::init_tracing();

	let cache = Arc::new(InMemoryCache::new());
	let identities = Arc::new(
		CountingIdentityService::default()
			.with_tenant("tenant-a", Some(ProviderConfig::new("https://a.example.com").expect("config"))),
	);
	let resolver = Arc::new(
		CountingKeyResolver::default()
			.with_key(Tenant::Global, KeyMaterial::from_public_pem(common::RSA_PRIMARY_PUBLIC))
			.await,
	);
	let context = ProviderContext::builder()
		.config(common::global_config())
		.cache(cache.clone())
		.identity_service(identities)
		.key_resolver(resolver.clone())
		.build();

	// Unknown to the identity service.
	let unknown = context.jwks(&IdentityHint::explicit("tenant-z")).await;

	assert!(matches!(unknown, Err(Error::TenantNotFound { .. })));
	assert_eq!(resolver.calls(), 0);

	// Known tenant, but the key resolver has nothing for it.
	let keyless = context.jwks(&IdentityHint::explicit("tenant-a")).await;

	assert!(matches!(keyless, Err(Error::TenantNotFound { ref identity }) if identity == "tenant-a"));
	assert_eq!(resolver.calls(), 1);
	assert!(cache.is_empty().await);
}

#[tokio::test]
async fn cached_key_set_skips_resolver() -> Result<()> {
	let resolver = Arc::new(
		CountingKeyResolver::default()
			.with_key(Tenant::Global, KeyMaterial::from_public_pem(common::RSA_PRIMARY_PUBLIC))
			.await,
	);
	let context = ProviderContext::builder()
		.config(common::global_config())
		.key_resolver(resolver.clone())
		.build();

	for _ in 0..3 {
		context.jwks(&IdentityHint::None).await?;
	}

	assert_eq!(resolver.calls(), 1);

	context.key_rotation_event(&Tenant::Global).await?;
	context.jwks(&IdentityHint::None).await?;

	assert_eq!(resolver.calls(), 2);

	Ok(())
}

#[tokio::test]
async fn tenant_keys_use_tenant_algorithm() -> Result<()> {
	let tenant_config =
		ProviderConfig::new("https://a.example.com")?.with_signing_algorithms([Algorithm::ES256]);
	let identities =
		Arc::new(CountingIdentityService::default().with_tenant("tenant-a", Some(tenant_config)));
	let resolver = Arc::new(
		CountingKeyResolver::default()
			.with_key(common::tenant("tenant-a"), KeyMaterial::from_public_pem(common::EC_P256_PUBLIC))
			.await,
	);
	let context = ProviderContext::builder()
		.identity_service(identities)
		.key_resolver(resolver)
		.build();
	let jwks = context.jwks(&IdentityHint::explicit("tenant-a")).await?;
	let json = serde_json::to_value(&*jwks)?;

	assert_eq!(json["keys"][0]["kid"], common::EC_P256_KID);
	assert_eq!(json["keys"][0]["alg"], "ES256");
	assert_eq!(json["keys"][0]["crv"], "P-256");

	Ok(())
}

#[tokio::test]
async fn malformed_material_is_unavailable_and_uncached() {
	let cache = Arc::new(InMemoryCache::new());
	let resolver = Arc::new(InMemoryKeyResolver::new());

	let truncated = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";

	resolver.register(Tenant::Global, KeyMaterial::from_public_pem(truncated)).await;

	let context = ProviderContext::builder()
		.config(common::global_config())
		.cache(cache.clone())
		.key_resolver(resolver)
		.build();
	let result = context.jwks(&IdentityHint::None).await;

	assert!(matches!(result, Err(Error::KeyMaterialUnavailable { .. })));
	assert!(cache.is_empty().await);
}

#[tokio::test]
async fn missing_global_keys_are_a_server_error() {
	let cache = Arc::new(InMemoryCache::new());
	let context = ProviderContext::builder()
		.config(common::global_config())
		.cache(cache.clone())
		.key_resolver(Arc::new(InMemoryKeyResolver::new()))
		.build();
	let err = context.jwks(&IdentityHint::None).await.expect_err("no global keys registered");

	assert!(matches!(err, Error::KeyMaterialUnavailable { ref tenant, .. } if tenant == GLOBAL_LABEL));
	assert!(!err.is_tenant_not_found());
	assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert!(cache.is_empty().await);
}

#[tokio::test]
async fn missing_key_resolver_is_a_configuration_error() {
	let context = ProviderContext::builder().config(common::global_config()).build();

	assert!(matches!(
		context.jwks(&IdentityHint::None).await,
		Err(Error::ConfigurationInvalid { field: "key_resolver", .. })
	));
}

#[tokio::test]
async fn tokens_verify_against_published_keys() -> Result<()> {
	common::init_tracing();

	let resolver = Arc::new(InMemoryKeyResolver::new());

	resolver
		.register(
			Tenant::Global,
			KeyMaterial::from_public_pem(common::RSA_PRIMARY_PUBLIC)
				.with_private_pem(common::RSA_PRIMARY_PRIVATE),
		)
		.await;
	resolver
		.register(
			Tenant::Global,
			KeyMaterial::from_public_pem(common::EC_P256_PUBLIC)
				.with_private_pem(common::EC_P256_PRIVATE)
				.with_algorithm(Algorithm::ES256),
		)
		.await;

	let context = ProviderContext::builder()
		.config(common::global_config())
		.key_resolver(resolver.clone())
		.build();
	let jwks = context.jwks(&IdentityHint::None).await?;
	let claims = Claims {
		sub: "alice".into(),
		iss: "https://idp.example.com".into(),
		exp: chrono::Utc::now().timestamp() as u64 + 600,
	};

	for (material, algorithm) in [
		(
			KeyMaterial::from_public_pem(common::RSA_PRIMARY_PUBLIC)
				.with_private_pem(common::RSA_PRIMARY_PRIVATE),
			Algorithm::RS256,
		),
		(
			KeyMaterial::from_public_pem(common::EC_P256_PUBLIC)
				.with_private_pem(common::EC_P256_PRIVATE),
			Algorithm::ES256,
		),
	] {
		let signer = SigningKey::parse(&material)?;
		let encoding_key: EncodingKey = signer.encoding_key()?;
		let mut header = Header::new(algorithm);

		header.kid = Some(signer.kid().to_owned());

		let token = jsonwebtoken::encode(&header, &claims, &encoding_key)?;
		let kid = jsonwebtoken::decode_header(&token)?.kid.expect("kid in header");
		let jwk = jwks.find(&kid).expect("signing key is published");
		let mut validation = Validation::new(algorithm);

		validation.set_issuer(&["https://idp.example.com"]);

		let decoded =
			jsonwebtoken::decode::<Claims>(&token, &DecodingKey::from_jwk(jwk)?, &validation)?;

		assert_eq!(decoded.claims, claims);
	}

	Ok(())
}
