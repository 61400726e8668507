//! JSON Web Key Set publication.

// std
use std::collections::HashSet;
// crates.io
use jsonwebtoken::{Algorithm, jwk::JwkSet};
// self
use crate::{
	_prelude::*,
	cache::{CacheKey, CachedDocument, DocumentKind},
	context::ProviderContext,
	keys::{KeyMaterial, SigningKey},
	tenant::{IdentityHint, Tenant},
};

/// Build the key set of `tenant` from its key material.
///
/// Keys are ordered newest first (ties broken by `kid`) and deduplicated by `kid`. Keys without
/// a pinned algorithm are published with `default_algorithm`. An empty or unusable key list fails
/// with [`Error::KeyMaterialUnavailable`].
pub fn build_key_set(
	tenant: &Tenant,
	materials: &[KeyMaterial],
	default_algorithm: Algorithm,
) -> Result<JwkSet> {
	let unavailable = |reason: String| Error::KeyMaterialUnavailable {
		tenant: tenant.label().to_owned(),
		reason,
	};

	if materials.is_empty() {
		return Err(unavailable("The key resolver returned no keys.".into()));
	}

	let mut keys = materials
		.iter()
		.map(|material| {
			let key = SigningKey::parse(material)?;
			let algorithm = key.effective_algorithm(default_algorithm)?;

			Ok((key, algorithm))
		})
		.collect::<Result<Vec<_>>>()
		.map_err(|err| unavailable(err.to_string()))?;

	keys.sort_by(|(a, _), (b, _)| {
		b.created_at().cmp(&a.created_at()).then_with(|| a.kid().cmp(b.kid()))
	});

	let mut seen = HashSet::new();
	let keys = keys
		.into_iter()
		.filter(|(key, _)| seen.insert(key.kid().to_owned()))
		.map(|(key, algorithm)| key.to_jwk(algorithm))
		.collect();

	Ok(JwkSet { keys })
}

impl ProviderContext {
	/// Serve the key set for the tenant selected by `hint`.
	///
	/// Unknown tenants fail with [`Error::TenantNotFound`]; an empty set is never returned.
	#[tracing::instrument(skip(self, hint), fields(hint = ?hint.value()))]
	pub async fn jwks(&self, hint: &IdentityHint) -> Result<Arc<JwkSet>> {
		let tenant = self.resolve_tenant(hint).await?;
		let key = CacheKey::jwks(self.generation(), &tenant);
		let document = self
			.serve_cached(&tenant, DocumentKind::Jwks, &[key.clone()], || async {
				let config = self.tenant_config(&tenant).await?;
				let materials = self.signing_material(&tenant).await?;
				let jwks = build_key_set(&tenant, &materials, config.default_signing_algorithm()?)?;

				tracing::debug!(tenant = %tenant, keys = jwks.keys.len(), "key set built");

				Ok((key, CachedDocument::Jwks(Arc::new(jwks))))
			})
			.await?;

		document.into_jwks().ok_or_else(|| {
			Error::Cache(format!("Entry for tenant '{tenant}' does not hold a key set."))
		})
	}

	/// Key material the resolver holds for `tenant`.
	///
	/// A named tenant the resolver does not know is [`Error::TenantNotFound`]. The global tenant
	/// always exists, so missing global keys are [`Error::KeyMaterialUnavailable`].
	pub async fn signing_material(&self, tenant: &Tenant) -> Result<Vec<KeyMaterial>> {
		let resolver = self.key_resolver().ok_or_else(|| Error::ConfigurationInvalid {
			field: "key_resolver",
			reason: "No key resolver is wired into the provider context.".into(),
		})?;

		match self.call("key_resolver", resolver.resolve(tenant)).await? {
			Some(materials) => Ok(materials),
			None if tenant.is_global() => Err(Error::KeyMaterialUnavailable {
				tenant: tenant.label().to_owned(),
				reason: "No signing keys are registered for the global tenant.".into(),
			}),
			None => Err(tenant.not_found()),
		}
	}
}
