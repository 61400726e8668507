//! OpenID Provider configuration documents.
//!
//! [`build_document`] is a pure function of the effective issuer and a tenant's configuration.
//! [`ProviderContext::discovery_document`] wraps it with tenant resolution and caching.

// crates.io
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	cache::{CacheKey, CachedDocument, DocumentKind},
	config::{self, ProviderConfig},
	context::ProviderContext,
	tenant::{IdentityHint, Tenant},
};

/// OpenID Provider metadata as served from `/.well-known/openid-configuration`.
///
/// Field order is fixed so serialisation is byte-stable. List fields are always emitted, even
/// when empty; optional endpoints are omitted when not configured.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
	/// Issuer identifier.
	pub issuer: String,
	/// Authorization endpoint URL.
	pub authorization_endpoint: String,
	/// Token endpoint URL.
	pub token_endpoint: String,
	/// Userinfo endpoint URL.
	pub userinfo_endpoint: String,
	/// JWKS URL.
	pub jwks_uri: String,
	/// Dynamic client registration endpoint URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub registration_endpoint: Option<String>,
	/// RP-initiated logout endpoint URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end_session_endpoint: Option<String>,
	/// Session management iframe URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub check_session_iframe: Option<String>,
	/// Token revocation endpoint URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub revocation_endpoint: Option<String>,
	/// Token introspection endpoint URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub introspection_endpoint: Option<String>,
	#[allow(missing_docs)]
	pub scopes_supported: Vec<String>,
	#[allow(missing_docs)]
	pub response_types_supported: Vec<String>,
	#[allow(missing_docs)]
	pub response_modes_supported: Vec<String>,
	#[allow(missing_docs)]
	pub grant_types_supported: Vec<String>,
	#[allow(missing_docs)]
	pub subject_types_supported: Vec<String>,
	#[allow(missing_docs)]
	pub id_token_signing_alg_values_supported: Vec<Algorithm>,
	#[allow(missing_docs)]
	pub userinfo_signing_alg_values_supported: Vec<Algorithm>,
	#[allow(missing_docs)]
	pub request_object_signing_alg_values_supported: Vec<String>,
	#[allow(missing_docs)]
	pub token_endpoint_auth_methods_supported: Vec<String>,
	#[allow(missing_docs)]
	pub claim_types_supported: Vec<String>,
	#[allow(missing_docs)]
	pub claims_supported: Vec<String>,
	#[allow(missing_docs)]
	pub code_challenge_methods_supported: Vec<String>,
	#[allow(missing_docs)]
	pub request_parameter_supported: bool,
	#[allow(missing_docs)]
	pub request_uri_parameter_supported: bool,
	#[allow(missing_docs)]
	pub require_request_uri_registration: bool,
	#[allow(missing_docs)]
	pub claims_parameter_supported: bool,
}

/// Inputs of a discovery request once the transport layer has done its part.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryRequest {
	/// Issuer base derived from the request (scheme, host, port); used when the tenant
	/// configuration pins no issuer.
	pub base: Option<Url>,
	/// Tenant hint.
	pub hint: IdentityHint,
}
impl DiscoveryRequest {
	/// Request for the global tenant with no derived base.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the request-derived issuer base.
	pub fn with_base(mut self, base: Url) -> Self {
		self.base = Some(base);

		self
	}

	/// Set the tenant hint.
	pub fn with_hint(mut self, hint: IdentityHint) -> Self {
		self.hint = hint;

		self
	}
}

/// Compute the issuer a tenant publishes under.
///
/// A pinned issuer wins over the request base. With `dynamic_issuer`, named tenants get their
/// identity appended as a trailing path segment. The result never ends in `/`.
pub fn effective_issuer(config: &ProviderConfig, base: Option<&Url>, tenant: &Tenant) -> Result<String> {
	let root = match (&config.issuer, base) {
		(Some(issuer), _) => {
			config::validate_issuer(issuer, config.require_https)?;

			issuer
		},
		(None, Some(base)) => {
			config::validate_issuer(base, config.require_https).map_err(|err| {
				Error::InvalidRequest(format!("Request-derived issuer base is unusable: {err}"))
			})?;

			base
		},
		(None, None) =>
			return Err(Error::ConfigurationInvalid {
				field: "issuer",
				reason: "No issuer is configured and the request carried no base URL.".into(),
			}),
	};
	let root = root.as_str().trim_end_matches('/');

	Ok(match tenant.identity() {
		Some(identity) if config.dynamic_issuer => format!("{root}/{identity}"),
		_ => root.to_owned(),
	})
}

/// Build the discovery document for `issuer` from `config`.
pub fn build_document(issuer: &str, config: &ProviderConfig) -> Result<DiscoveryDocument> {
	config.endpoints.validate()?;

	let issuer = issuer.trim_end_matches('/');
	let endpoint = |path: &str| format!("{issuer}{path}");
	let optional = |path: &Option<String>| path.as_deref().map(endpoint);
	let endpoints = &config.endpoints;

	Ok(DiscoveryDocument {
		issuer: issuer.to_owned(),
		authorization_endpoint: endpoint(&endpoints.authorization),
		token_endpoint: endpoint(&endpoints.token),
		userinfo_endpoint: endpoint(&endpoints.userinfo),
		jwks_uri: endpoint(&endpoints.jwks),
		registration_endpoint: optional(&endpoints.registration),
		end_session_endpoint: optional(&endpoints.end_session),
		check_session_iframe: optional(&endpoints.check_session),
		revocation_endpoint: optional(&endpoints.revocation),
		introspection_endpoint: optional(&endpoints.introspection),
		scopes_supported: config.scopes_supported.clone(),
		response_types_supported: config.response_types_supported.clone(),
		response_modes_supported: config.response_modes_supported.clone(),
		grant_types_supported: config.grant_types_supported.clone(),
		subject_types_supported: config.subject_types_supported.clone(),
		id_token_signing_alg_values_supported: config.id_token_signing_alg_values_supported.clone(),
		userinfo_signing_alg_values_supported: config.userinfo_signing_alg_values_supported.clone(),
		request_object_signing_alg_values_supported: config
			.request_object_signing_alg_values_supported
			.clone(),
		token_endpoint_auth_methods_supported: config.token_endpoint_auth_methods_supported.clone(),
		claim_types_supported: config.claim_types_supported.clone(),
		claims_supported: config.claims_supported.clone(),
		code_challenge_methods_supported: config.code_challenge_methods_supported.clone(),
		request_parameter_supported: config.request_parameter_supported,
		request_uri_parameter_supported: config.request_uri_parameter_supported,
		require_request_uri_registration: config.require_request_uri_registration,
		claims_parameter_supported: config.claims_parameter_supported,
	})
}

impl ProviderContext {
	/// Serve the discovery document for a request.
	///
	/// Cached documents are returned as-is. Tenant lookup failures are never cached. Documents of
	/// a pinned issuer are cached once per tenant; request-derived ones once per request base.
	#[tracing::instrument(skip(self, request), fields(hint = ?request.hint.value()))]
	pub async fn discovery_document(&self, request: &DiscoveryRequest) -> Result<Arc<DiscoveryDocument>> {
		let tenant = self.resolve_tenant(&request.hint).await?;
		let generation = self.generation();
		let pinned = CacheKey::discovery(generation, &tenant, None);
		let derived =
			request.base.as_ref().map(|base| CacheKey::discovery(generation, &tenant, Some(base)));
		let lookup =
			[Some(pinned.clone()), derived.clone()].into_iter().flatten().collect::<Vec<_>>();
		let document = self
			.serve_cached(&tenant, DocumentKind::Discovery, &lookup, || async {
				let config = self.tenant_config(&tenant).await?;
				let issuer = effective_issuer(&config, request.base.as_ref(), &tenant)?;
				let document = build_document(&issuer, &config)?;

				tracing::debug!(tenant = %tenant, issuer = %document.issuer, "discovery document built");

				// A pinned issuer ignores the request base, so one entry serves every host.
				let key = match derived {
					Some(derived) if config.issuer.is_none() => derived,
					_ => pinned,
				};

				Ok((key, CachedDocument::Discovery(Arc::new(document))))
			})
			.await?;

		document.into_discovery().ok_or_else(|| {
			Error::Cache(format!("Entry for tenant '{tenant}' does not hold a discovery document."))
		})
	}
}
