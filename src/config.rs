//! Provider configuration and validation.
//!
//! One [`ProviderConfig`] describes the capabilities and endpoint layout of a single issuer. A
//! provider without tenants owns exactly one; multi-tenant providers hold one per identity.

// crates.io
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{_prelude::*, security};

/// Default authorization endpoint path.
pub const DEFAULT_AUTHORIZATION_PATH: &str = "/oauth/authorize";
/// Default token endpoint path.
pub const DEFAULT_TOKEN_PATH: &str = "/oauth/token";
/// Default userinfo endpoint path.
pub const DEFAULT_USERINFO_PATH: &str = "/oauth/userinfo";
/// Default JWKS path.
pub const DEFAULT_JWKS_PATH: &str = "/.well-known/jwks.json";
/// Default discovery document path.
pub const DEFAULT_DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
/// Maximum accepted length of an endpoint path.
pub const MAX_PATH_LEN: usize = 256;

const RESPONSE_TYPE_TOKENS: &[&str] = &["code", "token", "id_token", "none"];
const SUBJECT_TYPES: &[&str] = &["public", "pairwise"];

/// Relative endpoint paths, each joined onto the effective issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
	/// Authorization endpoint.
	pub authorization: String,
	/// Token endpoint.
	pub token: String,
	/// Userinfo endpoint.
	pub userinfo: String,
	/// JWKS endpoint.
	pub jwks: String,
	/// Discovery document location; [`crate::RequestPolicy::with_endpoint_paths`] finds
	/// identity path segments in front of it.
	pub discovery: String,
	/// Dynamic client registration endpoint.
	pub registration: Option<String>,
	/// RP-initiated logout endpoint.
	pub end_session: Option<String>,
	/// Session management iframe.
	pub check_session: Option<String>,
	/// Token revocation endpoint.
	pub revocation: Option<String>,
	/// Token introspection endpoint.
	pub introspection: Option<String>,
}
impl EndpointPaths {
	/// Validate every configured path.
	pub fn validate(&self) -> Result<()> {
		validate_path("endpoints.authorization", &self.authorization)?;
		validate_path("endpoints.token", &self.token)?;
		validate_path("endpoints.userinfo", &self.userinfo)?;
		validate_path("endpoints.jwks", &self.jwks)?;
		validate_path("endpoints.discovery", &self.discovery)?;

		[
			("endpoints.registration", &self.registration),
			("endpoints.end_session", &self.end_session),
			("endpoints.check_session", &self.check_session),
			("endpoints.revocation", &self.revocation),
			("endpoints.introspection", &self.introspection),
		]
		.into_iter()
		.filter_map(|(field, path)| path.as_deref().map(|path| (field, path)))
		.try_for_each(|(field, path)| validate_path(field, path))
	}
}
impl Default for EndpointPaths {
	fn default() -> Self {
		Self {
			authorization: DEFAULT_AUTHORIZATION_PATH.into(),
			token: DEFAULT_TOKEN_PATH.into(),
			userinfo: DEFAULT_USERINFO_PATH.into(),
			jwks: DEFAULT_JWKS_PATH.into(),
			discovery: DEFAULT_DISCOVERY_PATH.into(),
			registration: Some("/oauth/registration".into()),
			end_session: Some("/oauth/logout".into()),
			check_session: Some("/oauth/check_session".into()),
			revocation: Some("/oauth/revoke".into()),
			introspection: None,
		}
	}
}

/// Capabilities and endpoint layout advertised by one issuer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
	/// Fixed issuer URL; when absent the issuer is derived from the inbound request.
	#[serde(default)]
	pub issuer: Option<Url>,
	/// Append the tenant identity as a trailing path segment of the issuer.
	#[serde(default)]
	pub dynamic_issuer: bool,
	/// Require HTTPS issuers (loopback hosts are exempt).
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Endpoint paths relative to the issuer.
	#[serde(default)]
	pub endpoints: EndpointPaths,
	/// `scopes_supported`.
	#[serde(default = "default_scopes")]
	pub scopes_supported: Vec<String>,
	/// `response_types_supported`.
	#[serde(default = "default_response_types")]
	pub response_types_supported: Vec<String>,
	/// `response_modes_supported`.
	#[serde(default = "default_response_modes")]
	pub response_modes_supported: Vec<String>,
	/// `grant_types_supported`.
	#[serde(default = "default_grant_types")]
	pub grant_types_supported: Vec<String>,
	/// `subject_types_supported`.
	#[serde(default = "default_subject_types")]
	pub subject_types_supported: Vec<String>,
	/// `id_token_signing_alg_values_supported`; the first entry signs keys that carry no own
	/// algorithm.
	#[serde(default = "default_signing_algorithms")]
	pub id_token_signing_alg_values_supported: Vec<Algorithm>,
	/// `userinfo_signing_alg_values_supported`.
	#[serde(default = "default_signing_algorithms")]
	pub userinfo_signing_alg_values_supported: Vec<Algorithm>,
	/// `request_object_signing_alg_values_supported`; may contain `none`.
	#[serde(default = "default_request_object_algorithms")]
	pub request_object_signing_alg_values_supported: Vec<String>,
	/// `token_endpoint_auth_methods_supported`.
	#[serde(default = "default_token_auth_methods")]
	pub token_endpoint_auth_methods_supported: Vec<String>,
	/// `claim_types_supported`.
	#[serde(default = "default_claim_types")]
	pub claim_types_supported: Vec<String>,
	/// `claims_supported`.
	#[serde(default = "default_claims")]
	pub claims_supported: Vec<String>,
	/// `code_challenge_methods_supported`.
	#[serde(default = "default_code_challenge_methods")]
	pub code_challenge_methods_supported: Vec<String>,
	/// `request_parameter_supported`.
	#[serde(default)]
	pub request_parameter_supported: bool,
	/// `request_uri_parameter_supported`.
	#[serde(default)]
	pub request_uri_parameter_supported: bool,
	/// `require_request_uri_registration`.
	#[serde(default)]
	pub require_request_uri_registration: bool,
	/// `claims_parameter_supported`.
	#[serde(default)]
	pub claims_parameter_supported: bool,
}
impl ProviderConfig {
	/// Construct a configuration with a fixed issuer and default capabilities.
	pub fn new(issuer: impl AsRef<str>) -> Result<Self> {
		let issuer = Url::parse(issuer.as_ref())?;

		Ok(Self { issuer: Some(issuer), ..Self::default() })
	}

	/// Construct a configuration whose issuer is derived from each inbound request.
	pub fn request_derived() -> Self {
		Self::default()
	}

	/// Parse a JSON document and validate it.
	pub fn from_json(raw: &str) -> Result<Self> {
		let config: Self = serde_json::from_str(raw)?;

		config.validate()?;

		Ok(config)
	}

	/// Require HTTPS issuers and redirect URIs outside loopback.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Toggle identity-suffixed issuers.
	pub fn with_dynamic_issuer(mut self, dynamic_issuer: bool) -> Self {
		self.dynamic_issuer = dynamic_issuer;

		self
	}

	/// Replace the endpoint path map.
	pub fn with_endpoints(mut self, endpoints: EndpointPaths) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Replace `scopes_supported`.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes_supported = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Replace `response_types_supported`.
	pub fn with_response_types<I, S>(mut self, response_types: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.response_types_supported = response_types.into_iter().map(Into::into).collect();

		self
	}

	/// Replace `grant_types_supported`.
	pub fn with_grant_types<I, S>(mut self, grant_types: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.grant_types_supported = grant_types.into_iter().map(Into::into).collect();

		self
	}

	/// Replace `id_token_signing_alg_values_supported`.
	pub fn with_signing_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
		self.id_token_signing_alg_values_supported = algorithms.into_iter().collect();

		self
	}

	/// Algorithm stamped on keys that do not pin their own.
	pub fn default_signing_algorithm(&self) -> Result<Algorithm> {
		self.id_token_signing_alg_values_supported.first().copied().ok_or_else(|| {
			Error::ConfigurationInvalid {
				field: "id_token_signing_alg_values_supported",
				reason: "Must list at least one algorithm.".into(),
			}
		})
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if let Some(issuer) = &self.issuer {
			validate_issuer(issuer, self.require_https)?;
		}

		self.endpoints.validate()?;
		self.default_signing_algorithm()?;

		for scope in &self.scopes_supported {
			if scope.is_empty() || scope.chars().any(|c| c.is_whitespace() || c == '"') {
				return Err(Error::ConfigurationInvalid {
					field: "scopes_supported",
					reason: format!("Scope '{scope}' is not a valid scope token."),
				});
			}
		}
		for response_type in &self.response_types_supported {
			let valid = !response_type.trim().is_empty()
				&& response_type.split(' ').all(|token| RESPONSE_TYPE_TOKENS.contains(&token));

			if !valid {
				return Err(Error::ConfigurationInvalid {
					field: "response_types_supported",
					reason: format!("Response type '{response_type}' is not recognised."),
				});
			}
		}
		for subject_type in &self.subject_types_supported {
			if !SUBJECT_TYPES.contains(&subject_type.as_str()) {
				return Err(Error::ConfigurationInvalid {
					field: "subject_types_supported",
					reason: format!("Subject type '{subject_type}' is not recognised."),
				});
			}
		}

		Ok(())
	}
}
impl Default for ProviderConfig {
	fn default() -> Self {
		Self {
			issuer: None,
			dynamic_issuer: false,
			require_https: true,
			endpoints: EndpointPaths::default(),
			scopes_supported: default_scopes(),
			response_types_supported: default_response_types(),
			response_modes_supported: default_response_modes(),
			grant_types_supported: default_grant_types(),
			subject_types_supported: default_subject_types(),
			id_token_signing_alg_values_supported: default_signing_algorithms(),
			userinfo_signing_alg_values_supported: default_signing_algorithms(),
			request_object_signing_alg_values_supported: default_request_object_algorithms(),
			token_endpoint_auth_methods_supported: default_token_auth_methods(),
			claim_types_supported: default_claim_types(),
			claims_supported: default_claims(),
			code_challenge_methods_supported: default_code_challenge_methods(),
			request_parameter_supported: false,
			request_uri_parameter_supported: false,
			require_request_uri_registration: false,
			claims_parameter_supported: false,
		}
	}
}

/// Validate an issuer URL: absolute, no query or fragment, HTTPS unless loopback when required.
pub fn validate_issuer(issuer: &Url, require_https: bool) -> Result<()> {
	if issuer.cannot_be_a_base() || issuer.host_str().is_none() {
		return Err(Error::ConfigurationInvalid {
			field: "issuer",
			reason: "Must be an absolute URL with a host.".into(),
		});
	}
	if issuer.query().is_some() || issuer.fragment().is_some() {
		return Err(Error::ConfigurationInvalid {
			field: "issuer",
			reason: "Must not carry a query or fragment component.".into(),
		});
	}
	if require_https && !security::is_loopback(issuer) {
		security::enforce_https("issuer", issuer)?;
	}

	Ok(())
}

fn validate_path(field: &'static str, path: &str) -> Result<()> {
	if !path.starts_with('/') {
		return Err(Error::ConfigurationInvalid { field, reason: "Must start with '/'.".into() });
	}
	if path.len() > MAX_PATH_LEN {
		return Err(Error::ConfigurationInvalid {
			field,
			reason: format!("Must be {MAX_PATH_LEN} characters or fewer."),
		});
	}
	if path.starts_with("//") || path.contains("://") || path.contains(['?', '#', ' ']) {
		return Err(Error::ConfigurationInvalid {
			field,
			reason: "Must be a plain path relative to the issuer.".into(),
		});
	}

	Ok(())
}

fn default_true() -> bool {
	true
}

fn strings(values: &[&str]) -> Vec<String> {
	values.iter().map(|value| (*value).to_owned()).collect()
}

fn default_scopes() -> Vec<String> {
	strings(&["openid", "profile", "email", "phone", "address"])
}

fn default_response_types() -> Vec<String> {
	strings(&[
		"code",
		"token",
		"id_token",
		"code token",
		"code id_token",
		"id_token token",
		"code id_token token",
		"none",
	])
}

fn default_response_modes() -> Vec<String> {
	strings(&["query", "fragment", "form_post"])
}

fn default_grant_types() -> Vec<String> {
	strings(&["authorization_code", "implicit", "password", "client_credentials", "refresh_token"])
}

fn default_subject_types() -> Vec<String> {
	strings(&["public"])
}

fn default_signing_algorithms() -> Vec<Algorithm> {
	vec![Algorithm::RS256]
}

fn default_request_object_algorithms() -> Vec<String> {
	strings(&["none", "RS256", "ES256"])
}

fn default_token_auth_methods() -> Vec<String> {
	strings(&["client_secret_basic", "client_secret_post", "none"])
}

fn default_claim_types() -> Vec<String> {
	strings(&["normal"])
}

fn default_claims() -> Vec<String> {
	strings(&[
		"sub",
		"iss",
		"aud",
		"exp",
		"iat",
		"auth_time",
		"nonce",
		"name",
		"preferred_username",
		"email",
		"email_verified",
	])
}

fn default_code_challenge_methods() -> Vec<String> {
	strings(&["S256", "plain"])
}
