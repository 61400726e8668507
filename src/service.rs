//! Pluggable collaborator contracts consumed by the provider context.
//!
//! Every lookup is asynchronous and may fail. `Ok(None)` means the collaborator answered and the
//! item does not exist; `Err` means the collaborator itself could not answer.

pub mod memory;

pub use memory::{
	InMemoryClientRegistry, InMemoryKeyResolver, InMemoryUserDirectory, StaticIdentityService,
};

// std
use std::{
	collections::BTreeMap,
	fmt::{Debug, Formatter, Result as FmtResult},
};
// crates.io
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	config::ProviderConfig,
	keys::KeyMaterial,
	security,
	tenant::{Identity, IdentityHint, Tenant},
};

/// Registered OAuth client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetail {
	/// Client identifier.
	pub client_id: String,
	/// Shared secret for confidential clients.
	#[serde(default, skip_serializing)]
	pub client_secret: Option<String>,
	/// Human readable name.
	#[serde(default)]
	pub client_name: Option<String>,
	/// Registered redirect URIs.
	#[serde(default)]
	pub redirect_uris: Vec<Url>,
	/// Scopes the client may request.
	#[serde(default)]
	pub scopes: Vec<String>,
	/// Grant types the client may use.
	#[serde(default)]
	pub grant_types: Vec<String>,
	/// Response types the client may use.
	#[serde(default)]
	pub response_types: Vec<String>,
	/// Token endpoint authentication method.
	#[serde(default = "default_auth_method")]
	pub token_endpoint_auth_method: String,
	/// Disabled clients are treated as unknown.
	#[serde(default = "default_enabled")]
	pub enabled: bool,
}
impl ClientDetail {
	/// Create an enabled client with no registrations.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: None,
			client_name: None,
			redirect_uris: Vec::new(),
			scopes: Vec::new(),
			grant_types: Vec::new(),
			response_types: Vec::new(),
			token_endpoint_auth_method: default_auth_method(),
			enabled: true,
		}
	}

	/// Check the client's registrations against what the provider advertises.
	pub fn validate_against(&self, config: &ProviderConfig) -> Result<()> {
		let invalid = |reason: String| Error::InvalidClientMetadata {
			client_id: self.client_id.clone(),
			reason,
		};

		if self.client_id.trim().is_empty() {
			return Err(invalid("client_id must not be empty.".into()));
		}

		ensure_subset("scope", &self.scopes, &config.scopes_supported).map_err(invalid)?;
		ensure_subset("grant type", &self.grant_types, &config.grant_types_supported)
			.map_err(invalid)?;
		ensure_subset("response type", &self.response_types, &config.response_types_supported)
			.map_err(invalid)?;

		if !config.token_endpoint_auth_methods_supported.contains(&self.token_endpoint_auth_method) {
			return Err(invalid(format!(
				"Token endpoint auth method '{}' is not supported.",
				self.token_endpoint_auth_method
			)));
		}

		for uri in &self.redirect_uris {
			if uri.cannot_be_a_base() || uri.fragment().is_some() {
				return Err(invalid(format!("Redirect URI {uri} must be absolute without fragment.")));
			}
			if config.require_https && !security::is_loopback(uri) && uri.scheme() != "https" {
				return Err(invalid(format!("Redirect URI {uri} must use HTTPS.")));
			}
		}

		Ok(())
	}
}
impl Debug for ClientDetail {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ClientDetail")
			.field("client_id", &self.client_id)
			.field("client_name", &self.client_name)
			.field("redirect_uris", &self.redirect_uris)
			.field("scopes", &self.scopes)
			.field("grant_types", &self.grant_types)
			.field("response_types", &self.response_types)
			.field("token_endpoint_auth_method", &self.token_endpoint_auth_method)
			.field("enabled", &self.enabled)
			.finish_non_exhaustive()
	}
}

/// End user known to the provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
	/// Subject identifier.
	pub subject: String,
	/// `preferred_username` claim.
	#[serde(default)]
	pub username: Option<String>,
	/// `name` claim.
	#[serde(default)]
	pub name: Option<String>,
	/// `email` claim.
	#[serde(default)]
	pub email: Option<String>,
	/// `email_verified` claim.
	#[serde(default)]
	pub email_verified: bool,
	/// Additional claims released through userinfo.
	#[serde(default)]
	pub claims: BTreeMap<String, serde_json::Value>,
}
impl User {
	/// Create a user with only a subject.
	pub fn new(subject: impl Into<String>) -> Self {
		Self { subject: subject.into(), ..Self::default() }
	}
}

/// Looks up registered clients.
#[async_trait]
pub trait ClientDetailService: Send + Sync {
	/// Find a client by id.
	async fn find_by_client_id(&self, client_id: &str) -> Result<Option<ClientDetail>>;
}

/// Looks up end users.
#[async_trait]
pub trait UserService: Send + Sync {
	/// Find a user by subject.
	async fn find_by_subject(&self, subject: &str) -> Result<Option<User>>;
}

/// Maps request hints onto tenants and serves per-tenant configuration.
#[async_trait]
pub trait IdentityService: Send + Sync {
	/// Resolve a non-empty hint; `Ok(None)` means no such tenant.
	async fn resolve(&self, hint: &IdentityHint) -> Result<Option<Identity>>;

	/// Configuration of a resolved tenant; `Ok(None)` means the tenant has none.
	async fn config(&self, identity: &Identity) -> Result<Option<Arc<ProviderConfig>>>;
}

/// Produces the signing key material of a tenant.
#[async_trait]
pub trait KeyResolver: Send + Sync {
	/// Key material for `tenant`; `Ok(None)` means the tenant is unknown to the resolver.
	async fn resolve(&self, tenant: &Tenant) -> Result<Option<Vec<KeyMaterial>>>;
}

fn ensure_subset(
	label: &str,
	values: &[String],
	supported: &[String],
) -> std::result::Result<(), String> {
	match values.iter().find(|value| !supported.contains(*value)) {
		Some(value) => Err(format!("The {label} '{value}' is not supported by this provider.")),
		None => Ok(()),
	}
}

fn default_auth_method() -> String {
	"client_secret_basic".into()
}

fn default_enabled() -> bool {
	true
}
