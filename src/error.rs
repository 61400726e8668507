//! Crate-wide error types and `Result` alias.

// crates.io
use http::StatusCode;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the provider metadata crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Jsonwebtoken(#[from] jsonwebtoken::errors::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[cfg(feature = "redis")]
	#[error(transparent)]
	Redis(#[from] redis::RedisError),

	#[error("Cache error: {0}")]
	Cache(String),
	#[error("Client '{0}' is not registered.")]
	ClientNotFound(String),
	#[error("Collaborator '{service}' is unavailable: {reason}")]
	CollaboratorUnavailable { service: &'static str, reason: String },
	#[error("Configuration invalid for {field}: {reason}")]
	ConfigurationInvalid { field: &'static str, reason: String },
	#[error("Client '{client_id}' has invalid metadata: {reason}")]
	InvalidClientMetadata { client_id: String, reason: String },
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Key material for tenant '{tenant}' is unavailable: {reason}")]
	KeyMaterialUnavailable { tenant: String, reason: String },
	#[error("Malformed key material: {0}")]
	MalformedKey(String),
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Tenant '{identity}' is not known to this provider.")]
	TenantNotFound { identity: String },
	#[error("Subject '{0}' is not known.")]
	UserNotFound(String),
}
impl Error {
	/// HTTP status the endpoint layer should answer with for this failure.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::TenantNotFound { .. } | Self::ClientNotFound(_) | Self::UserNotFound(_) =>
				StatusCode::NOT_FOUND,
			Self::InvalidRequest(_) | Self::InvalidClientMetadata { .. } => StatusCode::BAD_REQUEST,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// OAuth-style error code used in JSON error bodies.
	pub fn oauth_error_code(&self) -> &'static str {
		match self {
			Self::TenantNotFound { .. } | Self::ClientNotFound(_) | Self::UserNotFound(_) =>
				"not_found",
			Self::InvalidRequest(_) => "invalid_request",
			Self::InvalidClientMetadata { .. } => "invalid_client_metadata",
			Self::CollaboratorUnavailable { .. } => "temporarily_unavailable",
			_ => "server_error",
		}
	}

	/// Whether the failure means the requested tenant does not exist.
	pub fn is_tenant_not_found(&self) -> bool {
		matches!(self, Self::TenantNotFound { .. })
	}
}
