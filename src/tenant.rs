//! Tenant identities, request hints, and the resolved tenant handle.

// std
use std::fmt::{Display, Formatter, Result as FmtResult};
// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// Maximum accepted identity length.
pub const MAX_IDENTITY_LEN: usize = 64;

/// Validated tenant identity (user, organisation, or enterprise key).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(Arc<str>);
impl Identity {
	/// Validate and wrap an identity.
	pub fn new(value: impl AsRef<str>) -> Result<Self> {
		let value = value.as_ref();

		validate_identity(value)?;

		Ok(Self(Arc::from(value)))
	}

	/// Borrow the identity string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for Identity {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl AsRef<str> for Identity {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl TryFrom<String> for Identity {
	type Error = Error;

	fn try_from(value: String) -> Result<Self> {
		Self::new(value)
	}
}
impl From<Identity> for String {
	fn from(value: Identity) -> Self {
		value.0.to_string()
	}
}

/// Request-derived hint handed to the identity service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IdentityHint {
	/// The request carried nothing tenant specific.
	#[default]
	None,
	/// Identity supplied explicitly by the caller (e.g. a query parameter).
	Explicit(String),
	/// Leading path segment preceding a well-known path.
	PathSegment(String),
	/// Value of a tenant header.
	Header(String),
}
impl IdentityHint {
	/// Convenience constructor for an explicit identity.
	pub fn explicit(value: impl Into<String>) -> Self {
		Self::Explicit(value.into())
	}

	/// Raw hint value, if any.
	pub fn value(&self) -> Option<&str> {
		match self {
			Self::None => None,
			Self::Explicit(value) | Self::PathSegment(value) | Self::Header(value) => Some(value),
		}
	}

	/// Whether the hint carries no value.
	pub fn is_none(&self) -> bool {
		self.value().map(str::trim).is_none_or(str::is_empty)
	}
}
impl From<Option<&str>> for IdentityHint {
	fn from(value: Option<&str>) -> Self {
		value.map(Self::explicit).unwrap_or_default()
	}
}

/// Label of [`Tenant::Global`].
pub const GLOBAL_LABEL: &str = "(global)";

/// Tenant handle produced once per request by identity resolution and passed to every lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tenant {
	/// Default tenant served when no identity applies.
	#[default]
	Global,
	/// Named tenant.
	Identity(Identity),
}
impl Tenant {
	/// Identity of a named tenant.
	pub fn identity(&self) -> Option<&Identity> {
		match self {
			Self::Global => None,
			Self::Identity(identity) => Some(identity),
		}
	}

	/// Whether this is the default tenant.
	pub fn is_global(&self) -> bool {
		matches!(self, Self::Global)
	}

	/// Segment used inside cache keys; cannot collide with a valid identity.
	pub fn cache_segment(&self) -> &str {
		match self {
			Self::Global => "~",
			Self::Identity(identity) => identity.as_str(),
		}
	}

	/// Label used for logs, errors, and metrics; the global label is not a valid identity.
	pub fn label(&self) -> &str {
		match self {
			Self::Global => GLOBAL_LABEL,
			Self::Identity(identity) => identity.as_str(),
		}
	}

	pub(crate) fn not_found(&self) -> Error {
		Error::TenantNotFound { identity: self.label().to_owned() }
	}
}
impl Display for Tenant {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.label())
	}
}
impl From<Option<Identity>> for Tenant {
	fn from(value: Option<Identity>) -> Self {
		value.map(Self::Identity).unwrap_or_default()
	}
}

fn validate_identity(value: &str) -> Result<()> {
	if value.is_empty() {
		return Err(Error::InvalidRequest("Identity must not be empty.".into()));
	}
	if value.len() > MAX_IDENTITY_LEN {
		return Err(Error::InvalidRequest(format!(
			"Identity must be {MAX_IDENTITY_LEN} characters or fewer."
		)));
	}
	if !value.as_bytes().iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_')) {
		return Err(Error::InvalidRequest(
			"Identity may only contain ASCII letters, numbers, '-', or '_'.".into(),
		));
	}

	Ok(())
}
