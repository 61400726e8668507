//! Security utilities covering HTTPS enforcement, host allowlists, and SPKI fingerprints.
//!
//! # Threat Model
//! Issuer bases derived from request headers are attacker-controlled until proven otherwise, so
//! hosts are canonicalised and matched against an allowlist before they may root any published
//! metadata. Key identifiers are derived from the public key itself so they cannot drift away
//! from the material they name.

// std
use std::{
	collections::HashSet,
	fmt::{Debug, Display, Formatter, Result as FmtResult},
};
// crates.io
use base64::prelude::*;
use serde::{Deserialize, de::Deserializer};
use sha2::{Digest, Sha256};
use url::{Host, Url};
// self
use crate::_prelude::*;

/// SHA-256 fingerprint of a DER-encoded SubjectPublicKeyInfo.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpkiFingerprint([u8; 32]);
impl SpkiFingerprint {
	/// Fingerprint a DER-encoded SPKI payload.
	pub fn of_spki(spki_der: &[u8]) -> Self {
		let mut bytes = [0u8; 32];

		bytes.copy_from_slice(&Sha256::digest(spki_der));

		Self(bytes)
	}

	/// Raw digest bytes.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	/// Unpadded base64url rendering used as the JWK `kid`.
	pub fn to_kid(&self) -> String {
		BASE64_URL_SAFE_NO_PAD.encode(self.0)
	}
}
impl Debug for SpkiFingerprint {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "SpkiFingerprint({})", self.to_kid())
	}
}
impl Display for SpkiFingerprint {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(&self.to_kid())
	}
}

/// Canonical form of a host name: trimmed, lowercased, without a trailing dot.
///
/// Returns `None` for empty names and names containing whitespace.
pub fn canonical_host(value: &str) -> Option<String> {
	let host = value.trim().trim_end_matches('.');

	if host.is_empty() || host.contains(char::is_whitespace) {
		return None;
	}

	Some(host.to_ascii_lowercase())
}

/// Canonicalise allowlist entries, dropping invalid entries and duplicates while keeping order.
pub fn normalize_allowlist(hosts: Vec<String>) -> Vec<String> {
	let mut seen = HashSet::new();

	hosts
		.iter()
		.filter_map(|host| canonical_host(host))
		.filter(|host| seen.insert(host.clone()))
		.collect()
}

/// `serde` helper normalising allowlist hosts during deserialisation.
pub fn deserialize_allowed_hosts<'de, D>(
	deserializer: D,
) -> std::result::Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Vec::<String>::deserialize(deserializer).map(normalize_allowlist)
}

/// Whether `host` equals an allowlisted domain or is a subdomain of one.
///
/// An empty allowlist admits every host.
pub fn host_is_allowed(host: &str, allowed_hosts: &[String]) -> bool {
	if allowed_hosts.is_empty() {
		return true;
	}

	let Some(host) = canonical_host(host) else {
		return false;
	};

	allowed_hosts.iter().filter_map(|domain| canonical_host(domain)).any(|domain| {
		host == domain
			|| host.strip_suffix(domain.as_str()).is_some_and(|prefix| prefix.ends_with('.'))
	})
}

/// Ensure the URL uses HTTPS.
pub fn enforce_https(field: &'static str, url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::ConfigurationInvalid { field, reason: format!("URL {url} must use HTTPS.") })
	}
}

/// Whether the URL points at a loopback host, where plain HTTP is tolerated.
pub fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}
