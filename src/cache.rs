//! Document cache abstraction and key layout.
//!
//! Built discovery documents and key sets are cached per context generation and tenant. Keys are
//! namespaced so that one tenant's entries never satisfy another tenant's lookup, a replaced
//! context's entries never satisfy its successor, and a tenant can be invalidated with a single
//! prefix sweep.

pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use memory::InMemoryCache;

// std
use std::{
	fmt::{Display, Formatter, Result as FmtResult},
	sync::{
		OnceLock,
		atomic::{AtomicU64, Ordering},
	},
};
// crates.io
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{_prelude::*, discovery::DiscoveryDocument, tenant::Tenant};

/// Base segment of discovery entries whose issuer is pinned by configuration.
const PINNED: &str = "-";

/// Cache namespace of one built [`ProviderContext`](crate::context::ProviderContext).
///
/// Every key carries the generation of the context that wrote it, so contexts sharing a cache
/// never read each other's documents. The boot stamp keeps generations of separate processes
/// apart when they share a Redis cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Generation {
	boot: u64,
	sequence: u64,
}
impl Generation {
	pub(crate) fn next() -> Self {
		static BOOT: OnceLock<u64> = OnceLock::new();
		static SEQUENCE: AtomicU64 = AtomicU64::new(0);

		let boot = *BOOT.get_or_init(|| Utc::now().timestamp_micros().unsigned_abs());

		Self { boot, sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed) }
	}

	/// Prefix shared by every key of this generation.
	pub fn prefix(&self) -> String {
		format!("{self}:")
	}
}
impl Display for Generation {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "{:x}.{}", self.boot, self.sequence)
	}
}

/// Which published document a cache entry holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
	/// OpenID Provider configuration.
	Discovery,
	/// JSON Web Key Set.
	Jwks,
}
impl DocumentKind {
	/// Stable label used in cache keys, logs, and metrics.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Discovery => "discovery",
			Self::Jwks => "jwks",
		}
	}
}

/// Fully-qualified cache key (`{generation}:{kind}:{tenant}[:{base}]`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);
impl CacheKey {
	/// Key for a tenant's discovery document.
	///
	/// `base` is the request base of a request-derived issuer. Documents of a pinned issuer do
	/// not depend on the request and are stored once under `None`.
	pub fn discovery(generation: Generation, tenant: &Tenant, base: Option<&Url>) -> Self {
		let base = base.map(Url::as_str).unwrap_or(PINNED);

		Self(format!("{}{base}", Self::discovery_prefix(generation, tenant)))
	}

	/// Key for a tenant's key set.
	pub fn jwks(generation: Generation, tenant: &Tenant) -> Self {
		Self(format!("{generation}:{}:{}", DocumentKind::Jwks.as_str(), tenant.cache_segment()))
	}

	/// Prefix matching every discovery entry of `tenant`, whatever the request base.
	pub fn discovery_prefix(generation: Generation, tenant: &Tenant) -> String {
		format!("{generation}:{}:{}:", DocumentKind::Discovery.as_str(), tenant.cache_segment())
	}

	/// Borrow the key string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Cached, already-built document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "document", rename_all = "snake_case")]
pub enum CachedDocument {
	/// Built discovery document.
	Discovery(Arc<DiscoveryDocument>),
	/// Built key set.
	Jwks(Arc<JwkSet>),
}
impl CachedDocument {
	/// Kind of the cached document.
	pub fn kind(&self) -> DocumentKind {
		match self {
			Self::Discovery(_) => DocumentKind::Discovery,
			Self::Jwks(_) => DocumentKind::Jwks,
		}
	}

	/// Discovery payload, if this entry holds one.
	pub fn into_discovery(self) -> Option<Arc<DiscoveryDocument>> {
		match self {
			Self::Discovery(document) => Some(document),
			Self::Jwks(_) => None,
		}
	}

	/// Key set payload, if this entry holds one.
	pub fn into_jwks(self) -> Option<Arc<JwkSet>> {
		match self {
			Self::Jwks(jwks) => Some(jwks),
			Self::Discovery(_) => None,
		}
	}
}

/// Storage for built documents.
///
/// Implementations must be safe for concurrent use. Entries never expire on their own; the
/// context invalidates them on configuration or key changes.
#[async_trait]
pub trait Cache: Send + Sync {
	/// Fetch an entry.
	async fn get(&self, key: &CacheKey) -> Result<Option<CachedDocument>>;

	/// Insert or replace an entry.
	async fn put(&self, key: CacheKey, document: CachedDocument) -> Result<()>;

	/// Remove a single entry.
	async fn invalidate(&self, key: &CacheKey) -> Result<()>;

	/// Remove every entry whose key starts with `prefix`, returning how many were dropped.
	async fn invalidate_prefix(&self, prefix: &str) -> Result<usize>;

	/// Remove every entry.
	async fn clear(&self) -> Result<()>;
}
