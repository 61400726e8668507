//! Process-local cache used when no cache service is configured.

// std
use std::collections::HashMap;
// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	cache::{Cache, CacheKey, CachedDocument},
};

/// In-memory [`Cache`] guarded by an async read/write lock.
#[derive(Debug, Default)]
pub struct InMemoryCache {
	entries: RwLock<HashMap<CacheKey, CachedDocument>>,
}
impl InMemoryCache {
	/// Create an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of cached documents.
	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	/// Whether the cache holds no documents.
	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}
}
#[async_trait]
impl Cache for InMemoryCache {
	async fn get(&self, key: &CacheKey) -> Result<Option<CachedDocument>> {
		Ok(self.entries.read().await.get(key).cloned())
	}

	async fn put(&self, key: CacheKey, document: CachedDocument) -> Result<()> {
		self.entries.write().await.insert(key, document);

		Ok(())
	}

	async fn invalidate(&self, key: &CacheKey) -> Result<()> {
		self.entries.write().await.remove(key);

		Ok(())
	}

	async fn invalidate_prefix(&self, prefix: &str) -> Result<usize> {
		let mut entries = self.entries.write().await;
		let before = entries.len();

		entries.retain(|key, _| !key.as_str().starts_with(prefix));

		Ok(before - entries.len())
	}

	async fn clear(&self) -> Result<()> {
		self.entries.write().await.clear();

		Ok(())
	}
}
