//! Redis-backed cache shared between provider instances.

// crates.io
use async_trait::async_trait;
use redis::AsyncCommands;
// self
use crate::{
	_prelude::*,
	cache::{Cache, CacheKey, CachedDocument},
};

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "oidc-provider-metadata";

/// [`Cache`] storing JSON-encoded documents in Redis.
#[derive(Clone, Debug)]
pub struct RedisCache {
	client: redis::Client,
	namespace: Arc<str>,
	ttl: Option<Duration>,
}
impl RedisCache {
	/// Wrap a Redis client using the default namespace and no expiry.
	pub fn new(client: redis::Client) -> Self {
		Self { client, namespace: Arc::from(DEFAULT_NAMESPACE), ttl: None }
	}

	/// Adjust the key namespace.
	pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
		self.namespace = Arc::from(namespace.into());

		self
	}

	/// Expire entries after `ttl`, bounding staleness when several instances share the cache.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = Some(ttl);

		self
	}

	fn key(&self, key: &str) -> String {
		format!("{}:{key}", self.namespace)
	}

	async fn delete_matching(&self, pattern: String) -> Result<usize> {
		let mut conn = self.client.get_multiplexed_async_connection().await?;
		let keys: Vec<String> = conn.keys(pattern).await?;

		if keys.is_empty() {
			return Ok(0);
		}

		let removed: usize = conn.del(keys).await?;

		Ok(removed)
	}
}
#[async_trait]
impl Cache for RedisCache {
	async fn get(&self, key: &CacheKey) -> Result<Option<CachedDocument>> {
		let mut conn = self.client.get_multiplexed_async_connection().await?;
		let value: Option<String> = conn.get(self.key(key.as_str())).await?;

		if let Some(json) = value {
			let document: CachedDocument = serde_json::from_str(&json)?;

			Ok(Some(document))
		} else {
			Ok(None)
		}
	}

	async fn put(&self, key: CacheKey, document: CachedDocument) -> Result<()> {
		let mut conn = self.client.get_multiplexed_async_connection().await?;
		let payload = serde_json::to_string(&document)?;
		let key = self.key(key.as_str());

		match self.ttl {
			Some(ttl) => conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs().max(1)).await?,
			None => conn.set::<_, _, ()>(key, payload).await?,
		}

		Ok(())
	}

	async fn invalidate(&self, key: &CacheKey) -> Result<()> {
		let mut conn = self.client.get_multiplexed_async_connection().await?;

		conn.del::<_, ()>(self.key(key.as_str())).await?;

		Ok(())
	}

	async fn invalidate_prefix(&self, prefix: &str) -> Result<usize> {
		self.delete_matching(format!("{}*", self.key(&escape_glob(prefix)))).await
	}

	async fn clear(&self) -> Result<()> {
		self.delete_matching(format!("{}:*", escape_glob(&self.namespace))).await?;

		Ok(())
	}
}

fn escape_glob(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());

	for c in value.chars() {
		if matches!(c, '*' | '?' | '[' | ']' | '\\') {
			escaped.push('\\');
		}

		escaped.push(c);
	}

	escaped
}
