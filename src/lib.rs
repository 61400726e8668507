//! OpenID Connect provider discovery metadata and JWKS publication, wired through a shared
//! provider context with pluggable services and multi-tenant issuers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod config;
pub mod context;
pub mod discovery;
pub mod http;
pub mod jwks;
pub mod keys;
pub mod metrics;
pub mod security;
pub mod service;
pub mod tenant;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "redis")] pub use crate::cache::redis::RedisCache;
#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{Cache, CacheKey, CachedDocument, DocumentKind, InMemoryCache},
	config::{EndpointPaths, ProviderConfig},
	context::{IdentityFailurePolicy, ProviderContext, ProviderContextBuilder, SharedContext},
	discovery::{DiscoveryDocument, DiscoveryRequest},
	error::{Error, Result},
	http::{RequestPolicy, render_json},
	keys::{KeyFamily, KeyMaterial, SigningKey},
	metrics::{DocumentStats, ProviderMetrics, ProviderMetricsSnapshot},
	service::{
		ClientDetail, ClientDetailService, IdentityService, InMemoryClientRegistry,
		InMemoryKeyResolver, InMemoryUserDirectory, KeyResolver, StaticIdentityService, User,
		UserService,
	},
	tenant::{Identity, IdentityHint, Tenant},
};
