//! Provider telemetry.
//!
//! Every cached serve is reported twice: through the global `metrics` facade, labelled by
//! tenant and document, and into the [`ProviderMetrics`] owned by the serving context so
//! callers can inspect a context without installing a recorder.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::{_prelude::*, cache::DocumentKind, tenant::Tenant};

type Labels = SmallVec<[Label; 3]>;

const REQUESTS: &str = "oidc_metadata_requests_total";
const CACHE_HITS: &str = "oidc_metadata_cache_hits_total";
const CACHE_MISSES: &str = "oidc_metadata_cache_misses_total";
const BUILD_ERRORS: &str = "oidc_metadata_build_errors_total";
const BUILD_DURATION: &str = "oidc_metadata_build_duration_seconds";

#[cfg(feature = "prometheus")]
static PROMETHEUS: OnceLock<std::result::Result<PrometheusHandle, String>> = OnceLock::new();

#[derive(Debug, Default)]
struct DocumentCounters {
	requests: AtomicU64,
	hits: AtomicU64,
	builds: AtomicU64,
	failures: AtomicU64,
}
impl DocumentCounters {
	fn read(&self) -> DocumentStats {
		DocumentStats {
			requests: self.requests.load(Ordering::Relaxed),
			hits: self.hits.load(Ordering::Relaxed),
			builds: self.builds.load(Ordering::Relaxed),
			failures: self.failures.load(Ordering::Relaxed),
		}
	}
}

/// Per-context serve counters, split by document kind.
#[derive(Debug, Default)]
pub struct ProviderMetrics {
	discovery: DocumentCounters,
	jwks: DocumentCounters,
	last_build_micros: AtomicU64,
}
impl ProviderMetrics {
	/// Fresh, zeroed counters.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// A request for `kind` was answered from the cache.
	pub fn record_hit(&self, kind: DocumentKind) {
		let counters = self.counters(kind);

		counters.requests.fetch_add(1, Ordering::Relaxed);
		counters.hits.fetch_add(1, Ordering::Relaxed);
	}

	/// A request for `kind` missed the cache.
	pub fn record_miss(&self, kind: DocumentKind) {
		self.counters(kind).requests.fetch_add(1, Ordering::Relaxed);
	}

	/// A document of `kind` was built in `duration`.
	pub fn record_build_success(&self, kind: DocumentKind, duration: Duration) {
		let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

		self.counters(kind).builds.fetch_add(1, Ordering::Relaxed);
		self.last_build_micros.store(micros.max(1), Ordering::Relaxed);
	}

	/// Building a document of `kind` failed.
	pub fn record_build_error(&self, kind: DocumentKind) {
		self.counters(kind).failures.fetch_add(1, Ordering::Relaxed);
	}

	/// Point-in-time copy of the counters.
	pub fn snapshot(&self) -> ProviderMetricsSnapshot {
		let last_build = match self.last_build_micros.load(Ordering::Relaxed) {
			0 => None,
			micros => Some(Duration::from_micros(micros)),
		};

		ProviderMetricsSnapshot {
			discovery: self.discovery.read(),
			jwks: self.jwks.read(),
			last_build,
		}
	}

	fn counters(&self, kind: DocumentKind) -> &DocumentCounters {
		match kind {
			DocumentKind::Discovery => &self.discovery,
			DocumentKind::Jwks => &self.jwks,
		}
	}
}

/// Counters of one document kind.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentStats {
	pub requests: u64,
	pub hits: u64,
	pub builds: u64,
	pub failures: u64,
}

/// Snapshot returned by [`ProviderMetrics::snapshot`].
#[derive(Clone, Debug)]
pub struct ProviderMetricsSnapshot {
	/// Discovery document counters.
	pub discovery: DocumentStats,
	/// Key set counters.
	pub jwks: DocumentStats,
	/// Latency of the most recent successful build of any kind.
	pub last_build: Option<Duration>,
}
impl ProviderMetricsSnapshot {
	/// Requests across both document kinds.
	pub fn total_requests(&self) -> u64 {
		self.discovery.requests + self.jwks.requests
	}

	/// Cache hits across both document kinds.
	pub fn cache_hits(&self) -> u64 {
		self.discovery.hits + self.jwks.hits
	}

	/// Builds across both document kinds.
	pub fn builds(&self) -> u64 {
		self.discovery.builds + self.jwks.builds
	}

	/// Share of requests answered from the cache; zero before the first request.
	pub fn hit_rate(&self) -> f64 {
		match self.total_requests() {
			0 => 0.0,
			total => self.cache_hits() as f64 / total as f64,
		}
	}
}

/// Install a global Prometheus recorder.
///
/// Only the first call installs; every later or concurrent call returns its outcome.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	PROMETHEUS
		.get_or_init(|| {
			let recorder = PrometheusBuilder::new().build_recorder();
			let handle = recorder.handle();

			metrics::set_global_recorder(recorder).map(|()| handle).map_err(|err| err.to_string())
		})
		.as_ref()
		.map(|_| ())
		.map_err(|err| Error::Metrics(format!("Failed to install Prometheus recorder: {err}.")))
}

/// Handle used to render the Prometheus scrape body; `None` until an install succeeded.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS.get().and_then(|installed| installed.as_ref().ok())
}

/// Count a request answered from the cache.
pub fn record_cache_hit(tenant: &Tenant, document: DocumentKind) {
	let labels = labels(tenant, document);

	metrics::counter!(REQUESTS, labels.iter()).increment(1);
	metrics::counter!(CACHE_HITS, labels.iter()).increment(1);
}

/// Count a request that had to build its document.
pub fn record_cache_miss(tenant: &Tenant, document: DocumentKind) {
	let labels = labels(tenant, document);

	metrics::counter!(REQUESTS, labels.iter()).increment(1);
	metrics::counter!(CACHE_MISSES, labels.iter()).increment(1);
}

/// Observe the latency of a successful build.
pub fn record_build_success(tenant: &Tenant, document: DocumentKind, duration: Duration) {
	metrics::histogram!(BUILD_DURATION, labels(tenant, document).iter())
		.record(duration.as_secs_f64());
}

/// Count a failed build, labelled with the OAuth error code of the failure.
pub fn record_build_error(tenant: &Tenant, document: DocumentKind, error: &Error) {
	let mut labels = labels(tenant, document);

	labels.push(Label::new("error", error.oauth_error_code()));

	metrics::counter!(BUILD_ERRORS, labels.iter()).increment(1);
}

fn labels(tenant: &Tenant, document: DocumentKind) -> Labels {
	let mut labels = Labels::new();

	labels.push(Label::new("tenant", tenant.label().to_owned()));
	labels.push(Label::new("document", document.as_str()));

	labels
}
