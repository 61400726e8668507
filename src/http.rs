//! HTTP boundary helpers: request-to-issuer derivation and JSON response rendering.
//!
//! These helpers work on `http` types only, so any server framework can call them with the
//! request head it already parsed.

// crates.io
use http::{
	HeaderMap, HeaderValue, Response, StatusCode,
	header::{CACHE_CONTROL, CONTENT_TYPE, HOST},
	request::Parts,
};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	config::{DEFAULT_DISCOVERY_PATH, DEFAULT_JWKS_PATH, EndpointPaths},
	discovery::DiscoveryRequest,
	security,
	tenant::IdentityHint,
};

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";
const JSON: &str = "application/json";

/// How inbound requests are mapped onto issuer bases and tenant hints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestPolicy {
	/// Query parameter carrying an explicit identity.
	pub identity_query_param: Option<String>,
	/// Header carrying the tenant identity.
	pub identity_header: Option<String>,
	/// Treat the segment preceding a well-known path as the tenant identity
	/// (`/{identity}/.well-known/openid-configuration`).
	pub path_identity: bool,
	/// Well-known paths recognised for path-based identities.
	pub well_known_paths: Vec<String>,
	/// Honour `X-Forwarded-Proto` and `X-Forwarded-Host` from a trusted proxy.
	pub trust_forwarded_headers: bool,
	/// Scheme assumed when neither the URI nor a trusted proxy supplies one.
	pub default_scheme: String,
	/// Hosts allowed to root an issuer; empty allows every host.
	#[serde(deserialize_with = "security::deserialize_allowed_hosts")]
	pub allowed_hosts: Vec<String>,
}
impl RequestPolicy {
	/// Only accept hosts under the given domains.
	pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.allowed_hosts = security::normalize_allowlist(hosts.into_iter().map(Into::into).collect());

		self
	}

	/// Read the identity from `header`.
	pub fn with_identity_header(mut self, header: impl Into<String>) -> Self {
		self.identity_header = Some(header.into());

		self
	}

	/// Toggle path-segment identities.
	pub fn with_path_identity(mut self, enabled: bool) -> Self {
		self.path_identity = enabled;

		self
	}

	/// Recognise path identities in front of the discovery and JWKS paths of `endpoints`.
	pub fn with_endpoint_paths(mut self, endpoints: &EndpointPaths) -> Self {
		self.well_known_paths = vec![endpoints.discovery.clone(), endpoints.jwks.clone()];

		self
	}

	/// Toggle trust in forwarding headers.
	pub fn with_trusted_forwarding(mut self, trusted: bool) -> Self {
		self.trust_forwarded_headers = trusted;

		self
	}

	/// Derive the discovery inputs of a request.
	pub fn discovery_request(&self, parts: &Parts) -> Result<DiscoveryRequest> {
		let base = self.issuer_base(parts)?;

		Ok(DiscoveryRequest { base: Some(base), hint: self.identity_hint(parts) })
	}

	/// Extract the tenant hint: query parameter, then header, then path segment.
	pub fn identity_hint(&self, parts: &Parts) -> IdentityHint {
		if let Some(name) = &self.identity_query_param
			&& let Some(query) = parts.uri.query()
			&& let Some((_, value)) =
				url::form_urlencoded::parse(query.as_bytes()).find(|(key, _)| key == name)
		{
			return IdentityHint::Explicit(value.into_owned());
		}
		if let Some(name) = &self.identity_header
			&& let Some(value) = header_str(&parts.headers, name)
		{
			return IdentityHint::Header(value.to_owned());
		}
		if self.path_identity {
			let path = parts.uri.path();

			for well_known in &self.well_known_paths {
				if let Some(prefix) = path.strip_suffix(well_known.as_str())
					&& let Some(segment) = prefix.strip_prefix('/')
					&& !segment.is_empty()
					&& !segment.contains('/')
				{
					return IdentityHint::PathSegment(segment.to_owned());
				}
			}
		}

		IdentityHint::None
	}

	/// Scheme and authority the request was addressed to, checked against the allowlist.
	pub fn issuer_base(&self, parts: &Parts) -> Result<Url> {
		let forwarded = |name| {
			self.trust_forwarded_headers
				.then(|| header_str(&parts.headers, name))
				.flatten()
				.and_then(|value| value.split(',').next())
				.map(str::trim)
		};
		let scheme = forwarded(FORWARDED_PROTO)
			.or_else(|| parts.uri.scheme_str())
			.unwrap_or(self.default_scheme.as_str())
			.to_ascii_lowercase();

		if scheme != "https" && scheme != "http" {
			return Err(Error::InvalidRequest(format!("Unsupported scheme '{scheme}'.")));
		}

		let host = forwarded(FORWARDED_HOST)
			.or_else(|| header_str(&parts.headers, HOST.as_str()))
			.or_else(|| parts.uri.authority().map(|authority| authority.as_str()))
			.ok_or_else(|| Error::InvalidRequest("Request carries no host.".into()))?;
		let base = Url::parse(&format!("{scheme}://{host}/"))
			.map_err(|err| Error::InvalidRequest(format!("Invalid request host '{host}': {err}.")))?;
		let Some(hostname) = base.host_str() else {
			return Err(Error::InvalidRequest("Request carries no host.".into()));
		};

		if !base.username().is_empty() || base.password().is_some() || base.path() != "/" {
			return Err(Error::InvalidRequest(format!("Invalid request host '{host}'.")));
		}
		if !security::host_is_allowed(hostname, &self.allowed_hosts) {
			tracing::warn!(host = hostname, "request host rejected by allowlist");

			return Err(Error::InvalidRequest(format!("Host '{hostname}' is not allowed.")));
		}

		Ok(base)
	}
}
impl Default for RequestPolicy {
	fn default() -> Self {
		Self {
			identity_query_param: Some("identity".into()),
			identity_header: None,
			path_identity: false,
			well_known_paths: vec![DEFAULT_DISCOVERY_PATH.into(), DEFAULT_JWKS_PATH.into()],
			trust_forwarded_headers: false,
			default_scheme: "https".into(),
			allowed_hosts: Vec::new(),
		}
	}
}

/// Render a document or failure as a JSON HTTP response.
///
/// Failures use an OAuth-style body (`error`, `error_description`) with the status from
/// [`Error::status`]. Server-side failures do not leak their description.
pub fn render_json<T>(result: Result<T>) -> Response<Vec<u8>>
where
	T: Serialize,
{
	let rendered = result.and_then(|document| Ok(serde_json::to_vec(&document)?));

	match rendered {
		Ok(body) => json_response(StatusCode::OK, body),
		Err(err) => {
			let status = err.status();
			let description = if status.is_server_error() {
				tracing::error!(error = %err, "request failed");

				"The provider could not complete the request.".to_owned()
			} else {
				err.to_string()
			};
			let body = serde_json::json!({
				"error": err.oauth_error_code(),
				"error_description": description,
			});
			let mut response = json_response(status, serde_json::to_vec(&body).unwrap_or_default());

			response.headers_mut().insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

			response
		},
	}
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Vec<u8>> {
	let mut response = Response::new(body);

	*response.status_mut() = status;
	response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(JSON));

	response
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get(name)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
}
