//! Transport primitives for authority discovery and token exchanges.
//!
//! The module exposes [`HttpTransport`], the engine's only dependency on an
//! HTTP stack, plus [`ExchangeClient`], which layers the retry contract on top:
//! exactly one retry after a connect/read timeout or a 500/503/504 response,
//! with a fixed backoff between attempts. Other statuses return as ordinary
//! responses for the protocol layer to interpret.

// std
use std::{collections::BTreeMap, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::NetworkError};

/// Statuses that consume the retry budget instead of surfacing as responses.
const RETRYABLE_STATUSES: [u16; 3] = [500, 503, 504];
/// Fixed pause between the first attempt and its single retry.
const RETRY_BACKOFF: StdDuration = StdDuration::from_secs(1);
/// Connect deadline applied to the default transport.
#[cfg(feature = "reqwest")]
const CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
/// Overall request deadline applied to the default transport.
#[cfg(feature = "reqwest")]
const READ_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// HTTP method subset used by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeMethod {
	/// GET request.
	Get,
	/// POST request.
	Post,
}
impl ExchangeMethod {
	/// Returns the wire representation of the method.
	pub const fn as_str(self) -> &'static str {
		match self {
			ExchangeMethod::Get => "GET",
			ExchangeMethod::Post => "POST",
		}
	}
}

/// Single logical HTTP request issued by the engine.
#[derive(Clone, Debug)]
pub struct ExchangeRequest {
	/// HTTP method.
	pub method: ExchangeMethod,
	/// Target URL.
	pub url: Url,
	/// Request headers; caller values take precedence over derived ones.
	pub headers: BTreeMap<String, String>,
	/// Optional request body.
	pub body: Option<String>,
	/// Content type attached when a body is present.
	pub content_type: Option<String>,
}
impl ExchangeRequest {
	/// Creates a bodyless GET request.
	pub fn get(url: Url) -> Self {
		Self {
			method: ExchangeMethod::Get,
			url,
			headers: BTreeMap::new(),
			body: None,
			content_type: None,
		}
	}

	/// Creates a form-encoded POST request.
	pub fn form_post(url: Url, form: &BTreeMap<String, String>) -> Self {
		let body = form
			.iter()
			.map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
			.collect::<Vec<_>>()
			.join("&");

		Self {
			method: ExchangeMethod::Post,
			url,
			headers: BTreeMap::new(),
			body: Some(body),
			content_type: Some("application/x-www-form-urlencoded".into()),
		}
	}

	/// Adds a header; caller-supplied values win over derived ones.
	pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(key.into(), value.into());

		self
	}
}

/// Response observed from a single exchange.
#[derive(Clone, Debug)]
pub struct ExchangeResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers, keys lowercased.
	pub headers: BTreeMap<String, String>,
	/// Response body as text.
	pub body: String,
}
impl ExchangeResponse {
	/// Returns true for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Failures reported by transports before a response is available.
#[derive(Debug, ThisError)]
pub enum TransportFailure {
	/// Connect or read deadline elapsed.
	#[error("Transport deadline elapsed.")]
	Timeout,
	/// Any other transport-level failure (DNS, TCP, TLS).
	#[error("Transport failure.")]
	Io {
		/// Transport-specific failure.
		#[source]
		source: Box<dyn StdError + Send + Sync>,
	},
}
impl TransportFailure {
	/// Wraps a transport-specific failure.
	pub fn io(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Io { source: Box::new(src) }
	}
}

/// Boxed future returned by [`HttpTransport`] implementations.
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ExchangeResponse, TransportFailure>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing one request/response pair.
///
/// Implementations must honor connect and read deadlines internally and release
/// all request/response resources on every exit path; the retry contract lives
/// entirely in [`ExchangeClient`].
pub trait HttpTransport
where
	Self: Send + Sync,
{
	/// Executes one request and returns the observed response.
	fn roundtrip(&self, request: ExchangeRequest) -> TransportFuture<'_>;
}

/// Retry-aware client wrapping an [`HttpTransport`].
#[derive(Clone)]
pub struct ExchangeClient {
	transport: Arc<dyn HttpTransport>,
	backoff: StdDuration,
}
impl ExchangeClient {
	/// Wraps the provided transport with the engine retry policy.
	pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
		Self { transport, backoff: RETRY_BACKOFF }
	}

	/// Overrides the fixed retry backoff; tests shrink it to keep runs fast.
	pub fn with_backoff(mut self, backoff: StdDuration) -> Self {
		self.backoff = backoff;

		self
	}

	/// Sends a request, retrying once on a timeout or 500/503/504 response.
	///
	/// A `Host` header is derived from the target URL and merged beneath any
	/// caller-supplied headers. After the single retry, a transient outcome is
	/// terminal: the call fails with a typed [`NetworkError`] carrying the last
	/// observed status. Non-retryable statuses always return as responses.
	pub async fn send(&self, mut request: ExchangeRequest) -> Result<ExchangeResponse> {
		derive_host_header(&mut request);

		match self.attempt(&request).await {
			Attempt::Delivered(response) => return Ok(response),
			Attempt::RetryableStatus(_) | Attempt::TimedOut => {},
			Attempt::Failed(failure) => return Err(NetworkError::Io { source: failure }.into()),
		}

		tokio::time::sleep(self.backoff).await;

		match self.attempt(&request).await {
			Attempt::Delivered(response) => Ok(response),
			Attempt::RetryableStatus(status) =>
				Err(NetworkError::ServiceUnavailable { status }.into()),
			Attempt::TimedOut => Err(NetworkError::Timeout { attempts: 2 }.into()),
			Attempt::Failed(failure) => Err(NetworkError::Io { source: failure }.into()),
		}
	}

	async fn attempt(&self, request: &ExchangeRequest) -> Attempt {
		match self.transport.roundtrip(request.clone()).await {
			Ok(response) if RETRYABLE_STATUSES.contains(&response.status) =>
				Attempt::RetryableStatus(response.status),
			Ok(response) => Attempt::Delivered(response),
			Err(TransportFailure::Timeout) => Attempt::TimedOut,
			Err(TransportFailure::Io { source }) => Attempt::Failed(source),
		}
	}
}
impl Debug for ExchangeClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExchangeClient").field("backoff", &self.backoff).finish()
	}
}

enum Attempt {
	Delivered(ExchangeResponse),
	RetryableStatus(u16),
	TimedOut,
	Failed(Box<dyn StdError + Send + Sync>),
}

fn derive_host_header(request: &mut ExchangeRequest) {
	if request.headers.keys().any(|key| key.eq_ignore_ascii_case("host")) {
		return;
	}

	let Some(host) = request.url.host_str() else { return };
	let value = match request.url.port() {
		Some(port) => format!("{host}:{port}"),
		None => host.to_owned(),
	};

	request.headers.insert("Host".into(), value);
}

fn urlencode(value: &str) -> String {
	let mut buf = String::with_capacity(value.len());

	for byte in value.bytes() {
		match byte {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' =>
				buf.push(byte as char),
			b' ' => buf.push('+'),
			other => {
				buf.push('%');
				buf.push_str(&format!("{other:02X}"));
			},
		}
	}

	buf
}

/// Thin wrapper around [`ReqwestClient`] providing the default transport.
///
/// Token requests must not follow redirects; the default client disables them
/// and applies the engine's connect/read deadlines. Custom clients passed via
/// [`ReqwestTransport::with_client`] should do the same.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl Default for ReqwestTransport {
	fn default() -> Self {
		let client = ReqwestClient::builder()
			.connect_timeout(CONNECT_TIMEOUT)
			.timeout(READ_TIMEOUT)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			// The builder only fails on TLS backend misconfiguration; fall back
			// to the stock client rather than poisoning engine construction.
			.unwrap_or_default();

		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn roundtrip(&self, request: ExchangeRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = match request.method {
				ExchangeMethod::Get => client.get(request.url.clone()),
				ExchangeMethod::Post => client.post(request.url.clone()),
			};

			for (key, value) in &request.headers {
				builder = builder.header(key, value);
			}
			if let Some(content_type) = &request.content_type {
				builder = builder.header("content-type", content_type);
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(map_reqwest_error)?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(key, value)| {
					value.to_str().ok().map(|v| (key.as_str().to_ascii_lowercase(), v.to_owned()))
				})
				.collect();
			let body = response.text().await.map_err(map_reqwest_error)?;

			Ok(ExchangeResponse { status, headers, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(e: ReqwestError) -> TransportFailure {
	if e.is_timeout() || e.is_connect() {
		TransportFailure::Timeout
	} else {
		TransportFailure::io(e)
	}
}
