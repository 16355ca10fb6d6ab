//! HTTP request driver for the device flow.
//!
//! The flow depends on an HTTP stack only through [`HttpTransport`]: a non-blocking engine that
//! starts one request, advances it whenever the shared [`Multiplexer`](crate::mux::Multiplexer)
//! reports readiness, and yields the buffered response once complete. [`HttpDriver`] wraps a
//! transport and enforces the rules every transport shares: one request lifecycle at a time and
//! HTTPS-only endpoints unless the caller opted into unsafe debugging. Response bodies are
//! accumulated through [`BodyCollector`], which aborts instead of truncating once
//! [`MAX_RESPONSE_SIZE`] is exceeded.
//!
//! [`curl::CurlTransport`] is the production engine.

pub mod curl;
pub mod global;

// self
use crate::{
	_prelude::*,
	error::{ResourceError, SecurityError, TransportError},
	mux::Readiness,
};

/// Hard cap on a buffered response body.
pub const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// HTTP method used by the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
	/// Discovery document fetch.
	Get,
	/// Form-encoded POST to the device authorization or token endpoint.
	Post,
}
impl Method {
	/// Returns the method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A request the flow wants performed.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
	/// Method.
	pub method: Method,
	/// Absolute URL.
	pub url: String,
	/// Body bytes; empty for GET.
	pub body: Vec<u8>,
	/// Extra request headers as name/value pairs.
	pub headers: Vec<(String, String)>,
}
impl HttpRequest {
	/// Builds a GET request.
	pub fn get(url: impl Into<String>) -> Self {
		Self { method: Method::Get, url: url.into(), body: Vec::new(), headers: Vec::new() }
	}

	/// Builds a form-encoded POST request.
	pub fn post_form(url: impl Into<String>, body: Vec<u8>) -> Self {
		Self {
			method: Method::Post,
			url: url.into(),
			body,
			headers: vec![(
				"Content-Type".into(),
				"application/x-www-form-urlencoded".into(),
			)],
		}
	}

	/// Adds a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Looks up a header value by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Body as UTF-8 text, for diagnostics and tests.
	pub fn body_text(&self) -> Option<&str> {
		std::str::from_utf8(&self.body).ok()
	}
}
impl Debug for HttpRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// Header values and bodies may carry credentials.
		f.debug_struct("HttpRequest")
			.field("method", &self.method)
			.field("url", &self.url)
			.field("body_len", &self.body.len())
			.field("headers", &self.headers.iter().map(|(name, _)| name).collect::<Vec<_>>())
			.finish()
	}
}

/// A completed response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u32,
	/// `Content-Type` header, if the server sent one.
	pub content_type: Option<String>,
	/// Buffered body, at most [`MAX_RESPONSE_SIZE`] bytes.
	pub body: Vec<u8>,
}

/// Progress of the in-flight request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStatus {
	/// More readiness is needed.
	Running,
	/// The response is available through [`HttpTransport::finish`].
	Complete,
}

/// Non-blocking HTTP engine driven through the flow's multiplexer.
///
/// Implementations receive the shared multiplexer when they are constructed and register
/// their sockets and timeouts with it. `start` may complete synchronously. An `Err` from
/// `start` or `poll` ends the request.
pub trait HttpTransport {
	/// Begins `request`.
	fn start(&mut self, request: &HttpRequest) -> Result<TransferStatus>;

	/// Advances the request after the multiplexer reported `events`.
	fn poll(&mut self, events: &[Readiness]) -> Result<TransferStatus>;

	/// Yields the response of a completed request.
	fn finish(&mut self) -> Result<HttpResponse>;
}

/// Checks that `url` parses and uses HTTPS (or HTTP when `allow_http` is set).
pub fn check_scheme(url: &str, allow_http: bool) -> Result<Url, SecurityError> {
	let parsed = Url::parse(url)
		.map_err(|source| SecurityError::InvalidEndpoint { url: url.to_owned(), source })?;

	match parsed.scheme() {
		"https" => Ok(parsed),
		"http" if allow_http => Ok(parsed),
		_ => Err(SecurityError::InsecureScheme { url: url.to_owned() }),
	}
}

/// Size-capped response body accumulator.
#[derive(Debug)]
pub struct BodyCollector {
	body: Vec<u8>,
	limit: usize,
	error: Option<ResourceError>,
}
impl BodyCollector {
	/// Creates a collector with a custom cap.
	pub fn with_limit(limit: usize) -> Self {
		Self { body: Vec::new(), limit, error: None }
	}

	/// Appends `chunk`, failing without buffering anything once the cap would be exceeded.
	pub fn push(&mut self, chunk: &[u8]) -> Result<(), ResourceError> {
		if self.body.len().saturating_add(chunk.len()) > self.limit {
			return Err(*self.error.insert(ResourceError::TooLarge));
		}
		if self.body.try_reserve(chunk.len()).is_err() {
			return Err(*self.error.insert(ResourceError::OutOfMemory));
		}

		self.body.extend_from_slice(chunk);

		Ok(())
	}

	/// Takes the failure recorded by [`push`](Self::push), if any.
	pub fn take_error(&mut self) -> Option<ResourceError> {
		self.error.take()
	}

	/// Buffered bytes so far.
	pub fn len(&self) -> usize {
		self.body.len()
	}

	/// Whether nothing has been buffered.
	pub fn is_empty(&self) -> bool {
		self.body.is_empty()
	}

	/// Consumes the collector, returning the body.
	pub fn into_body(self) -> Vec<u8> {
		self.body
	}
}
impl Default for BodyCollector {
	fn default() -> Self {
		Self::with_limit(MAX_RESPONSE_SIZE)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DriverState {
	Idle,
	Running,
	Done,
}

/// Enforces the single-request lifecycle and the scheme policy on top of a transport.
#[derive(Debug)]
pub struct HttpDriver<T> {
	transport: T,
	allow_http: bool,
	state: DriverState,
}
impl<T> HttpDriver<T>
where
	T: HttpTransport,
{
	/// Wraps `transport`; `allow_http` additionally permits plain HTTP endpoints.
	pub fn new(transport: T, allow_http: bool) -> Self {
		Self { transport, allow_http, state: DriverState::Idle }
	}

	/// Begins a request. Fails if another request has not been finished yet.
	pub fn start(&mut self, request: &HttpRequest) -> Result<TransferStatus> {
		if self.state != DriverState::Idle {
			return Err(TransportError::Lifecycle("a request is already in flight").into());
		}

		check_scheme(&request.url, self.allow_http)?;

		let status = self.transport.start(request);

		self.settle(status)
	}

	/// Advances the running request.
	pub fn poll(&mut self, events: &[Readiness]) -> Result<TransferStatus> {
		if self.state != DriverState::Running {
			return Err(TransportError::Lifecycle("no request is running").into());
		}

		let status = self.transport.poll(events);

		self.settle(status)
	}

	/// Yields the response of the completed request and returns the driver to idle.
	pub fn finish(&mut self) -> Result<HttpResponse> {
		if self.state != DriverState::Done {
			return Err(TransportError::Lifecycle("the request has not completed").into());
		}

		self.state = DriverState::Idle;
		self.transport.finish()
	}

	/// Whether a request is waiting on readiness.
	pub fn is_running(&self) -> bool {
		self.state == DriverState::Running
	}

	/// The wrapped transport.
	pub fn transport(&self) -> &T {
		&self.transport
	}

	fn settle(&mut self, status: Result<TransferStatus>) -> Result<TransferStatus> {
		self.state = match status {
			Ok(TransferStatus::Running) => DriverState::Running,
			Ok(TransferStatus::Complete) => DriverState::Done,
			Err(_) => DriverState::Idle,
		};

		status
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{RequestLog, ScriptedReply, ScriptedTransport},
		mux::Multiplexer,
	};

	fn driver(replies: Vec<ScriptedReply>) -> (HttpDriver<ScriptedTransport>, RequestLog) {
		let mux = Arc::new(Multiplexer::new().expect("Multiplexer should build."));
		let log = RequestLog::default();

		(HttpDriver::new(ScriptedTransport::new(mux, replies, log.clone()), false), log)
	}

	#[test]
	fn body_cap_is_inclusive() {
		let mut exact = BodyCollector::default();

		exact.push(&vec![b'a'; MAX_RESPONSE_SIZE - 1]).expect("Below the cap should buffer.");
		exact.push(b"a").expect("Exactly the cap should buffer.");

		assert_eq!(exact.len(), MAX_RESPONSE_SIZE);

		let err = exact.push(b"a").expect_err("One byte over the cap should fail.");

		assert_eq!(err, ResourceError::TooLarge);
		assert_eq!(err.to_string(), "response is too large");
		assert_eq!(exact.len(), MAX_RESPONSE_SIZE);
		assert_eq!(exact.take_error(), Some(ResourceError::TooLarge));
		assert_eq!(exact.take_error(), None);
	}

	#[test]
	fn oversized_chunk_is_not_partially_buffered() {
		let mut collector = BodyCollector::with_limit(4);

		collector.push(b"ab").expect("Two bytes should buffer.");

		assert!(collector.push(b"cde").is_err());
		assert_eq!(collector.into_body(), b"ab");
	}

	#[test]
	fn scheme_policy() {
		assert!(check_scheme("https://idp.example/token", false).is_ok());
		assert!(matches!(
			check_scheme("http://idp.example/token", false),
			Err(SecurityError::InsecureScheme { .. })
		));
		assert!(check_scheme("http://idp.example/token", true).is_ok());
		assert!(matches!(
			check_scheme("file:///etc/passwd", true),
			Err(SecurityError::InsecureScheme { .. })
		));
		assert!(matches!(
			check_scheme("not a url", true),
			Err(SecurityError::InvalidEndpoint { .. })
		));
	}

	#[test]
	fn insecure_request_never_reaches_the_transport() {
		let (mut driver, log) = driver(vec![ScriptedReply::json(200, "{}")]);
		let err = driver
			.start(&HttpRequest::get("http://idp.example/.well-known/openid-configuration"))
			.expect_err("Plain HTTP should be rejected.");

		assert!(matches!(err, Error::Security(SecurityError::InsecureScheme { .. })));
		assert!(log.is_empty());
	}

	#[test]
	fn lifecycle_is_enforced() {
		let (mut driver, _log) = driver(vec![ScriptedReply::json(200, "{}").deferred()]);

		assert!(driver.finish().is_err());
		assert_eq!(
			driver.start(&HttpRequest::get("https://idp.example/a")).expect("Start should work."),
			TransferStatus::Running
		);
		assert!(driver.is_running());
		assert!(driver.start(&HttpRequest::get("https://idp.example/b")).is_err());
		assert!(driver.finish().is_err());
		assert_eq!(
			driver.poll(&[Readiness::Timer]).expect("Timer readiness should complete."),
			TransferStatus::Complete
		);
		assert_eq!(driver.finish().expect("Finish should yield.").status, 200);
		assert!(driver.poll(&[Readiness::Timer]).is_err());
	}

	#[test]
	fn debug_output_hides_credentials() {
		let request = HttpRequest::post_form("https://idp.example/token", b"secret=1".to_vec())
			.with_header("Authorization", "Basic c2VjcmV0");
		let rendered = format!("{request:?}");

		assert!(!rendered.contains("c2VjcmV0"));
		assert!(!rendered.contains("secret=1"));
		assert_eq!(request.header("authorization"), Some("Basic c2VjcmV0"));
	}
}
