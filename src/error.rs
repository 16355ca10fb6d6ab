//! Error types shared across the device flow, its transport, and its multiplexer.
//!
//! Every failure is classified into one of the nested enums below and folded into
//! [`Error`]. A flow that fails reports exactly one [`FlowError`], which pairs the
//! detail with the static context of the step that produced it.

// std
use std::io;
// self
use crate::{_prelude::*, json::SchemaError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error returned by caller-supplied hooks and transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Caller-supplied configuration is unusable.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The platform or HTTP library cannot run the flow at all.
	#[error(transparent)]
	Capability(#[from] CapabilityError),
	/// DNS, connect, TLS, or readiness-primitive failure.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The provider's response does not follow the protocol.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// A security check rejected the provider.
	#[error(transparent)]
	Security(#[from] SecurityError),
	/// The provider answered with a fatal in-band OAuth error.
	#[error(transparent)]
	Provider(#[from] ProviderError),
	/// Memory or size limits were exceeded.
	#[error(transparent)]
	Resource(#[from] ResourceError),
	/// The caller-supplied prompt hook failed.
	#[error("device prompt failed")]
	Prompt(#[source] BoxError),
	/// The flow already reached a terminal state.
	#[error("the device flow has already finished")]
	Finished,
}
impl Error {
	/// Returns the transport-specific note (for example libcurl's error buffer), if any.
	pub fn transport_note(&self) -> Option<&str> {
		match self {
			Error::Transport(TransportError::Curl { note, .. }) => note.as_deref(),
			_ => None,
		}
	}
}
impl From<SchemaError> for Error {
	fn from(e: SchemaError) -> Self {
		ProtocolError::Schema(e).into()
	}
}

/// Configuration problems detected before any request is sent.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The client identifier is required.
	#[error("a client identifier is required")]
	MissingClientId,
	/// The expected issuer identifier is required.
	#[error("an expected issuer identifier is required")]
	MissingIssuer,
	/// A configured URL cannot be parsed.
	#[error("the {name} URL is invalid: {source}")]
	InvalidUrl {
		/// Which configured URL failed to parse.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Permanent capability failures; never retried.
#[derive(Debug, ThisError)]
pub enum CapabilityError {
	/// No readiness-notification backend exists for this target.
	#[error("the device authorization flow is not supported on this platform")]
	UnsupportedPlatform,
	/// The readiness primitive could not be created.
	#[error("failed to create {primitive}: {source}")]
	Multiplexer {
		/// Name of the primitive (epoll set, timerfd, kqueue).
		primitive: &'static str,
		/// Operating system failure.
		#[source]
		source: io::Error,
	},
	/// One-time global initialization of libcurl failed during this call.
	#[error("libcurl global initialization failed")]
	GlobalInit,
	/// One-time global initialization of libcurl failed during an earlier call.
	#[error("libcurl global initialization previously failed")]
	GlobalInitReplay,
}

/// Transport-level failures (network, TLS, readiness primitives).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// libcurl reported a failed transfer or rejected an option.
	#[error("{description}")]
	Curl {
		/// libcurl's description of the error code.
		description: String,
		/// libcurl's per-transfer error buffer, when populated.
		note: Option<String>,
	},
	/// The libcurl multi handle reported a failure.
	#[error("asynchronous HTTP request failed: {0}")]
	Multi(String),
	/// A readiness-primitive system call failed.
	#[error("{op}: {source}")]
	Io {
		/// Operation that failed.
		op: &'static str,
		/// Operating system failure.
		#[source]
		source: io::Error,
	},
	/// The transport finished without producing a result for the request.
	#[error("no result was retrieved for the finished handle")]
	MissingResult,
	/// The request driver was used out of order.
	#[error("HTTP request driver misuse: {0}")]
	Lifecycle(&'static str),
	/// A caller-supplied transport failed.
	#[error("{0}")]
	Other(BoxError),
}
impl TransportError {
	/// Wraps an operating system failure for the named operation.
	pub fn io(op: &'static str, source: io::Error) -> Self {
		Self::Io { op, source }
	}

	/// Wraps a failure from a caller-supplied transport.
	pub fn other(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Other(Box::new(src))
	}
}
impl From<curl::Error> for TransportError {
	fn from(e: curl::Error) -> Self {
		let note = e.extra_description().map(|note| note.trim_end().to_owned());

		Self::Curl { description: e.description().to_owned(), note }
	}
}
impl From<curl::MultiError> for TransportError {
	fn from(e: curl::MultiError) -> Self {
		Self::Multi(e.description().to_owned())
	}
}
impl From<curl::Error> for Error {
	fn from(e: curl::Error) -> Self {
		TransportError::from(e).into()
	}
}
impl From<curl::MultiError> for Error {
	fn from(e: curl::MultiError) -> Self {
		TransportError::from(e).into()
	}
}

/// Protocol validation failures in provider responses.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// The endpoint answered with a status the protocol does not allow.
	#[error("unexpected response code {status}")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u32,
	},
	/// The response carried no `Content-Type` header.
	#[error("no content type was provided")]
	MissingContentType,
	/// The response is not `application/json`.
	#[error("unexpected content type: \"{content_type}\"")]
	UnexpectedContentType {
		/// The offending header value.
		content_type: String,
	},
	/// The body contains NUL bytes.
	#[error("response contains embedded NULs")]
	EmbeddedNul,
	/// The body is not UTF-8.
	#[error("response is not valid UTF-8")]
	InvalidUtf8,
	/// The JSON document does not match the expected schema.
	#[error(transparent)]
	Schema(SchemaError),
	/// Repeated `slow_down` responses pushed the interval past its range.
	#[error("slow_down interval overflow")]
	IntervalOverflow,
}

/// Security checks that reject a provider outright.
#[derive(Debug, ThisError)]
pub enum SecurityError {
	/// The discovery document names a different issuer.
	#[error("the issuer identifier ({reported}) does not match the expected issuer ({expected})")]
	IssuerMismatch {
		/// Issuer claimed by the discovery document.
		reported: String,
		/// Issuer the caller configured.
		expected: String,
	},
	/// The provider does not advertise the device code grant.
	#[error("issuer \"{issuer}\" does not support device code grants")]
	DeviceGrantUnsupported {
		/// Issuer identifier.
		issuer: String,
	},
	/// The provider has no device authorization endpoint.
	#[error("issuer \"{issuer}\" does not provide a device authorization endpoint")]
	MissingDeviceEndpoint {
		/// Issuer identifier.
		issuer: String,
	},
	/// A URL uses a scheme that is not allowed.
	#[error("URL \"{url}\" must use HTTPS")]
	InsecureScheme {
		/// The rejected URL.
		url: String,
	},
	/// A provider-supplied endpoint cannot be parsed.
	#[error("URL \"{url}\" is invalid: {source}")]
	InvalidEndpoint {
		/// The rejected URL.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Fatal in-band error reported by the device authorization or token endpoint.
///
/// Renders as `description (error)` when the provider supplied a description, or
/// as `hint (error)` when a hint could be derived from the HTTP status.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{}", render_provider_error(self))]
pub struct ProviderError {
	/// The `error` code returned by the provider.
	pub error: String,
	/// The optional `error_description` returned by the provider.
	pub description: Option<String>,
	/// Best-effort diagnostic derived from the HTTP status.
	pub hint: Option<&'static str>,
}

fn render_provider_error(e: &ProviderError) -> String {
	match (&e.description, e.hint) {
		(Some(description), _) => format!("{description} ({})", e.error),
		(None, Some(hint)) => format!("{hint} ({})", e.error),
		(None, None) => format!("({})", e.error),
	}
}

/// Resource exhaustion while buffering a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum ResourceError {
	/// The response body exceeded the size cap.
	#[error("response is too large")]
	TooLarge,
	/// An allocation failed.
	#[error("out of memory")]
	OutOfMemory,
}

/// Terminal error of a failed device flow: context, detail, and transport note.
#[derive(Debug, ThisError)]
#[error("{}", render_flow_error(self))]
pub struct FlowError {
	context: Option<&'static str>,
	#[source]
	error: Error,
}
impl FlowError {
	/// Builds a flow error from the step context and the underlying failure.
	pub fn new(context: Option<&'static str>, error: impl Into<Error>) -> Self {
		Self { context, error: error.into() }
	}

	/// Static description of the operation that was in progress.
	pub fn context(&self) -> Option<&'static str> {
		self.context
	}

	/// The underlying failure.
	pub fn error(&self) -> &Error {
		&self.error
	}

	/// Transport-specific detail, rendered in parentheses.
	pub fn transport_note(&self) -> Option<&str> {
		self.error.transport_note()
	}

	/// Consumes the record, returning the underlying failure.
	pub fn into_error(self) -> Error {
		self.error
	}
}

fn render_flow_error(e: &FlowError) -> String {
	let mut message = String::new();

	if let Some(context) = e.context {
		message.push_str(context);
		message.push_str(": ");
	}

	message.push_str(&e.error.to_string());

	if let Some(note) = e.transport_note().filter(|note| !note.is_empty()) {
		message.push_str(" (");
		message.push_str(note);
		message.push(')');
	}

	message
}
