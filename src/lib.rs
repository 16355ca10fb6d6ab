//! Non-blocking OAuth 2.0 Device Authorization Grant engine with OIDC discovery, driven by the
//! caller's own event loop through a single pollable descriptor.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod blocking;
pub mod config;
pub mod encode;
pub mod error;
pub mod flows;
pub mod http;
pub mod json;
pub mod mux;
pub mod obs;
pub mod provider;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and a scripted transport for tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{collections::VecDeque, io};
	// self
	use crate::{
		config::FlowConfig,
		error::TransportError,
		flows::DeviceFlow,
		http::{BodyCollector, HttpRequest, HttpResponse, HttpTransport, TransferStatus},
		mux::{Multiplexer, Readiness},
	};

	/// Response played back by [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub struct ScriptedReply {
		/// HTTP status code.
		pub status: u32,
		/// `Content-Type` header, if any.
		pub content_type: Option<String>,
		/// Raw body bytes.
		pub body: Vec<u8>,
		/// Completes on the next timer readiness instead of inside `start`.
		pub deferred: bool,
		/// Fails the transfer with this message instead of answering.
		pub failure: Option<&'static str>,
	}
	impl ScriptedReply {
		/// JSON reply with the given status, completed synchronously.
		pub fn json(status: u32, body: impl Into<String>) -> Self {
			Self {
				status,
				content_type: Some("application/json".into()),
				body: body.into().into_bytes(),
				deferred: false,
				failure: None,
			}
		}

		/// Reply whose transfer fails with `message` when it starts.
		pub fn failure(message: &'static str) -> Self {
			Self {
				status: 0,
				content_type: None,
				body: Vec::new(),
				deferred: false,
				failure: Some(message),
			}
		}

		/// Overrides the `Content-Type` header.
		pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
			self.content_type = content_type.map(Into::into);

			self
		}

		/// Delivers the reply asynchronously through the multiplexer timer.
		pub fn deferred(mut self) -> Self {
			self.deferred = true;

			self
		}
	}

	/// Shared log of every request a [`ScriptedTransport`] received.
	#[derive(Clone, Debug, Default)]
	pub struct RequestLog(Arc<Mutex<Vec<HttpRequest>>>);
	impl RequestLog {
		/// Returns a snapshot of the recorded requests.
		pub fn requests(&self) -> Vec<HttpRequest> {
			self.0.lock().clone()
		}

		/// Number of recorded requests.
		pub fn len(&self) -> usize {
			self.0.lock().len()
		}

		/// Whether no request has been recorded.
		pub fn is_empty(&self) -> bool {
			self.0.lock().is_empty()
		}
	}

	/// Deterministic [`HttpTransport`] that replays canned responses in order.
	#[derive(Debug)]
	pub struct ScriptedTransport {
		mux: Arc<Multiplexer>,
		replies: VecDeque<ScriptedReply>,
		log: RequestLog,
		in_flight: Option<ScriptedReply>,
		completed: Option<HttpResponse>,
	}
	impl ScriptedTransport {
		/// Creates a transport that answers requests with `replies`, in order.
		pub fn new(mux: Arc<Multiplexer>, replies: Vec<ScriptedReply>, log: RequestLog) -> Self {
			Self { mux, replies: replies.into(), log, in_flight: None, completed: None }
		}

		fn complete(&mut self, reply: ScriptedReply) -> Result<TransferStatus> {
			let mut collector = BodyCollector::default();

			collector.push(&reply.body)?;

			self.completed = Some(HttpResponse {
				status: reply.status,
				content_type: reply.content_type,
				body: collector.into_body(),
			});

			Ok(TransferStatus::Complete)
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn start(&mut self, request: &HttpRequest) -> Result<TransferStatus> {
			self.log.0.lock().push(request.clone());

			let reply = self
				.replies
				.pop_front()
				.ok_or(TransportError::Lifecycle("no scripted reply left"))?;

			if let Some(message) = reply.failure {
				return Err(TransportError::other(io::Error::other(message)).into());
			}
			if reply.deferred {
				self.mux.arm_timer(Duration::ZERO)?;
				self.in_flight = Some(reply);

				return Ok(TransferStatus::Running);
			}

			self.complete(reply)
		}

		fn poll(&mut self, events: &[Readiness]) -> Result<TransferStatus> {
			if !events.contains(&Readiness::Timer) {
				return Ok(TransferStatus::Running);
			}

			self.mux.disarm_timer()?;

			match self.in_flight.take() {
				Some(reply) => self.complete(reply),
				None => Err(TransportError::MissingResult.into()),
			}
		}

		fn finish(&mut self) -> Result<HttpResponse> {
			self.completed.take().ok_or_else(|| TransportError::MissingResult.into())
		}
	}

	/// Builds a flow over [`ScriptedTransport`] and returns it with its request log.
	pub fn scripted_flow(
		config: FlowConfig,
		replies: Vec<ScriptedReply>,
	) -> (DeviceFlow<ScriptedTransport>, RequestLog) {
		let log = RequestLog::default();
		let log_for_transport = log.clone();
		let flow = DeviceFlow::with_transport(config, move |mux, _| {
			Ok(ScriptedTransport::new(mux, replies, log_for_transport))
		})
		.expect("Scripted device flow should build.");

		(flow, log)
	}

	/// Debug-mode configuration pointing at `https://idp.example`.
	pub fn test_config() -> FlowConfig {
		FlowConfig::builder(
			"https://idp.example/.well-known/openid-configuration",
			"https://idp.example",
			"client-1",
		)
		.unsafe_debug(true)
		.build()
	}
}

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::Duration;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use curl;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
#[cfg(all(test, not(feature = "tokio")))] use tokio as _;
