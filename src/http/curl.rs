//! libcurl multi-socket engine.
//!
//! libcurl tells us which sockets it cares about (and when it wants a timeout) through two
//! callbacks; both forward straight into the shared [`Multiplexer`]. Callbacks cannot return
//! errors to us, so failures are parked in a [`CallbackErrorSlot`] and surfaced by the next
//! `start`/`poll`.

// std
use std::{mem, path::PathBuf};
// crates.io
use ::curl::{
	Version,
	easy::{Easy2, Handler, InfoType, List, WriteError},
	multi::{Easy2Handle, Events, Multi},
};
// self
use crate::{
	_prelude::*,
	config::FlowConfig,
	error::TransportError,
	http::{BodyCollector, HttpRequest, HttpResponse, HttpTransport, Method, TransferStatus, global},
	mux::{Interest, Multiplexer, Readiness},
	obs,
};

/// Per-request libcurl handler: buffers the body and, under unsafe debug, traces the wire.
#[derive(Debug, Default)]
pub struct Collector {
	body: BodyCollector,
	wire_trace: bool,
}
impl Handler for Collector {
	fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
		// A short count makes libcurl abort the transfer with a write error.
		Ok(if self.body.push(data).is_ok() { data.len() } else { 0 })
	}

	fn debug(&mut self, kind: InfoType, data: &[u8]) {
		if !self.wire_trace {
			return;
		}

		let prefix = match kind {
			InfoType::Text => '*',
			InfoType::HeaderIn | InfoType::DataIn => '<',
			InfoType::HeaderOut | InfoType::DataOut => '>',
			_ => return,
		};

		for line in String::from_utf8_lossy(data).lines() {
			obs::wire_line(prefix, line.trim_end_matches('\r'));
		}
	}
}

/// First error raised inside a libcurl callback, waiting to be reported.
#[derive(Clone, Debug, Default)]
pub struct CallbackErrorSlot(Arc<Mutex<Option<TransportError>>>);
impl CallbackErrorSlot {
	/// Records `error` unless an earlier one is still pending.
	pub fn store(&self, error: TransportError) {
		self.0.lock().get_or_insert(error);
	}

	/// Takes the pending error, if any.
	pub fn take(&self) -> Option<TransportError> {
		self.0.lock().take()
	}
}

/// [`HttpTransport`] backed by a libcurl multi handle.
pub struct CurlTransport {
	// Declared before `multi` so the handle detaches first.
	active: Option<Easy2Handle<Collector>>,
	done: Option<Easy2<Collector>>,
	multi: Multi,
	errors: CallbackErrorSlot,
	wire_trace: bool,
	ca_file: Option<PathBuf>,
}
impl CurlTransport {
	/// Initializes libcurl (once per process) and wires a multi handle to `mux`.
	pub fn new(mux: Arc<Multiplexer>, config: &FlowConfig) -> Result<Self> {
		global::ensure_initialized()?;

		if !Version::get().feature_async_dns() {
			obs::warn_blocking_resolver();
		}

		let mut multi = Multi::new();
		let errors = CallbackErrorSlot::default();

		{
			let mux = Arc::clone(&mux);
			let errors = errors.clone();

			multi.socket_function(move |socket, events, _| {
				let result = if events.remove() {
					mux.deregister(socket)
				} else if events.input_and_output() {
					mux.register(socket, Interest::ReadWrite)
				} else if events.input() {
					mux.register(socket, Interest::Read)
				} else {
					mux.register(socket, Interest::Write)
				};

				if let Err(e) = result {
					errors.store(e);
				}
			})?;
		}
		{
			let errors = errors.clone();

			multi.timer_function(move |timeout| {
				// `None` asks for the timer to be deleted.
				let timeout = timeout.map_or(Duration::seconds(-1), |t| {
					Duration::try_from(t).unwrap_or(Duration::MAX)
				});

				match mux.arm_timer(timeout) {
					Ok(()) => true,
					Err(e) => {
						errors.store(e);

						false
					},
				}
			})?;
		}

		let wire_trace = config.unsafe_debug;

		Ok(Self {
			active: None,
			done: None,
			multi,
			errors,
			wire_trace,
			ca_file: config.ca_file.clone().filter(|_| wire_trace),
		})
	}

	fn configure(&self, request: &HttpRequest) -> Result<Easy2<Collector>> {
		let mut easy =
			Easy2::new(Collector { body: BodyCollector::default(), wire_trace: self.wire_trace });

		easy.signal(false)?;
		easy.follow_location(false)?;
		easy.url(&request.url)?;

		match request.method {
			Method::Get => easy.get(true)?,
			Method::Post => {
				easy.post(true)?;
				easy.post_fields_copy(&request.body)?;
			},
		}

		let mut headers = List::new();

		// An empty value removes libcurl's default `Accept: */*`.
		headers.append("Accept:")?;

		for (name, value) in &request.headers {
			headers.append(&format!("{name}: {value}"))?;
		}

		easy.http_headers(headers)?;

		if self.wire_trace {
			easy.verbose(true)?;

			if let Some(ca_file) = &self.ca_file {
				easy.cainfo(ca_file)?;
			}
		}

		Ok(easy)
	}

	fn collect(&mut self) -> Result<TransferStatus> {
		if let Some(e) = self.errors.take() {
			self.active = None;

			return Err(e.into());
		}

		let Some(handle) = self.active.take() else {
			return Err(TransportError::Lifecycle("no transfer is active").into());
		};
		let mut outcome = None;

		self.multi.messages(|message| {
			if let Some(result) = message.result_for2(&handle) {
				outcome = Some(result);
			}
		});

		let Some(outcome) = outcome else {
			self.active = Some(handle);

			return Ok(TransferStatus::Running);
		};
		let mut easy = self.multi.remove2(handle)?;

		match outcome {
			Ok(()) => {
				self.done = Some(easy);

				Ok(TransferStatus::Complete)
			},
			Err(e) => {
				// A failed write means the collector refused the body; its reason is the real one.
				if let Some(resource) = easy.get_mut().body.take_error() {
					return Err(resource.into());
				}

				let mut error = TransportError::from(e);

				if let TransportError::Curl { note: note @ None, .. } = &mut error {
					*note = easy.take_error_buf().map(|buf| buf.trim_end().to_owned());
				}

				Err(error.into())
			},
		}
	}
}
impl HttpTransport for CurlTransport {
	fn start(&mut self, request: &HttpRequest) -> Result<TransferStatus> {
		if self.active.is_some() {
			return Err(TransportError::Lifecycle("a transfer is already active").into());
		}

		self.done = None;

		let easy = self.configure(request)?;

		self.active = Some(self.multi.add2(easy)?);
		// Kick the transfer; it may finish right here.
		self.multi.timeout()?;

		self.collect()
	}

	fn poll(&mut self, events: &[Readiness]) -> Result<TransferStatus> {
		for event in events {
			match *event {
				Readiness::Timer => {
					self.multi.timeout()?;
				},
				Readiness::Socket { fd, readable, writable, error } => {
					let mut flags = Events::new();

					flags.input(readable).output(writable).error(error);
					self.multi.action(fd, &flags)?;
				},
			}
		}

		self.collect()
	}

	fn finish(&mut self) -> Result<HttpResponse> {
		let Some(mut easy) = self.done.take() else {
			return Err(TransportError::MissingResult.into());
		};
		let status = easy.response_code()?;
		let content_type = easy.content_type()?.map(str::to_owned);
		let body = mem::take(&mut easy.get_mut().body).into_body();

		Ok(HttpResponse { status, content_type, body })
	}
}
impl Debug for CurlTransport {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CurlTransport")
			.field("active", &self.active.is_some())
			.field("done", &self.done.is_some())
			.field("wire_trace", &self.wire_trace)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn collector_refuses_oversized_bodies() {
		let mut collector = Collector { body: BodyCollector::with_limit(3), wire_trace: false };

		assert_eq!(collector.write(b"abc").expect("Write should not error."), 3);
		assert_eq!(collector.write(b"d").expect("Write should not error."), 0);
		assert_eq!(collector.body.take_error(), Some(crate::error::ResourceError::TooLarge));
	}

	#[test]
	fn callback_slot_keeps_the_first_error() {
		let slot = CallbackErrorSlot::default();

		slot.store(TransportError::Lifecycle("first"));
		slot.store(TransportError::Lifecycle("second"));

		assert!(matches!(slot.take(), Some(TransportError::Lifecycle("first"))));
		assert!(slot.take().is_none());
	}

	#[test]
	fn builds_against_a_live_multiplexer() {
		let mux = Arc::new(Multiplexer::new().expect("Multiplexer should build."));
		let config = crate::_preludet::test_config();
		let transport = CurlTransport::new(mux, &config).expect("Transport should build.");

		assert!(format!("{transport:?}").starts_with("CurlTransport"));
	}
}
