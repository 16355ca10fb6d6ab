//! Device flow orchestrator and the protocol steps it drives.
//!
//! [`DeviceFlow`] walks Discovery, Device Authorization, and the Token Request / Wait Interval
//! cycle. The caller owns the event loop: it waits for [`DeviceFlow::altsock`] to poll readable
//! and then calls [`DeviceFlow::advance`] until a token or an error comes back.

pub mod client_auth;
pub mod device_authz;
pub mod discovery;
pub mod prompt;
pub mod token;
#[cfg(feature = "tokio")] pub mod tokio;

pub use prompt::{DevicePrompt, PromptHook};

// std
use std::os::fd::{AsRawFd, RawFd};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::FlowConfig,
	error::{FlowError, TransportError},
	flows::{
		client_auth::ClientAuthMethod,
		device_authz::DeviceAuthorization,
		token::PollOutcome,
	},
	http::{
		HttpDriver, HttpRequest, HttpResponse, HttpTransport, TransferStatus, curl::CurlTransport,
	},
	mux::{Multiplexer, Readiness},
	obs::{self, FlowOutcome, FlowSpan, PollResult},
	provider::ProviderMetadata,
};

const MISSING_AUTHORIZATION: TransportError = TransportError::Lifecycle("no device authorization");

/// Position of the flow in the device grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
	/// Nothing has been sent yet.
	Init,
	/// Fetching the discovery document.
	Discovery,
	/// Requesting the device and user codes.
	DeviceAuthorization,
	/// Polling the token endpoint.
	TokenRequest,
	/// Sleeping for the polling interval.
	WaitInterval,
}
impl Step {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Step::Init => "init",
			Step::Discovery => "discovery",
			Step::DeviceAuthorization => "device_authorization",
			Step::TokenRequest => "token_request",
			Step::WaitInterval => "wait_interval",
		}
	}

	const fn transport_context(self) -> &'static str {
		match self {
			Step::Init | Step::Discovery => discovery::FETCH_CONTEXT,
			Step::DeviceAuthorization => device_authz::OBTAIN_CONTEXT,
			Step::TokenRequest | Step::WaitInterval => token::OBTAIN_CONTEXT,
		}
	}
}
impl Display for Step {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Result of one [`DeviceFlow::advance`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowStatus {
	/// Wait for the altsock to poll readable, then advance again.
	Pending,
	/// The provider issued a token; the flow is over.
	Complete(AccessToken),
}

enum Next {
	Transfer(TransferStatus),
	Wait,
	Done(AccessToken),
}

/// One device authorization grant in progress.
///
/// Dropping the flow at any step releases the in-flight transfer, every registered socket, and
/// the timer.
pub struct DeviceFlow<T = CurlTransport> {
	config: FlowConfig,
	driver: HttpDriver<T>,
	mux: Arc<Multiplexer>,
	step: Step,
	provider: Option<ProviderMetadata>,
	authz: Option<DeviceAuthorization>,
	auth_method: ClientAuthMethod,
	prompt: Option<Box<dyn PromptHook>>,
	prompted: bool,
	finished: bool,
}
impl DeviceFlow {
	/// Validates `config` and prepares a flow over libcurl.
	///
	/// No request is sent until the first [`advance`](Self::advance).
	pub fn new(config: FlowConfig) -> Result<Self> {
		Self::with_transport(config, CurlTransport::new)
	}
}
impl<T> DeviceFlow<T>
where
	T: HttpTransport,
{
	/// Validates `config` and prepares a flow over the transport built by `transport`.
	///
	/// The closure receives the flow's multiplexer so the transport can register its sockets
	/// and timeouts there.
	pub fn with_transport<F>(config: FlowConfig, transport: F) -> Result<Self>
	where
		F: FnOnce(Arc<Multiplexer>, &FlowConfig) -> Result<T>,
	{
		config.validate()?;

		let mux = Arc::new(Multiplexer::new()?);
		let driver = HttpDriver::new(transport(Arc::clone(&mux), &config)?, config.unsafe_debug);

		Ok(Self {
			config,
			driver,
			mux,
			step: Step::Init,
			provider: None,
			authz: None,
			auth_method: ClientAuthMethod::RequestBody,
			prompt: None,
			prompted: false,
			finished: false,
		})
	}

	/// Installs the hook that shows the verification URI and user code.
	pub fn with_prompt(mut self, hook: impl 'static + PromptHook) -> Self {
		self.prompt = Some(Box::new(hook));

		self
	}

	/// The descriptor to wait on; readable means [`advance`](Self::advance) has work to do.
	pub fn altsock(&self) -> RawFd {
		self.mux.as_raw_fd()
	}

	/// The current step.
	pub fn step(&self) -> Step {
		self.step
	}

	/// Provider metadata, once discovery has succeeded.
	pub fn provider(&self) -> Option<&ProviderMetadata> {
		self.provider.as_ref()
	}

	/// Device authorization, once it has been granted.
	pub fn device_authorization(&self) -> Option<&DeviceAuthorization> {
		self.authz.as_ref()
	}

	/// Current polling interval in seconds.
	pub fn interval(&self) -> Option<u32> {
		self.authz.as_ref().map(|authz| authz.interval)
	}

	/// The configuration the flow runs with.
	pub fn config(&self) -> &FlowConfig {
		&self.config
	}

	/// Makes as much progress as possible without blocking.
	///
	/// Returns [`FlowStatus::Pending`] while network or timer I/O is outstanding. The first
	/// error ends the flow; later calls return [`Error::Finished`].
	pub fn advance(&mut self) -> Result<FlowStatus, FlowError> {
		if self.finished {
			return Err(FlowError::new(None, Error::Finished));
		}

		let _span = FlowSpan::new(self.step.as_str()).entered();

		if self.step == Step::Init {
			obs::record_flow_outcome(FlowOutcome::Attempt);
		}

		let result = self.drive();

		match &result {
			Ok(FlowStatus::Pending) => {},
			Ok(FlowStatus::Complete(_)) => {
				self.finished = true;

				obs::record_flow_outcome(FlowOutcome::Success);
			},
			Err(e) => {
				self.finished = true;

				obs::log_failure(e);
				obs::record_flow_outcome(FlowOutcome::Failure);
			},
		}

		result
	}

	fn drive(&mut self) -> Result<FlowStatus, FlowError> {
		let events = self.mux.drain().map_err(|e| self.fail(e))?;
		let mut status = match self.step {
			Step::Init => self.begin_discovery()?,
			Step::WaitInterval => {
				if !events.contains(&Readiness::Timer) {
					return Ok(FlowStatus::Pending);
				}

				self.begin_token_request()?
			},
			Step::Discovery | Step::DeviceAuthorization | Step::TokenRequest =>
				self.driver.poll(&events).map_err(|e| self.fail(e))?,
		};

		// Synchronous completions chain into the next request without yielding.
		loop {
			if status == TransferStatus::Running {
				return Ok(FlowStatus::Pending);
			}

			let response = self.driver.finish().map_err(|e| self.fail(e))?;

			status = match self.handle_response(response)? {
				Next::Transfer(status) => status,
				Next::Wait => return Ok(FlowStatus::Pending),
				Next::Done(token) => return Ok(FlowStatus::Complete(token)),
			};
		}
	}

	fn handle_response(&mut self, response: HttpResponse) -> Result<Next, FlowError> {
		match self.step {
			Step::Discovery => {
				let (provider, endpoint) = discovery::finish_discovery(&response, &self.config)?;
				let (request, method) =
					device_authz::device_authorization_request(&endpoint, &self.config);

				self.provider = Some(provider);
				self.auth_method = method;

				self.begin(Step::DeviceAuthorization, &request).map(Next::Transfer)
			},
			Step::DeviceAuthorization => {
				let authz = device_authz::finish_device_authorization(
					&response,
					self.auth_method,
					self.config.unsafe_debug,
				)?;

				self.authz = Some(authz);

				self.begin_token_request().map(Next::Transfer)
			},
			Step::TokenRequest => self.handle_token(&response),
			Step::Init | Step::WaitInterval =>
				Err(self.fail(TransportError::Lifecycle("no request was expected"))),
		}
	}

	fn handle_token(&mut self, response: &HttpResponse) -> Result<Next, FlowError> {
		let auth_method = self.auth_method;
		let Some(authz) = self.authz.as_mut() else {
			return Err(FlowError::new(Some(token::OBTAIN_CONTEXT), MISSING_AUTHORIZATION));
		};
		let outcome = token::parse_token_response(response).and_then(|parsed| {
			token::handle_token_response(parsed, response.status, auth_method, &mut authz.interval)
		});
		let interval = authz.interval;
		let outcome = match outcome {
			Ok(outcome) => outcome,
			Err(e) => {
				obs::log_poll(PollResult::Rejected, interval);
				obs::record_token_poll(PollResult::Rejected);

				return Err(e);
			},
		};
		let result = match &outcome {
			PollOutcome::Granted(_) => PollResult::Granted,
			PollOutcome::Pending => PollResult::Pending,
			PollOutcome::SlowDown => PollResult::SlowDown,
		};

		obs::log_poll(result, interval);
		obs::record_token_poll(result);

		// The token endpoint answered sanely, so the user can be sent off to approve.
		if !self.prompted {
			self.present_prompt()?;
		}

		match outcome {
			PollOutcome::Granted(token) => Ok(Next::Done(token)),
			PollOutcome::Pending | PollOutcome::SlowDown => {
				self.mux
					.arm_timer(Duration::seconds(i64::from(interval)))
					.map_err(|e| self.fail(e))?;
				self.transition(Step::WaitInterval);

				Ok(Next::Wait)
			},
		}
	}

	fn present_prompt(&mut self) -> Result<(), FlowError> {
		let Some(authz) = &self.authz else {
			return Ok(());
		};

		prompt::present(self.prompt.as_deref_mut(), &DevicePrompt::from_authorization(authz))
			.map_err(|e| FlowError::new(None, e))?;

		self.prompted = true;

		Ok(())
	}

	fn begin_discovery(&mut self) -> Result<TransferStatus, FlowError> {
		let request = discovery::discovery_request(&self.config);

		self.begin(Step::Discovery, &request)
	}

	fn begin_token_request(&mut self) -> Result<TransferStatus, FlowError> {
		let (Some(provider), Some(authz)) = (&self.provider, &self.authz) else {
			return Err(self.fail(MISSING_AUTHORIZATION));
		};
		let (request, method) =
			token::token_request(&provider.token_endpoint, &authz.device_code, &self.config);

		self.auth_method = method;

		self.begin(Step::TokenRequest, &request)
	}

	fn begin(&mut self, step: Step, request: &HttpRequest) -> Result<TransferStatus, FlowError> {
		self.transition(step);

		self.driver.start(request).map_err(|e| self.fail(e))
	}

	fn transition(&mut self, to: Step) {
		obs::log_transition(self.step.as_str(), to.as_str());

		self.step = to;
	}

	fn fail(&self, error: impl Into<Error>) -> FlowError {
		FlowError::new(Some(self.step.transport_context()), error)
	}
}
impl<T> Debug for DeviceFlow<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DeviceFlow")
			.field("step", &self.step)
			.field("issuer", &self.config.issuer)
			.field("client_id", &self.config.client_id)
			.field("client_secret_set", &self.config.client_secret.is_some())
			.field("driver", &self.driver)
			.field("prompt_set", &self.prompt.is_some())
			.field("prompted", &self.prompted)
			.field("finished", &self.finished)
			.finish_non_exhaustive()
	}
}
