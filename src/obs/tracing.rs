// self
use crate::{_prelude::*, error::FlowError, obs::PollResult};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span wrapping one `advance()` call.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the current step.
	pub fn new(step: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::debug_span!("oauth2_device_flow.advance", step);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = step;

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

/// Logs a step transition.
pub fn log_transition(from: &'static str, to: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(from, to, "device flow step changed");
	#[cfg(not(feature = "tracing"))]
	let _ = (from, to);
}

/// Logs a token-endpoint poll and the interval that now applies.
pub fn log_poll(result: PollResult, interval_secs: u32) {
	#[cfg(feature = "tracing")]
	tracing::debug!(result = result.as_str(), interval_secs, "token endpoint polled");
	#[cfg(not(feature = "tracing"))]
	let _ = (result, interval_secs);
}

/// Logs the terminal failure of a flow.
pub fn log_failure(error: &FlowError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %error, "device flow failed");
	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// Warns that libcurl resolves names synchronously, so `advance()` may block during DNS.
pub fn warn_blocking_resolver() {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		"libcurl was built without an asynchronous resolver; name resolution may block the caller"
	);
}

/// Emits one wire-trace line (`*` info, `<` received, `>` sent).
pub fn wire_line(prefix: char, line: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(target: "oauth2_device_flow::wire", "{prefix} {line}");
	#[cfg(not(feature = "tracing"))]
	eprintln!("[libcurl] {prefix} {line}");
}
