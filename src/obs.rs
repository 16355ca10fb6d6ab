//! Optional observability helpers for device flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (default) to wrap every `advance()` in an `oauth2_device_flow.advance`
//!   span carrying the current `step`, and to emit step transitions, token-poll results, and
//!   terminal failures as events. Wire traces produced under unsafe debug go to the
//!   `oauth2_device_flow::wire` target.
//! - Enable `metrics` to increment `oauth2_device_flow_total` (labeled by `outcome`) and
//!   `oauth2_device_flow_polls_total` (labeled by `result`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded for each flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// A flow started.
	Attempt,
	/// A flow produced a token.
	Success,
	/// A flow ended with an error.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Result of one token-endpoint poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PollResult {
	/// The token was issued.
	Granted,
	/// `authorization_pending`.
	Pending,
	/// `slow_down`.
	SlowDown,
	/// Any fatal answer.
	Rejected,
}
impl PollResult {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PollResult::Granted => "granted",
			PollResult::Pending => "authorization_pending",
			PollResult::SlowDown => "slow_down",
			PollResult::Rejected => "rejected",
		}
	}
}
impl Display for PollResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
