// self
use crate::obs::{FlowOutcome, PollResult};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_device_flow_total", "outcome" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Records one token-endpoint poll via the global metrics recorder (when enabled).
pub fn record_token_poll(result: PollResult) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_device_flow_polls_total", "result" => result.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = result;
	}
}
