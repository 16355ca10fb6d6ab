//! Driving a device flow from a tokio task.

// std
use std::{
	os::fd::{AsRawFd, RawFd},
	time::Duration as StdDuration,
};
// crates.io
use ::tokio::io::{Interest, unix::AsyncFd};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	blocking,
	error::{FlowError, TransportError},
	flows::{DeviceFlow, FlowStatus},
	http::HttpTransport,
	obs::FlowSpan,
};

// Borrowed view of the altsock; the flow keeps ownership of the descriptor.
struct Altsock(RawFd);
impl AsRawFd for Altsock {
	fn as_raw_fd(&self) -> RawFd {
		self.0
	}
}

impl<T> DeviceFlow<T>
where
	T: HttpTransport,
{
	/// Drives the flow to completion, awaiting altsock readiness through the tokio reactor.
	///
	/// Must be called from within a runtime with I/O enabled. `advance()` itself never blocks,
	/// apart from libcurl's synchronous resolver where one is in use.
	pub async fn run_async(&mut self) -> Result<AccessToken, FlowError> {
		let span = FlowSpan::new(self.step().as_str());

		span.instrument(self.drive_async()).await
	}

	async fn drive_async(&mut self) -> Result<AccessToken, FlowError> {
		let fd = self.altsock();
		let altsock = AsyncFd::with_interest(Altsock(fd), Interest::READABLE)
			.map_err(|e| wait_error("registering the altsock with tokio", e))?;

		loop {
			if let FlowStatus::Complete(token) = self.advance()? {
				return Ok(token);
			}
			// The reactor only reports edges, so level-check before sleeping on it.
			if blocking::wait_readable(fd, Some(StdDuration::ZERO))
				.map_err(|e| wait_error("polling the altsock", e))?
			{
				continue;
			}

			let mut guard =
				altsock.readable().await.map_err(|e| wait_error("waiting for the altsock", e))?;

			guard.clear_ready();
		}
	}
}

fn wait_error(op: &'static str, e: std::io::Error) -> FlowError {
	FlowError::new(None, TransportError::io(op, e))
}
