//! Blocking helpers for callers without an event loop of their own.

// std
use std::{io, os::fd::RawFd, time::Duration as StdDuration};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::{FlowError, TransportError},
	flows::{DeviceFlow, FlowStatus},
	http::HttpTransport,
};

/// Waits until `fd` polls readable or `timeout` elapses; `None` waits indefinitely.
///
/// Returns whether the descriptor became ready.
pub fn wait_readable(fd: RawFd, timeout: Option<StdDuration>) -> io::Result<bool> {
	let timeout =
		timeout.map_or(-1, |t| t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int);
	let mut pfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };

	loop {
		// SAFETY: `pfd` outlives the call and the count matches.
		let n = unsafe { libc::poll(&mut pfd, 1, timeout) };

		if n >= 0 {
			return Ok(n > 0);
		}

		let e = io::Error::last_os_error();

		if e.kind() != io::ErrorKind::Interrupted {
			return Err(e);
		}
	}
}

impl<T> DeviceFlow<T>
where
	T: HttpTransport,
{
	/// Drives the flow to completion on the current thread, sleeping on the altsock between
	/// steps.
	pub fn run_blocking(&mut self) -> Result<AccessToken, FlowError> {
		loop {
			if let FlowStatus::Complete(token) = self.advance()? {
				return Ok(token);
			}

			wait_readable(self.altsock(), None).map_err(|e| {
				FlowError::new(None, TransportError::io("waiting for the device flow", e))
			})?;
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{io::Write, os::fd::AsRawFd, os::unix::net::UnixStream, time::Instant};
	// self
	use super::*;

	#[test]
	fn times_out_without_data() {
		let (_left, right) = UnixStream::pair().expect("Socket pair should open.");
		let started = Instant::now();

		assert!(
			!wait_readable(right.as_raw_fd(), Some(StdDuration::from_millis(30)))
				.expect("Poll should succeed.")
		);
		assert!(started.elapsed() >= StdDuration::from_millis(25));
	}

	#[test]
	fn reports_pending_data() {
		let (mut left, right) = UnixStream::pair().expect("Socket pair should open.");

		left.write_all(b"ping").expect("Write should succeed.");

		assert!(
			wait_readable(right.as_raw_fd(), Some(StdDuration::from_secs(1)))
				.expect("Poll should succeed.")
		);
	}
}
