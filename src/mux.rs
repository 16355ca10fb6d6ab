//! Readiness multiplexer behind the flow's single pollable descriptor.
//!
//! [`Multiplexer`] owns one platform readiness set (epoll on Linux and Android, kqueue on the
//! BSD family) holding the transport's sockets plus exactly one timer. Callers only ever see
//! the set's own descriptor (the "altsock"): when it polls readable, the flow has work to do.
//!
//! The timer is never added or removed; it is armed and disarmed. A negative duration disarms
//! it and a zero duration fires on the next loop iteration.

#[cfg(any(target_os = "linux", target_os = "android"))] mod epoll;
#[cfg(any(
	target_os = "macos",
	target_os = "ios",
	target_os = "freebsd",
	target_os = "dragonfly"
))]
mod kqueue;

// std
use std::os::fd::{AsRawFd, RawFd};
// self
#[cfg(any(target_os = "linux", target_os = "android"))] use self::epoll::Backend;
#[cfg(any(
	target_os = "macos",
	target_os = "ios",
	target_os = "freebsd",
	target_os = "dragonfly"
))]
use self::kqueue::Backend;
use crate::{
	_prelude::*,
	error::{CapabilityError, TransportError},
};

/// Socket interest requested by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interest {
	/// Wake when the socket is readable.
	Read,
	/// Wake when the socket is writable.
	Write,
	/// Wake on either direction.
	ReadWrite,
}
impl Interest {
	/// Whether read readiness is requested.
	pub const fn readable(self) -> bool {
		matches!(self, Interest::Read | Interest::ReadWrite)
	}

	/// Whether write readiness is requested.
	pub const fn writable(self) -> bool {
		matches!(self, Interest::Write | Interest::ReadWrite)
	}
}

/// A readiness event collected from the set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
	/// A registered transport socket is ready.
	Socket {
		/// The socket descriptor.
		fd: RawFd,
		/// Readable.
		readable: bool,
		/// Writable.
		writable: bool,
		/// Error or hang-up condition.
		error: bool,
	},
	/// The timer expired.
	Timer,
}

/// Aggregated readiness set exposed to the caller as one descriptor.
///
/// All methods take `&self` so transport callbacks can share the set through an [`Arc`].
#[derive(Debug)]
pub struct Multiplexer {
	backend: Backend,
}
impl Multiplexer {
	/// Creates the readiness set and its timer.
	///
	/// Fails with a [`CapabilityError`] when the platform has no supported primitive.
	pub fn new() -> Result<Self, CapabilityError> {
		Ok(Self { backend: Backend::new()? })
	}

	/// Adds `fd` to the set or replaces its interest.
	pub fn register(&self, fd: RawFd, interest: Interest) -> Result<(), TransportError> {
		self.backend.register(fd, interest)
	}

	/// Removes `fd` from the set. Descriptors the set no longer knows are ignored.
	pub fn deregister(&self, fd: RawFd) -> Result<(), TransportError> {
		self.backend.deregister(fd)
	}

	/// Arms the timer; a negative `timeout` disarms it.
	pub fn arm_timer(&self, timeout: Duration) -> Result<(), TransportError> {
		if timeout.is_negative() { self.backend.disarm_timer() } else { self.backend.arm_timer(timeout) }
	}

	/// Disarms the timer and discards any pending expiration.
	pub fn disarm_timer(&self) -> Result<(), TransportError> {
		self.backend.disarm_timer()
	}

	/// Collects the readiness events currently pending, without blocking.
	///
	/// Reporting a timer expiration consumes it.
	pub fn drain(&self) -> Result<Vec<Readiness>, TransportError> {
		self.backend.drain()
	}
}
impl AsRawFd for Multiplexer {
	fn as_raw_fd(&self) -> RawFd {
		self.backend.as_raw_fd()
	}
}

#[cfg(not(any(
	target_os = "linux",
	target_os = "android",
	target_os = "macos",
	target_os = "ios",
	target_os = "freebsd",
	target_os = "dragonfly"
)))]
#[derive(Debug)]
enum Backend {}
#[cfg(not(any(
	target_os = "linux",
	target_os = "android",
	target_os = "macos",
	target_os = "ios",
	target_os = "freebsd",
	target_os = "dragonfly"
)))]
impl Backend {
	fn new() -> Result<Self, CapabilityError> {
		Err(CapabilityError::UnsupportedPlatform)
	}

	fn register(&self, _: RawFd, _: Interest) -> Result<(), TransportError> {
		match *self {}
	}

	fn deregister(&self, _: RawFd) -> Result<(), TransportError> {
		match *self {}
	}

	fn arm_timer(&self, _: Duration) -> Result<(), TransportError> {
		match *self {}
	}

	fn disarm_timer(&self) -> Result<(), TransportError> {
		match *self {}
	}

	fn drain(&self) -> Result<Vec<Readiness>, TransportError> {
		match *self {}
	}

	fn as_raw_fd(&self) -> RawFd {
		match *self {}
	}
}

#[cfg(all(
	test,
	any(target_os = "linux", target_os = "android", target_os = "macos", target_os = "freebsd")
))]
mod tests {
	// std
	use std::{
		io::Write,
		os::unix::net::UnixStream,
		time::{Duration as StdDuration, Instant},
	};
	// self
	use super::*;
	use crate::blocking;

	fn wait(mux: &Multiplexer, millis: u64) -> bool {
		blocking::wait_readable(mux.as_raw_fd(), Some(StdDuration::from_millis(millis)))
			.expect("Polling the multiplexer should succeed.")
	}

	#[test]
	fn idle_set_is_not_readable() {
		let mux = Multiplexer::new().expect("Multiplexer should build.");

		assert!(!wait(&mux, 20));
		assert!(mux.drain().expect("Drain should succeed.").is_empty());
	}

	#[test]
	fn zero_timer_fires_promptly_and_is_consumed() {
		let mux = Multiplexer::new().expect("Multiplexer should build.");
		let started = Instant::now();

		mux.arm_timer(Duration::ZERO).expect("Arming should succeed.");

		assert!(wait(&mux, 1_000));
		assert!(started.elapsed() < StdDuration::from_millis(500));
		assert_eq!(mux.drain().expect("Drain should succeed."), vec![Readiness::Timer]);
		assert!(mux.drain().expect("Drain should succeed.").is_empty());
	}

	#[test]
	fn negative_timeout_disarms() {
		let mux = Multiplexer::new().expect("Multiplexer should build.");

		mux.arm_timer(Duration::milliseconds(30)).expect("Arming should succeed.");
		mux.arm_timer(Duration::seconds(-1)).expect("Disarming should succeed.");

		assert!(!wait(&mux, 100));
		assert!(mux.drain().expect("Drain should succeed.").is_empty());
	}

	#[test]
	fn sockets_report_their_interest() {
		let mux = Multiplexer::new().expect("Multiplexer should build.");
		let (mut left, right) = UnixStream::pair().expect("Socket pair should open.");
		let fd = right.as_raw_fd();

		mux.register(fd, Interest::Read).expect("Registration should succeed.");

		assert!(!wait(&mux, 20));

		left.write_all(b"x").expect("Write should succeed.");

		assert!(wait(&mux, 1_000));
		assert!(mux.drain().expect("Drain should succeed.").iter().any(|event| matches!(
			event,
			Readiness::Socket { fd: ready, readable: true, .. } if *ready == fd
		)));

		mux.register(fd, Interest::Write).expect("Modification should succeed.");

		let events = mux.drain().expect("Drain should succeed.");

		assert!(events.iter().any(|event| matches!(
			event,
			Readiness::Socket { fd: ready, writable: true, .. } if *ready == fd
		)));
		assert!(!events.iter().any(|event| matches!(event, Readiness::Socket { readable: true, .. })));

		mux.deregister(fd).expect("Removal should succeed.");
		mux.deregister(fd).expect("Removing an unknown descriptor should be tolerated.");

		assert!(mux.drain().expect("Drain should succeed.").is_empty());
	}
}
