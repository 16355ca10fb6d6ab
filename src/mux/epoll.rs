// std
use std::{
	io, mem,
	os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
	ptr,
};
// self
use crate::{
	_prelude::*,
	error::{CapabilityError, TransportError},
	mux::{Interest, Readiness},
};

const MAX_EVENTS: usize = 16;

/// epoll set plus a timerfd that lives in it for the whole lifetime of the set.
#[derive(Debug)]
pub(super) struct Backend {
	epoll: OwnedFd,
	timer: OwnedFd,
}
impl Backend {
	pub(super) fn new() -> Result<Self, CapabilityError> {
		// SAFETY: plain system calls; the returned descriptors are owned below.
		let epoll = owned("epoll set", unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
		let timer = owned("timerfd", unsafe {
			libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC | libc::TFD_NONBLOCK)
		})?;
		let mut event = libc::epoll_event { events: libc::EPOLLIN as u32, u64: timer.as_raw_fd() as u64 };

		// SAFETY: both descriptors are open and `event` outlives the call.
		if unsafe {
			libc::epoll_ctl(epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, timer.as_raw_fd(), &mut event)
		} < 0
		{
			return Err(CapabilityError::Multiplexer {
				primitive: "timerfd registration",
				source: io::Error::last_os_error(),
			});
		}

		Ok(Self { epoll, timer })
	}

	pub(super) fn register(&self, fd: RawFd, interest: Interest) -> Result<(), TransportError> {
		let mut mask = 0;

		if interest.readable() {
			mask |= libc::EPOLLIN as u32;
		}
		if interest.writable() {
			mask |= libc::EPOLLOUT as u32;
		}

		let mut event = libc::epoll_event { events: mask, u64: fd as u64 };

		let added = match self.ctl(libc::EPOLL_CTL_ADD, fd, &mut event) {
			Err(e) if e.raw_os_error() == Some(libc::EEXIST) =>
				self.ctl(libc::EPOLL_CTL_MOD, fd, &mut event),
			other => other,
		};

		added.map_err(|e| TransportError::io("could not add socket to epoll set", e))
	}

	pub(super) fn deregister(&self, fd: RawFd) -> Result<(), TransportError> {
		let mut event = libc::epoll_event { events: 0, u64: 0 };

		match self.ctl(libc::EPOLL_CTL_DEL, fd, &mut event) {
			Err(e) if matches!(e.raw_os_error(), Some(libc::ENOENT | libc::EBADF)) => Ok(()),
			other => other.map_err(|e| TransportError::io("could not delete socket from epoll set", e)),
		}
	}

	pub(super) fn arm_timer(&self, timeout: Duration) -> Result<(), TransportError> {
		// A zeroed it_value disarms a timerfd, so "now" becomes one nanosecond.
		let timeout = if timeout.is_zero() { Duration::NANOSECOND } else { timeout };
		// SAFETY: itimerspec is plain data.
		let mut spec: libc::itimerspec = unsafe { mem::zeroed() };

		spec.it_value.tv_sec = timeout.whole_seconds().try_into().unwrap_or(libc::time_t::MAX);
		spec.it_value.tv_nsec = timeout.subsec_nanoseconds() as _;

		self.settime(&spec)
	}

	pub(super) fn disarm_timer(&self) -> Result<(), TransportError> {
		// SAFETY: itimerspec is plain data.
		self.settime(&unsafe { mem::zeroed() })
	}

	pub(super) fn drain(&self) -> Result<Vec<Readiness>, TransportError> {
		// SAFETY: epoll_event is plain data.
		let mut events: [libc::epoll_event; MAX_EVENTS] = unsafe { mem::zeroed() };
		// SAFETY: the buffer holds MAX_EVENTS entries.
		let n = unsafe {
			libc::epoll_wait(self.epoll.as_raw_fd(), events.as_mut_ptr(), MAX_EVENTS as _, 0)
		};

		if n < 0 {
			let e = io::Error::last_os_error();

			if e.kind() == io::ErrorKind::Interrupted {
				return Ok(Vec::new());
			}

			return Err(TransportError::io("epoll_wait", e));
		}

		let mut ready = Vec::with_capacity(n as usize);

		for event in &events[..n as usize] {
			// Copy out; the struct is packed on some targets.
			let bits = event.events;
			let fd = event.u64 as RawFd;

			if fd == self.timer.as_raw_fd() {
				self.clear_timer()?;
				ready.push(Readiness::Timer);

				continue;
			}

			ready.push(Readiness::Socket {
				fd,
				readable: bits & (libc::EPOLLIN | libc::EPOLLHUP) as u32 != 0,
				writable: bits & libc::EPOLLOUT as u32 != 0,
				error: bits & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0,
			});
		}

		Ok(ready)
	}

	fn ctl(&self, op: libc::c_int, fd: RawFd, event: &mut libc::epoll_event) -> io::Result<()> {
		// SAFETY: `event` outlives the call; `fd` validity is checked by the kernel.
		if unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, event) } < 0 {
			Err(io::Error::last_os_error())
		} else {
			Ok(())
		}
	}

	fn settime(&self, spec: &libc::itimerspec) -> Result<(), TransportError> {
		// SAFETY: `spec` outlives the call and the old value is not requested.
		if unsafe { libc::timerfd_settime(self.timer.as_raw_fd(), 0, spec, ptr::null_mut()) } < 0 {
			return Err(TransportError::io("setting timerfd", io::Error::last_os_error()));
		}

		Ok(())
	}

	fn clear_timer(&self) -> Result<(), TransportError> {
		let mut expirations = [0_u8; 8];
		// SAFETY: the buffer is exactly the eight bytes a timerfd read produces.
		let n = unsafe {
			libc::read(self.timer.as_raw_fd(), expirations.as_mut_ptr().cast(), expirations.len())
		};

		if n < 0 {
			let e = io::Error::last_os_error();

			if e.kind() != io::ErrorKind::WouldBlock {
				return Err(TransportError::io("reading timerfd", e));
			}
		}

		Ok(())
	}
}
impl AsRawFd for Backend {
	fn as_raw_fd(&self) -> RawFd {
		self.epoll.as_raw_fd()
	}
}

fn owned(primitive: &'static str, fd: RawFd) -> Result<OwnedFd, CapabilityError> {
	if fd < 0 {
		return Err(CapabilityError::Multiplexer { primitive, source: io::Error::last_os_error() });
	}

	// SAFETY: `fd` was just returned by the kernel and nothing else owns it.
	Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
