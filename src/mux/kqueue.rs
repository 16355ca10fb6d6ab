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
const TIMER_IDENT: usize = 1;

/// kqueue whose single EVFILT_TIMER entry doubles as the flow timer.
#[derive(Debug)]
pub(super) struct Backend {
	kq: OwnedFd,
}
impl Backend {
	pub(super) fn new() -> Result<Self, CapabilityError> {
		// SAFETY: plain system call; the descriptor is owned below.
		let fd = unsafe { libc::kqueue() };

		if fd < 0 {
			return Err(CapabilityError::Multiplexer {
				primitive: "kqueue",
				source: io::Error::last_os_error(),
			});
		}

		// SAFETY: `fd` was just returned by the kernel and nothing else owns it.
		Ok(Self { kq: unsafe { OwnedFd::from_raw_fd(fd) } })
	}

	pub(super) fn register(&self, fd: RawFd, interest: Interest) -> Result<(), TransportError> {
		for (filter, wanted) in
			[(libc::EVFILT_READ, interest.readable()), (libc::EVFILT_WRITE, interest.writable())]
		{
			let result = if wanted {
				self.change(fd as usize, filter, libc::EV_ADD | libc::EV_RECEIPT, 0)
			} else {
				tolerate_missing(self.change(fd as usize, filter, libc::EV_DELETE, 0))
			};

			result.map_err(|e| TransportError::io("could not modify kqueue", e))?;
		}

		Ok(())
	}

	pub(super) fn deregister(&self, fd: RawFd) -> Result<(), TransportError> {
		for filter in [libc::EVFILT_READ, libc::EVFILT_WRITE] {
			tolerate_missing(self.change(fd as usize, filter, libc::EV_DELETE, 0))
				.map_err(|e| TransportError::io("could not delete from kqueue", e))?;
		}

		Ok(())
	}

	pub(super) fn arm_timer(&self, timeout: Duration) -> Result<(), TransportError> {
		// EVFILT_TIMER counts in milliseconds; round up and never ask for zero.
		let millis =
			timeout.saturating_add(Duration::nanoseconds(999_999)).whole_milliseconds().max(1);

		self.change(
			TIMER_IDENT,
			libc::EVFILT_TIMER,
			libc::EV_ADD | libc::EV_ONESHOT,
			millis.try_into().unwrap_or(isize::MAX),
		)
		.map_err(|e| TransportError::io("setting kqueue timer", e))
	}

	pub(super) fn disarm_timer(&self) -> Result<(), TransportError> {
		tolerate_missing(self.change(TIMER_IDENT, libc::EVFILT_TIMER, libc::EV_DELETE, 0))
			.map_err(|e| TransportError::io("deleting kqueue timer", e))
	}

	pub(super) fn drain(&self) -> Result<Vec<Readiness>, TransportError> {
		// SAFETY: kevent and timespec are plain data.
		let mut events: [libc::kevent; MAX_EVENTS] = unsafe { mem::zeroed() };
		let timeout: libc::timespec = unsafe { mem::zeroed() };
		// SAFETY: the buffer holds MAX_EVENTS entries and `timeout` outlives the call.
		let n = unsafe {
			libc::kevent(
				self.kq.as_raw_fd(),
				ptr::null(),
				0,
				events.as_mut_ptr(),
				MAX_EVENTS as _,
				&timeout,
			)
		};

		if n < 0 {
			let e = io::Error::last_os_error();

			if e.kind() == io::ErrorKind::Interrupted {
				return Ok(Vec::new());
			}

			return Err(TransportError::io("kevent", e));
		}

		let mut ready = Vec::with_capacity(n as usize);

		for event in &events[..n as usize] {
			if event.filter == libc::EVFILT_TIMER {
				ready.push(Readiness::Timer);

				continue;
			}

			ready.push(Readiness::Socket {
				fd: event.ident as RawFd,
				readable: event.filter == libc::EVFILT_READ,
				writable: event.filter == libc::EVFILT_WRITE,
				error: event.flags & libc::EV_ERROR != 0,
			});
		}

		Ok(ready)
	}

	fn change(&self, ident: usize, filter: i16, flags: u16, data: isize) -> io::Result<()> {
		// SAFETY: kevent is plain data.
		let mut change: libc::kevent = unsafe { mem::zeroed() };

		change.ident = ident as _;
		change.filter = filter as _;
		change.flags = flags as _;
		change.data = data as _;

		let receipt = flags & libc::EV_RECEIPT != 0;
		// SAFETY: zeroed is a valid kevent.
		let mut result: libc::kevent = unsafe { mem::zeroed() };
		// SAFETY: `change` and `result` outlive the call.
		let n = unsafe {
			libc::kevent(
				self.kq.as_raw_fd(),
				&change,
				1,
				if receipt { &mut result as *mut libc::kevent } else { ptr::null_mut() },
				receipt as _,
				ptr::null(),
			)
		};

		if n < 0 {
			return Err(io::Error::last_os_error());
		}
		// With EV_RECEIPT each change comes back flagged EV_ERROR; data holds the errno, 0 on success.
		if receipt && n == 1 && result.flags & libc::EV_ERROR != 0 && result.data != 0 {
			return Err(io::Error::from_raw_os_error(result.data as i32));
		}

		Ok(())
	}
}
impl AsRawFd for Backend {
	fn as_raw_fd(&self) -> RawFd {
		self.kq.as_raw_fd()
	}
}

fn tolerate_missing(result: io::Result<()>) -> io::Result<()> {
	match result {
		Err(e) if matches!(e.raw_os_error(), Some(libc::ENOENT | libc::EBADF)) => Ok(()),
		other => other,
	}
}
