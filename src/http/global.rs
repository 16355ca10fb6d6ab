//! Process-wide libcurl initialization.
//!
//! `curl_global_init` is not thread-safe on every build of libcurl, so it runs at most once
//! under a mutex and its outcome is remembered for every later flow.

// crates.io
use parking_lot::const_mutex;
// self
use crate::{_prelude::*, error::CapabilityError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InitState {
	Uninitialized,
	Ready,
	Failed,
}

static INIT: Mutex<InitState> = const_mutex(InitState::Uninitialized);

/// Initializes libcurl once per process, replaying an earlier failure without retrying.
pub fn ensure_initialized() -> Result<(), CapabilityError> {
	ensure_with(&INIT, || {
		// SAFETY: serialized by `INIT`; the flags are libcurl's documented defaults.
		unsafe { curl_sys::curl_global_init(curl_sys::CURL_GLOBAL_ALL) == curl_sys::CURLE_OK }
	})
}

fn ensure_with(
	state: &Mutex<InitState>,
	init: impl FnOnce() -> bool,
) -> Result<(), CapabilityError> {
	let mut state = state.lock();

	match *state {
		InitState::Ready => Ok(()),
		InitState::Failed => Err(CapabilityError::GlobalInitReplay),
		InitState::Uninitialized =>
			if init() {
				*state = InitState::Ready;

				Ok(())
			} else {
				*state = InitState::Failed;

				Err(CapabilityError::GlobalInit)
			},
	}
}
