use std::sync::atomic::{AtomicU32, Ordering};

use atomic_wait::{wait, wake_one};

#[repr(u32)]
enum State {
	Parked = 0,
	Idle   = 1,
	Notified = 2
}

/// A one-shot wakeup flag for a single thread
///
/// An `unpark` that lands before the matching `park` is remembered, so a
/// waker racing the sleeper never loses the wakeup.
pub(super) struct Parker {
	state: AtomicU32
}

impl Parker {
	#[must_use]
	pub(super) const fn new() -> Self {
		Self { state: AtomicU32::new(State::Idle as u32) }
	}

	/// Blocks until [`Parker::unpark`] is called, consuming the notification
	pub(super) fn park(&self) {
		if self.state.fetch_sub(1, Ordering::Acquire) == State::Notified as u32 {
			return;
		}

		loop {
			wait(&self.state, State::Parked as u32);

			if self
				.state
				.compare_exchange(
					State::Notified as u32,
					State::Idle as u32,
					Ordering::Acquire,
					Ordering::Relaxed
				)
				.is_ok()
			{
				break;
			}
		}
	}

	pub(super) fn unpark(&self) {
		if self.state.swap(State::Notified as u32, Ordering::Release) == State::Parked as u32 {
			wake_one(&self.state);
		}
	}
}

impl Default for Parker {
	fn default() -> Self {
		Self::new()
	}
}
