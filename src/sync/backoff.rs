use std::marker::PhantomData;
use std::thread::yield_now;

use crate::platform::{Host, Scheduler};

const SPIN_LIMIT: u16 = 6;
const YIELD_LIMIT: u16 = 10;

/// Exponential busy-wait between attempts on a contended word
///
/// Each step doubles the number of [`Scheduler::cpu_pause`] hints up to
/// `2^6`. [`Backoff::snooze`] then switches to yielding the processor, which
/// only callers that are allowed to be descheduled may use.
#[allow(missing_copy_implementations)]
pub struct Backoff<P = Host> {
	step: u16,
	platform: PhantomData<fn() -> P>
}

impl<P: Scheduler> Backoff<P> {
	#[must_use]
	pub const fn new() -> Self {
		Self { step: 0, platform: PhantomData }
	}

	fn pause_internal(&self) {
		for _ in 0..1u32 << self.step.min(SPIN_LIMIT) {
			P::cpu_pause();
		}
	}

	#[allow(clippy::arithmetic_side_effects)]
	pub fn pause(&mut self) {
		self.pause_internal();

		if self.step <= SPIN_LIMIT {
			self.step += 1;
		}
	}

	#[allow(clippy::arithmetic_side_effects)]
	pub fn snooze(&mut self) {
		if self.step < SPIN_LIMIT {
			self.pause_internal();
		} else {
			yield_now();
		}

		if self.step <= YIELD_LIMIT {
			self.step += 1;
		}
	}
}

impl<P: Scheduler> Default for Backoff<P> {
	fn default() -> Self {
		Self::new()
	}
}
