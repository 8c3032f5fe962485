//! Adaptive spin-wait
//!
//! A contending thread spins at least one learning window. At the end of each
//! window it gives up if the owner never changed, otherwise it estimates the
//! hold time from the ownership changes seen so far and moves a sliding
//! deadline. A fair lock (fewer changes than processors) earns up to one hold
//! time per other processor. An unfair one gets a deadline spread over the
//! remaining budget by a per-lock, per-processor bias so that spinners give
//! up at different times, and adaptation stops. Nothing spins past the hard
//! deadline.

use std::sync::atomic::{AtomicU64, Ordering};

use super::*;
use crate::{config, trace};

/// How a spin-wait ended
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SpinWaitResult {
	/// The lock was taken. The interlock is held and preemption disabled
	Acquired,

	/// The owner was off core before the first iteration
	NoSpin,
	SpunHighThreshold,
	SpunOwnerNotOnCore,
	SpunNoWindowContention,
	SpunSlidingThreshold
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Adjustment {
	pub sliding_deadline: u64,

	/// Whether contention looked fair. Unfair contention ends adaptation
	pub fair: bool
}

/// Computes the sliding deadline at the end of a learning window
///
/// `total` is the number of ownership changes seen since `start` and must
/// be nonzero. `bias` is in `0..ncpus`.
#[must_use]
pub fn adjust_deadline(
	start: u64, now: u64, high_deadline: u64, total: u32, ncpus: u32, bias: u64
) -> Adjustment {
	let ncpus = ncpus.max(1);

	if total / ncpus == 0 {
		let delta = now.saturating_sub(start);
		let budget = delta.saturating_mul(u64::from(ncpus - 1));

		Adjustment {
			sliding_deadline: start.saturating_add(budget.checked_div(total.into()).unwrap_or(0)),
			fair: true
		}
	} else {
		let delta = high_deadline.saturating_sub(now);

		Adjustment {
			sliding_deadline: now.saturating_add(delta.saturating_mul(bias) / u64::from(ncpus)),
			fair: false
		}
	}
}

/// Bookkeeping for one spin-wait call
#[derive(Clone, Debug)]
#[allow(missing_copy_implementations)]
pub struct SpinWindow {
	start: u64,
	low: u64,
	window_deadline: u64,
	sliding_deadline: u64,
	high_deadline: u64,
	ncpus: u32,
	bias: u64,
	total_samples: u32,
	window_samples: u32,
	adjust: bool,
	loops: u32
}

impl SpinWindow {
	/// `low` is the learning window. Without an explicit `high` the hard
	/// limit is one window per processor
	#[must_use]
	pub fn new(start: u64, low: u64, high: Option<u64>, ncpus: u32, bias: u64) -> Self {
		let ncpus = ncpus.max(1);
		let window_deadline = start.saturating_add(low);
		let high = high.unwrap_or_else(|| low.saturating_mul(ncpus.into()));

		Self {
			start,
			low,
			window_deadline,
			sliding_deadline: window_deadline,
			high_deadline: start.saturating_add(high),
			ncpus,
			bias,
			total_samples: 0,
			window_samples: 0,
			adjust: true,
			loops: 0
		}
	}

	#[must_use]
	pub const fn past_hard_deadline(&self, now: u64) -> bool {
		now >= self.high_deadline
	}

	#[must_use]
	pub const fn loops(&self) -> u32 {
		self.loops
	}

	#[must_use]
	pub const fn high_deadline(&self) -> u64 {
		self.high_deadline
	}

	#[must_use]
	pub const fn sliding_deadline(&self) -> u64 {
		self.sliding_deadline
	}

	/// Records one iteration at `now`. Returns the reason to stop, if any
	pub fn sample(&mut self, now: u64, owner_changed: bool) -> Option<SpinWaitResult> {
		if owner_changed {
			self.total_samples = self.total_samples.saturating_add(1);
			self.window_samples = self.window_samples.saturating_add(1);
		}

		if now >= self.window_deadline {
			if self.window_samples == 0 {
				return Some(SpinWaitResult::SpunNoWindowContention);
			}

			if self.adjust {
				let adjustment = adjust_deadline(
					self.start,
					now,
					self.high_deadline,
					self.total_samples,
					self.ncpus,
					self.bias
				);

				self.sliding_deadline = adjustment.sliding_deadline;
				self.adjust = adjustment.fair;
			}

			self.window_deadline = self.window_deadline.saturating_add(self.low);
			self.window_samples = 0;
		}

		if now >= self.sliding_deadline {
			return Some(SpinWaitResult::SpunSlidingThreshold);
		}

		self.loops = self.loops.saturating_add(1);

		None
	}
}

/// Scrambles a lock address into a per-lock bias seed
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn hash_addr(addr: usize) -> u32 {
	let key = ((addr >> 4) as u32).wrapping_mul(0x5052_acdb);

	key ^ key.swap_bytes()
}

impl<P: Platform> LckMtx<P> {
	/// Spins on `word` while its owner is on core. On
	/// [`SpinWaitResult::Acquired`] the caller holds the lock as a mutex, with
	/// the interlock held
	pub(crate) fn spin_wait(&self, word: &AtomicU64) -> SpinWaitResult {
		let tunables = config::tunables();
		let ncpus = P::processor_count().max(1);
		let bias = (u64::from(hash_addr(key(word))) + u64::from(P::cpu_number())) % u64::from(ncpus);
		let mut window = SpinWindow::new(
			P::now(),
			P::ticks_from(tunables.low_spin),
			tunables.high_spin.map(P::ticks_from),
			ncpus,
			bias
		);

		let me = owner_bits(P::current_thread());
		let mut prev_owner = owner_of(word.load(Ordering::Relaxed));

		let result = loop {
			let state = word.load(Ordering::Relaxed);

			if likely(interlock::try_lock_set_flags::<P>(word, state, MLOCKED | me).is_some()) {
				break SpinWaitResult::Acquired;
			}

			let now = P::now();

			if window.past_hard_deadline(now) {
				break SpinWaitResult::SpunHighThreshold;
			}

			let mut owner = owner_of(word.load(Ordering::Relaxed));

			if let Some(current) = owner {
				P::disable_preemption();

				let on_core = P::thread_on_core(current);

				P::enable_preemption();

				if !on_core {
					owner = owner_of(word.load(Ordering::Relaxed));

					if owner == Some(current) {
						break if window.loops() == 0 {
							SpinWaitResult::NoSpin
						} else {
							SpinWaitResult::SpunOwnerNotOnCore
						};
					}

					prev_owner = Some(current);
				}
			}

			if let Some(result) = window.sample(now, owner != prev_owner) {
				break result;
			}

			prev_owner = owner;

			if owner.is_some() {
				P::cpu_pause();
			}
		};

		trace!(target: self, "== Spin wait {:?} after {} loops", result, window.loops());

		result
	}
}
