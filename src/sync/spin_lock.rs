use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::Backoff;
use crate::config;
use crate::error::{fatal, Violation};
use crate::opt::hint::*;
use crate::platform::{Clock, Host, Scheduler, ThreadId};
use crate::trace;

const FREE: u64 = 0;
const DESTROYED: u64 = u64::MAX;

/// A pure spin lock for when the critical section is short and predictable
///
/// The word holds the owner's thread id, so release by a non-owner and
/// recursive acquisition are caught. Holding the lock keeps preemption
/// disabled; the `_nopreempt` variants are for callers that already did so.
/// A contended acquisition that spins past [`config::Tunables::spin_timeout`]
/// is fatal.
pub struct LckSpin<P = Host> {
	word: AtomicU64,
	platform: PhantomData<fn() -> P>
}

impl<P: Scheduler + Clock> LckSpin<P> {
	#[must_use]
	pub const fn new() -> Self {
		Self { word: AtomicU64::new(FREE), platform: PhantomData }
	}

	fn me() -> u64 {
		P::current_thread().get().into()
	}

	fn decode(word: u64) -> Option<ThreadId> {
		u32::try_from(word).ok().and_then(ThreadId::new)
	}

	/// Marks the lock unusable. Fatal if it is held or already destroyed
	pub fn destroy(&self) {
		match self
			.word
			.compare_exchange(FREE, DESTROYED, Ordering::Relaxed, Ordering::Relaxed)
		{
			Ok(_) => (),
			Err(DESTROYED) => fatal(self, Violation::DoubleDestroy),
			Err(_) => fatal(self, Violation::DestroyHeld)
		}
	}

	pub fn try_lock_nopreempt(&self) -> bool {
		let me = Self::me();

		match self
			.word
			.compare_exchange(FREE, me, Ordering::Acquire, Ordering::Relaxed)
		{
			Ok(_) => true,
			Err(DESTROYED) => fatal(self, Violation::Destroyed),
			Err(_) => false
		}
	}

	pub fn try_lock(&self) -> bool {
		P::disable_preemption();

		let locked = self.try_lock_nopreempt();

		if !locked {
			P::enable_preemption();
		}

		locked
	}

	pub fn lock_nopreempt(&self) {
		if likely(self.try_lock_nopreempt()) {
			return;
		}

		self.lock_contended();
	}

	pub fn lock(&self) {
		P::disable_preemption();
		self.lock_nopreempt();
	}

	#[cold]
	fn lock_contended(&self) {
		let me = Self::me();
		let start = P::now();
		let deadline = start.saturating_add(P::ticks_from(config::tunables().spin_timeout));
		let mut backoff = Backoff::<P>::new();

		trace!(target: self, "== Contended");

		loop {
			loop {
				match self.word.load(Ordering::Relaxed) {
					FREE => break,
					DESTROYED => fatal(self, Violation::Destroyed),
					word if unlikely(word == me) => fatal(self, Violation::Recursive),
					word => {
						let now = P::now();

						if unlikely(now > deadline) {
							let owner = Self::decode(word);

							fatal(self, Violation::SpinTimeout { owner, start, now });
						}

						backoff.pause();
					}
				}
			}

			if self.try_lock_nopreempt() {
				break;
			}
		}
	}

	/// Spins on [`LckSpin::try_lock`] until it succeeds or the clock passes
	/// `deadline`. A deadline already in the past fails without trying
	pub fn try_lock_until(&self, deadline: u64) -> bool {
		if P::now() > deadline {
			return false;
		}

		while !self.try_lock() {
			if P::now() > deadline {
				return false;
			}

			P::cpu_pause();
		}

		true
	}

	/// Like [`LckSpin::try_lock_until`], with the deadline `timeout` from now.
	/// A deadline past the end of the clock saturates
	pub fn try_lock_for(&self, timeout: Duration) -> bool {
		if likely(self.try_lock()) {
			return true;
		}

		self.try_lock_until(P::now().saturating_add(P::ticks_from(timeout)))
	}

	pub fn unlock_nopreempt(&self) {
		let me = Self::me();

		if let Err(word) = self
			.word
			.compare_exchange(me, FREE, Ordering::Release, Ordering::Relaxed)
		{
			let violation = match (word, Self::decode(word)) {
				(DESTROYED, _) => Violation::Destroyed,
				(_, Some(owner)) => Violation::NotOwner { owner, current: P::current_thread() },
				(FREE, _) => Violation::NotHeld,
				_ => Violation::Corrupt(word)
			};

			fatal(self, violation);
		}
	}

	pub fn unlock(&self) {
		self.unlock_nopreempt();
		P::enable_preemption();
	}

	pub fn assert_owned(&self) {
		if self.word.load(Ordering::Relaxed) != Self::me() {
			fatal(self, Violation::AssertOwned);
		}
	}

	pub fn assert_not_owned(&self) {
		if self.word.load(Ordering::Relaxed) == Self::me() {
			fatal(self, Violation::AssertNotOwned);
		}
	}

	#[must_use]
	pub fn is_locked(&self) -> bool {
		let word = self.word.load(Ordering::Relaxed);

		word != FREE && word != DESTROYED
	}

	#[must_use]
	pub fn owner(&self) -> Option<ThreadId> {
		Self::decode(self.word.load(Ordering::Relaxed))
	}
}

impl<P: Scheduler + Clock> Default for LckSpin<P> {
	fn default() -> Self {
		Self::new()
	}
}
