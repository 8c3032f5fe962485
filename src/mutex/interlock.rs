//! The interlock bit
//!
//! Holding the interlock means exclusive right to rewrite the lock word with a
//! plain store, and preemption disabled on the holder. Every helper that hands
//! back a state returns it with the interlock held; `None` means the word
//! turned out to be a sentinel tag.

use std::sync::atomic::{AtomicU64, Ordering};

use super::word::*;
use crate::opt::hint::*;
use crate::platform::Scheduler;

const BUSY: u64 = ILOCKED | MLOCKED | SPIN;

/// Takes the interlock, setting `set` and clearing `clear` in the same
/// exchange. Waits while the interlock or any of `set` is held
#[must_use]
pub(super) fn lock_set_and_clear_flags<P>(
	word: &AtomicU64, mut state: u64, set: u64, clear: u64
) -> Option<u64>
where
	P: Scheduler
{
	loop {
		while unlikely(state & (ILOCKED | set) != 0) {
			if unlikely(is_tag(state)) {
				return None;
			}

			P::cpu_pause();
			state = word.load(Ordering::Relaxed);
		}

		let prev = state;

		state = (state | ILOCKED | set) & !clear;

		P::disable_preemption();

		match word.compare_exchange_weak(prev, state, Ordering::Acquire, Ordering::Relaxed) {
			Ok(_) => return Some(state),
			Err(current) => {
				P::enable_preemption();
				P::cpu_pause();

				state = current;
			}
		}
	}
}

#[must_use]
pub(super) fn lock_clear_flags<P>(word: &AtomicU64, state: u64, clear: u64) -> Option<u64>
where
	P: Scheduler
{
	lock_set_and_clear_flags::<P>(word, state, 0, clear)
}

#[must_use]
pub(super) fn lock<P>(word: &AtomicU64) -> Option<u64>
where
	P: Scheduler
{
	lock_set_and_clear_flags::<P>(word, word.load(Ordering::Relaxed), 0, 0)
}

/// One attempt at taking the interlock together with `set`. Fails without
/// waiting if the lock is held in any mode or interlocked
#[must_use]
pub(super) fn try_lock_set_flags<P>(word: &AtomicU64, state: u64, set: u64) -> Option<u64>
where
	P: Scheduler
{
	if state & BUSY != 0 {
		return None;
	}

	let new = state | ILOCKED | set;

	P::disable_preemption();

	if word
		.compare_exchange(state, new, Ordering::Acquire, Ordering::Relaxed)
		.is_ok()
	{
		return Some(new);
	}

	P::enable_preemption();

	None
}

/// Waits out a transient interlock. Gives up once the lock is held as a
/// mutex, which includes the sentinel tags. Does not take the interlock
#[must_use]
pub(super) fn wait_interlock_to_clear<P>(word: &AtomicU64) -> Option<u64>
where
	P: Scheduler
{
	loop {
		P::cpu_pause();

		let state = word.load(Ordering::Relaxed);

		if state & (ILOCKED | MLOCKED) == 0 {
			return Some(state);
		}

		if state & MLOCKED != 0 {
			return None;
		}
	}
}

/// Like [`wait_interlock_to_clear`], but also gives up on a spin hold
#[must_use]
pub(super) fn try_wait_interlock_to_clear<P>(word: &AtomicU64) -> Option<u64>
where
	P: Scheduler
{
	loop {
		P::cpu_pause();

		let state = word.load(Ordering::Relaxed);

		if state & (MLOCKED | SPIN) != 0 {
			return None;
		}

		if state & ILOCKED == 0 {
			return Some(state);
		}
	}
}

/// Publishes `state` with the interlock dropped and re-enables preemption
pub(super) fn unlock<P>(word: &AtomicU64, state: u64)
where
	P: Scheduler
{
	word.store(state & !ILOCKED, Ordering::Release);

	P::enable_preemption();
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::platform::{Host, ThreadId};

	#[test]
	fn test_lock_unlock() {
		let word = AtomicU64::new(2 * WAITER);
		let level = Host::preemption_level();
		let state = lock::<Host>(&word).unwrap();

		assert_eq!(state, ILOCKED | 2 * WAITER);
		assert_eq!(Host::preemption_level(), level + 1);

		unlock::<Host>(&word, state);

		assert_eq!(word.load(Ordering::Relaxed), 2 * WAITER);
		assert_eq!(Host::preemption_level(), level);
	}

	#[test]
	fn test_tags_rejected() {
		let word = AtomicU64::new(TAG_DESTROYED);

		assert_eq!(lock::<Host>(&word), None);
		assert_eq!(try_lock_set_flags::<Host>(&word, TAG_DESTROYED, MLOCKED), None);
		assert_eq!(wait_interlock_to_clear::<Host>(&word), None);
		assert_eq!(try_wait_interlock_to_clear::<Host>(&word), None);
	}

	#[test]
	fn test_try_set_flags() {
		let owner = owner_bits(ThreadId::new(5).unwrap());
		let word = AtomicU64::new(FREE);
		let state = try_lock_set_flags::<Host>(&word, FREE, MLOCKED | owner).unwrap();

		assert_eq!(state, ILOCKED | MLOCKED | owner);
		assert_eq!(try_lock_set_flags::<Host>(&word, state, MLOCKED), None);

		unlock::<Host>(&word, state);

		assert_eq!(word.load(Ordering::Relaxed), MLOCKED | owner);
		assert_eq!(wait_interlock_to_clear::<Host>(&word), None);
	}
}
