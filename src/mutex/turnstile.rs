//! Blocking and wakeup through the lock's turnstile
//!
//! `waiters` in the lock word is one-to-one with threads queued on the
//! turnstile. A waiter increments it before queueing. The unlocker that wakes
//! it decrements it, so a woken thread that is runnable but has not yet
//! retried the lock is not counted and no wakeup is ever spurious.

use std::sync::atomic::{AtomicU64, Ordering};

use super::*;
use crate::trace;

impl<P: Platform> LckMtx<P> {
	/// Queues the caller behind the current mutex holder and blocks
	///
	/// Entered with the interlock held on a word held as a mutex. Returns
	/// with the interlock released. The turnstile is prepared on the first
	/// wait and stays prepared until the caller finally acquires the lock.
	pub(super) fn lock_wait(
		&self, word: &AtomicU64, state: u64, turnstile: &mut Option<P::Handle>
	) {
		if unlikely(waiters(state) == u16::MAX) {
			interlock::unlock::<P>(word, state);
			fatal(self, Violation::WaiterOverflow);
		}

		let state = state + WAITER;
		let key = key(word);
		let holder = owner_of(state);
		let handle = *turnstile.get_or_insert_with(|| P::prepare(key));

		word.store(state, Ordering::Relaxed);

		P::set_inheritor(handle, holder);
		P::assert_wait(handle, Event::from_key(key));

		interlock::unlock::<P>(word, state);

		trace!(target: self, "== Blocking behind {:?} with {} waiters", holder, waiters(state));

		P::block_current_thread();
	}

	/// Hands the lock off to one waiter and releases it
	///
	/// Entered with the interlock held, the hold bits and owner already
	/// cleared from `state`, and `waiters > 0`. While more waiters remain the
	/// woken thread inherits their priority from the moment it wakes. The
	/// last waiter is woken with the inheritor cleared
	pub(super) fn unlock_wakeup(&self, word: &AtomicU64, state: u64) {
		let key = key(word);
		let event = Event::from_key(key);
		let handle = P::prepare(key);

		let woken = if waiters(state) > 1 {
			P::wakeup_one(handle, event, WakeMode::PromoteOnWake)
		} else {
			let woken = P::wakeup_one(handle, event, WakeMode::AllPriorities);

			P::set_inheritor(handle, None);

			woken
		};

		P::complete(key);

		let Some(woken) = woken else {
			interlock::unlock::<P>(word, state & !SPIN);
			fatal(self, Violation::LostWaiter);
		};

		let state = (state - WAITER) & !(SPIN | ILOCKED);

		word.store(state, Ordering::Release);
		P::enable_preemption();

		trace!(target: self, "== Woke {} with {} waiters left", woken, waiters(state));
	}

	/// Makes the new holder the turnstile's inheritor
	///
	/// Entered with the interlock held and the lock held as a mutex by the
	/// caller. Completes the caller's turnstile, if it prepared one.
	pub(super) fn lock_acquire(&self, word: &AtomicU64, state: u64, turnstile: Option<P::Handle>) {
		let key = key(word);
		let waiting = waiters(state) > 0;
		let turnstile = match turnstile {
			None if waiting => Some(P::prepare(key)),
			turnstile => turnstile
		};

		let Some(handle) = turnstile else { return };

		if waiting {
			P::set_inheritor(handle, owner_of(state));

			trace!(target: self, "== Inheriting from {} waiters", waiters(state));
		}

		P::complete(key);
	}
}
