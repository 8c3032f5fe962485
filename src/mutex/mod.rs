//! The adaptive kernel mutex
//!
//! [`LckMtx`] packs its whole state into one 64 bit word (see [`word`]). An
//! uncontended `lock` or `unlock` is a single compare-and-swap. Under
//! contention a thread spins while the owner is on core ([`spinwait`]), then
//! queues on the lock's turnstile and blocks, lending its priority to the
//! owner until the lock is handed over.
//!
//! A lock may also be held in spin mode, which keeps the interlock and
//! preemption disabled and records no owner. [`LckMtx::convert_to_mutex`]
//! upgrades such a hold.
//!
//! Misuse is fatal. See [`Violation`].

use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use enumflags2::BitFlags;

use crate::error::{fatal, Violation};
use crate::opt::hint::*;
use crate::platform::*;
use crate::sync::Backoff;
use crate::debug;

mod attr;
mod guard;
mod interlock;
pub mod spinwait;
mod turnstile;
pub mod word;

pub use attr::LockAttr;
pub use guard::*;
pub use spinwait::SpinWaitResult;
pub use word::{LockKind, LockState};

use attr::Ext;
use word::*;

/// Turnstile key and wait event of the lock whose live word is `word`
fn key(word: &AtomicU64) -> usize {
	ptr::from_ref(word) as usize
}

pub struct LckMtx<P = Host> {
	word: AtomicU64,
	ext: Option<Box<Ext>>,
	platform: PhantomData<fn() -> P>
}

impl<P: Platform> LckMtx<P> {
	#[must_use]
	pub const fn new() -> Self {
		Self { word: AtomicU64::new(FREE), ext: None, platform: PhantomData }
	}

	/// A lock with attributes. [`LockAttr::Debug`] moves the word into an
	/// extension record
	#[must_use]
	pub fn with_attr<A>(attr: A) -> Self
	where
		A: Into<BitFlags<LockAttr>>
	{
		Self::init(attr.into(), None)
	}

	/// A lock with a name, reported in its log records. Always indirect
	#[must_use]
	pub fn named<A>(name: &'static str, attr: A) -> Self
	where
		A: Into<BitFlags<LockAttr>>
	{
		Self::init(attr.into(), Some(name))
	}

	fn init(attr: BitFlags<LockAttr>, name: Option<&'static str>) -> Self {
		if !attr.contains(LockAttr::Debug) && name.is_none() {
			return Self::new();
		}

		Self {
			word: AtomicU64::new(TAG_INDIRECT),
			ext: Some(Ext::new(attr, name)),
			platform: PhantomData
		}
	}

	#[must_use]
	pub fn attr(&self) -> BitFlags<LockAttr> {
		self.ext.as_ref().map_or_else(BitFlags::empty, |ext| ext.attr)
	}

	#[must_use]
	pub fn name(&self) -> Option<&'static str> {
		self.ext.as_ref().and_then(|ext| ext.name)
	}

	#[cold]
	fn indirect(&self) -> &AtomicU64 {
		match &self.ext {
			Some(ext) => &ext.word,
			None => fatal(self, Violation::Corrupt(TAG_INDIRECT))
		}
	}

	/// The word the state machine runs on. Fatal if the lock is destroyed
	fn live_word(&self) -> &AtomicU64 {
		match self.word.load(Ordering::Relaxed) {
			TAG_INDIRECT => self.indirect(),
			TAG_DESTROYED => fatal(self, Violation::Destroyed),
			_ => &self.word
		}
	}

	/// Current word value, following the indirection without any checks
	fn peek(&self) -> u64 {
		match (self.word.load(Ordering::Relaxed), &self.ext) {
			(TAG_INDIRECT, Some(ext)) => ext.word.load(Ordering::Relaxed),
			(state, _) => state
		}
	}

	fn me() -> u64 {
		owner_bits(P::current_thread())
	}

	fn trace_contention(&self) {
		if self.attr().contains(LockAttr::Debug) {
			debug!(target: self, "== Contended {}", self.name().unwrap_or("<unnamed>"));
		}
	}

	/// Marks the lock unusable. Any later operation on it is fatal
	///
	/// Fatal if the lock is held, has waiters, or was already destroyed.
	pub fn destroy(&self) {
		let state = self.word.load(Ordering::Relaxed);

		if state == TAG_DESTROYED {
			fatal(self, Violation::DoubleDestroy);
		}

		let word = if state == TAG_INDIRECT { self.indirect() } else { &self.word };

		match word.compare_exchange(FREE, TAG_DESTROYED, Ordering::Relaxed, Ordering::Relaxed) {
			Ok(_) => (),
			Err(TAG_DESTROYED) => fatal(self, Violation::DoubleDestroy),
			Err(_) => fatal(self, Violation::DestroyHeld)
		}

		if state == TAG_INDIRECT
			&& self
				.word
				.compare_exchange(
					TAG_INDIRECT,
					TAG_DESTROYED,
					Ordering::Relaxed,
					Ordering::Relaxed
				)
				.is_err()
		{
			fatal(self, Violation::DoubleDestroy);
		}

		debug!(target: self, "== Destroyed");
	}

	/// Acquires the lock as a mutex, spinning then blocking as needed
	pub fn lock(&self) {
		let me = Self::me();

		if likely(
			self.word
				.compare_exchange(FREE, MLOCKED | me, Ordering::Acquire, Ordering::Relaxed)
				.is_ok()
		) {
			return;
		}

		self.lock_slow(me);
	}

	#[cold]
	#[inline(never)]
	fn lock_slow(&self, me: u64) {
		let word = self.live_word();
		let mut state = word.load(Ordering::Relaxed);

		if unlikely(state & (ILOCKED | MLOCKED) != 0) {
			if state & OWNER_MSK == me {
				fatal(self, Violation::Recursive);
			}

			if state & ILOCKED == 0 {
				return self.lock_contended(word, me);
			}

			if unlikely(state == TAG_DESTROYED) {
				fatal(self, Violation::Destroyed);
			}

			match interlock::wait_interlock_to_clear::<P>(word) {
				Some(current) => state = current,
				None => return self.lock_contended(word, me)
			}
		}

		let state = loop {
			if let Some(state) = interlock::try_lock_set_flags::<P>(word, state, MLOCKED | me) {
				break state;
			}

			match interlock::wait_interlock_to_clear::<P>(word) {
				Some(current) => state = current,
				None => return self.lock_contended(word, me)
			}
		};

		self.acquired(word, state, None);
	}

	#[cold]
	#[inline(never)]
	fn lock_contended(&self, word: &AtomicU64, me: u64) {
		let mut turnstile = None;

		self.trace_contention();

		let state = loop {
			if self.spin_wait(word) == SpinWaitResult::Acquired {
				break word.load(Ordering::Relaxed);
			}

			let Some(state) = interlock::lock::<P>(word) else {
				fatal(self, Violation::Destroyed);
			};

			if state & MLOCKED != 0 {
				self.lock_wait(word, state, &mut turnstile);

				continue;
			}

			let state = state | MLOCKED | me;

			word.store(state, Ordering::Relaxed);

			break state;
		};

		self.acquired(word, state, turnstile);
	}

	/// Finishes an acquisition made with the interlock held
	fn acquired(&self, word: &AtomicU64, state: u64, turnstile: Option<P::Handle>) {
		if unlikely(waiters(state) > 0 || turnstile.is_some()) {
			self.lock_acquire(word, state, turnstile);
		}

		interlock::unlock::<P>(word, state);
	}

	/// Acquires the lock as a mutex if that is possible without waiting on
	/// another holder
	#[must_use]
	pub fn try_lock(&self) -> bool {
		let me = Self::me();

		if likely(
			self.word
				.compare_exchange(FREE, MLOCKED | me, Ordering::Acquire, Ordering::Relaxed)
				.is_ok()
		) {
			return true;
		}

		self.try_lock_slow(me)
	}

	#[cold]
	#[inline(never)]
	fn try_lock_slow(&self, me: u64) -> bool {
		let word = self.live_word();
		let Some(state) = self.try_wait_free(word) else {
			return false;
		};

		let Some(state) = self.try_set_flags(word, state, MLOCKED | me) else {
			return false;
		};

		self.acquired(word, state, None);

		true
	}

	/// Loads `word`, waiting out a transient interlock. `None` if it is held
	fn try_wait_free(&self, word: &AtomicU64) -> Option<u64> {
		let state = word.load(Ordering::Relaxed);

		if likely(state & (ILOCKED | MLOCKED) == 0) {
			return Some(state);
		}

		if state & ILOCKED == 0 {
			return None;
		}

		if unlikely(state == TAG_DESTROYED) {
			fatal(self, Violation::Destroyed);
		}

		interlock::try_wait_interlock_to_clear::<P>(word)
	}

	fn try_set_flags(&self, word: &AtomicU64, mut state: u64, set: u64) -> Option<u64> {
		loop {
			if let Some(state) = interlock::try_lock_set_flags::<P>(word, state, set) {
				break Some(state);
			}

			state = interlock::try_wait_interlock_to_clear::<P>(word)?;
		}
	}

	/// Acquires the lock in spin mode
	///
	/// Returns with preemption disabled. If the lock is held as a mutex the
	/// caller goes through the contended path and may come back holding it
	/// as a mutex instead; [`LckMtx::unlock`] releases either.
	pub fn lock_spin(&self) {
		P::disable_preemption();

		if likely(
			self.word
				.compare_exchange(FREE, ILOCKED | SPIN, Ordering::Acquire, Ordering::Relaxed)
				.is_ok()
		) {
			return;
		}

		P::enable_preemption();

		self.lock_spin_slow();
	}

	#[cold]
	#[inline(never)]
	fn lock_spin_slow(&self) {
		let me = Self::me();
		let word = self.live_word();
		let mut state = word.load(Ordering::Relaxed);

		if unlikely(state & (ILOCKED | MLOCKED) != 0) {
			if state & OWNER_MSK == me {
				fatal(self, Violation::Recursive);
			}

			if state & ILOCKED == 0 {
				return self.lock_contended(word, me);
			}

			if unlikely(state == TAG_DESTROYED) {
				fatal(self, Violation::Destroyed);
			}

			match interlock::wait_interlock_to_clear::<P>(word) {
				Some(current) => state = current,
				None => return self.lock_contended(word, me)
			}
		}

		while interlock::try_lock_set_flags::<P>(word, state, SPIN).is_none() {
			match interlock::wait_interlock_to_clear::<P>(word) {
				Some(current) => state = current,
				None => return self.lock_contended(word, me)
			}
		}
	}

	/// Acquires the lock in spin mode if it is free. On success preemption
	/// stays disabled until [`LckMtx::unlock`]
	#[must_use]
	pub fn try_lock_spin(&self) -> bool {
		P::disable_preemption();

		if likely(
			self.word
				.compare_exchange(FREE, ILOCKED | SPIN, Ordering::Acquire, Ordering::Relaxed)
				.is_ok()
		) {
			return true;
		}

		P::enable_preemption();

		self.try_lock_spin_slow()
	}

	#[cold]
	#[inline(never)]
	fn try_lock_spin_slow(&self) -> bool {
		let word = self.live_word();

		self.try_wait_free(word)
			.and_then(|state| self.try_set_flags(word, state, SPIN))
			.is_some()
	}

	/// Acquires the lock in spin mode, busy waiting through any holder
	/// rather than blocking
	pub fn lock_spin_always(&self) {
		let mut backoff = Backoff::<P>::new();

		while !self.try_lock_spin() {
			if unlikely(self.owner() == Some(P::current_thread())) {
				fatal(self, Violation::Recursive);
			}

			backoff.pause();
		}
	}

	/// Polls [`LckMtx::try_lock`] until `timeout` elapses
	#[must_use]
	pub fn try_lock_for(&self, timeout: Duration) -> bool {
		let deadline = P::now().saturating_add(P::ticks_from(timeout));
		let mut backoff = Backoff::<P>::new();

		loop {
			if self.try_lock() {
				return true;
			}

			if P::now() >= deadline {
				return false;
			}

			backoff.snooze();
		}
	}

	/// Upgrades the caller's spin-mode hold to a mutex hold. A no-op if the
	/// caller already holds the lock as a mutex
	pub fn convert_to_mutex(&self) {
		let word = self.live_word();
		let state = word.load(Ordering::Relaxed);
		let current = P::current_thread();

		match LockState::decode(state).kind {
			LockKind::MutexHeld(owner) if owner == current => return,
			LockKind::MutexHeld(owner) => fatal(self, Violation::NotOwner { owner, current }),
			LockKind::SpinHeld if state & ILOCKED != 0 && P::preemption_level() > 0 => (),
			_ => fatal(self, Violation::NotSpinHeld)
		}

		let state = (state & !SPIN) | MLOCKED | owner_bits(current);

		word.store(state, Ordering::Relaxed);

		if unlikely(waiters(state) > 0) {
			self.lock_acquire(word, state, None);
		}

		interlock::unlock::<P>(word, state);
	}

	/// Releases the lock, held in either mode
	pub fn unlock(&self) {
		let me = Self::me();

		if likely(
			self.word
				.compare_exchange(MLOCKED | me, FREE, Ordering::Release, Ordering::Relaxed)
				.is_ok()
		) {
			return;
		}

		self.unlock_slow(me);
	}

	#[cold]
	#[inline(never)]
	fn unlock_slow(&self, me: u64) {
		let word = self.live_word();
		let state = word.load(Ordering::Relaxed);

		let state = match LockState::decode(state).kind {
			LockKind::SpinHeld if state & ILOCKED != 0 && P::preemption_level() > 0 => state,
			LockKind::MutexHeld(owner) if owner_bits(owner) == me => {
				match interlock::lock_clear_flags::<P>(word, state, MLOCKED | OWNER_MSK) {
					Some(state) => state,
					None => fatal(self, Violation::Destroyed)
				}
			}

			LockKind::MutexHeld(owner) => fatal(
				self,
				Violation::NotOwner { owner, current: P::current_thread() }
			),
			LockKind::Free | LockKind::SpinHeld => fatal(self, Violation::NotHeld),
			LockKind::Destroyed => fatal(self, Violation::Destroyed),
			LockKind::Indirect | LockKind::Invalid(_) => fatal(self, Violation::Corrupt(state))
		};

		if unlikely(waiters(state) > 0) {
			return self.unlock_wakeup(word, state);
		}

		interlock::unlock::<P>(word, state & !SPIN);
	}

	/// Fatal unless the caller holds the lock. A spin-mode hold records no
	/// owner, so it passes for any caller with preemption disabled
	pub fn assert_owned(&self) {
		let owned = match LockState::decode(self.live_word().load(Ordering::Relaxed)).kind {
			LockKind::MutexHeld(owner) => owner == P::current_thread(),
			LockKind::SpinHeld => P::preemption_level() > 0,
			_ => false
		};

		if !owned {
			fatal(self, Violation::AssertOwned);
		}
	}

	pub fn assert_not_owned(&self) {
		let state = LockState::decode(self.live_word().load(Ordering::Relaxed));

		if state.kind == LockKind::MutexHeld(P::current_thread()) {
			fatal(self, Violation::AssertNotOwned);
		}
	}

	/// Whether anyone holds the lock, in either mode
	#[must_use]
	pub fn is_locked(&self) -> bool {
		self.state().is_held()
	}

	#[must_use]
	pub fn owner(&self) -> Option<ThreadId> {
		match self.state().kind {
			LockKind::MutexHeld(owner) => Some(owner),
			_ => None
		}
	}

	/// Number of threads blocked on the lock
	#[must_use]
	pub fn waiters(&self) -> u16 {
		self.state().waiters
	}

	/// A racy snapshot of the lock's state
	#[must_use]
	pub fn state(&self) -> LockState {
		LockState::decode(self.peek())
	}

	#[cfg(test)]
	pub(crate) fn turnstile_key(&self) -> usize {
		key(self.live_word())
	}
}

impl<P: Platform> Default for LckMtx<P> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P: Platform> Debug for LckMtx<P> {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = fmt.debug_struct("LckMtx");

		if let Some(name) = self.name() {
			debug.field("name", &name);
		}

		debug.field("state", &self.state()).finish()
	}
}
