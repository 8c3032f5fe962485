//! Collaborators of the lock subsystem
//!
//! The mutex never touches scheduler or wait-queue internals. It drives them
//! through three narrow services, each a trait of associated functions so a
//! platform is a zero-sized type parameter resolved at compile time:
//!
//! - [`Scheduler`]: thread identity, processor queries, preemption control,
//!   blocking and waking, priority boosts
//! - [`Turnstiles`]: per-lock priority-ordered wait queues with an inheritor
//! - [`Clock`]: monotonic time for the spin-wait estimator
//!
//! [`host::Host`] implements all three on top of std threads.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroU32;
use std::time::Duration;

pub mod host;

pub use host::Host;

/// Identity of a thread, as recorded in a lock word's owner field
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct ThreadId(NonZeroU32);

impl ThreadId {
	#[must_use]
	pub const fn new(raw: u32) -> Option<Self> {
		match NonZeroU32::new(raw) {
			Some(raw) => Some(Self(raw)),
			None => None
		}
	}

	#[must_use]
	pub const fn get(self) -> u32 {
		self.0.get()
	}
}

impl Display for ThreadId {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		Display::fmt(&self.0, fmt)
	}
}

/// A scheduling priority. Higher runs first
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Priority(pub u8);

impl Priority {
	pub const MIN: Self = Self(0);
	pub const DEFAULT: Self = Self(31);

	/// The promotion ceiling. Inheritance never boosts a thread past this
	pub const PROMOTE: Self = Self(80);
	pub const MAX: Self = Self(127);

	/// The effective priority of a thread at `self` that inherits from a
	/// waiter at `waiter`
	#[must_use]
	pub fn promoted_by(self, waiter: Self) -> Self {
		self.max(waiter.min(Self::PROMOTE))
	}
}

impl Default for Priority {
	fn default() -> Self {
		Self::DEFAULT
	}
}

/// Opaque token a thread waits on, derived from the address of the lock
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Event(usize);

impl Event {
	#[must_use]
	pub const fn from_key(key: usize) -> Self {
		Self(key)
	}

	#[must_use]
	pub const fn key(self) -> usize {
		self.0
	}
}

/// How a turnstile wakeup treats priority inheritance
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WakeMode {
	/// The woken thread becomes the turnstile's inheritor, so the remaining
	/// waiters push on it from the moment it is runnable
	PromoteOnWake,

	/// Wake without touching the inheritor
	AllPriorities
}

pub trait Scheduler {
	fn current_thread() -> ThreadId;

	fn cpu_number() -> u32;

	fn processor_count() -> u32;

	/// Whether `thread` is running on some processor right now. May be stale
	/// by the time it returns
	fn thread_on_core(thread: ThreadId) -> bool;

	fn disable_preemption();

	fn enable_preemption();

	fn preemption_level() -> u32;

	/// Suspends the calling thread until it is woken. A wakeup delivered
	/// after the thread queued itself but before it blocked is not lost
	fn block_current_thread();

	/// Wakes one thread queued on `event`, without touching priority
	/// inheritance
	///
	/// For plain event waits. The mutex never calls this: lock waiters are
	/// woken through [`Turnstiles::wakeup_one`] together with the waiter count
	/// in the lock word, which this would leave stale.
	fn wake_one(event: Event) -> bool;

	/// Wakes every thread queued on `event`. Same caveat as
	/// [`Scheduler::wake_one`]
	fn wake_all(event: Event) -> usize;

	fn thread_priority_boost(thread: ThreadId, priority: Priority);

	fn thread_priority_clear(thread: ThreadId);

	#[inline(always)]
	fn cpu_pause() {
		std::hint::spin_loop();
	}
}

/// Wait queues keyed by lock address
///
/// Callers serialize every operation on a key with that lock's interlock.
pub trait Turnstiles {
	type Handle: Copy;

	/// Returns the turnstile for `key`, creating it if needed. Must be paired
	/// with [`Turnstiles::complete`]
	fn prepare(key: usize) -> Self::Handle;

	/// Ends one `prepare` bracket. The turnstile dissolves once nobody
	/// holds it prepared and its queue is empty
	fn complete(key: usize);

	/// Designates the thread the waiters' priority flows to
	fn set_inheritor(turnstile: Self::Handle, inheritor: Option<ThreadId>);

	/// Queues the calling thread on `event` at its current priority. The
	/// thread then calls [`Scheduler::block_current_thread`]
	fn assert_wait(turnstile: Self::Handle, event: Event);

	/// Wakes the highest priority waiter, FIFO among equals
	fn wakeup_one(turnstile: Self::Handle, event: Event, mode: WakeMode) -> Option<ThreadId>;
}

pub trait Clock {
	/// Monotonic time in ticks
	fn now() -> u64;

	fn ticks_from(duration: Duration) -> u64;
}

pub trait Platform: Scheduler + Turnstiles + Clock + 'static {}

impl<P> Platform for P where P: Scheduler + Turnstiles + Clock + 'static {}
