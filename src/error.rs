//! Contract violations
//!
//! Misuse of a lock (use after destroy, unlocking a lock the caller does not
//! hold, destroying a held lock, ...) corrupts state every other thread depends
//! on, so it is never reported as a recoverable error. [`fatal`] logs the
//! violation against the offending lock and panics the calling thread.
//!
//! Contention is not an error: failing a compare-and-swap, spinning and
//! blocking are all normal outcomes, and the `try_*` entry points report them
//! as `false`.

#![allow(clippy::module_name_repetitions)]

use std::fmt::{self, Display, Formatter};

use crate::log::print_violation;
use crate::platform::ThreadId;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Violation {
	/// An operation observed the destroyed sentinel
	Destroyed,

	/// `destroy` on a lock that was already destroyed
	DoubleDestroy,

	/// `destroy` on a lock that is held or has waiters
	DestroyHeld,

	/// Release by a thread other than the recorded owner
	NotOwner { owner: ThreadId, current: ThreadId },

	/// Release, conversion or assertion on a lock nobody holds
	NotHeld,

	/// A thread tried to take a spin lock it already holds
	Recursive,

	/// `assert_owned` failed
	AssertOwned,

	/// `assert_not_owned` failed
	AssertNotOwned,

	/// `convert_to_mutex` without a spin-mode hold
	NotSpinHeld,

	/// More parked threads than the waiter field can count
	WaiterOverflow,

	/// The waiter count promised a parked thread the turnstile did not have
	LostWaiter,

	/// A spin lock acquisition spun past the configured timeout. Times are
	/// in platform ticks
	SpinTimeout { owner: Option<ThreadId>, start: u64, now: u64 },

	/// The lock word holds a bit pattern no transition produces
	Corrupt(u64)
}

impl Display for Violation {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Destroyed => fmt.write_str("trying to interlock destroyed mutex"),
			Self::DoubleDestroy => fmt.write_str("mutex destroyed twice"),
			Self::DestroyHeld => fmt.write_str("destroying a mutex that is held"),
			Self::NotOwner { owner, current } => write!(
				fmt,
				"mutex unlock attempted from non-owner thread {} (owner {})",
				current, owner
			),
			Self::NotHeld => fmt.write_str("mutex not held"),
			Self::Recursive => fmt.write_str("lock already held by the current thread"),
			Self::AssertOwned => fmt.write_str("mutex not owned"),
			Self::AssertNotOwned => fmt.write_str("mutex owned"),
			Self::NotSpinHeld => fmt.write_str("mutex not held in spin mode"),
			Self::WaiterOverflow => fmt.write_str("mutex waiter count overflow"),
			Self::LostWaiter => fmt.write_str("mutex has waiters but none are parked"),
			Self::SpinTimeout { owner, start, now } => {
				fmt.write_str("spinlock acquisition timed out: owner ")?;

				match owner {
					Some(owner) => write!(fmt, "{}", owner)?,
					None => fmt.write_str("none")?
				}

				write!(
					fmt,
					", spin time {}, start time {}, now {}",
					now.saturating_sub(*start),
					start,
					now
				)
			}

			Self::Corrupt(word) => write!(fmt, "corrupt lock word {:#018x}", word)
		}
	}
}

impl std::error::Error for Violation {}

/// Reports `violation` against `lock` and terminates the calling thread
#[cold]
#[inline(never)]
#[track_caller]
#[allow(clippy::panic)]
pub fn fatal<T>(lock: &T, violation: Violation) -> !
where
	T: ?Sized
{
	print_violation(lock, format_args!("{}", violation));

	panic!("{} ({:p})", violation, lock)
}
