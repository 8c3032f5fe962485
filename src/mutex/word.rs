//! Lock word layout
//!
//! ```text
//!  63            32 31  27 26 25 24 23    16 15           0
//! +----------------+------+--+--+--+--------+--------------+
//! |     owner      |  0   |S |M |I |reserved|   waiters    |
//! +----------------+------+--+--+--+--------+--------------+
//! ```
//!
//! `I` is the interlock, `M` held as mutex, `S` held as spin. The owner field
//! is populated exactly when `M` is set. The two sentinel tags carry `I` and
//! `M` (and `S`), so no fast-path compare-and-swap ever succeeds on them.

use static_assertions::const_assert;

use crate::platform::ThreadId;

pub const WAITERS_MSK: u64 = 0x0000_ffff;
pub const WAITER: u64 = 0x0000_0001;
pub const ILOCKED: u64 = 1 << 24;
pub const MLOCKED: u64 = 1 << 25;
pub const SPIN: u64 = 1 << 26;
pub const OWNER_SHIFT: u32 = 32;
pub const OWNER_MSK: u64 = 0xffff_ffff << OWNER_SHIFT;

pub const TAG_INDIRECT: u64 = 0x07ff_1007;
pub const TAG_DESTROYED: u64 = 0x07fe_2007;

pub const FREE: u64 = 0;

const_assert!(WAITERS_MSK & (ILOCKED | MLOCKED | SPIN | OWNER_MSK) == 0);
const_assert!(ILOCKED & MLOCKED == 0 && MLOCKED & SPIN == 0 && ILOCKED & SPIN == 0);
const_assert!((ILOCKED | MLOCKED | SPIN) & OWNER_MSK == 0);
const_assert!(TAG_INDIRECT != TAG_DESTROYED);
const_assert!(TAG_INDIRECT & (ILOCKED | MLOCKED) == ILOCKED | MLOCKED);
const_assert!(TAG_DESTROYED & (ILOCKED | MLOCKED) == ILOCKED | MLOCKED);
const_assert!((TAG_INDIRECT | TAG_DESTROYED) & OWNER_MSK == 0);
const_assert!(size_of::<ThreadId>() * 8 == (64 - OWNER_SHIFT) as usize);

#[must_use]
pub const fn owner_bits(owner: ThreadId) -> u64 {
	(owner.get() as u64) << OWNER_SHIFT
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn owner_of(word: u64) -> Option<ThreadId> {
	ThreadId::new((word >> OWNER_SHIFT) as u32)
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn waiters(word: u64) -> u16 {
	(word & WAITERS_MSK) as u16
}

#[must_use]
pub const fn is_tag(word: u64) -> bool {
	word == TAG_INDIRECT || word == TAG_DESTROYED
}

/// The lock word as a logical state
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LockKind {
	Free,
	SpinHeld,
	MutexHeld(ThreadId),
	Indirect,
	Destroyed,

	/// A bit pattern no transition produces
	Invalid(u64)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LockState {
	pub kind: LockKind,
	pub interlocked: bool,
	pub waiters: u16
}

impl LockState {
	#[must_use]
	pub const fn decode(word: u64) -> Self {
		let kind = match word {
			TAG_INDIRECT => LockKind::Indirect,
			TAG_DESTROYED => LockKind::Destroyed,
			_ => match (word & MLOCKED != 0, word & SPIN != 0, owner_of(word)) {
				(false, false, None) => LockKind::Free,
				(false, true, None) => LockKind::SpinHeld,
				(true, false, Some(owner)) => LockKind::MutexHeld(owner),
				_ => LockKind::Invalid(word)
			}
		};

		match kind {
			LockKind::Indirect | LockKind::Destroyed => {
				Self { kind, interlocked: false, waiters: 0 }
			}

			_ => Self { kind, interlocked: word & ILOCKED != 0, waiters: waiters(word) }
		}
	}

	#[must_use]
	pub const fn is_held(&self) -> bool {
		matches!(self.kind, LockKind::SpinHeld | LockKind::MutexHeld(_))
	}
}
