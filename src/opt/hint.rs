//! Branch layout hints for the lock fast paths

#[inline(always)]
#[cold]
const fn cold_path() {}

/// Marks `cond` as the expected outcome, moving the other arm out of line
#[inline(always)]
#[must_use]
pub const fn likely(cond: bool) -> bool {
	if !cond {
		cold_path();
	}

	cond
}

/// Marks `cond` as the rare outcome
#[inline(always)]
#[must_use]
pub const fn unlikely(cond: bool) -> bool {
	if cond {
		cold_path();
	}

	cond
}
