//! Spin-wait tunables
//!
//! `low_spin` is the learning window of the spin-wait estimator and the
//! minimum time any contending thread spins. `high_spin` is the hard limit;
//! when unset it is derived as `low_spin` times the processor count.
//! `spin_timeout` bounds how long a pure spin lock acquisition may spin
//! before it is reported as fatal.
//!
//! All are read from the environment at load time (`XX_MTX_SPIN_US`,
//! `XX_MTX_HIGH_SPIN_US`, `XX_SPIN_TIMEOUT_US`, in microseconds) and may be
//! changed at runtime with [`set_spin`] and [`set_spin_timeout`].

use std::env::var;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ctor::ctor;

use crate::{debug, warn};

pub const SPIN_ENV: &str = "XX_MTX_SPIN_US";
pub const HIGH_SPIN_ENV: &str = "XX_MTX_HIGH_SPIN_US";
pub const SPIN_TIMEOUT_ENV: &str = "XX_SPIN_TIMEOUT_US";

pub const DEFAULT_LOW_SPIN: Duration = Duration::from_micros(10);
pub const DEFAULT_SPIN_TIMEOUT: Duration = Duration::from_millis(250);

const DERIVED: u64 = u64::MAX;

#[allow(clippy::cast_possible_truncation)]
static LOW_SPIN_NS: AtomicU64 = AtomicU64::new(DEFAULT_LOW_SPIN.as_nanos() as u64);
static HIGH_SPIN_NS: AtomicU64 = AtomicU64::new(DERIVED);
#[allow(clippy::cast_possible_truncation)]
static SPIN_TIMEOUT_NS: AtomicU64 = AtomicU64::new(DEFAULT_SPIN_TIMEOUT.as_nanos() as u64);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Tunables {
	pub low_spin: Duration,
	pub high_spin: Option<Duration>,
	pub spin_timeout: Duration
}

impl Default for Tunables {
	fn default() -> Self {
		Self {
			low_spin: DEFAULT_LOW_SPIN,
			high_spin: None,
			spin_timeout: DEFAULT_SPIN_TIMEOUT
		}
	}
}

fn as_nanos(duration: Duration) -> u64 {
	u64::try_from(duration.as_nanos()).unwrap_or(DERIVED - 1)
}

#[must_use]
pub fn tunables() -> Tunables {
	let high = HIGH_SPIN_NS.load(Ordering::Relaxed);

	Tunables {
		low_spin: Duration::from_nanos(LOW_SPIN_NS.load(Ordering::Relaxed)),
		high_spin: (high != DERIVED).then(|| Duration::from_nanos(high)),
		spin_timeout: Duration::from_nanos(SPIN_TIMEOUT_NS.load(Ordering::Relaxed))
	}
}

/// Replaces the spin-wait tunables for every lock. Takes effect on the next
/// contended acquisition
pub fn set_spin(low_spin: Duration, high_spin: Option<Duration>) {
	LOW_SPIN_NS.store(as_nanos(low_spin), Ordering::Relaxed);
	HIGH_SPIN_NS.store(high_spin.map_or(DERIVED, as_nanos), Ordering::Relaxed);
}

/// Replaces the spin lock acquisition timeout. Takes effect on the next
/// contended acquisition
pub fn set_spin_timeout(timeout: Duration) {
	SPIN_TIMEOUT_NS.store(as_nanos(timeout), Ordering::Relaxed);
}

/// Parses a whole number of microseconds
#[must_use]
pub fn parse_micros(value: &str) -> Option<Duration> {
	value.trim().parse::<u64>().ok().map(Duration::from_micros)
}

fn read_env(name: &str) -> Option<Duration> {
	let value = var(name).ok()?;
	let parsed = parse_micros(&value);

	if parsed.is_none() {
		warn!("== Ignoring invalid {} value {:?}", name, value);
	}

	parsed
}

#[ctor]
fn init() {
	let mut tunables = Tunables::default();

	if let Some(low_spin) = read_env(SPIN_ENV) {
		tunables.low_spin = low_spin;
	}

	if let Some(high_spin) = read_env(HIGH_SPIN_ENV) {
		tunables.high_spin = Some(high_spin);
	}

	if let Some(timeout) = read_env(SPIN_TIMEOUT_ENV) {
		tunables.spin_timeout = timeout;
	}

	set_spin(tunables.low_spin, tunables.high_spin);
	set_spin_timeout(tunables.spin_timeout);

	debug!("== Spin tunables {:?}", tunables);
}
