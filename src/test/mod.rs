use std::thread;
use std::time::{Duration, Instant};

mod config;
mod mutex;
mod platform;
mod sync;

/// Polls `cond` until it holds. Panics after ten seconds
#[track_caller]
fn wait_until<F>(mut cond: F)
where
	F: FnMut() -> bool
{
	let deadline = Instant::now() + Duration::from_secs(10);

	while !cond() {
		assert!(Instant::now() < deadline, "timed out");

		thread::sleep(Duration::from_millis(1));
	}
}
