//! Logging for the lock subsystem
//!
//! Records go through the [`log`](::log) facade. With the `logger` feature a
//! stderr logger is installed at load time, filtered by the `XX_LOG`
//! environment variable.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt::Arguments;
use std::panic::Location;

pub use log::{max_level as get_max_level, set_max_level, Level, LevelFilter};

pub mod internal;
#[cfg(feature = "logger")]
mod logger;
mod macros;

macro_rules! with_thread_name {
	($var:ident => $body:expr) => {{
		let thread = ::std::thread::current();
		let $var = thread.name().unwrap_or("<unnamed>");

		$body
	}};
}

/// Logs an unrecoverable condition on behalf of the current thread
pub fn print_fatal(fmt: Arguments<'_>) {
	with_thread_name!(thread_name => internal::print_fatal(thread_name, fmt));
}

/// Logs a contract violation against the lock at `target`, followed by a
/// backtrace when one was captured
pub fn print_violation<T>(target: &T, fmt: Arguments<'_>)
where
	T: ?Sized
{
	internal::log_target(Level::Error, target, fmt);

	let backtrace = Backtrace::capture();

	if backtrace.status() == BacktraceStatus::Captured {
		with_thread_name!(thread_name => {
			internal::print_fatal(thread_name, format_args!("\nBack trace:\n{}", backtrace));
		});
	}
}

#[track_caller]
pub fn print_panic(location: Option<&Location<'_>>, fmt: Arguments<'_>) {
	let location = match location {
		Some(location) => location,
		None => Location::caller()
	};

	print_fatal(format_args!("Panic occurred at {}:\n>> {}", location, fmt));
}
