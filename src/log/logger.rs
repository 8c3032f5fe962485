use std::env::var;
use std::fmt;
use std::io::{stderr, BufWriter, Result, Stderr, Write};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ctor::ctor;
use lazy_static::lazy_static;
use log::{set_boxed_logger, Log, Metadata, Record};

use super::*;
use crate::{error, trace};

const LOG_ENV: &str = "XX_LOG";

lazy_static! {
	static ref STDERR: Mutex<BufWriter<Stderr>> =
		Mutex::new(BufWriter::with_capacity(1024, stderr()));
}

fn get_stderr() -> MutexGuard<'static, BufWriter<Stderr>> {
	/* a panic while logging must not silence every later record */
	STDERR.lock().unwrap_or_else(PoisonError::into_inner)
}

macro_rules! ansi_color {
	(bold) => {
		format_args!("{}", "\x1b[1m")
	};

	($color:expr) => {
		format_args!("\x1b[1;48;5;{}m", $color)
	};

	() => {
		format_args!("{}", "\x1b[0m")
	};
}

/// Prefixes every line of a record with its level colour and target
struct LineWriter<'a> {
	output: MutexGuard<'a, BufWriter<Stderr>>,
	record: &'a Record<'a>,
	at_line_start: bool
}

impl LineWriter<'_> {
	fn write_prefix(&mut self) -> Result<()> {
		if !self.at_line_start {
			return Ok(());
		}

		self.at_line_start = false;

		let color = match self.record.level() {
			Level::Error => ansi_color!(1),
			Level::Warn => ansi_color!(11),
			Level::Info => ansi_color!(10),
			Level::Debug => ansi_color!(14),
			Level::Trace => ansi_color!(bold)
		};

		self.output.write_fmt(format_args!(
			"{}| {: >24} |{} ",
			color,
			self.record.target(),
			ansi_color!()
		))
	}
}

impl fmt::Write for LineWriter<'_> {
	fn write_str(&mut self, data: &str) -> fmt::Result {
		for line in data.split_inclusive('\n') {
			self.write_prefix().map_err(|_| fmt::Error)?;
			self.output
				.write_all(line.as_bytes())
				.map_err(|_| fmt::Error)?;

			if line.ends_with('\n') {
				self.at_line_start = true;
			}
		}

		Ok(())
	}
}

struct Logger;

impl Log for Logger {
	fn enabled(&self, _: &Metadata<'_>) -> bool {
		true
	}

	fn log(&self, record: &Record<'_>) {
		let mut writer = LineWriter { output: get_stderr(), record, at_line_start: true };

		let _ = fmt::Write::write_fmt(&mut writer, *record.args());

		if !writer.at_line_start {
			let _ = writer.output.write_all(b"\n");
		}

		let _ = writer.output.flush();
	}

	fn flush(&self) {
		let _ = get_stderr().flush();
	}
}

#[cfg(feature = "panic-log")]
fn panic_hook(info: &std::panic::PanicHookInfo<'_>) {
	let payload = info.payload();
	let msg = match payload.downcast_ref::<&'static str>() {
		Some(msg) => *msg,
		None => payload
			.downcast_ref::<String>()
			.map_or("Box<dyn Any>", String::as_str)
	};

	print_panic(info.location(), format_args!("{}", msg));
}

#[ctor]
fn init() {
	if set_boxed_logger(Box::new(Logger)).is_err() {
		/* another logger won the race, keep its configuration */
		return;
	}

	#[cfg(feature = "panic-log")]
	std::panic::set_hook(Box::new(panic_hook));

	let level = match var(LOG_ENV) {
		Ok(level) => LevelFilter::from_str(&level).map_err(|_| Some(level)),
		Err(_) => Err(None)
	};

	match level {
		Ok(level) => {
			set_max_level(level);

			trace!("== Log level set to {} by {}", level.as_str(), LOG_ENV);
		}

		Err(input) => {
			set_max_level(LevelFilter::Info);

			if let Some(input) = input {
				error!("== Invalid log level {} in {}", input, LOG_ENV);
			}
		}
	}
}
