use std::any::type_name;
use std::io::{Cursor, Result, Write};
use std::ptr;
use std::str::from_utf8;

pub use log::{log, log_enabled};

use super::*;

/// The last path segment of `T`'s name, without generic arguments.
/// `xx_mutex::mutex::LckMtx<xx_mutex::platform::host::Host>` becomes `LckMtx`
fn short_type_name<T>() -> &'static str
where
	T: ?Sized
{
	let full_name = type_name::<T>();
	let path = full_name
		.find('<')
		.map_or(full_name, |generics| &full_name[..generics]);

	path.rsplit("::").next().unwrap_or(path)
}

fn low_addr<T>(target: &T) -> usize
where
	T: ?Sized
{
	let addr = ptr::from_ref(target).cast::<()>() as usize;

	addr & u32::MAX as usize
}

/// Writes the `@ address name` target prefix used for lock-scoped records
pub fn format_target<T, W>(write: &mut W, target: &T, name: &str) -> Result<()>
where
	T: ?Sized,
	W: Write
{
	write.write_fmt(format_args!("@ {:0>8x} {: >13}", low_addr(target), name))
}

#[inline(never)]
#[cold]
pub fn log_target<T>(level: Level, target: &T, args: Arguments<'_>)
where
	T: ?Sized
{
	let mut buf = Cursor::new([0u8; 64]);
	let _ = format_target(&mut buf, target, short_type_name::<T>());

	#[allow(clippy::cast_possible_truncation)]
	let len = buf.position() as usize;

	log!(
		target: from_utf8(&buf.get_ref()[..len]).unwrap_or("<error>"),
		level,
		"{}",
		args
	);
}

pub(super) fn print_fatal(thread_name: &str, fmt: Arguments<'_>) {
	log!(target: thread_name, Level::Error, "{}", fmt);
}

#[cfg(test)]
mod test {
	use super::*;

	struct Probe<T>(T);

	#[test]
	fn test_short_type_name() {
		assert_eq!(short_type_name::<Probe<u32>>(), "Probe");
		assert_eq!(short_type_name::<Probe<Probe<u8>>>(), "Probe");
		assert_eq!(short_type_name::<u64>(), "u64");
	}

	#[test]
	fn test_format_target() {
		let probe = Probe(0u64);
		let mut buf = Vec::new();

		format_target(&mut buf, &probe, "Probe").unwrap();

		let line = String::from_utf8(buf).unwrap();

		assert!(line.starts_with("@ "));
		assert!(line.ends_with(" Probe"));
		assert_eq!(line.len(), 2 + 8 + 1 + 13);
	}
}
