use std::time::Duration;

use crate::config::*;

#[test]
fn test_parse_micros() {
	assert_eq!(parse_micros("25"), Some(Duration::from_micros(25)));
	assert_eq!(parse_micros(" 7\n"), Some(Duration::from_micros(7)));
	assert_eq!(parse_micros("-1"), None);
	assert_eq!(parse_micros("fast"), None);
}

#[test]
fn test_defaults() {
	let tunables = Tunables::default();

	assert_eq!(tunables.low_spin, Duration::from_micros(10));
	assert_eq!(tunables.high_spin, None);
	assert_eq!(tunables.spin_timeout, Duration::from_millis(250));
}
