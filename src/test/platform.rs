use std::thread::{self, JoinHandle};

use super::wait_until;
use crate::platform::host::{self, Host};
use crate::platform::{Event, Priority, Scheduler, ThreadId, Turnstiles};

/// Queues a new thread on `key` as a plain event wait, outside any lock
fn wait_on(key: usize) -> JoinHandle<()> {
	thread::spawn(move || {
		let handle = Host::prepare(key);

		Host::assert_wait(handle, Event::from_key(key));
		Host::complete(key);
		Host::block_current_thread();
	})
}

#[test]
fn test_promotion() {
	assert_eq!(Priority(10).promoted_by(Priority(60)), Priority(60));
	assert_eq!(Priority(10).promoted_by(Priority(120)), Priority::PROMOTE);
	assert_eq!(Priority(90).promoted_by(Priority(120)), Priority(90));
	assert_eq!(Priority(40).promoted_by(Priority(20)), Priority(40));
}

#[test]
fn test_thread_id() {
	assert_eq!(ThreadId::new(0), None);
	assert_eq!(ThreadId::new(17).map(ThreadId::get), Some(17));
	assert_eq!(ThreadId::new(17).unwrap().to_string(), "17");
}

#[test]
fn test_host_threads_distinct() {
	let me = Host::current_thread();
	let other = thread::spawn(Host::current_thread).join().unwrap();

	assert_ne!(me, other);
	assert_eq!(Host::current_thread(), me);
	assert!(Host::thread_on_core(me));
	assert!(!Host::thread_on_core(other));
}

#[test]
fn test_event_wake_one() {
	let key = 0x7e57_0001;
	let waiter = wait_on(key);

	wait_until(|| host::parked_waiters(key) == 1);

	assert!(Host::wake_one(Event::from_key(key)));

	waiter.join().unwrap();

	assert_eq!(host::parked_waiters(key), 0);
	assert!(!Host::wake_one(Event::from_key(key)));
}

#[test]
fn test_event_wake_all() {
	let key = 0x7e57_0003;
	let waiters = [wait_on(key), wait_on(key)];

	wait_until(|| host::parked_waiters(key) == 2);

	assert_eq!(Host::wake_all(Event::from_key(key)), 2);

	for waiter in waiters {
		waiter.join().unwrap();
	}

	assert_eq!(Host::wake_all(Event::from_key(key)), 0);
}
