use std::panic::resume_unwind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use crate::config;
use crate::platform::{Clock, Host, Scheduler};
use crate::sync::{LckSpin, SpinMutex};

#[test]
fn test_lock_unlock() {
	let lock = LckSpin::<Host>::new();
	let level = Host::preemption_level();

	lock.lock();

	assert!(lock.is_locked());
	assert_eq!(lock.owner(), Some(Host::current_thread()));
	assert_eq!(Host::preemption_level(), level + 1);

	lock.assert_owned();
	lock.unlock();
	lock.assert_not_owned();

	assert!(!lock.is_locked());
	assert_eq!(Host::preemption_level(), level);
}

#[test]
fn test_try_lock_contended() {
	let lock = Arc::new(LckSpin::<Host>::new());
	let level = Host::preemption_level();

	lock.lock();

	let other = lock.clone();
	let acquired = thread::spawn(move || other.try_lock()).join().unwrap();

	assert!(!acquired);

	lock.unlock();

	assert_eq!(Host::preemption_level(), level);
}

#[test]
fn test_exclusion() {
	let lock = Arc::new(LckSpin::<Host>::new());
	let inside = Arc::new(AtomicBool::new(false));
	let mut threads = Vec::new();

	for _ in 0..4 {
		let lock = lock.clone();
		let inside = inside.clone();

		threads.push(thread::spawn(move || {
			for _ in 0..1000 {
				lock.lock();

				assert!(!inside.swap(true, Ordering::Relaxed));

				inside.store(false, Ordering::Relaxed);
				lock.unlock();
			}
		}));
	}

	for thread in threads {
		thread.join().unwrap();
	}
}

#[test]
fn test_try_lock_for_expires() {
	let lock = Arc::new(LckSpin::<Host>::new());

	lock.lock();

	let other = lock.clone();
	let (acquired, elapsed, level_kept) = thread::spawn(move || {
		let level = Host::preemption_level();
		let start = Instant::now();
		let acquired = other.try_lock_for(Duration::from_millis(20));

		(acquired, start.elapsed(), Host::preemption_level() == level)
	})
	.join()
	.unwrap();

	assert!(!acquired);
	assert!(elapsed >= Duration::from_millis(20));
	assert!(level_kept);

	lock.unlock();
}

#[test]
fn test_try_lock_for_acquires_on_release() {
	let lock = Arc::new(LckSpin::<Host>::new());
	let (held_tx, held_rx) = mpsc::channel();

	let holder = {
		let lock = lock.clone();

		thread::spawn(move || {
			lock.lock();
			held_tx.send(()).unwrap();

			thread::sleep(Duration::from_millis(10));

			lock.unlock();
		})
	};

	held_rx.recv().unwrap();

	/* the deadline overflows the clock and saturates */
	assert!(lock.try_lock_for(Duration::MAX));
	assert_eq!(lock.owner(), Some(Host::current_thread()));

	lock.unlock();
	holder.join().unwrap();
}

#[test]
fn test_try_lock_until_past_deadline() {
	let lock = LckSpin::<Host>::new();
	let past = Host::now();

	thread::sleep(Duration::from_millis(1));

	assert!(!lock.try_lock_until(past));
	assert!(!lock.is_locked());

	assert!(lock.try_lock_until(u64::MAX));
	assert!(lock.is_locked());

	lock.unlock();
}

#[test]
#[should_panic(expected = "spinlock acquisition timed out")]
fn test_spin_timeout() {
	let lock = Arc::new(LckSpin::<Host>::new());
	let (held_tx, held_rx) = mpsc::channel();

	{
		let lock = lock.clone();

		thread::spawn(move || {
			lock.lock();
			held_tx.send(()).unwrap();

			thread::sleep(config::tunables().spin_timeout * 4);

			lock.unlock();
		});
	}

	held_rx.recv().unwrap();
	lock.lock();
}

#[test]
#[should_panic(expected = "lock already held")]
fn test_recursive() {
	let lock = LckSpin::<Host>::new();

	lock.lock();
	lock.lock();
}

#[test]
#[should_panic(expected = "non-owner")]
fn test_unlock_from_other_thread() {
	let lock = Arc::new(LckSpin::<Host>::new());

	lock.lock();

	let other = lock.clone();
	let result = thread::spawn(move || other.unlock_nopreempt()).join();

	lock.unlock();

	if let Err(panic) = result {
		resume_unwind(panic);
	}
}

#[test]
#[should_panic(expected = "destroyed")]
fn test_destroyed() {
	let lock = LckSpin::<Host>::new();

	lock.destroy();
	lock.lock();
}

#[test]
#[should_panic(expected = "destroyed twice")]
fn test_double_destroy() {
	let lock = LckSpin::<Host>::new();

	lock.destroy();
	lock.destroy();
}

#[test]
fn test_spin_mutex_counter() {
	let counter = Arc::new(SpinMutex::<u64, Host>::new(0));
	let mut threads = Vec::new();

	for _ in 0..4 {
		let counter = counter.clone();

		threads.push(thread::spawn(move || {
			for _ in 0..10_000 {
				*counter.lock() += 1;
			}
		}));
	}

	for thread in threads {
		thread.join().unwrap();
	}

	assert_eq!(*counter.lock(), 40_000);
}

#[test]
fn test_spin_mutex_try_lock() {
	let value = SpinMutex::<Vec<u32>, Host>::default();
	let mut guard = value.lock();

	guard.push(7);

	assert!(value.try_lock().is_none());

	drop(guard);

	assert_eq!(value.try_lock().as_deref(), Some(&vec![7]));
	assert_eq!(value.into_inner(), vec![7]);
}
