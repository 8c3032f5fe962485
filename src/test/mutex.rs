use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use super::wait_until;
use crate::mutex::*;
use crate::platform::host::{self, Host};
use crate::platform::Scheduler;

fn free_state() -> LockState {
	LockState { kind: LockKind::Free, interlocked: false, waiters: 0 }
}

#[test]
fn test_exclusion() {
	let lock = Arc::new(LckMtx::<Host>::new());
	let inside = Arc::new(AtomicBool::new(false));
	let count = Arc::new(AtomicU64::new(0));
	let mut threads = Vec::new();

	for _ in 0..4 {
		let lock = lock.clone();
		let inside = inside.clone();
		let count = count.clone();

		threads.push(thread::spawn(move || {
			for _ in 0..2000 {
				lock.lock();

				assert!(!inside.swap(true, Ordering::Relaxed));

				count.store(count.load(Ordering::Relaxed) + 1, Ordering::Relaxed);
				inside.store(false, Ordering::Relaxed);

				lock.unlock();
			}
		}));
	}

	for thread in threads {
		thread.join().unwrap();
	}

	assert_eq!(count.load(Ordering::Relaxed), 8000);
	assert_eq!(lock.state(), free_state());
}

#[test]
fn test_try_lock_free() {
	let lock = LckMtx::<Host>::new();

	assert!(lock.try_lock());
	assert_eq!(lock.owner(), Some(Host::current_thread()));

	lock.unlock();

	assert_eq!(lock.state(), free_state());
}

#[test]
fn test_try_lock_held() {
	let lock = Arc::new(LckMtx::<Host>::new());

	lock.lock();

	let other = lock.clone();

	assert!(!thread::spawn(move || other.try_lock()).join().unwrap());

	let other = lock.clone();

	assert!(!thread::spawn(move || other.try_lock_spin()).join().unwrap());

	lock.unlock();
}

#[test]
fn test_no_lost_wakeup() {
	let lock = Arc::new(LckMtx::<Host>::new());

	lock.lock();

	let waiter = {
		let lock = lock.clone();

		thread::spawn(move || {
			lock.lock();
			lock.assert_owned();
			lock.unlock();
		})
	};

	wait_until(|| host::parked_waiters(lock.turnstile_key()) == 1);

	assert_eq!(lock.waiters(), 1);

	lock.unlock();
	waiter.join().unwrap();

	assert_eq!(lock.state(), free_state());
}

#[test]
fn test_waiter_conservation() {
	let lock = Arc::new(LckMtx::<Host>::new());
	let key = lock.turnstile_key();
	let mut threads = Vec::new();

	lock.lock();

	for _ in 0..3 {
		let lock = lock.clone();

		threads.push(thread::spawn(move || {
			lock.lock();
			thread::sleep(Duration::from_millis(1));
			lock.unlock();
		}));
	}

	wait_until(|| host::parked_waiters(key) == 3);

	assert_eq!(lock.waiters(), 3);

	lock.unlock();

	for thread in threads {
		thread.join().unwrap();
	}

	assert_eq!(lock.waiters(), 0);
	assert_eq!(host::parked_waiters(key), 0);
	assert_eq!(lock.state(), free_state());
}

#[test]
fn test_spin_mode() {
	let lock = LckMtx::<Host>::new();
	let level = Host::preemption_level();

	lock.lock_spin();

	assert_eq!(lock.state().kind, LockKind::SpinHeld);
	assert!(lock.state().interlocked);
	assert_eq!(lock.owner(), None);
	assert_eq!(Host::preemption_level(), level + 1);

	lock.assert_owned();
	lock.unlock();

	assert_eq!(Host::preemption_level(), level);
	assert_eq!(lock.state(), free_state());

	assert!(lock.try_lock_spin());

	lock.unlock();

	assert_eq!(Host::preemption_level(), level);
}

#[test]
fn test_convert_to_mutex() {
	let lock = LckMtx::<Host>::new();
	let level = Host::preemption_level();

	lock.lock_spin();
	lock.convert_to_mutex();

	assert_eq!(lock.owner(), Some(Host::current_thread()));
	assert!(!lock.state().interlocked);
	assert_eq!(Host::preemption_level(), level);

	lock.convert_to_mutex();
	lock.unlock();

	assert_eq!(lock.state(), free_state());
}

#[test]
fn test_convert_after_handoff() {
	let lock = Arc::new(LckMtx::<Host>::new());

	lock.lock();

	let waiter = {
		let lock = lock.clone();

		thread::spawn(move || {
			lock.lock();
			lock.unlock();
		})
	};

	wait_until(|| host::parked_waiters(lock.turnstile_key()) == 1);

	lock.unlock();
	lock.lock_spin();
	lock.convert_to_mutex();
	lock.assert_owned();
	lock.unlock();

	waiter.join().unwrap();

	assert_eq!(lock.state(), free_state());
}

#[test]
fn test_spin_waits_for_mutex_holder() {
	let lock = Arc::new(LckMtx::<Host>::new());
	let barrier = Arc::new(Barrier::new(2));

	lock.lock();

	let spinner = {
		let lock = lock.clone();
		let barrier = barrier.clone();

		thread::spawn(move || {
			barrier.wait();
			lock.lock_spin();
			lock.assert_owned();
			lock.unlock();
		})
	};

	barrier.wait();
	thread::sleep(Duration::from_millis(5));
	lock.unlock();
	spinner.join().unwrap();
}

#[test]
fn test_lock_spin_always() {
	let lock = Arc::new(LckMtx::<Host>::new());
	let (tx, rx) = mpsc::channel();

	lock.lock();

	let spinner = {
		let lock = lock.clone();

		thread::spawn(move || {
			tx.send(()).unwrap();
			lock.lock_spin_always();

			let state = lock.state();

			lock.unlock();
			state
		})
	};

	rx.recv().unwrap();
	thread::sleep(Duration::from_millis(2));
	lock.unlock();

	assert_eq!(spinner.join().unwrap().kind, LockKind::SpinHeld);
}

#[test]
fn test_try_lock_for() {
	let lock = Arc::new(LckMtx::<Host>::new());

	lock.lock();

	let other = lock.clone();
	let timed_out = thread::spawn(move || other.try_lock_for(Duration::from_millis(5)))
		.join()
		.unwrap();

	assert!(!timed_out);

	let other = lock.clone();
	let acquirer = thread::spawn(move || {
		let acquired = other.try_lock_for(Duration::from_secs(10));

		if acquired {
			other.unlock();
		}

		acquired
	});

	thread::sleep(Duration::from_millis(2));
	lock.unlock();

	assert!(acquirer.join().unwrap());
}

#[test]
fn test_indirect() {
	let lock = Arc::new(LckMtx::<Host>::named("test_indirect", LockAttr::Debug));

	assert_eq!(lock.name(), Some("test_indirect"));
	assert!(lock.attr().contains(LockAttr::Debug));
	assert_eq!(lock.state(), free_state());

	lock.lock();

	assert_eq!(lock.owner(), Some(Host::current_thread()));

	let waiter = {
		let lock = lock.clone();

		thread::spawn(move || {
			lock.lock();
			lock.unlock();
		})
	};

	wait_until(|| lock.waiters() == 1);

	lock.unlock();
	waiter.join().unwrap();

	assert!(lock.try_lock());

	lock.unlock();
	lock.lock_spin();
	lock.convert_to_mutex();
	lock.unlock();

	assert_eq!(lock.state(), free_state());

	lock.destroy();

	assert_eq!(lock.state().kind, LockKind::Destroyed);
}

#[test]
fn test_stat_only_is_direct() {
	let lock = LckMtx::<Host>::with_attr(LockAttr::Stat);

	assert!(lock.attr().is_empty());
	assert!(lock.try_lock());

	lock.unlock();
}

#[test]
fn test_guard() {
	let counter = Arc::new(Mutex::<u64, Host>::new(0));
	let mut threads = Vec::new();

	for _ in 0..4 {
		let counter = counter.clone();

		threads.push(thread::spawn(move || {
			for i in 0..1000 {
				if i % 2 == 0 {
					*counter.lock() += 1;
				} else {
					let mut guard = counter.lock_spin();

					guard.convert_to_mutex();
					*guard += 1;
				}
			}
		}));
	}

	for thread in threads {
		thread.join().unwrap();
	}

	assert_eq!(*counter.lock(), 4000);

	let guard = counter.lock();

	assert!(counter.try_lock().is_none());
	assert!(counter.try_lock_for(Duration::from_millis(1)).is_none());

	drop(guard);

	assert!(counter.try_lock().is_some());
	assert!(!counter.raw().is_locked());
}

#[test]
#[should_panic(expected = "trying to interlock destroyed mutex")]
fn test_lock_destroyed() {
	let lock = LckMtx::<Host>::new();

	lock.destroy();
	lock.lock();
}

#[test]
#[should_panic(expected = "trying to interlock destroyed mutex")]
fn test_try_lock_destroyed() {
	let lock = LckMtx::<Host>::new();

	lock.destroy();

	let _ = lock.try_lock();
}

#[test]
#[should_panic(expected = "trying to interlock destroyed mutex")]
fn test_unlock_destroyed() {
	let lock = LckMtx::<Host>::with_attr(LockAttr::Debug);

	lock.destroy();
	lock.unlock();
}

#[test]
#[should_panic(expected = "mutex destroyed twice")]
fn test_double_destroy() {
	let lock = LckMtx::<Host>::new();

	lock.destroy();
	lock.destroy();
}

#[test]
#[should_panic(expected = "destroying a mutex that is held")]
fn test_destroy_held() {
	let lock = LckMtx::<Host>::new();

	lock.lock();
	lock.destroy();
}

#[test]
#[should_panic(expected = "non-owner")]
fn test_unlock_non_owner() {
	let lock = Arc::new(LckMtx::<Host>::new());

	lock.lock();

	let other = lock.clone();

	if let Err(panic) = thread::spawn(move || other.unlock()).join() {
		std::panic::resume_unwind(panic);
	}
}

#[test]
#[should_panic(expected = "mutex not held")]
fn test_unlock_free() {
	LckMtx::<Host>::new().unlock();
}

#[test]
#[should_panic(expected = "lock already held")]
fn test_recursive_lock() {
	let lock = LckMtx::<Host>::new();

	lock.lock();
	lock.lock();
}

#[test]
#[should_panic(expected = "mutex not owned")]
fn test_assert_owned() {
	LckMtx::<Host>::new().assert_owned();
}

#[test]
#[should_panic(expected = "mutex owned")]
fn test_assert_not_owned() {
	let lock = LckMtx::<Host>::new();

	lock.lock();
	lock.assert_not_owned();
}

#[test]
#[should_panic(expected = "not held in spin mode")]
fn test_convert_unheld() {
	LckMtx::<Host>::new().convert_to_mutex();
}
