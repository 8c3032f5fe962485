//! The std-thread platform
//!
//! Every OS thread that touches a lock is registered on first use and keeps
//! its record for the life of the process. Ids are never reused, so an owner
//! id read out of a lock word always names the same thread, even one that
//! has since exited.
//!
//! Preemption control is bookkeeping only: a level counter the locks use to
//! check their own discipline. The OS may still deschedule a thread with
//! preemption "disabled".

use std::cell::Cell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::available_parallelism;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;

use super::*;
use crate::sync::CachePadded;
use crate::trace;

mod parker;
mod turnstile;

use parker::Parker;

struct HostThread {
	id: ThreadId,
	base: AtomicU8,
	effective: AtomicU8,
	on_core: AtomicBool,
	parked: AtomicBool,
	blocked_on: AtomicUsize,
	parker: Parker
}

impl HostThread {
	fn new(id: ThreadId) -> Self {
		Self {
			id,
			base: AtomicU8::new(Priority::DEFAULT.0),
			effective: AtomicU8::new(Priority::DEFAULT.0),
			on_core: AtomicBool::new(true),
			parked: AtomicBool::new(false),
			blocked_on: AtomicUsize::new(0),
			parker: Parker::new()
		}
	}

	fn base(&self) -> Priority {
		Priority(self.base.load(Ordering::Relaxed))
	}

	fn effective(&self) -> Priority {
		Priority(self.effective.load(Ordering::Relaxed))
	}

	fn running(&self) -> bool {
		self.on_core.load(Ordering::Relaxed) && !self.parked.load(Ordering::Relaxed)
	}
}

type ThreadRef = Arc<CachePadded<HostThread>>;

lazy_static! {
	static ref THREADS: RwLock<Vec<ThreadRef>> = RwLock::new(Vec::new());
	static ref PROCESSORS: u32 = available_parallelism()
		.map_or(1, NonZeroUsize::get)
		.try_into()
		.unwrap_or(u32::MAX);
	static ref BASE: Instant = Instant::now();
}

struct Local {
	thread: ThreadRef,
	preemption: Cell<u32>
}

impl Local {
	#[allow(clippy::panic)]
	fn register() -> Self {
		let mut threads = THREADS.write().unwrap_or_else(PoisonError::into_inner);
		let Some(id) = u32::try_from(threads.len() + 1)
			.ok()
			.and_then(ThreadId::new)
		else {
			panic!("thread id space exhausted");
		};

		let thread = Arc::new(CachePadded(HostThread::new(id)));

		threads.push(thread.clone());
		drop(threads);

		trace!("== Registered thread {}", id);

		Self { thread, preemption: Cell::new(0) }
	}
}

impl Drop for Local {
	fn drop(&mut self) {
		self.thread.on_core.store(false, Ordering::Relaxed);
	}
}

thread_local! {
	static CURRENT: Local = Local::register();
}

fn with_current<F, R>(func: F) -> R
where
	F: FnOnce(&Local) -> R
{
	CURRENT.with(func)
}

fn current() -> ThreadRef {
	with_current(|local| local.thread.clone())
}

fn lookup(id: ThreadId) -> Option<ThreadRef> {
	let index = usize::try_from(id.get()).ok()?.checked_sub(1)?;

	THREADS
		.read()
		.unwrap_or_else(PoisonError::into_inner)
		.get(index)
		.cloned()
}

/// The host platform. Uninhabited; used only as a type parameter
#[derive(Clone, Copy, Debug)]
pub enum Host {}

impl Scheduler for Host {
	fn current_thread() -> ThreadId {
		with_current(|local| local.thread.id)
	}

	fn cpu_number() -> u32 {
		Self::current_thread().get() % *PROCESSORS
	}

	fn processor_count() -> u32 {
		*PROCESSORS
	}

	fn thread_on_core(thread: ThreadId) -> bool {
		lookup(thread).is_some_and(|thread| thread.running())
	}

	fn disable_preemption() {
		with_current(|local| local.preemption.set(local.preemption.get().saturating_add(1)));
	}

	fn enable_preemption() {
		with_current(|local| {
			let level = local.preemption.get();

			debug_assert!(level > 0, "preemption enabled more times than disabled");

			local.preemption.set(level.saturating_sub(1));
		});
	}

	fn preemption_level() -> u32 {
		with_current(|local| local.preemption.get())
	}

	fn block_current_thread() {
		let thread = current();

		thread.parked.store(true, Ordering::Relaxed);
		thread.parker.park();
		thread.parked.store(false, Ordering::Relaxed);
	}

	fn wake_one(event: Event) -> bool {
		turnstile::wake_event(event, 1) != 0
	}

	fn wake_all(event: Event) -> usize {
		turnstile::wake_event(event, usize::MAX)
	}

	fn thread_priority_boost(thread: ThreadId, priority: Priority) {
		if let Some(thread) = lookup(thread) {
			thread
				.effective
				.store(priority.max(thread.base()).0, Ordering::Relaxed);
		}
	}

	fn thread_priority_clear(thread: ThreadId) {
		if let Some(thread) = lookup(thread) {
			thread.effective.store(thread.base().0, Ordering::Relaxed);
		}
	}
}

impl Clock for Host {
	fn now() -> u64 {
		u64::try_from(BASE.elapsed().as_nanos()).unwrap_or(u64::MAX)
	}

	fn ticks_from(duration: Duration) -> u64 {
		u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
	}
}

impl Turnstiles for Host {
	type Handle = usize;

	fn prepare(key: usize) -> Self::Handle {
		turnstile::prepare(key)
	}

	fn complete(key: usize) {
		turnstile::complete(key);
	}

	fn set_inheritor(turnstile: Self::Handle, inheritor: Option<ThreadId>) {
		turnstile::set_inheritor(turnstile, inheritor);
	}

	fn assert_wait(turnstile: Self::Handle, event: Event) {
		turnstile::assert_wait(turnstile, event);
	}

	fn wakeup_one(turnstile: Self::Handle, event: Event, mode: WakeMode) -> Option<ThreadId> {
		turnstile::wakeup_one(turnstile, event, mode)
	}
}

/// Sets the calling thread's base priority, keeping any inherited boost
pub fn set_base_priority(priority: Priority) {
	let thread = current();

	thread.base.store(priority.0, Ordering::Relaxed);
	turnstile::refresh_priority(thread.id);
}

#[must_use]
pub fn current_priority() -> Priority {
	current().effective()
}

/// The effective priority of `thread`, if it was ever registered
#[must_use]
pub fn thread_priority(thread: ThreadId) -> Option<Priority> {
	lookup(thread).map(|thread| thread.effective())
}

/// Marks the calling thread as descheduled (or back on core) as far as
/// [`Scheduler::thread_on_core`] is concerned
pub fn set_on_core(on_core: bool) {
	current().on_core.store(on_core, Ordering::Relaxed);
}

/// Number of threads parked on the turnstile keyed by `key`
#[must_use]
pub fn parked_waiters(key: usize) -> usize {
	turnstile::waiter_count(key)
}
