//! Priority-ordered wait queues with inheritance
//!
//! One table maps lock keys to turnstiles. A turnstile exists while someone
//! holds it prepared or a thread is queued on it. Its inheritor's effective
//! priority is the promotion of its base by the best waiter across every
//! turnstile it inherits, and a boosted thread that is itself queued passes
//! the boost on down the chain.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::*;
use crate::debug;
use crate::sync::SpinMutex;

/// Bound on transitive propagation through blocked inheritors
const CHAIN_DEPTH: usize = 16;

pub(super) type Handle = usize;

struct Waiter {
	thread: ThreadId,
	priority: Priority,
	seq: u64
}

#[derive(Default)]
struct Turnstile {
	waitq: Vec<Waiter>,
	inheritor: Option<ThreadId>,
	users: usize
}

impl Turnstile {
	fn best_waiter(&self) -> Option<usize> {
		self.waitq
			.iter()
			.enumerate()
			.min_by_key(|(_, waiter)| (std::cmp::Reverse(waiter.priority), waiter.seq))
			.map(|(index, _)| index)
	}

	fn top_priority(&self) -> Option<Priority> {
		self.waitq.iter().map(|waiter| waiter.priority).max()
	}
}

#[derive(Default)]
struct Table {
	turnstiles: HashMap<usize, Turnstile>,
	seq: u64
}

impl Table {
	fn inherited(&self, thread: ThreadId) -> Option<Priority> {
		self.turnstiles
			.values()
			.filter(|turnstile| turnstile.inheritor == Some(thread))
			.filter_map(Turnstile::top_priority)
			.max()
	}

	/// Recomputes the effective priority of `thread` and of every inheritor
	/// downstream of it
	fn propagate(&mut self, thread: Option<ThreadId>) {
		let mut next = thread;

		for _ in 0..CHAIN_DEPTH {
			let Some(id) = next.take() else { break };
			let Some(record) = lookup(id) else { break };

			let effective = match self.inherited(id) {
				Some(waiter) => record.base().promoted_by(waiter),
				None => record.base()
			};

			if effective == record.base() {
				Host::thread_priority_clear(id);
			} else {
				Host::thread_priority_boost(id, effective);
			}

			let key = record.blocked_on.load(Ordering::Relaxed);
			let Some(turnstile) = self.turnstiles.get_mut(&key) else { break };

			let mut changed = false;

			for waiter in &mut turnstile.waitq {
				if waiter.thread == id && waiter.priority != effective {
					waiter.priority = effective;
					changed = true;
				}
			}

			if changed {
				next = turnstile.inheritor;
			}
		}
	}

	fn dissolve_if_idle(&mut self, key: usize) {
		let idle = self
			.turnstiles
			.get(&key)
			.is_some_and(|turnstile| turnstile.users == 0 && turnstile.waitq.is_empty());

		if !idle {
			return;
		}

		if let Some(turnstile) = self.turnstiles.remove(&key) {
			debug!("== Turnstile {:#x} dissolved", key);

			self.propagate(turnstile.inheritor);
		}
	}

	fn dequeue(&mut self, key: usize, mode: WakeMode) -> Option<ThreadId> {
		let turnstile = self.turnstiles.get_mut(&key)?;
		let index = turnstile.best_waiter()?;
		let waiter = turnstile.waitq.remove(index);
		let previous = match mode {
			WakeMode::PromoteOnWake => turnstile.inheritor.replace(waiter.thread),
			WakeMode::AllPriorities => None
		};

		if let Some(record) = lookup(waiter.thread) {
			record.blocked_on.store(0, Ordering::Relaxed);
		}

		self.propagate(previous);
		self.propagate(Some(waiter.thread));

		if let Some(inheritor) = self.turnstiles.get(&key).and_then(|t| t.inheritor) {
			self.propagate(Some(inheritor));
		}

		self.dissolve_if_idle(key);

		Some(waiter.thread)
	}
}

lazy_static! {
	static ref TABLE: SpinMutex<Table, Host> = SpinMutex::new(Table::default());
}

fn unpark(thread: ThreadId) {
	if let Some(record) = lookup(thread) {
		record.parker.unpark();
	}
}

pub(super) fn prepare(key: usize) -> Handle {
	let mut table = TABLE.lock();
	let turnstile = table.turnstiles.entry(key).or_default();

	turnstile.users += 1;

	if turnstile.users == 1 && turnstile.waitq.is_empty() {
		debug!("== Turnstile {:#x} prepared", key);
	}

	key
}

pub(super) fn complete(key: usize) {
	let mut table = TABLE.lock();

	if let Some(turnstile) = table.turnstiles.get_mut(&key) {
		turnstile.users = turnstile.users.saturating_sub(1);
	}

	table.dissolve_if_idle(key);
}

pub(super) fn set_inheritor(key: Handle, inheritor: Option<ThreadId>) {
	let mut table = TABLE.lock();
	let Some(turnstile) = table.turnstiles.get_mut(&key) else { return };
	let previous = std::mem::replace(&mut turnstile.inheritor, inheritor);

	if previous != inheritor {
		table.propagate(previous);
	}

	table.propagate(inheritor);
}

pub(super) fn assert_wait(key: Handle, event: Event) {
	debug_assert_eq!(event.key(), key);

	let thread = current();
	let mut table = TABLE.lock();

	table.seq += 1;

	let seq = table.seq;
	let turnstile = table.turnstiles.entry(key).or_default();

	turnstile
		.waitq
		.push(Waiter { thread: thread.id, priority: thread.effective(), seq });
	thread.blocked_on.store(key, Ordering::Relaxed);

	let inheritor = turnstile.inheritor;

	table.propagate(inheritor);
}

pub(super) fn wakeup_one(key: Handle, event: Event, mode: WakeMode) -> Option<ThreadId> {
	debug_assert_eq!(event.key(), key);

	let woken = TABLE.lock().dequeue(key, mode);

	if let Some(thread) = woken {
		unpark(thread);
	}

	woken
}

/// Wakes up to `count` threads queued on `event` without touching the
/// inheritor
pub(super) fn wake_event(event: Event, count: usize) -> usize {
	let mut woken = Vec::new();
	let mut table = TABLE.lock();

	while woken.len() < count {
		let Some(thread) = table.dequeue(event.key(), WakeMode::AllPriorities) else { break };

		woken.push(thread);
	}

	drop(table);

	for &thread in &woken {
		unpark(thread);
	}

	woken.len()
}

pub(super) fn refresh_priority(thread: ThreadId) {
	TABLE.lock().propagate(Some(thread));
}

pub(super) fn waiter_count(key: usize) -> usize {
	TABLE
		.lock()
		.turnstiles
		.get(&key)
		.map_or(0, |turnstile| turnstile.waitq.len())
}
