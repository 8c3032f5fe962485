#![allow(clippy::module_name_repetitions)]

use std::cell::UnsafeCell;
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use super::*;
use crate::platform::{Clock, Host, Scheduler};

/// Guard for a [`SpinMutex`]. Preemption stays disabled while it lives
pub struct SpinMutexGuard<'a, T: ?Sized, P: Scheduler + Clock = Host> {
	lock: &'a SpinMutex<T, P>,
	owned: PhantomData<*const ()>
}

impl<'a, T: ?Sized, P: Scheduler + Clock> SpinMutexGuard<'a, T, P> {
	const fn new(lock: &'a SpinMutex<T, P>) -> Self {
		Self { lock, owned: PhantomData }
	}
}

impl<T: ?Sized, P: Scheduler + Clock> Deref for SpinMutexGuard<'_, T, P> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		/* Safety: lock held */
		unsafe { &*self.lock.value.get() }
	}
}

impl<T: ?Sized, P: Scheduler + Clock> DerefMut for SpinMutexGuard<'_, T, P> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		/* Safety: lock held */
		unsafe { &mut *self.lock.value.get() }
	}
}

impl<T: ?Sized, P: Scheduler + Clock> Drop for SpinMutexGuard<'_, T, P> {
	fn drop(&mut self) {
		self.lock.lock.unlock();
	}
}

impl<T: ?Sized + Debug, P: Scheduler + Clock> Debug for SpinMutexGuard<'_, T, P> {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		self.deref().fmt(fmt)
	}
}

/* Safety: same as &mut T */
unsafe impl<T: ?Sized + Sync, P: Scheduler + Clock> Sync for SpinMutexGuard<'_, T, P> {}

/// A value protected by an [`LckSpin`]
///
/// The guard records the locking thread as owner, so it must be dropped on
/// the thread that created it.
pub struct SpinMutex<T: ?Sized, P: Scheduler + Clock = Host> {
	lock: LckSpin<P>,
	value: UnsafeCell<T>
}

impl<T: ?Sized, P: Scheduler + Clock> SpinMutex<T, P> {
	pub const fn new(value: T) -> Self
	where
		T: Sized
	{
		Self { lock: LckSpin::new(), value: UnsafeCell::new(value) }
	}

	pub fn lock(&self) -> SpinMutexGuard<'_, T, P> {
		self.lock.lock();

		SpinMutexGuard::new(self)
	}

	pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T, P>> {
		self.lock.try_lock().then(|| SpinMutexGuard::new(self))
	}

	pub fn into_inner(self) -> T
	where
		T: Sized
	{
		self.value.into_inner()
	}

	pub fn get_mut(&mut self) -> &mut T {
		self.value.get_mut()
	}
}

impl<T: Default, P: Scheduler + Clock> Default for SpinMutex<T, P> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

/* Safety: a mutex is send if T is send */
unsafe impl<T: ?Sized + Send, P: Scheduler + Clock> Send for SpinMutex<T, P> {}

/* Safety: a mutex is sync if T is send */
unsafe impl<T: ?Sized + Send, P: Scheduler + Clock> Sync for SpinMutex<T, P> {}
