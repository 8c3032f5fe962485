#![allow(clippy::module_name_repetitions)]

use std::cell::UnsafeCell;
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use super::*;

/// Guard for a [`Mutex`]. Must be dropped on the thread that locked
pub struct MutexGuard<'a, T: ?Sized, P: Platform = Host> {
	mutex: &'a Mutex<T, P>,
	owned: PhantomData<*const ()>
}

impl<'a, T: ?Sized, P: Platform> MutexGuard<'a, T, P> {
	const fn new(mutex: &'a Mutex<T, P>) -> Self {
		Self { mutex, owned: PhantomData }
	}

	/// Upgrades a spin-mode hold to a mutex hold, re-enabling preemption
	pub fn convert_to_mutex(&self) {
		self.mutex.lock.convert_to_mutex();
	}
}

impl<T: ?Sized, P: Platform> Deref for MutexGuard<'_, T, P> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		/* Safety: lock held */
		unsafe { &*self.mutex.value.get() }
	}
}

impl<T: ?Sized, P: Platform> DerefMut for MutexGuard<'_, T, P> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		/* Safety: lock held */
		unsafe { &mut *self.mutex.value.get() }
	}
}

impl<T: ?Sized, P: Platform> Drop for MutexGuard<'_, T, P> {
	fn drop(&mut self) {
		self.mutex.lock.unlock();
	}
}

impl<T: ?Sized + Debug, P: Platform> Debug for MutexGuard<'_, T, P> {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		self.deref().fmt(fmt)
	}
}

/* Safety: same as &mut T */
unsafe impl<T: ?Sized + Sync, P: Platform> Sync for MutexGuard<'_, T, P> {}

/// A value protected by an [`LckMtx`]
pub struct Mutex<T: ?Sized, P: Platform = Host> {
	lock: LckMtx<P>,
	value: UnsafeCell<T>
}

impl<T: ?Sized, P: Platform> Mutex<T, P> {
	pub const fn new(value: T) -> Self
	where
		T: Sized
	{
		Self { lock: LckMtx::new(), value: UnsafeCell::new(value) }
	}

	pub fn named(name: &'static str, value: T) -> Self
	where
		T: Sized
	{
		Self {
			lock: LckMtx::named(name, LockAttr::Debug),
			value: UnsafeCell::new(value)
		}
	}

	pub fn lock(&self) -> MutexGuard<'_, T, P> {
		self.lock.lock();

		MutexGuard::new(self)
	}

	pub fn try_lock(&self) -> Option<MutexGuard<'_, T, P>> {
		self.lock.try_lock().then(|| MutexGuard::new(self))
	}

	pub fn try_lock_for(&self, timeout: Duration) -> Option<MutexGuard<'_, T, P>> {
		self.lock.try_lock_for(timeout).then(|| MutexGuard::new(self))
	}

	/// Locks in spin mode. Keep the critical section short, or call
	/// [`MutexGuard::convert_to_mutex`] before doing anything that may block
	pub fn lock_spin(&self) -> MutexGuard<'_, T, P> {
		self.lock.lock_spin();

		MutexGuard::new(self)
	}

	#[must_use]
	pub const fn raw(&self) -> &LckMtx<P> {
		&self.lock
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

impl<T: Default, P: Platform> Default for Mutex<T, P> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

impl<T: ?Sized, P: Platform> Debug for Mutex<T, P> {
	fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
		fmt.debug_struct("Mutex").field("lock", &self.lock).finish_non_exhaustive()
	}
}

/* Safety: a mutex is send if T is send */
unsafe impl<T: ?Sized + Send, P: Platform> Send for Mutex<T, P> {}

/* Safety: a mutex is sync if T is send */
unsafe impl<T: ?Sized + Send, P: Platform> Sync for Mutex<T, P> {}
