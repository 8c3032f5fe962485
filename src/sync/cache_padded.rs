use std::ops::{Deref, DerefMut};

/// Keeps `T` on its own cache line so a hot lock word or thread record does
/// not false-share with its neighbours
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Debug, Default)]
#[repr(align(128))]
pub struct CachePadded<T>(pub T);

impl<T> Deref for CachePadded<T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.0
	}
}

impl<T> DerefMut for CachePadded<T> {
	fn deref_mut(&mut self) -> &mut T {
		&mut self.0
	}
}
