//! An adaptive kernel mutex
//!
//! [`mutex::LckMtx`] spins while its owner runs and blocks on a priority
//! inheriting turnstile otherwise. [`sync::LckSpin`] is the pure spin flavor.
//! Both run against the collaborator traits in [`platform`], implemented for
//! std threads by [`platform::Host`].

pub mod config;
pub mod error;
pub mod log;
pub mod mutex;
pub mod opt;
pub mod platform;
pub mod sync;

#[cfg(test)]
mod test;

pub use mutex::{LckMtx, LockAttr, Mutex, MutexGuard};
pub use sync::{LckSpin, SpinMutex, SpinMutexGuard};
