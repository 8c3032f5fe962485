pub mod backoff;
pub mod cache_padded;
pub mod spin_lock;
pub mod spin_mutex;

#[doc(inline)]
pub use backoff::*;
#[doc(inline)]
pub use cache_padded::*;
#[doc(inline)]
pub use spin_lock::*;
#[doc(inline)]
pub use spin_mutex::{SpinMutex, SpinMutexGuard};
