use std::sync::atomic::AtomicU64;

use enumflags2::{bitflags, BitFlags};

use super::word::FREE;

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockAttr {
	/// Keep the lock word in an extension record and trace contention
	Debug = 1 << 0,

	/// Accepted for compatibility. Statistics are not collected
	Stat  = 1 << 1
}

/// Out-of-line state for a lock whose word is [`TAG_INDIRECT`]
///
/// [`TAG_INDIRECT`]: super::word::TAG_INDIRECT
pub(super) struct Ext {
	pub(super) word: AtomicU64,
	pub(super) attr: BitFlags<LockAttr>,
	pub(super) name: Option<&'static str>
}

impl Ext {
	pub(super) fn new(attr: BitFlags<LockAttr>, name: Option<&'static str>) -> Box<Self> {
		Box::new(Self { word: AtomicU64::new(FREE), attr, name })
	}
}
