//! Addresses and segments of the device memory image.

use core::{fmt, ops::Add};

use serde::{Deserialize, Serialize};

/// A byte location in device memory.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Address(u32);

impl Address {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Signed distance from `origin` to `self`.
    pub fn delta_from(self, origin: Address) -> i64 {
        i64::from(self.0) - i64::from(origin.0)
    }

    /// Shifts the address by a signed delta, or `None` if it leaves the `u32` range.
    pub fn shifted(self, delta: i64) -> Option<Address> {
        let shifted = i64::from(self.0).checked_add(delta)?;
        u32::try_from(shifted).ok().map(Address)
    }
}

impl Add<u32> for Address {
    type Output = Address;

    fn add(self, offset: u32) -> Address {
        Address(self.0 + offset)
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Address(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06x}", self.0)
    }
}

/// A contiguous, half-open byte range owned by the data store.
///
/// Segments partition the store and are the unit of change notification,
/// dirty tracking and device transmission. They are identified by `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    start: Address,
    len: u32,
}

impl Segment {
    pub const fn new(start: Address, len: u32) -> Self {
        Self { start, len }
    }

    pub const fn start(&self) -> Address {
        self.start
    }

    pub const fn len(&self) -> u32 {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First address past the segment.
    pub fn end(&self) -> u64 {
        u64::from(self.start.value()) + u64::from(self.len)
    }

    /// Returns true if `len` bytes at `addr` lie entirely inside the segment.
    pub fn contains(&self, addr: Address, len: usize) -> bool {
        addr >= self.start && u64::from(addr.value()) + len as u64 <= self.end()
    }

    pub fn overlaps(&self, other: &Segment) -> bool {
        u64::from(self.start.value()) < other.end() && u64::from(other.start.value()) < self.end()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.start, self.len)
    }
}
