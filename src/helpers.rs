//! Utility functions for address and segment calculations.

use crate::{
    address::{Address, Segment},
    error::{KitError, Result, Target},
};

/// Calculates the byte offset range of `len` bytes at `addr` inside `segment`.
///
/// Returns `(start_offset, end_offset)` where end is exclusive.
///
/// # Errors
/// * [`KitError::UnknownTarget`] - if `len` is 0 or the range leaves the segment
///
/// # Example
/// ```
/// use kit_shadow::{Address, Segment, helpers::range_span};
///
/// let segment = Segment::new(Address::new(0x100), 16);
/// assert_eq!(range_span(&segment, Address::new(0x104), 4).unwrap(), (4, 8));
/// assert!(range_span(&segment, Address::new(0x10E), 4).is_err());
/// ```
pub fn range_span(segment: &Segment, addr: Address, len: usize) -> Result<(usize, usize)> {
    if len == 0 || !segment.contains(addr, len) {
        return Err(KitError::UnknownTarget(Target::Range { start: addr, len }));
    }

    let offset = (addr.value() - segment.start().value()) as usize;
    Ok((offset, offset + len))
}

/// Returns the index of the segment holding `addr` in a list sorted by start.
pub fn segment_index(segments: &[Segment], addr: Address) -> Option<usize> {
    let idx = segments.partition_point(|s| s.start() <= addr).checked_sub(1)?;
    segments[idx].contains(addr, 1).then_some(idx)
}
