use bitmaps::Bitmap;

use crate::{
    address::{Address, Segment},
    error::{KitError, Result, Target},
    helpers::{range_span, segment_index},
};

/// Maximum number of segments a single store can hold.
pub const MAX_SEGMENTS: usize = 1024;

/// Raw byte images of every segment, in segment order.
pub(crate) type Image = Vec<Box<[u8]>>;

/// The segment partition of a store and the bytes behind it.
///
/// Segments are sorted by start address and never overlap; the builder
/// guarantees both before a table is created.
#[derive(Clone)]
pub(crate) struct SegmentTable {
    segments: Vec<Segment>,
    bytes: Image,
    dirty: Bitmap<MAX_SEGMENTS>,
}

impl SegmentTable {
    pub(crate) fn new(segments: Vec<Segment>) -> Self {
        debug_assert!(segments.len() <= MAX_SEGMENTS, "too many segments");
        debug_assert!(
            segments.windows(2).all(|w| w[0].end() <= u64::from(w[1].start().value())),
            "segments must be sorted and disjoint",
        );

        let bytes = segments
            .iter()
            .map(|s| vec![0u8; s.len() as usize].into_boxed_slice())
            .collect();

        Self {
            segments,
            bytes,
            dirty: Bitmap::new(),
        }
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub(crate) fn segment(&self, idx: usize) -> Segment {
        self.segments[idx]
    }

    /// Index of the segment holding all `len` bytes at `addr`.
    pub(crate) fn locate(&self, addr: Address, len: usize) -> Result<usize> {
        segment_index(&self.segments, addr)
            .filter(|&idx| self.segments[idx].contains(addr, len) && len > 0)
            .ok_or(KitError::UnknownTarget(Target::Range { start: addr, len }))
    }

    /// Index of the segment starting exactly at `start`.
    pub(crate) fn index_of_start(&self, start: Address) -> Result<usize> {
        self.segments
            .binary_search_by_key(&start, |s| s.start())
            .map_err(|_| KitError::UnknownTarget(Target::Segment(start)))
    }

    pub(crate) fn with_bytes<F, R>(&self, addr: Address, len: usize, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        let idx = self.locate(addr, len)?;
        let (offset, end) = range_span(&self.segments[idx], addr, len)?;
        Ok(f(&self.bytes[idx][offset..end]))
    }

    pub(crate) fn with_bytes_mut<F, R>(&mut self, addr: Address, len: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let idx = self.locate(addr, len)?;
        let (offset, end) = range_span(&self.segments[idx], addr, len)?;
        Ok(f(&mut self.bytes[idx][offset..end]))
    }

    pub(crate) fn bytes(&self, idx: usize) -> &[u8] {
        &self.bytes[idx]
    }

    pub(crate) fn bytes_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self.bytes[idx]
    }

    pub(crate) fn image(&self) -> Image {
        self.bytes.clone()
    }

    /// Replaces every segment's bytes from `image`, returning the indices that changed.
    pub(crate) fn restore(&mut self, image: Image) -> Vec<usize> {
        debug_assert_eq!(image.len(), self.bytes.len(), "image layout mismatch");
        let changed = self
            .bytes
            .iter()
            .zip(image.iter())
            .enumerate()
            .filter(|(_, (live, saved))| live != saved)
            .map(|(idx, _)| idx)
            .collect();
        self.bytes = image;
        changed
    }

    pub(crate) fn iter_dirty<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Segment, &[u8]) -> Result<()>,
    {
        let mut idx = self.dirty.first_index();
        while let Some(i) = idx {
            f(self.segments[i], &self.bytes[i])?;
            idx = self.dirty.next_index(i);
        }
        Ok(())
    }

    pub(crate) fn is_dirty(&self, idx: usize) -> bool {
        self.dirty.get(idx)
    }

    pub(crate) fn any_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(crate) fn mark_dirty(&mut self, idx: usize) {
        self.dirty.set(idx, true);
    }

    pub(crate) fn clear_dirty(&mut self, idx: usize) {
        self.dirty.set(idx, false);
    }

    pub(crate) fn clear_all_dirty(&mut self) {
        self.dirty = Bitmap::new();
    }
}
