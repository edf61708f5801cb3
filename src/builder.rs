use crate::{
    address::{Address, Segment},
    error::{KitError, Result},
    store::DataStore,
    table::{MAX_SEGMENTS, SegmentTable},
};

/// One past the highest addressable byte.
const ADDRESS_SPACE: u64 = 1 << 32;

/// Builds a [`DataStore`] from a segment layout.
///
/// Segments may be added in any order; `build` sorts them and rejects
/// zero-length or overlapping segments and layouts larger than
/// [`MAX_SEGMENTS`].
///
/// ```
/// use kit_shadow::{Address, StoreBuilder};
///
/// let store = StoreBuilder::new()
///     .segment(Address::new(0x000), 0x10)
///     .segment(Address::new(0x010), 0x04)
///     .build()
///     .unwrap();
/// assert_eq!(store.get_segments().len(), 2);
/// ```
#[derive(Debug, Default, Clone)]
pub struct StoreBuilder {
    segments: Vec<Segment>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one segment of `len` bytes at `start`.
    pub fn segment(mut self, start: Address, len: u32) -> Self {
        self.segments.push(Segment::new(start, len));
        self
    }

    /// Adds every segment of `layout`.
    pub fn segments(mut self, layout: impl IntoIterator<Item = Segment>) -> Self {
        self.segments.extend(layout);
        self
    }

    /// Adds `layout` with every start shifted from relative offsets to `base`.
    pub fn relative_segments(
        mut self,
        base: Address,
        layout: impl IntoIterator<Item = (u32, u32)>,
    ) -> Self {
        self.segments
            .extend(layout.into_iter().map(|(offset, len)| Segment::new(base + offset, len)));
        self
    }

    pub fn build(mut self) -> Result<DataStore> {
        if self.segments.len() > MAX_SEGMENTS {
            return Err(KitError::invariant(format!(
                "{} segments exceed the maximum of {}",
                self.segments.len(),
                MAX_SEGMENTS
            )));
        }

        self.segments.sort_by_key(|s| s.start());

        if let Some(empty) = self.segments.iter().find(|s| s.is_empty()) {
            return Err(KitError::invariant(format!(
                "segment at {} has zero length",
                empty.start()
            )));
        }

        if let Some(wide) = self.segments.iter().find(|s| s.end() > ADDRESS_SPACE) {
            return Err(KitError::invariant(format!(
                "segment {wide} runs past the end of the address space"
            )));
        }

        if let Some(pair) = self.segments.windows(2).find(|w| w[0].overlaps(&w[1])) {
            return Err(KitError::invariant(format!(
                "segments {} and {} overlap",
                pair[0], pair[1]
            )));
        }

        Ok(DataStore::from_table(SegmentTable::new(self.segments)))
    }
}
