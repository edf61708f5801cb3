//! The live byte image of a kit and its change notifications.

use core::fmt;
use std::rc::{Rc, Weak};

use crate::{
    address::{Address, Segment},
    builder::StoreBuilder,
    context::FixedContainer,
    error::{KitError, Result, Target},
    schema::{Field, FieldValue},
    slice::{MAX_DATA_BYTE, ROSlice, RWSlice},
    table::{Image, SegmentTable},
};

/// Receives a notification for every committed mutation of a store.
pub trait DataListener {
    fn data_changed(&self, segment: Segment);
}

/// Handle returned by [`DataStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// One segment together with its current bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentData<'a> {
    segment: Segment,
    bytes: &'a [u8],
}

impl<'a> SegmentData<'a> {
    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn start(&self) -> Address {
        self.segment.start()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Byte image of a kit, partitioned into segments.
///
/// Every mutation is attributed to exactly one segment. Writes through
/// [`write`](Self::write) mark that segment dirty and notify listeners;
/// device-originated data loaded with [`load_segment`](Self::load_segment)
/// notifies without marking dirty.
pub struct DataStore {
    table: SegmentTable,
    snapshot: Option<Image>,
    listeners: Vec<(ListenerId, Weak<dyn DataListener>)>,
    next_listener: u64,
}

impl DataStore {
    pub(crate) fn from_table(table: SegmentTable) -> Self {
        Self {
            table,
            snapshot: None,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        self.table.segments()
    }

    /// Every segment with its bytes, in address order.
    pub fn get_segments(&self) -> Vec<SegmentData<'_>> {
        self.table
            .segments()
            .iter()
            .enumerate()
            .map(|(idx, &segment)| SegmentData {
                segment,
                bytes: self.table.bytes(idx),
            })
            .collect()
    }

    /// The segment containing `addr`.
    pub fn segment_of(&self, addr: Address) -> Result<Segment> {
        self.table.locate(addr, 1).map(|idx| self.table.segment(idx))
    }

    pub fn segment_bytes(&self, start: Address) -> Result<&[u8]> {
        self.table
            .index_of_start(start)
            .map(|idx| self.table.bytes(idx))
    }

    /// Runs `f` over `len` bytes at `addr`, which must lie in one segment.
    pub fn with_ro_slice<F, R>(&self, addr: Address, len: usize, f: F) -> Result<R>
    where
        F: FnOnce(ROSlice<'_>) -> R,
    {
        self.table.with_bytes(addr, len, |bytes| f(ROSlice::new(bytes)))
    }

    pub fn read(&self, context: &FixedContainer, field: &Field) -> Result<FieldValue> {
        field.read_at(context.base(), self)
    }

    /// Validates and encodes `value`, then marks and reports the owning segment.
    ///
    /// Nothing is written unless the value passes validation and every byte it
    /// encodes to lies in the same segment. Writing identical bytes still
    /// notifies.
    pub fn write(
        &mut self,
        context: &FixedContainer,
        field: &Field,
        value: &FieldValue,
    ) -> Result<Segment> {
        let base = context.base();
        let patches = field.encode(value)?;

        let mut owner = None;
        for patch in &patches {
            let idx = self.table.locate(base + patch.offset, patch.bytes.len())?;
            match owner {
                None => owner = Some(idx),
                Some(prev) if prev != idx => {
                    return Err(KitError::UnknownTarget(Target::Range {
                        start: base + field.offset(),
                        len: field.byte_len(),
                    }));
                }
                Some(_) => {}
            }
        }
        let idx = owner.ok_or_else(|| KitError::invariant("field encoded to no bytes"))?;

        for patch in &patches {
            self.table
                .with_bytes_mut(base + patch.offset, patch.bytes.len(), |bytes| {
                    RWSlice::new(bytes).copy_from_slice(&patch.bytes)
                })?;
        }
        self.table.mark_dirty(idx);

        let segment = self.table.segment(idx);
        self.notify(segment);
        Ok(segment)
    }

    /// Parses `text` for `field` and writes the result.
    pub fn set_text(&mut self, context: &FixedContainer, field: &Field, text: &str) -> Result<Segment> {
        let value = field.parse(text)?;
        self.write(context, field, &value)
    }

    /// Replaces a whole segment with data received from the device.
    ///
    /// The segment is not marked dirty. Bytes above [`MAX_DATA_BYTE`] are a
    /// validation error and leave the segment unchanged.
    pub fn load_segment(&mut self, start: Address, bytes: &[u8]) -> Result<Segment> {
        let idx = self.table.index_of_start(start)?;
        let segment = self.table.segment(idx);
        if bytes.len() != segment.len() as usize {
            return Err(KitError::UnknownTarget(Target::Range {
                start,
                len: bytes.len(),
            }));
        }
        if let Some(pos) = bytes.iter().position(|b| *b > MAX_DATA_BYTE) {
            return Err(KitError::validation(
                &format!("segment at {start}"),
                format!("byte {:#04x} at offset {pos} exceeds {MAX_DATA_BYTE:#04x}", bytes[pos]),
            ));
        }
        RWSlice::new(self.table.bytes_mut(idx)).copy_from_slice(bytes);
        self.notify(segment);
        Ok(segment)
    }

    /// Copies the image aside and enters transactional mode.
    pub fn snapshot(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(KitError::invariant("a snapshot is already open"));
        }
        self.snapshot = Some(self.table.image());
        Ok(())
    }

    /// Keeps the live image and drops the aside copy.
    pub fn commit_snapshot(&mut self) -> Result<()> {
        self.snapshot
            .take()
            .map(drop)
            .ok_or_else(|| KitError::invariant("no snapshot to commit"))
    }

    /// Restores the aside copy and reports every segment whose bytes differed.
    ///
    /// Restored segments are marked dirty, since the device may hold the
    /// discarded bytes.
    pub fn revert_snapshot(&mut self) -> Result<Vec<Segment>> {
        let image = self
            .snapshot
            .take()
            .ok_or_else(|| KitError::invariant("no snapshot to revert"))?;

        let changed: Vec<Segment> = self
            .table
            .restore(image)
            .into_iter()
            .map(|idx| {
                self.table.mark_dirty(idx);
                self.table.segment(idx)
            })
            .collect();

        for &segment in &changed {
            self.notify(segment);
        }
        Ok(changed)
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Registers `listener`; the store holds only a weak reference.
    pub fn subscribe<L: DataListener + 'static>(&mut self, listener: &Rc<L>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        let weak: Weak<L> = Rc::downgrade(listener);
        self.listeners.push((id, weak));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .iter()
            .filter(|(_, l)| l.strong_count() > 0)
            .count()
    }

    fn notify(&mut self, segment: Segment) {
        self.listeners.retain(|(_, l)| l.strong_count() > 0);
        for (_, listener) in &self.listeners {
            if let Some(listener) = listener.upgrade() {
                listener.data_changed(segment);
            }
        }
    }

    /// Calls `f` for every dirty segment in address order, stopping at the first error.
    pub fn iter_dirty<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(Segment, &[u8]) -> Result<()>,
    {
        self.table.iter_dirty(f)
    }

    pub fn dirty_segments(&self) -> Vec<Segment> {
        let mut dirty = Vec::new();
        // The closure never fails.
        let _ = self.table.iter_dirty(|segment, _| {
            dirty.push(segment);
            Ok(())
        });
        dirty
    }

    pub fn is_dirty(&self, start: Address) -> Result<bool> {
        self.table
            .index_of_start(start)
            .map(|idx| self.table.is_dirty(idx))
    }

    pub fn any_dirty(&self) -> bool {
        self.table.any_dirty()
    }

    pub fn clear_dirty(&mut self, start: Address) -> Result<()> {
        let idx = self.table.index_of_start(start)?;
        self.table.clear_dirty(idx);
        Ok(())
    }

    pub fn clear_all_dirty(&mut self) {
        self.table.clear_all_dirty();
    }

    /// Copies every segment inside `[start, start + size)` into a new store,
    /// shifted so that `start` lands on `new_base`.
    ///
    /// A segment straddling either boundary is an [`KitError::UnknownTarget`].
    pub fn clone_range(&self, start: Address, size: u32, new_base: Address) -> Result<DataStore> {
        let begin = u64::from(start.value());
        let end = begin + u64::from(size);
        let delta = new_base.delta_from(start);

        let mut layout = Vec::new();
        let mut images = Vec::new();
        for (idx, segment) in self.table.segments().iter().enumerate() {
            let seg_start = u64::from(segment.start().value());
            if segment.end() <= begin || seg_start >= end {
                continue;
            }
            if seg_start < begin || segment.end() > end {
                return Err(KitError::UnknownTarget(Target::Segment(segment.start())));
            }
            let shifted = segment
                .start()
                .shifted(delta)
                .ok_or(KitError::UnknownTarget(Target::Range {
                    start: new_base,
                    len: size as usize,
                }))?;
            layout.push(Segment::new(shifted, segment.len()));
            images.push(self.table.bytes(idx));
        }

        let mut clone = StoreBuilder::new().segments(layout).build()?;
        // Shifting preserves order, so clone indices follow `images`.
        for (idx, bytes) in images.into_iter().enumerate() {
            RWSlice::new(clone.table.bytes_mut(idx)).copy_from_slice(bytes);
        }
        Ok(clone)
    }
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("segments", &self.table.segments().len())
            .field("in_transaction", &self.in_transaction())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::{
        schema::{Container, NumericSpec},
        test_support::*,
    };

    // Three 4-byte segments, two 1-byte numeric fields in each
    fn block() -> (DataStore, FixedContainer) {
        let store = StoreBuilder::new()
            .relative_segments(Address::new(0x100), [(0, 4), (4, 4), (8, 4)])
            .build()
            .unwrap();
        let container = (0..6).fold(Container::new("Block", 12), |c, i| {
            c.with_field(Field::numeric(
                format!("Value {i}"),
                i * 2,
                NumericSpec::new(1, 0, 127),
            ))
        });
        let context = FixedContainer::new(Arc::new(container), Address::new(0x100));
        (store, context)
    }

    fn write_numeric(store: &mut DataStore, context: &FixedContainer, idx: usize, v: i32) -> Segment {
        let field = &context.container().fields()[idx];
        store.write(context, field, &FieldValue::Numeric(v)).unwrap()
    }

    #[test]
    fn write_marks_dirty_and_notifies_owner_segment() {
        let (mut store, context) = block();
        let listener = Rc::new(RecordingListener::default());
        store.subscribe(&listener);

        let segment = write_numeric(&mut store, &context, 3, 42);
        assert_eq!(segment.start(), Address::new(0x104));
        assert!(store.is_dirty(Address::new(0x104)).unwrap());
        assert!(!store.is_dirty(Address::new(0x100)).unwrap());
        assert_eq!(listener.take(), vec![segment]);

        // Identical bytes still count as a write.
        write_numeric(&mut store, &context, 3, 42);
        assert_eq!(listener.take(), vec![segment]);
    }

    #[test]
    fn rejected_write_leaves_bytes_and_listeners_untouched() {
        let (mut store, context) = block();
        let listener = Rc::new(RecordingListener::default());
        store.subscribe(&listener);

        let field = &context.container().fields()[0];
        let err = store
            .write(&context, field, &FieldValue::Numeric(128))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.segment_bytes(Address::new(0x100)).unwrap(), &[0; 4]);
        assert!(listener.take().is_empty());
        assert!(!store.any_dirty());
    }

    #[test]
    fn write_spanning_segments_is_unknown_target() {
        let (mut store, _) = block();
        let context = FixedContainer::new(Arc::new(Container::new("Shifted", 8)), Address::new(0x102));
        let name = Field::text("Name", 0, 4);
        let err = store
            .write(&context, &name, &FieldValue::Text("Oops".into()))
            .unwrap_err();
        assert!(matches!(err, KitError::UnknownTarget(Target::Range { .. })));
    }

    #[test]
    fn set_text_parses_then_writes() {
        let (mut store, context) = block();
        let field = &context.container().fields()[1];
        store.set_text(&context, field, "17").unwrap();
        assert_eq!(store.read(&context, field).unwrap(), FieldValue::Numeric(17));
        assert!(store.set_text(&context, field, "lots").unwrap_err().is_validation());
    }

    #[test]
    fn snapshot_transitions() {
        let (mut store, _) = block();
        assert!(store.commit_snapshot().is_err());
        assert!(store.revert_snapshot().is_err());

        store.snapshot().unwrap();
        assert!(store.in_transaction());
        assert!(matches!(
            store.snapshot(),
            Err(KitError::InvariantViolation(_))
        ));
        store.commit_snapshot().unwrap();
        assert!(!store.in_transaction());
    }

    #[test]
    fn commit_keeps_edits_without_events() {
        let (mut store, context) = block();
        let listener = Rc::new(RecordingListener::default());
        store.subscribe(&listener);

        store.snapshot().unwrap();
        write_numeric(&mut store, &context, 5, 9);
        listener.take();
        store.commit_snapshot().unwrap();

        assert!(listener.take().is_empty());
        let field = &context.container().fields()[5];
        assert_eq!(store.read(&context, field).unwrap(), FieldValue::Numeric(9));
    }

    #[test]
    fn load_segment_notifies_without_dirty() {
        let (mut store, _) = block();
        let listener = Rc::new(RecordingListener::default());
        store.subscribe(&listener);

        let segment = store.load_segment(Address::new(0x108), &[1, 2, 3, 4]).unwrap();
        assert_eq!(listener.take(), vec![segment]);
        assert!(!store.any_dirty());
        assert_eq!(store.segment_bytes(Address::new(0x108)).unwrap(), &[1, 2, 3, 4]);

        assert!(store.load_segment(Address::new(0x108), &[1, 2]).is_err());
        assert!(store.load_segment(Address::new(0x109), &[1, 2, 3, 4]).is_err());

        let err = store.load_segment(Address::new(0x108), &[5, 0x80, 6, 7]).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.segment_bytes(Address::new(0x108)).unwrap(), &[1, 2, 3, 4]);
        assert!(listener.take().is_empty());
    }

    #[test]
    fn dropped_listener_is_pruned() {
        let (mut store, context) = block();
        let kept = Rc::new(RecordingListener::default());
        let dropped = Rc::new(RecordingListener::default());
        store.subscribe(&kept);
        let id = store.subscribe(&dropped);
        assert_eq!(store.listener_count(), 2);

        drop(dropped);
        write_numeric(&mut store, &context, 0, 1);
        assert_eq!(store.listener_count(), 1);
        assert_eq!(kept.take().len(), 1);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let (mut store, context) = block();
        let listener = Rc::new(RecordingListener::default());
        let id = store.subscribe(&listener);
        assert!(store.unsubscribe(id));

        write_numeric(&mut store, &context, 0, 1);
        assert!(listener.take().is_empty());
    }

    #[test]
    fn dirty_api() {
        let (mut store, context) = block();
        write_numeric(&mut store, &context, 0, 1);
        write_numeric(&mut store, &context, 5, 1);
        assert_eq!(
            store
                .dirty_segments()
                .iter()
                .map(|s| s.start().value())
                .collect::<Vec<_>>(),
            vec![0x100, 0x108]
        );

        store.clear_dirty(Address::new(0x100)).unwrap();
        assert_eq!(store.dirty_segments().len(), 1);
        assert!(store.clear_dirty(Address::new(0x101)).is_err());
        store.clear_all_dirty();
        assert!(!store.any_dirty());
    }

    #[test]
    fn clone_range_shifts_segments() {
        let (mut store, context) = block();
        write_numeric(&mut store, &context, 2, 0x33);

        let clone = store
            .clone_range(Address::new(0x104), 8, Address::new(0x504))
            .unwrap();
        let segments = clone.get_segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start(), Address::new(0x504));
        assert_eq!(segments[0].bytes(), &[0x33, 0, 0, 0]);
        assert_eq!(segments[1].start(), Address::new(0x508));
        assert!(!clone.any_dirty());

        // 0x102..0x10a cuts through the first and last segments.
        assert!(matches!(
            store.clone_range(Address::new(0x102), 8, Address::new(0)),
            Err(KitError::UnknownTarget(Target::Segment(_)))
        ));
    }

    proptest! {
        #[test]
        fn revert_restores_image_and_reports_differences(
            before in prop::collection::vec((0usize..6, 0i32..=127), 0..12),
            during in prop::collection::vec((0usize..6, 0i32..=127), 0..12),
        ) {
            let (mut store, context) = block();
            for (idx, v) in before {
                write_numeric(&mut store, &context, idx, v);
            }
            let saved: Vec<Vec<u8>> = store.get_segments().iter().map(|s| s.bytes().to_vec()).collect();

            store.snapshot().unwrap();
            for (idx, v) in during {
                write_numeric(&mut store, &context, idx, v);
            }
            let edited: Vec<Vec<u8>> = store.get_segments().iter().map(|s| s.bytes().to_vec()).collect();

            let listener = Rc::new(RecordingListener::default());
            store.subscribe(&listener);
            let reverted = store.revert_snapshot().unwrap();

            let restored: Vec<Vec<u8>> = store.get_segments().iter().map(|s| s.bytes().to_vec()).collect();
            prop_assert_eq!(&restored, &saved);

            let expected: Vec<Segment> = store
                .segments()
                .iter()
                .zip(saved.iter().zip(edited.iter()))
                .filter(|(_, (a, b))| a != b)
                .map(|(s, _)| *s)
                .collect();
            prop_assert_eq!(&reverted, &expected);
            prop_assert_eq!(listener.take(), expected);
        }

        #[test]
        fn read_after_write_returns_value(idx in 0usize..6, v in 0i32..=127) {
            let (mut store, context) = block();
            write_numeric(&mut store, &context, idx, v);
            let field = &context.container().fields()[idx];
            prop_assert_eq!(store.read(&context, field).unwrap(), FieldValue::Numeric(v));
        }

        #[test]
        fn text_read_after_write(text in "[ -~]{0,8}") {
            let context = FixedContainer::new(Arc::new(Container::new("Name", 8)), Address::new(0x104));
            let name = Field::text("Name", 0, 8);
            let mut store = StoreBuilder::new()
                .segment(Address::new(0x104), 8)
                .build()
                .unwrap();
            let before = store.segment_bytes(Address::new(0x104)).unwrap().to_vec();
            match store.write(&context, &name, &FieldValue::Text(text.clone())) {
                Ok(_) => {
                    prop_assert_eq!(store.read(&context, &name).unwrap(), FieldValue::Text(text));
                }
                Err(err) => {
                    prop_assert!(err.is_validation());
                    prop_assert!(text.ends_with(' '));
                    prop_assert_eq!(store.segment_bytes(Address::new(0x104)).unwrap(), &before[..]);
                }
            }
        }
    }
}
