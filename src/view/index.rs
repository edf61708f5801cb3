use std::collections::HashMap;

use crate::{
    address::Address,
    view::{GroupId, NodeId},
};

/// Reverse index from segment start to the entities bound to that segment.
///
/// Entries keep insertion order and hold no duplicates. The index is only
/// ever rebuilt wholesale.
#[derive(Debug, Clone)]
pub struct SegmentIndex<T> {
    entries: HashMap<Address, Vec<T>>,
}

impl<T> Default for SegmentIndex<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Copy + PartialEq> SegmentIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, start: Address, item: T) {
        let items = self.entries.entry(start).or_default();
        if !items.contains(&item) {
            items.push(item);
        }
    }

    /// Entities bound to the segment starting at `start`.
    pub fn lookup(&self, start: Address) -> &[T] {
        self.entries.get(&start).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn starts(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries.keys().copied()
    }

    /// Number of indexed segment starts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Segment start to the view nodes whose label reads from it.
pub type TreeIndex = SegmentIndex<NodeId>;

/// Segment start to the detail groups that read from it.
pub type DetailIndex = SegmentIndex<GroupId>;
