//! Address-bound view state derived from a schema and a store.
//!
//! The [`ViewTree`] instantiates the node schema at a kit root; a
//! [`DetailPage`] binds the details of one selected node. Each comes with a
//! reverse index from segment start to the entities that depend on that
//! segment, so a change notification reaches exactly those entities.

mod detail;
mod index;
mod tree;

pub use detail::{DetailGroup, DetailPage, FieldRow, GroupContent, GroupId, OverlaySite};
pub use index::{DetailIndex, SegmentIndex, TreeIndex};
pub use tree::{NodeId, ViewNode, ViewTree};
