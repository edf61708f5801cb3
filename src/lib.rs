//! A schema-driven shadow of a drum module's kit memory.
//!
//! Kit data lives on the device as a sparse set of byte segments. This crate
//! keeps a local image of one kit, decodes it through a declarative schema,
//! and keeps every derived view consistent as the image changes.
//!
//! # Features
//!
//! - **Typed fields** - booleans, enums, ASCII text, nibble-packed numerics
//!   and bank-switched instrument references over 7-bit device bytes
//! - **Dynamic overlays** - containers whose layout depends on a discriminator
//!   field, reset to defaults whenever the discriminator switches
//! - **Segment-level change propagation** - reverse indices route every
//!   notification to exactly the tree labels and detail groups it affects
//! - **Transactional edits** - snapshot on enter, revert on cancel
//! - **Device sync** - rate-limited, cancellable transfer of dirty segments
//!   or whole kits cloned to another slot
//! - **Kit files** - JSON persistence tagged with the schema identity
//!
//! # Architecture
//!
//! Edits flow one way, from the session into the store and back out as
//! segment notifications:
//!
//! ```text
//! ┌──────────────────┐  write   ┌──────────────────┐  send   ┌──────────┐
//! │   KitSession     │─────────▶│    DataStore     │────────▶│  Device  │
//! │                  │          │                  │  dirty  │          │
//! │  ViewTree        │◀─────────│  segments        │ segments│          │
//! │  DetailPage      │ segment  │  dirty bits      │◀────────│          │
//! │  reverse indices │ changed  │  snapshot        │  load   │          │
//! └──────────────────┘          └──────────────────┘         └──────────┘
//! ```
//!
//! - **Session writes** mark the segment dirty and propagate to the labels
//!   and groups indexed under it
//! - **Variant switches** reset the new variant to its defaults, which
//!   propagates in turn, bounded by a reset guard
//! - **Device loads** replace segment bytes without marking them dirty
//! - **Sync** sends dirty segments and clears each bit once sent
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kit_shadow::prelude::*;
//!
//! # fn schema() -> Arc<Schema> { unimplemented!() }
//! let mut session = KitSession::create(schema(), 1).unwrap();
//! let root = session.tree().root();
//! session.select(root).unwrap();
//!
//! session.enter_edit().unwrap();
//! let group = GroupId(1);
//! session.set_row_text(group, 0, "Rock").unwrap();
//! session.commit().unwrap();
//!
//! let label = session.tree().node(root).unwrap().label().to_owned();
//! assert_eq!(label, "Kit: Rock");
//! ```

#![deny(unsafe_code)]

pub mod address;
pub mod builder;
pub mod context;
pub mod edit;
pub mod error;
pub mod helpers;
pub mod overlay;
pub mod persist;
pub mod schema;
pub mod session;
pub mod slice;
pub mod store;
pub mod sync;
pub(crate) mod table;
pub mod view;

#[cfg(test)]
mod test_support;

pub use address::{Address, Segment};
pub use builder::StoreBuilder;
pub use context::{BoundField, FixedContainer};
pub use edit::{EditSession, EditState, Transition};
pub use error::{KitError, Result, Target};
pub use overlay::{ResetGuard, VariantChange, VariantSwitch};
pub use persist::PersistError;
pub use schema::{
    Condition, Container, Description, DetailSchema, DynamicOverlay, Field, FieldKind, FieldValue,
    NodeSchema, NumericSpec, Schema, SchemaIdentifier,
};
pub use session::{KitSession, SessionConfig};
pub use slice::{ROSlice, RWSlice, WOSlice};
pub use store::{DataListener, DataStore, ListenerId, SegmentData};
pub use sync::{
    CancelToken, Delay, DeviceChannel, DeviceSync, StdDelay, SyncConfig, SyncOutcome,
    TransportError,
};
pub use view::{DetailGroup, DetailPage, FieldRow, GroupContent, GroupId, NodeId, ViewTree};

pub mod prelude {
    pub use super::{
        Address, CancelToken, Condition, Container, DataListener, DataStore, Description,
        DetailSchema, DeviceChannel, DeviceSync, DynamicOverlay, EditState, Field, FieldValue,
        FixedContainer, GroupContent, GroupId, KitError, KitSession, NodeId, NodeSchema,
        NumericSpec, Schema, SchemaIdentifier, Segment, StoreBuilder, SyncConfig, SyncOutcome,
    };
}
