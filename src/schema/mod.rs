//! Immutable description of a kit: node tree, containers, fields and overlays.
//!
//! A [`Schema`] is built once and shared through `Arc`. Nothing in it refers
//! to concrete addresses except the kit roots; every other position is an
//! offset relative to the enclosing node or container.

mod container;
mod field;
mod instrument;
mod node;

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

pub use container::{Container, DynamicOverlay};
pub use field::{Condition, Field, FieldKind, FieldValue, MAX_FIELD_BYTES, NumericSpec};
pub use instrument::{
    Bank, Instrument, InstrumentGroup, InstrumentLibrary, InstrumentRef, ResolvedInstrument,
};
pub use node::{Description, DetailSchema, NodeSchema};

use crate::{
    address::{Address, Segment},
    builder::StoreBuilder,
    context::FixedContainer,
    error::{KitError, Result, Target},
    helpers::segment_index,
    store::DataStore,
};

/// Name and version a kit file is tagged with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaIdentifier {
    pub name: String,
    pub version: String,
}

impl SchemaIdentifier {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl core::fmt::Display for SchemaIdentifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// The full description of one device model.
#[derive(Debug, Clone)]
pub struct Schema {
    identifier: SchemaIdentifier,
    kit: Arc<NodeSchema>,
    layout: Vec<(u32, u32)>,
    kit_roots: BTreeMap<u32, Address>,
    instruments: Arc<InstrumentLibrary>,
}

impl Schema {
    /// `layout` lists the `(offset, len)` segments of one kit, relative to its root.
    pub fn new(
        identifier: SchemaIdentifier,
        kit: NodeSchema,
        layout: impl IntoIterator<Item = (u32, u32)>,
        instruments: Arc<InstrumentLibrary>,
    ) -> Self {
        Self {
            identifier,
            kit: Arc::new(kit),
            layout: layout.into_iter().collect(),
            kit_roots: BTreeMap::new(),
            instruments,
        }
    }

    pub fn with_kit_root(mut self, number: u32, root: Address) -> Self {
        self.kit_roots.insert(number, root);
        self
    }

    pub fn identifier(&self) -> &SchemaIdentifier {
        &self.identifier
    }

    pub fn kit(&self) -> &Arc<NodeSchema> {
        &self.kit
    }

    pub fn layout(&self) -> &[(u32, u32)] {
        &self.layout
    }

    pub fn instruments(&self) -> &Arc<InstrumentLibrary> {
        &self.instruments
    }

    pub fn kit_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.kit_roots.keys().copied()
    }

    pub fn kit_root(&self, number: u32) -> Result<Address> {
        self.kit_roots
            .get(&number)
            .copied()
            .ok_or(KitError::UnknownTarget(Target::Kit(number)))
    }

    /// Creates a store for kit `number` holding every field's default.
    pub fn create_kit(&self, number: u32) -> Result<DataStore> {
        let root = self.kit_root(number)?;
        let mut store = StoreBuilder::new()
            .relative_segments(root, self.layout.iter().copied())
            .build()?;
        reset_node(&self.kit, root, &mut store)?;
        store.clear_all_dirty();
        Ok(store)
    }

    /// Checks that the schema is internally consistent.
    ///
    /// Every node validates, the layout is a valid partition, and every field
    /// reachable from the tree, including every overlay variant, lands inside
    /// exactly one segment.
    pub fn validate(&self) -> Result<()> {
        if self.identifier.name.is_empty() {
            return Err(KitError::invariant("schema has no name"));
        }
        self.kit.validate()?;

        let store = StoreBuilder::new()
            .relative_segments(Address::new(0), self.layout.iter().copied())
            .build()?;
        check_node(&self.kit, Address::new(0), store.segments())
    }
}

fn reset_node(node: &NodeSchema, parent: Address, store: &mut DataStore) -> Result<()> {
    let base = parent + node.offset();
    FixedContainer::new(node.container().clone(), base).reset(store)?;
    for detail in node.details() {
        if let DetailSchema::Container {
            offset, container, ..
        } = detail
        {
            FixedContainer::new(container.clone(), base + *offset).reset(store)?;
        }
    }
    node.children()
        .iter()
        .try_for_each(|child| reset_node(child, base, store))
}

fn check_node(node: &NodeSchema, parent: Address, segments: &[Segment]) -> Result<()> {
    let base = parent + node.offset();
    check_container(node.container(), base, segments)?;
    for field in node.description().args().iter().chain(node.midi_note()) {
        check_field(field, base, segments)?;
    }
    for detail in node.details() {
        match detail {
            DetailSchema::Descriptions { items, .. } => {
                for field in items.iter().flat_map(|d| d.args()) {
                    check_field(field, base, segments)?;
                }
            }
            DetailSchema::Container {
                offset, container, ..
            } => check_container(container, base + *offset, segments)?,
        }
    }
    node.children()
        .iter()
        .try_for_each(|child| check_node(child, base, segments))
}

fn check_container(container: &Container, base: Address, segments: &[Segment]) -> Result<()> {
    for field in container.fields() {
        check_field(field, base, segments)?;
    }
    if let Some(overlay) = container.overlay() {
        check_field(overlay.discriminator(), base, segments)?;
        for (_, variant) in overlay.variants() {
            check_container(variant, base + overlay.switch_offset(), segments)?;
        }
    }
    Ok(())
}

fn check_field(field: &Field, base: Address, segments: &[Segment]) -> Result<()> {
    for (offset, len) in field.spans() {
        let addr = base + offset;
        let inside = segment_index(segments, addr).is_some_and(|idx| segments[idx].contains(addr, len));
        if !inside {
            return Err(KitError::invariant(format!(
                "field {} at {addr} is not inside a single segment",
                field.name()
            )));
        }
    }
    Ok(())
}
