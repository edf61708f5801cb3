//! The single owner of a kit's live state.
//!
//! A [`KitSession`] holds the store, the view tree, the open detail page and
//! both reverse indices. Every mutation goes through it so that the changed
//! segment can be propagated synchronously: labels are refreshed, detail
//! groups re-read, and overlay switches reset and rebuilt.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    address::{Address, Segment},
    context::{BoundField, FixedContainer},
    edit::{EditSession, EditState, Transition},
    error::{KitError, Result, Target},
    overlay::{MAX_RESET_DEPTH, ResetGuard, VariantChange, VariantSwitch, detect_change},
    schema::{Field, FieldValue, Schema},
    store::DataStore,
    sync::{Delay, DeviceChannel, DeviceSync, SyncOutcome},
    view::{DetailIndex, DetailPage, GroupId, NodeId, TreeIndex, ViewTree},
};

/// Session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    max_reset_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reset_depth: MAX_RESET_DEPTH,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many overlay resets may nest; clamped to `1..=MAX_RESET_DEPTH`.
    pub fn max_reset_depth(mut self, depth: usize) -> Self {
        self.max_reset_depth = depth.clamp(1, MAX_RESET_DEPTH);
        self
    }

    pub fn reset_depth(&self) -> usize {
        self.max_reset_depth
    }
}

/// Live state of one open kit.
#[derive(Debug)]
pub struct KitSession {
    schema: Arc<Schema>,
    store: DataStore,
    tree: ViewTree,
    tree_index: TreeIndex,
    page: Option<DetailPage>,
    detail_index: DetailIndex,
    edit: EditSession,
    guard: ResetGuard,
    variant_switches: u64,
}

impl KitSession {
    /// Opens `store` with the kit tree rooted at `root`.
    pub fn new(schema: Arc<Schema>, store: DataStore, root: Address) -> Result<Self> {
        Self::with_config(schema, store, root, SessionConfig::default())
    }

    pub fn with_config(
        schema: Arc<Schema>,
        store: DataStore,
        root: Address,
        config: SessionConfig,
    ) -> Result<Self> {
        let (tree, tree_index) = ViewTree::build(schema.kit(), root, &store)?;
        Ok(Self {
            schema,
            store,
            tree,
            tree_index,
            page: None,
            detail_index: DetailIndex::new(),
            edit: EditSession::new(),
            guard: ResetGuard::new(config.reset_depth()),
            variant_switches: 0,
        })
    }

    /// Creates kit `number` with default values and opens it.
    pub fn create(schema: Arc<Schema>, number: u32) -> Result<Self> {
        let store = schema.create_kit(number)?;
        let root = schema.kit_root(number)?;
        Self::new(schema, store, root)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Mutable store access for listener registration and dirty handling.
    ///
    /// Writes made here bypass propagation.
    pub fn store_mut(&mut self) -> &mut DataStore {
        &mut self.store
    }

    pub fn tree(&self) -> &ViewTree {
        &self.tree
    }

    pub fn tree_index(&self) -> &TreeIndex {
        &self.tree_index
    }

    pub fn page(&self) -> Option<&DetailPage> {
        self.page.as_ref()
    }

    pub fn detail_index(&self) -> &DetailIndex {
        &self.detail_index
    }

    pub fn edit_state(&self) -> EditState {
        self.edit.state()
    }

    /// Overlay switches handled since the session was opened.
    pub fn variant_switches(&self) -> u64 {
        self.variant_switches
    }

    /// Opens the detail page of `node`.
    pub fn select(&mut self, node: NodeId) -> Result<()> {
        let (page, index) = DetailPage::build(&self.tree, node, &self.store, self.edit.is_editing())?;
        self.page = Some(page);
        self.detail_index = index;
        Ok(())
    }

    fn rebuild_page(&mut self) -> Result<()> {
        match self.page.as_ref().map(DetailPage::node) {
            Some(node) => self.select(node),
            None => Ok(()),
        }
    }

    /// Writes a field and propagates the change.
    pub fn write(&mut self, context: &FixedContainer, field: &Field, value: &FieldValue) -> Result<Segment> {
        let segment = self.store.write(context, field, value)?;
        self.propagate(segment)?;
        Ok(segment)
    }

    /// Writes the field behind a row of the open page.
    pub fn write_row(&mut self, group: GroupId, row: usize, value: &FieldValue) -> Result<Segment> {
        let binding = self.editable_row(group, row)?;
        self.write(binding.context(), binding.field(), value)
    }

    /// Parses `text` into the row's field and writes it.
    ///
    /// Text the field rejects marks the row invalid and returns `Ok(false)`;
    /// the store is left unchanged.
    pub fn set_row_text(&mut self, group: GroupId, row: usize, text: &str) -> Result<bool> {
        let binding = self.editable_row(group, row)?;
        match binding.field().parse(text) {
            Ok(value) => {
                self.write(binding.context(), binding.field(), &value)?;
                Ok(true)
            }
            Err(err) if err.is_validation() => {
                warn!("Rejected {text:?} for {}: {err}", binding.field().name());
                if let Some(page) = self.page.as_mut() {
                    page.row_mut(group, row)?.mark_invalid();
                }
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn editable_row(&self, group: GroupId, row: usize) -> Result<BoundField> {
        let page = self
            .page
            .as_ref()
            .ok_or(KitError::UnknownTarget(Target::Row { group: group.index(), row }))?;
        let row = page.row(group, row)?;
        if !row.editable() {
            return Err(KitError::invariant(format!(
                "{} is not editable outside edit mode",
                row.description()
            )));
        }
        Ok(row.binding().clone())
    }

    /// Refreshes everything bound to `segment`.
    ///
    /// Tree labels are re-formatted; detail groups either re-read their
    /// values or, after an overlay switch, reset the new variant and rebuild.
    pub fn propagate(&mut self, segment: Segment) -> Result<()> {
        let start = segment.start();
        self.refresh_labels(start)?;
        for group in self.detail_index.lookup(start).to_vec() {
            self.refresh_group(group)?;
        }
        Ok(())
    }

    fn refresh_group(&mut self, id: GroupId) -> Result<()> {
        let Some(page) = self.page.as_mut() else {
            return Ok(());
        };
        let group = page.group(id)?;
        let stale = group.is_stale();
        match detect_change(group, &self.store)? {
            VariantChange::Unchanged => {
                if !stale && page.refresh_values(id, &self.store)? {
                    self.detail_index = page.index();
                }
                Ok(())
            }
            VariantChange::Switched(switch) => self.switch_variant(id, switch),
        }
    }

    fn switch_variant(&mut self, id: GroupId, switch: VariantSwitch) -> Result<()> {
        debug!(
            "resetting overlay at {} for variant {:?}",
            switch.address, switch.to
        );
        self.guard.enter(switch.address)?;
        let reset = self.begin_switch(id, &switch).and_then(|()| self.reset_variant(switch.variant));
        self.guard.exit(switch.address);
        reset?;

        if let Some(page) = self.page.as_mut() {
            page.rebuild_group(id, &self.store)?;
            self.detail_index = page.index();
        }
        self.variant_switches += 1;
        Ok(())
    }

    fn begin_switch(&mut self, id: GroupId, switch: &VariantSwitch) -> Result<()> {
        match self.page.as_mut() {
            Some(page) => page.begin_switch(id, switch.site, switch.to),
            None => Ok(()),
        }
    }

    /// Writes the defaults of a newly active variant, propagating each write.
    fn reset_variant(&mut self, variant: Option<FixedContainer>) -> Result<()> {
        let mut current = variant;
        while let Some(context) = current {
            for field in context.container().fields() {
                let segment = self.store.write(&context, field, field.default_value())?;
                self.propagate(segment)?;
            }
            current = context.variant(&self.store)?;
        }
        Ok(())
    }

    /// Snapshots the store and reopens the page with editable rows.
    pub fn enter_edit(&mut self) -> Result<Transition> {
        let transition = self.edit.enter(&mut self.store)?;
        self.rebuild_page()?;
        Ok(transition)
    }

    pub fn commit(&mut self) -> Result<Transition> {
        let transition = self.edit.commit(&mut self.store)?;
        self.rebuild_page()?;
        Ok(transition)
    }

    /// Reverts every edit since [`enter_edit`](Self::enter_edit).
    ///
    /// The restored image is taken as is: labels are refreshed and the page
    /// rebuilt, but no overlay reset runs.
    pub fn cancel(&mut self) -> Result<Transition> {
        let transition = self.edit.cancel(&mut self.store)?;
        if let Transition::Cancelled { reverted } = &transition {
            for segment in reverted {
                self.refresh_labels(segment.start())?;
            }
        }
        self.rebuild_page()?;
        Ok(transition)
    }

    /// Replaces a segment with data received from the device.
    ///
    /// Like [`cancel`](Self::cancel), device data is authoritative and does
    /// not trigger overlay resets.
    pub fn load_segment(&mut self, start: Address, bytes: &[u8]) -> Result<Segment> {
        let segment = self.store.load_segment(start, bytes)?;
        self.refresh_labels(start)?;
        self.rebuild_page()?;
        Ok(segment)
    }

    fn refresh_labels(&mut self, start: Address) -> Result<()> {
        for node in self.tree_index.lookup(start).to_vec() {
            self.tree.refresh_label(node, &self.store)?;
        }
        Ok(())
    }

    /// The MIDI note bound to `node`.
    pub fn midi_note(&self, node: NodeId) -> Result<u8> {
        let view = self.tree.node(node)?;
        let field = view
            .schema()
            .midi_note()
            .ok_or(KitError::UnknownTarget(Target::MidiNote(node.index())))?;
        match field.read_at(view.context().base(), &self.store)? {
            FieldValue::Numeric(note) => u8::try_from(note)
                .ok()
                .filter(|n| *n <= 0x7F)
                .ok_or_else(|| KitError::validation(field.name(), format!("{note} is not a MIDI note"))),
            other => Err(KitError::invariant(format!(
                "MIDI note field {} decoded to {other:?}",
                field.name()
            ))),
        }
    }

    /// Triggers the note bound to `node` on the device.
    pub fn play_note<C: DeviceChannel, D: Delay>(
        &self,
        sync: &mut DeviceSync<C, D>,
        node: NodeId,
        channel: u8,
        velocity: u8,
    ) -> Result<()> {
        let note = self.midi_note(node)?;
        sync.trigger_note(channel, note, velocity)
    }

    /// Writes the whole kit to slot `kit_number` on the device.
    pub fn copy_to_device<C: DeviceChannel, D: Delay>(
        &self,
        sync: &mut DeviceSync<C, D>,
        kit_number: u32,
    ) -> Result<SyncOutcome> {
        let root = self.tree.node(self.tree.root())?.context();
        sync.copy_to_device(&self.schema, root, &self.store, kit_number)
    }

    /// Sends the segments changed since the last sync.
    pub fn sync_dirty<C: DeviceChannel, D: Delay>(
        &mut self,
        sync: &mut DeviceSync<C, D>,
    ) -> Result<SyncOutcome> {
        sync.sync_dirty(&mut self.store)
    }
}
