use log::debug;

use crate::{
    address::Address,
    context::{BoundField, FixedContainer},
    error::{KitError, Result, Target},
    schema::{DetailSchema, Description, Field},
    store::DataStore,
    view::{DetailIndex, NodeId, ViewTree},
};

/// Index of a group within its [`DetailPage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub usize);

impl GroupId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One displayed field of a bound-container group.
#[derive(Debug, Clone)]
pub struct FieldRow {
    description: String,
    text: String,
    binding: BoundField,
    editable: bool,
    valid: bool,
}

impl FieldRow {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn binding(&self) -> &BoundField {
        &self.binding
    }

    pub fn field(&self) -> &Field {
        self.binding.field()
    }

    pub fn editable(&self) -> bool {
        self.editable
    }

    /// False after text for this row was rejected, until the value is refreshed.
    pub fn valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn mark_invalid(&mut self) {
        self.valid = false;
    }

    fn same_binding(&self, other: &FieldRow) -> bool {
        self.binding.address() == other.binding.address()
            && self.field().name() == other.field().name()
    }
}

#[derive(Debug, Clone)]
pub enum GroupContent {
    Descriptions(Vec<String>),
    Fields(Vec<FieldRow>),
}

/// A dynamic overlay a group was resolved through, and the variant it saw.
#[derive(Debug, Clone)]
pub struct OverlaySite {
    host: FixedContainer,
    discriminator_segment: Address,
    variant: Option<i32>,
}

impl OverlaySite {
    /// The context whose container hosts the overlay.
    pub fn host(&self) -> &FixedContainer {
        &self.host
    }

    /// Address of the discriminator field; identifies the site.
    pub fn address(&self) -> Address {
        self.host
            .container()
            .overlay()
            .map_or(self.host.base(), |o| self.host.field_address(o.discriminator()))
    }

    pub fn discriminator_segment(&self) -> Address {
        self.discriminator_segment
    }

    /// The variant the group was last built for.
    pub fn variant(&self) -> Option<i32> {
        self.variant
    }
}

#[derive(Debug, Clone)]
enum GroupSource {
    Descriptions {
        context: FixedContainer,
        items: Vec<Description>,
    },
    Container {
        context: FixedContainer,
    },
}

/// A titled section of a detail page.
#[derive(Debug, Clone)]
pub struct DetailGroup {
    title: String,
    source: GroupSource,
    content: GroupContent,
    sites: Vec<OverlaySite>,
    segments: Vec<Address>,
    generation: u32,
    stale: bool,
}

struct Binding {
    content: GroupContent,
    sites: Vec<OverlaySite>,
    segments: Vec<Address>,
}

fn push_unique(starts: &mut Vec<Address>, start: Address) {
    if !starts.contains(&start) {
        starts.push(start);
    }
}

fn field_segments(
    field: &Field,
    base: Address,
    store: &DataStore,
    starts: &mut Vec<Address>,
) -> Result<()> {
    for (offset, _) in field.spans() {
        push_unique(starts, store.segment_of(base + offset)?.start());
    }
    Ok(())
}

fn bind(source: &GroupSource, store: &DataStore, editable: bool) -> Result<Binding> {
    let mut segments = Vec::new();
    match source {
        GroupSource::Descriptions { context, items } => {
            let mut lines = Vec::with_capacity(items.len());
            for item in items {
                lines.push(item.format(context, store)?);
                for start in item.segment_starts(context, store)? {
                    push_unique(&mut segments, start);
                }
            }
            Ok(Binding {
                content: GroupContent::Descriptions(lines),
                sites: Vec::new(),
                segments,
            })
        }
        GroupSource::Container { context } => {
            let mut sites = Vec::new();
            let mut current = Some(context.clone());
            while let Some(host) = current {
                if let Some(overlay) = host.container().overlay() {
                    let discriminator = overlay.discriminator();
                    let segment = store.segment_of(host.field_address(discriminator))?.start();
                    push_unique(&mut segments, segment);
                    sites.push(OverlaySite {
                        host: host.clone(),
                        discriminator_segment: segment,
                        variant: host.active_variant(store)?,
                    });
                }
                current = host.variant(store)?;
            }

            let mut rows = Vec::new();
            for bound in context.primitive_fields(store)? {
                let field = bound.field();
                let base = bound.context().base();
                if let Some(condition) = field.condition() {
                    field_segments(condition.field(), base, store, &mut segments)?;
                }
                if !field.is_enabled(base, store)? {
                    continue;
                }
                field_segments(field, base, store, &mut segments)?;
                let value = bound.read(store)?;
                rows.push(FieldRow {
                    description: field.name().to_owned(),
                    text: field.format(&value),
                    binding: bound.clone(),
                    editable,
                    valid: true,
                });
            }

            Ok(Binding {
                content: GroupContent::Fields(rows),
                sites,
                segments,
            })
        }
    }
}

impl DetailGroup {
    fn build(title: &str, source: GroupSource, store: &DataStore, editable: bool) -> Result<Self> {
        let binding = bind(&source, store, editable)?;
        Ok(Self {
            title: title.to_owned(),
            source,
            content: binding.content,
            sites: binding.sites,
            segments: binding.segments,
            generation: 0,
            stale: false,
        })
    }

    fn apply(&mut self, binding: Binding) {
        self.content = binding.content;
        self.sites = binding.sites;
        self.segments = binding.segments;
        self.generation += 1;
        self.stale = false;
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &GroupContent {
        &self.content
    }

    /// Field rows; empty for description groups.
    pub fn rows(&self) -> &[FieldRow] {
        match &self.content {
            GroupContent::Fields(rows) => rows,
            GroupContent::Descriptions(_) => &[],
        }
    }

    pub fn overlay_sites(&self) -> &[OverlaySite] {
        &self.sites
    }

    /// Segment starts this group is indexed under.
    pub fn segments(&self) -> &[Address] {
        &self.segments
    }

    /// Number of rebuilds since the page was built.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// True between an overlay switch and the rebuild that follows it.
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// The bound details of one selected view node.
#[derive(Debug, Clone)]
pub struct DetailPage {
    node: NodeId,
    editable: bool,
    groups: Vec<DetailGroup>,
}

impl DetailPage {
    /// Binds every detail of `node`, resolving containers through their
    /// active overlays, and indexes the groups by segment.
    pub fn build(
        tree: &ViewTree,
        node: NodeId,
        store: &DataStore,
        editable: bool,
    ) -> Result<(DetailPage, DetailIndex)> {
        let view = tree.node(node)?;
        let base = view.context().base();

        let mut groups = Vec::with_capacity(view.schema().details().len());
        for detail in view.schema().details() {
            let source = match detail {
                DetailSchema::Descriptions { items, .. } => GroupSource::Descriptions {
                    context: view.context().clone(),
                    items: items.clone(),
                },
                DetailSchema::Container {
                    offset, container, ..
                } => GroupSource::Container {
                    context: FixedContainer::new(container.clone(), base + *offset),
                },
            };
            groups.push(DetailGroup::build(detail.title(), source, store, editable)?);
        }

        let page = DetailPage {
            node,
            editable,
            groups,
        };
        let index = page.index();
        debug!(
            "built detail page for node {}: {} groups, {} indexed segments",
            node.index(),
            page.groups.len(),
            index.len()
        );
        Ok((page, index))
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn editable(&self) -> bool {
        self.editable
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &DetailGroup)> {
        self.groups.iter().enumerate().map(|(i, g)| (GroupId(i), g))
    }

    pub fn group(&self, id: GroupId) -> Result<&DetailGroup> {
        self.groups
            .get(id.0)
            .ok_or(KitError::UnknownTarget(Target::Row { group: id.0, row: 0 }))
    }

    fn group_mut(&mut self, id: GroupId) -> Result<&mut DetailGroup> {
        self.groups
            .get_mut(id.0)
            .ok_or(KitError::UnknownTarget(Target::Row { group: id.0, row: 0 }))
    }

    pub fn row(&self, group: GroupId, row: usize) -> Result<&FieldRow> {
        self.group(group)?
            .rows()
            .get(row)
            .ok_or(KitError::UnknownTarget(Target::Row {
                group: group.0,
                row,
            }))
    }

    pub(crate) fn row_mut(&mut self, group: GroupId, row: usize) -> Result<&mut FieldRow> {
        let found = match &mut self.group_mut(group)?.content {
            GroupContent::Fields(rows) => rows.get_mut(row),
            GroupContent::Descriptions(_) => None,
        };
        found.ok_or(KitError::UnknownTarget(Target::Row {
            group: group.0,
            row,
        }))
    }

    /// Rebinds the group from scratch and bumps its generation.
    pub fn rebuild_group(&mut self, id: GroupId, store: &DataStore) -> Result<()> {
        let editable = self.editable;
        let group = self.group_mut(id)?;
        let binding = bind(&group.source, store, editable)?;
        group.apply(binding);
        debug!(
            "rebuilt detail group {:?} (generation {})",
            group.title, group.generation
        );
        Ok(())
    }

    /// Re-reads the displayed values of a group.
    ///
    /// If the set of enabled rows changed, the group is rebuilt instead and
    /// true is returned: its indexed segments may differ.
    pub fn refresh_values(&mut self, id: GroupId, store: &DataStore) -> Result<bool> {
        let editable = self.editable;
        let group = self.group_mut(id)?;
        let binding = bind(&group.source, store, editable)?;

        let same_rows = match (&group.content, &binding.content) {
            (GroupContent::Fields(old), GroupContent::Fields(new)) => {
                old.len() == new.len() && old.iter().zip(new).all(|(a, b)| a.same_binding(b))
            }
            _ => true,
        };
        if !same_rows {
            group.apply(binding);
            return Ok(true);
        }

        group.content = binding.content;
        Ok(false)
    }

    /// Marks a group stale and records the variant an overlay switched to,
    /// so propagation during the reset treats the site as settled.
    pub(crate) fn begin_switch(
        &mut self,
        id: GroupId,
        site: usize,
        variant: Option<i32>,
    ) -> Result<()> {
        let group = self.group_mut(id)?;
        let site = group
            .sites
            .get_mut(site)
            .ok_or_else(|| KitError::invariant("overlay site out of range"))?;
        site.variant = variant;
        group.stale = true;
        Ok(())
    }

    /// Rebuilds the reverse index from every group's segments.
    pub fn index(&self) -> DetailIndex {
        let mut index = DetailIndex::new();
        for (id, group) in self.groups() {
            for &start in &group.segments {
                index.insert(start, id);
            }
        }
        index
    }
}
