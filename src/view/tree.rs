use std::sync::Arc;

use log::debug;

use crate::{
    address::Address,
    context::FixedContainer,
    error::{KitError, Result, Target},
    schema::NodeSchema,
    store::DataStore,
    view::TreeIndex,
};

/// Index of a node in its [`ViewTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node schema instantiated at a concrete address.
#[derive(Debug, Clone)]
pub struct ViewNode {
    schema: Arc<NodeSchema>,
    context: FixedContainer,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    label: String,
    label_segments: Vec<Address>,
}

impl ViewNode {
    pub fn schema(&self) -> &Arc<NodeSchema> {
        &self.schema
    }

    pub fn context(&self) -> &FixedContainer {
        &self.context
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Starts of the segments the label is formatted from.
    pub fn label_segments(&self) -> &[Address] {
        &self.label_segments
    }
}

/// Arena of view nodes in depth-first order; the root is always first.
#[derive(Debug, Clone, Default)]
pub struct ViewTree {
    nodes: Vec<ViewNode>,
}

impl ViewTree {
    /// Instantiates `schema` with its parent base at `root` and indexes
    /// every node under its label segments.
    pub fn build(
        schema: &Arc<NodeSchema>,
        root: Address,
        store: &DataStore,
    ) -> Result<(ViewTree, TreeIndex)> {
        let mut tree = ViewTree::default();
        tree.instantiate(schema, root, None, store)?;
        let index = tree.index();
        debug!(
            "built view tree: {} nodes, {} indexed segments",
            tree.nodes.len(),
            index.len()
        );
        Ok((tree, index))
    }

    fn instantiate(
        &mut self,
        schema: &Arc<NodeSchema>,
        parent_base: Address,
        parent: Option<NodeId>,
        store: &DataStore,
    ) -> Result<NodeId> {
        let context = FixedContainer::new(schema.container().clone(), parent_base + schema.offset());
        let label = schema.description().format(&context, store)?;
        let label_segments = schema.description().segment_starts(&context, store)?;

        let id = NodeId(self.nodes.len());
        self.nodes.push(ViewNode {
            schema: schema.clone(),
            context,
            parent,
            children: Vec::new(),
            label,
            label_segments,
        });

        let base = self.nodes[id.0].context.base();
        for child in schema.children() {
            let child_id = self.instantiate(child, base, Some(id), store)?;
            self.nodes[id.0].children.push(child_id);
        }
        Ok(id)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> Result<&ViewNode> {
        self.nodes
            .get(id.0)
            .ok_or(KitError::UnknownTarget(Target::Node(id.0)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ViewNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Re-formats the label of `id`, returning true if the text changed.
    pub fn refresh_label(&mut self, id: NodeId, store: &DataStore) -> Result<bool> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(KitError::UnknownTarget(Target::Node(id.0)))?;
        let label = node.schema.description().format(&node.context, store)?;
        if label == node.label {
            return Ok(false);
        }
        node.label = label;
        Ok(true)
    }

    /// Rebuilds the reverse index from every node's label segments.
    pub fn index(&self) -> TreeIndex {
        let mut index = TreeIndex::new();
        for (id, node) in self.iter() {
            for &start in &node.label_segments {
                index.insert(start, id);
            }
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::FieldValue, test_support::*};

    #[test]
    fn build_instantiates_depth_first() {
        let schema = demo_schema();
        let store = schema.create_kit(1).unwrap();
        let (tree, _) = ViewTree::build(schema.kit(), KIT1, &store).unwrap();

        assert_eq!(tree.len(), 2);
        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.label(), "Kit: New kit");
        assert_eq!(root.children().len(), 1);

        let pad = tree.node(root.children()[0]).unwrap();
        assert_eq!(pad.parent(), Some(tree.root()));
        assert_eq!(pad.context().base(), KIT1 + 0x10);
        assert_eq!(pad.label(), "Pad (note 38)");
        assert!(tree.node(NodeId(5)).is_err());
    }

    #[test]
    fn index_holds_exactly_label_segments() {
        let schema = demo_schema();
        let store = schema.create_kit(1).unwrap();
        let (tree, index) = ViewTree::build(schema.kit(), KIT1, &store).unwrap();

        let mut expected = 0;
        for (id, node) in tree.iter() {
            for &start in node.label_segments() {
                assert!(index.lookup(start).contains(&id));
                expected += 1;
            }
        }
        let total: usize = index.starts().map(|s| index.lookup(s).len()).sum();
        assert_eq!(total, expected);

        assert_eq!(index.lookup(KIT1), &[tree.root()]);
        assert_eq!(index.lookup(KIT1 + 0x20).len(), 1);
        assert!(index.lookup(KIT1 + 0x10).is_empty());
    }

    #[test]
    fn refresh_label_reports_changes() {
        let schema = demo_schema();
        let mut store = schema.create_kit(1).unwrap();
        let (mut tree, _) = ViewTree::build(schema.kit(), KIT1, &store).unwrap();
        let root = tree.root();

        assert!(!tree.refresh_label(root, &store).unwrap());

        let context = tree.node(root).unwrap().context().clone();
        let name = context.container().field("Name").unwrap();
        store
            .write(&context, name, &FieldValue::Text("Rock".into()))
            .unwrap();
        assert!(tree.refresh_label(root, &store).unwrap());
        assert_eq!(tree.node(root).unwrap().label(), "Kit: Rock");
    }
}
