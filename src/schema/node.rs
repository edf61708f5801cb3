use std::sync::Arc;

use crate::{
    address::Address,
    context::FixedContainer,
    error::{KitError, Result},
    schema::{container::Container, field::Field},
    store::DataStore,
};

/// Display text with `{0}`, `{1}`... placeholders filled from field values.
#[derive(Debug, Clone)]
pub struct Description {
    format: String,
    args: Vec<Field>,
}

impl Description {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, field: Field) -> Self {
        self.args.push(field);
        self
    }

    pub fn args(&self) -> &[Field] {
        &self.args
    }

    /// Fills every placeholder in one pass; argument text is never rescanned.
    ///
    /// Placeholders without a matching argument are kept as written.
    pub fn format(&self, context: &FixedContainer, store: &DataStore) -> Result<String> {
        let values = self
            .args
            .iter()
            .map(|field| Ok(field.format(&field.read_at(context.base(), store)?)))
            .collect::<Result<Vec<String>>>()?;

        let mut text = String::with_capacity(self.format.len());
        let mut rest = self.format.as_str();
        while let Some(open) = rest.find('{') {
            text.push_str(&rest[..open]);
            let tail = &rest[open..];
            let arg = tail[1..].find('}').and_then(|close| {
                let idx: usize = tail[1..=close].parse().ok()?;
                values.get(idx).map(|value| (value, close + 2))
            });
            match arg {
                Some((value, used)) => {
                    text.push_str(value);
                    rest = &tail[used..];
                }
                None => {
                    text.push('{');
                    rest = &tail[1..];
                }
            }
        }
        text.push_str(rest);
        Ok(text)
    }

    /// Starts of the segments the formatted text depends on, without duplicates.
    pub fn segment_starts(&self, context: &FixedContainer, store: &DataStore) -> Result<Vec<Address>> {
        let mut starts = Vec::new();
        for field in &self.args {
            for (offset, _) in field.spans() {
                let start = store.segment_of(context.base() + offset)?.start();
                if !starts.contains(&start) {
                    starts.push(start);
                }
            }
        }
        Ok(starts)
    }
}

/// One detail section shown for a selected node.
#[derive(Debug, Clone)]
pub enum DetailSchema {
    /// A list of formatted lines.
    Descriptions {
        title: String,
        items: Vec<Description>,
    },
    /// A container bound at `offset` from the node's own base.
    Container {
        title: String,
        offset: u32,
        container: Arc<Container>,
    },
}

impl DetailSchema {
    pub fn descriptions(title: impl Into<String>, items: impl IntoIterator<Item = Description>) -> Self {
        DetailSchema::Descriptions {
            title: title.into(),
            items: items.into_iter().collect(),
        }
    }

    pub fn container(title: impl Into<String>, offset: u32, container: Arc<Container>) -> Self {
        DetailSchema::Container {
            title: title.into(),
            offset,
            container,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            DetailSchema::Descriptions { title, .. } | DetailSchema::Container { title, .. } => title,
        }
    }
}

/// A node of the logical kit tree, positioned relative to its parent.
#[derive(Debug, Clone)]
pub struct NodeSchema {
    description: Description,
    offset: u32,
    container: Arc<Container>,
    children: Vec<Arc<NodeSchema>>,
    details: Vec<DetailSchema>,
    midi_note: Option<Field>,
}

impl NodeSchema {
    pub fn new(description: Description, offset: u32, container: Arc<Container>) -> Self {
        Self {
            description,
            offset,
            container,
            children: Vec::new(),
            details: Vec::new(),
            midi_note: None,
        }
    }

    pub fn with_child(mut self, child: NodeSchema) -> Self {
        self.children.push(Arc::new(child));
        self
    }

    pub fn with_detail(mut self, detail: DetailSchema) -> Self {
        self.details.push(detail);
        self
    }

    /// Binds the numeric field holding the note this node triggers.
    pub fn with_midi_note(mut self, field: Field) -> Self {
        self.midi_note = Some(field);
        self
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn children(&self) -> &[Arc<NodeSchema>] {
        &self.children
    }

    pub fn details(&self) -> &[DetailSchema] {
        &self.details
    }

    pub fn midi_note(&self) -> Option<&Field> {
        self.midi_note.as_ref()
    }

    /// Validates this node and every descendant.
    pub fn validate(&self) -> Result<()> {
        self.container.validate()?;

        let size = self.container.size();
        let within = |field: &Field| -> Result<()> {
            field.validate()?;
            if field.extent() > size {
                return Err(KitError::invariant(format!(
                    "{}: {} lies outside the node container",
                    self.container.name(),
                    field.name()
                )));
            }
            Ok(())
        };

        self.description.args.iter().try_for_each(within)?;
        if let Some(note) = &self.midi_note {
            within(note)?;
        }
        for detail in &self.details {
            match detail {
                DetailSchema::Descriptions { items, .. } => {
                    items.iter().flat_map(|d| d.args.iter()).try_for_each(within)?;
                }
                DetailSchema::Container { container, .. } => container.validate()?,
            }
        }
        self.children.iter().try_for_each(|c| c.validate())
    }
}
