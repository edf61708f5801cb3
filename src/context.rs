//! Containers bound to concrete addresses.

use std::sync::Arc;

use log::debug;

use crate::{
    address::{Address, Segment},
    error::Result,
    schema::{Container, Field, FieldValue},
    store::DataStore,
};

/// A schema container fixed at a base address.
///
/// Every field read or write goes through one of these. Overlay resolution
/// reads the store each time; nothing about the active variant is cached.
#[derive(Debug, Clone)]
pub struct FixedContainer {
    container: Arc<Container>,
    base: Address,
}

impl FixedContainer {
    pub fn new(container: Arc<Container>, base: Address) -> Self {
        Self { container, base }
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn base(&self) -> Address {
        self.base
    }

    /// A context for `container` at `offset` from this one.
    pub fn child(&self, offset: u32, container: Arc<Container>) -> Self {
        Self::new(container, self.base + offset)
    }

    pub fn field_address(&self, field: &Field) -> Address {
        self.base + field.offset()
    }

    pub fn read(&self, field: &Field, store: &DataStore) -> Result<FieldValue> {
        store.read(self, field)
    }

    /// Discriminator value of the overlay hosted by this container, if any.
    pub fn active_variant(&self, store: &DataStore) -> Result<Option<i32>> {
        match self.container.overlay() {
            Some(overlay) => Ok(overlay
                .discriminator()
                .read_at(self.base, store)?
                .discriminant()),
            None => Ok(None),
        }
    }

    /// The active variant bound at the overlay's switch offset.
    ///
    /// `None` if there is no overlay or the discriminator selects no variant.
    pub fn variant(&self, store: &DataStore) -> Result<Option<FixedContainer>> {
        let Some(overlay) = self.container.overlay() else {
            return Ok(None);
        };
        let Some(key) = self.active_variant(store)? else {
            return Ok(None);
        };
        match overlay.variant(key) {
            Some(variant) => Ok(Some(self.child(overlay.switch_offset(), variant.clone()))),
            None => {
                debug!(
                    "{} at {}: no variant for discriminator {}",
                    self.container.name(),
                    self.base,
                    key
                );
                Ok(None)
            }
        }
    }

    /// Resolves nested overlays down to the innermost active variant.
    ///
    /// Returns a clone of `self` when no overlay applies.
    pub fn fix_container(&self, store: &DataStore) -> Result<FixedContainer> {
        let mut current = self.clone();
        while let Some(next) = current.variant(store)? {
            current = next;
        }
        Ok(current)
    }

    /// This container's fields followed by those of every active variant.
    pub fn primitive_fields(&self, store: &DataStore) -> Result<Vec<BoundField>> {
        let mut fields = Vec::new();
        let mut current = Some(self.clone());
        while let Some(context) = current {
            fields.extend((0..context.container.fields().len()).map(|index| BoundField {
                context: context.clone(),
                index,
            }));
            current = context.variant(store)?;
        }
        Ok(fields)
    }

    /// Writes every field's default, descending into variants as they
    /// become active. Returns the written segments in order.
    pub fn reset(&self, store: &mut DataStore) -> Result<Vec<Segment>> {
        let mut written: Vec<Segment> = Vec::new();
        let mut current = Some(self.clone());
        while let Some(context) = current {
            for field in context.container.fields() {
                let segment = store.write(&context, field, field.default_value())?;
                if written.last() != Some(&segment) {
                    written.push(segment);
                }
            }
            current = context.variant(store)?;
        }
        Ok(written)
    }

    /// Copies the container's bytes into a new store based at `new_base`.
    pub fn clone_data(&self, store: &DataStore, new_base: Address) -> Result<DataStore> {
        store.clone_range(self.base, self.container.size(), new_base)
    }
}

/// A field paired with the context it is read through.
#[derive(Debug, Clone)]
pub struct BoundField {
    context: FixedContainer,
    index: usize,
}

impl BoundField {
    pub fn context(&self) -> &FixedContainer {
        &self.context
    }

    pub fn field(&self) -> &Field {
        &self.context.container.fields()[self.index]
    }

    pub fn address(&self) -> Address {
        self.context.field_address(self.field())
    }

    pub fn read(&self, store: &DataStore) -> Result<FieldValue> {
        store.read(&self.context, self.field())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::KitError, test_support::*};

    fn pad(schema: &crate::schema::Schema) -> FixedContainer {
        let node = &schema.kit().children()[0];
        FixedContainer::new(node.container().clone(), KIT1 + node.offset())
    }

    fn use_sample(store: &mut DataStore, pad: &FixedContainer, on: bool) {
        let field = pad.container().field("Use sample").unwrap();
        store.write(pad, field, &FieldValue::Bool(on)).unwrap();
    }

    #[test]
    fn fix_container_follows_discriminator() {
        let schema = demo_schema();
        let mut store = schema.create_kit(1).unwrap();
        let pad = pad(&schema);

        let fixed = pad.fix_container(&store).unwrap();
        assert_eq!(fixed.container().name(), "Tone");
        assert_eq!(fixed.base(), KIT1 + 0x11);
        assert_eq!(pad.active_variant(&store).unwrap(), Some(0));

        use_sample(&mut store, &pad, true);
        let fixed = pad.fix_container(&store).unwrap();
        assert_eq!(fixed.container().name(), "Sample");
        assert_eq!(pad.active_variant(&store).unwrap(), Some(1));
    }

    #[test]
    fn fix_container_without_overlay_is_identity() {
        let schema = demo_schema();
        let store = schema.create_kit(1).unwrap();
        let kit = FixedContainer::new(schema.kit().container().clone(), KIT1);
        let fixed = kit.fix_container(&store).unwrap();
        assert!(Arc::ptr_eq(fixed.container(), kit.container()));
        assert_eq!(kit.variant(&store).unwrap().map(|v| v.base()), None);
    }

    #[test]
    fn primitive_fields_include_active_variant() {
        let schema = demo_schema();
        let mut store = schema.create_kit(1).unwrap();
        let pad = pad(&schema);

        let names = |store: &DataStore| -> Vec<String> {
            pad.primitive_fields(store)
                .unwrap()
                .iter()
                .map(|b| b.field().name().to_owned())
                .collect()
        };
        assert_eq!(names(&store), ["Use sample", "Note", "Level", "Instrument"]);

        use_sample(&mut store, &pad, true);
        assert_eq!(names(&store), ["Use sample", "Note", "Sample name"]);

        let bound = &pad.primitive_fields(&store).unwrap()[2];
        assert_eq!(bound.address(), KIT1 + 0x11);
    }

    #[test]
    fn reset_writes_defaults_including_variant() {
        let schema = demo_schema();
        let mut store = schema.create_kit(1).unwrap();
        let pad = pad(&schema);
        let tone = pad.fix_container(&store).unwrap();
        let level = tone.container().field("Level").unwrap();
        store.write(&tone, level, &FieldValue::Numeric(12)).unwrap();

        let written = pad.reset(&mut store).unwrap();
        assert_eq!(store.read(&tone, level).unwrap(), FieldValue::Numeric(80));
        let starts: Vec<_> = written.iter().map(|s| s.start()).collect();
        assert_eq!(starts, [KIT1 + 0x10, KIT1 + 0x20, KIT1 + 0x11]);
    }

    #[test]
    fn clone_data_rejects_straddling_segment() {
        let schema = demo_schema();
        let store = schema.create_kit(1).unwrap();
        let half = FixedContainer::new(
            Arc::new(crate::schema::Container::new("Half", 0x08)),
            KIT1,
        );
        assert!(matches!(
            half.clone_data(&store, KIT2),
            Err(KitError::UnknownTarget(_))
        ));

        let kit = FixedContainer::new(schema.kit().container().clone(), KIT1);
        let clone = kit.clone_data(&store, KIT2).unwrap();
        assert_eq!(clone.segments().len(), store.segments().len());
        assert_eq!(clone.segments()[0].start(), KIT2);
    }
}
