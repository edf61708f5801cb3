use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::{KitError, Result},
    schema::field::{Field, FieldKind},
};

/// A fixed-size block of fields, optionally hosting one dynamic overlay.
#[derive(Debug, Clone)]
pub struct Container {
    name: String,
    size: u32,
    fields: Vec<Field>,
    overlay: Option<DynamicOverlay>,
}

impl Container {
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
            fields: Vec::new(),
            overlay: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Attaches the overlay, replacing any previous one.
    pub fn with_overlay(mut self, overlay: DynamicOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn overlay(&self) -> Option<&DynamicOverlay> {
        self.overlay.as_ref()
    }

    /// Checks that every field, condition and variant fits inside the container.
    pub fn validate(&self) -> Result<()> {
        let fits = |what: &str, extent: u32| {
            if extent > self.size {
                Err(KitError::invariant(format!(
                    "{}: {what} ends at {extent:#x}, past size {:#x}",
                    self.name, self.size
                )))
            } else {
                Ok(())
            }
        };

        for field in &self.fields {
            field.validate()?;
            fits(field.name(), field.extent())?;
            if let Some(condition) = field.condition() {
                fits(condition.field().name(), condition.field().extent())?;
            }
        }

        if let Some(overlay) = &self.overlay {
            let discriminator = overlay.discriminator();
            discriminator.validate()?;
            fits(discriminator.name(), discriminator.extent())?;
            if matches!(
                discriminator.kind(),
                FieldKind::Text { .. } | FieldKind::Instrument { .. }
            ) {
                return Err(KitError::invariant(format!(
                    "{}: discriminator {} cannot select variants",
                    self.name,
                    discriminator.name()
                )));
            }
            for variant in overlay.variants.values() {
                variant.validate()?;
                fits(variant.name(), overlay.switch_offset + variant.size())?;
            }
        }

        Ok(())
    }
}

/// A region of a container whose layout is picked by a discriminator value.
///
/// Variants are keyed by [`FieldValue::discriminant`]: `false`/`true` map to
/// 0/1, enums to their index, numerics to their value.
///
/// [`FieldValue::discriminant`]: crate::schema::FieldValue::discriminant
#[derive(Debug, Clone)]
pub struct DynamicOverlay {
    switch_offset: u32,
    discriminator: Field,
    variants: BTreeMap<i32, Arc<Container>>,
}

impl DynamicOverlay {
    pub fn new(switch_offset: u32, discriminator: Field) -> Self {
        Self {
            switch_offset,
            discriminator,
            variants: BTreeMap::new(),
        }
    }

    pub fn with_variant(mut self, key: i32, container: Container) -> Self {
        self.variants.insert(key, Arc::new(container));
        self
    }

    /// Offset of the variant fields, relative to the enclosing container.
    pub fn switch_offset(&self) -> u32 {
        self.switch_offset
    }

    pub fn discriminator(&self) -> &Field {
        &self.discriminator
    }

    pub fn variant(&self, key: i32) -> Option<&Arc<Container>> {
        self.variants.get(&key)
    }

    pub fn variants(&self) -> impl Iterator<Item = (i32, &Arc<Container>)> {
        self.variants.iter().map(|(k, v)| (*k, v))
    }
}
