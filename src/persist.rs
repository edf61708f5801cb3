//! Kit files: the schema identity plus every segment's raw bytes, as JSON.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::{
    address::{Address, Segment},
    builder::StoreBuilder,
    error::{KitError, Result, Target},
    schema::{Schema, SchemaIdentifier},
    slice::MAX_DATA_BYTE,
    store::DataStore,
};

/// Failures reading or writing a kit file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("kit file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed kit file: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct KitFile {
    schema: SchemaIdentifier,
    segments: Vec<SegmentRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SegmentRecord {
    start: Address,
    data: Vec<u8>,
}

/// Writes every segment of `store`, tagged with `schema`'s identity.
pub fn save<W: Write>(store: &DataStore, schema: &Schema, writer: W) -> Result<()> {
    let file = KitFile {
        schema: schema.identifier().clone(),
        segments: store
            .get_segments()
            .iter()
            .map(|s| SegmentRecord {
                start: s.start(),
                data: s.bytes().to_vec(),
            })
            .collect(),
    };
    serde_json::to_writer_pretty(writer, &file).map_err(PersistError::from)?;
    Ok(())
}

/// Reads a kit file written for `schema`.
///
/// A file tagged with another schema identity is an
/// [`UnknownTarget`](KitError::UnknownTarget). Its segments must match the
/// schema layout at one of the schema's kit roots. The returned store is
/// clean.
pub fn load<R: Read>(reader: R, schema: &Schema) -> Result<DataStore> {
    let file: KitFile = serde_json::from_reader(reader).map_err(PersistError::from)?;
    if &file.schema != schema.identifier() {
        return Err(KitError::UnknownTarget(Target::Schema(file.schema.to_string())));
    }

    let mut layout = Vec::with_capacity(file.segments.len());
    for record in &file.segments {
        if record.data.iter().any(|b| *b > MAX_DATA_BYTE) {
            return Err(format_error(format!(
                "segment at {} holds bytes above {MAX_DATA_BYTE:#x}",
                record.start
            )));
        }
        let len = u32::try_from(record.data.len())
            .map_err(|_| format_error(format!("segment at {} is too long", record.start)))?;
        layout.push(Segment::new(record.start, len));
    }
    layout.sort_by_key(|s| s.start());

    let root = matching_root(schema, &layout)?.ok_or_else(|| {
        format_error(format!(
            "segments do not match the layout of any {} kit",
            schema.identifier()
        ))
    })?;

    let mut store = StoreBuilder::new()
        .relative_segments(root, schema.layout().iter().copied())
        .build()?;
    for record in &file.segments {
        store.load_segment(record.start, &record.data)?;
    }
    Ok(store)
}

/// The kit root at which `schema`'s layout equals `layout`.
fn matching_root(schema: &Schema, layout: &[Segment]) -> Result<Option<Address>> {
    for number in schema.kit_numbers() {
        let root = schema.kit_root(number)?;
        let mut expected: Vec<Segment> = schema
            .layout()
            .iter()
            .map(|&(offset, len)| Segment::new(root + offset, len))
            .collect();
        expected.sort_by_key(|s| s.start());
        if expected == layout {
            return Ok(Some(root));
        }
    }
    Ok(None)
}

fn format_error(message: String) -> KitError {
    PersistError::Format(<serde_json::Error as serde::de::Error>::custom(message)).into()
}
