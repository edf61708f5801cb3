//! Test support utilities - only compiled in test builds.

use std::{cell::RefCell, sync::Arc, time::Duration};

use crate::{
    address::{Address, Segment},
    schema::{
        Condition, Container, Description, DetailSchema, DynamicOverlay, Field, FieldValue,
        InstrumentLibrary, NodeSchema, NumericSpec, Schema, SchemaIdentifier,
    },
    store::DataListener,
    sync::{CancelToken, Delay, DeviceChannel, TransportError},
};

/// Root of kit 1 in the demo layout.
pub const KIT1: Address = Address::new(0x1000);
/// Root of kit 2 in the demo layout.
pub const KIT2: Address = Address::new(0x2000);

/// Kit container (0x00..0x24), pad node at 0x10 with a tone/sample overlay at 0x11.
///
/// Segments: name/common 0x00+0x10, pad switch 0x10+1, pad variant 0x11+0xF,
/// pad note 0x20+4.
pub fn build_demo_schema(identifier: SchemaIdentifier) -> Schema {
    let library = Arc::new(
        InstrumentLibrary::new(16)
            .with_group("Kick", ["Kick 1", "Kick 2"])
            .with_group("Snare", ["Snare 1", "Snare 2", "Snare 3"]),
    );

    let name = Field::text("Name", 0, 8).with_default(FieldValue::Text("New kit".into()));
    let level = Field::numeric("Level", 8, NumericSpec::new(2, 0, 127))
        .with_default(FieldValue::Numeric(100));
    let tempo = Field::numeric(
        "Tempo",
        0xA,
        NumericSpec::new(4, 200, 2600)
            .with_divisor(10)
            .with_suffix(" bpm"),
    )
    .with_default(FieldValue::Numeric(1200))
    .enabled_when(Condition::new(Field::boolean("Sync", 0xF), FieldValue::Bool(true)));
    let kind = Field::enumeration("Type", 0xE, ["Acoustic", "Electronic", "Percussion"]);
    let sync = Field::boolean("Sync", 0xF);

    let kit = Arc::new(
        Container::new("Kit", 0x24)
            .with_field(name.clone())
            .with_field(level.clone())
            .with_field(tempo)
            .with_field(kind.clone())
            .with_field(sync),
    );

    let use_sample = Field::boolean("Use sample", 0);
    let note = Field::numeric("Note", 0x10, NumericSpec::new(1, 0, 127))
        .with_default(FieldValue::Numeric(38));
    let tone = Container::new("Tone", 0xF)
        .with_field(
            Field::numeric("Level", 0, NumericSpec::new(1, 0, 127))
                .with_default(FieldValue::Numeric(80)),
        )
        .with_field(Field::instrument("Instrument", 1, 5, library.clone()));
    let sample = Container::new("Sample", 0xF).with_field(Field::text("Sample name", 0, 8));
    let pad = Arc::new(
        Container::new("Pad", 0x14)
            .with_field(use_sample.clone())
            .with_field(note.clone())
            .with_overlay(
                DynamicOverlay::new(1, use_sample)
                    .with_variant(0, tone)
                    .with_variant(1, sample),
            ),
    );

    let pad_node = NodeSchema::new(Description::new("Pad (note {0})").with_arg(note.clone()), 0x10, pad.clone())
        .with_detail(DetailSchema::container("Pad", 0, pad))
        .with_midi_note(note);

    let kit_node = NodeSchema::new(Description::new("Kit: {0}").with_arg(name), 0, kit.clone())
        .with_child(pad_node)
        .with_detail(DetailSchema::descriptions(
            "Summary",
            [
                Description::new("Level {0}").with_arg(level),
                Description::new("Type {0}").with_arg(kind),
            ],
        ))
        .with_detail(DetailSchema::container("Common", 0, kit));

    Schema::new(
        identifier,
        kit_node,
        [(0, 0x10), (0x10, 1), (0x11, 0xF), (0x20, 4)],
        library,
    )
    .with_kit_root(1, KIT1)
    .with_kit_root(2, KIT2)
}

pub fn demo_schema() -> Arc<Schema> {
    Arc::new(build_demo_schema(SchemaIdentifier::new("TD-Demo", "1.0")))
}

/// The pad overlay's "Tone" variant.
pub fn tone_container(schema: &Schema) -> Arc<Container> {
    let pad = schema.kit().children()[0].container();
    match pad.overlay().and_then(|o| o.variant(0)) {
        Some(tone) => tone.clone(),
        None => panic!("demo pad has no tone variant"),
    }
}

/// Listener that records every notified segment.
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub events: RefCell<Vec<Segment>>,
}

impl RecordingListener {
    pub fn take(&self) -> Vec<Segment> {
        self.events.take()
    }
}

impl DataListener for RecordingListener {
    fn data_changed(&self, segment: Segment) {
        self.events.borrow_mut().push(segment);
    }
}

/// Channel that records sends and notes, optionally failing or cancelling.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub sent: Vec<(Address, Vec<u8>)>,
    pub notes: Vec<(u8, u8, u8)>,
    /// Reject the send issued when this many sends have succeeded.
    pub fail_at: Option<usize>,
    /// Cancel the token once this many sends have succeeded.
    pub cancel_after: Option<(Arc<CancelToken>, usize)>,
}

impl DeviceChannel for RecordingChannel {
    fn send_data(&mut self, address: Address, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_at == Some(self.sent.len()) {
            return Err(TransportError::Rejected {
                address,
                reason: "test failure".into(),
            });
        }
        self.sent.push((address, data.to_vec()));
        if let Some((token, n)) = &self.cancel_after {
            if self.sent.len() == *n {
                token.cancel();
            }
        }
        Ok(())
    }

    fn play_note(&mut self, channel: u8, note: u8, velocity: u8) -> Result<(), TransportError> {
        self.notes.push((channel, note, velocity));
        Ok(())
    }
}

/// Delay source that only records requested durations.
#[derive(Debug, Default)]
pub struct NoDelay {
    pub delays: Vec<Duration>,
}

impl Delay for NoDelay {
    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}
