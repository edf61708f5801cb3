use std::{cell::RefCell, rc::Rc, sync::Arc, time::Duration};

use kit_shadow::{
    persist,
    prelude::*,
    schema::InstrumentLibrary,
    Delay, TransportError,
};

const ROOT: Address = Address::new(0x100);
const SLOT2: Address = Address::new(0x200);

/// A voice with a layer switch at 0 and an overlay at 1:
/// variant 0 holds a numeric depth, variant 1 a short label.
fn voice_schema() -> Arc<Schema> {
    let layered = Field::boolean("Layered", 0);
    let voice = Arc::new(
        Container::new("Voice", 5)
            .with_field(layered.clone())
            .with_overlay(
                DynamicOverlay::new(1, layered.clone())
                    .with_variant(
                        0,
                        Container::new("A", 4).with_field(
                            Field::numeric("Depth", 0, NumericSpec::new(1, 0, 127))
                                .with_default(FieldValue::Numeric(64)),
                        ),
                    )
                    .with_variant(
                        1,
                        Container::new("B", 4).with_field(
                            Field::text("Label", 0, 4).with_default(FieldValue::Text("New".into())),
                        ),
                    ),
            ),
    );
    let node = NodeSchema::new(Description::new("Voice {0}").with_arg(layered), 0, voice.clone())
        .with_detail(DetailSchema::container("Voice", 0, voice));

    let schema = Schema::new(
        SchemaIdentifier::new("Voice", "1"),
        node,
        [(0, 1), (1, 4)],
        Arc::new(InstrumentLibrary::new(0)),
    )
    .with_kit_root(1, ROOT)
    .with_kit_root(2, SLOT2);
    schema.validate().unwrap();
    Arc::new(schema)
}

fn open() -> KitSession {
    let mut session = KitSession::create(voice_schema(), 1).unwrap();
    let root = session.tree().root();
    session.select(root).unwrap();
    session
}

fn row_names(session: &KitSession) -> Vec<String> {
    session
        .page()
        .unwrap()
        .group(GroupId(0))
        .unwrap()
        .rows()
        .iter()
        .map(|r| r.description().to_owned())
        .collect()
}

fn row_text(session: &KitSession, row: usize) -> String {
    session.page().unwrap().row(GroupId(0), row).unwrap().text().to_owned()
}

fn root_label(session: &KitSession) -> String {
    let tree = session.tree();
    tree.node(tree.root()).unwrap().label().to_owned()
}

#[derive(Default)]
struct Seen(RefCell<Vec<Segment>>);

impl DataListener for Seen {
    fn data_changed(&self, segment: Segment) {
        self.0.borrow_mut().push(segment);
    }
}

#[derive(Default)]
struct Capture {
    sent: Vec<(Address, Vec<u8>)>,
}

impl DeviceChannel for Capture {
    fn send_data(&mut self, address: Address, bytes: &[u8]) -> Result<(), TransportError> {
        self.sent.push((address, bytes.to_vec()));
        Ok(())
    }

    fn play_note(&mut self, _channel: u8, _note: u8, _velocity: u8) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Default)]
struct Immediate(usize);

impl Delay for Immediate {
    fn delay(&mut self, _duration: Duration) {
        self.0 += 1;
    }
}

#[test]
fn switching_back_resets_the_variant_to_defaults() {
    let mut session = open();
    assert_eq!(row_names(&session), ["Layered", "Depth"]);
    assert_eq!(root_label(&session), "Voice Off");

    session.enter_edit().unwrap();
    session.write_row(GroupId(0), 1, &FieldValue::Numeric(10)).unwrap();
    assert_eq!(row_text(&session, 1), "10");

    session.write_row(GroupId(0), 0, &FieldValue::Bool(true)).unwrap();
    assert_eq!(row_names(&session), ["Layered", "Label"]);
    assert_eq!(row_text(&session, 1), "New");
    assert_eq!(root_label(&session), "Voice On");

    session.write_row(GroupId(0), 0, &FieldValue::Bool(false)).unwrap();
    assert_eq!(row_names(&session), ["Layered", "Depth"]);
    assert_eq!(row_text(&session, 1), "64");
    assert_eq!(session.variant_switches(), 2);

    let groups = session.detail_index().lookup(ROOT + 1);
    assert_eq!(groups, &[GroupId(0)]);
    session.commit().unwrap();
}

#[test]
fn rejected_text_leaves_the_store_untouched() {
    let mut session = open();
    session.enter_edit().unwrap();
    let before = session.store().segment_bytes(ROOT + 1).unwrap().to_vec();

    assert!(!session.set_row_text(GroupId(0), 1, "deep").unwrap());
    assert!(!session.page().unwrap().row(GroupId(0), 1).unwrap().valid());
    assert_eq!(session.store().segment_bytes(ROOT + 1).unwrap(), &before[..]);
}

#[test]
fn rows_are_read_only_outside_edit_mode() {
    let mut session = open();
    let result = session.write_row(GroupId(0), 1, &FieldValue::Numeric(3));
    assert!(matches!(result, Err(KitError::InvariantViolation(_))));
}

#[test]
fn cancel_restores_the_image_without_resetting() {
    let mut session = open();
    let seen = Rc::new(Seen::default());
    session.store_mut().subscribe(&seen);

    session.enter_edit().unwrap();
    session.write_row(GroupId(0), 0, &FieldValue::Bool(true)).unwrap();
    session.cancel().unwrap();

    assert_eq!(session.edit_state(), EditState::Viewing);
    assert_eq!(row_names(&session), ["Layered", "Depth"]);
    assert_eq!(row_text(&session, 1), "64");
    assert_eq!(root_label(&session), "Voice Off");
    assert_eq!(session.variant_switches(), 1);
    assert!(!seen.0.borrow().is_empty());
}

#[test]
fn kit_files_round_trip_into_a_new_session() {
    let mut session = open();
    session.enter_edit().unwrap();
    session.write_row(GroupId(0), 0, &FieldValue::Bool(true)).unwrap();
    session.set_row_text(GroupId(0), 1, "Pad").unwrap();
    session.commit().unwrap();

    let mut file = Vec::new();
    persist::save(session.store(), session.schema(), &mut file).unwrap();

    let schema = session.schema().clone();
    let store = persist::load(file.as_slice(), &schema).unwrap();
    let mut reopened = KitSession::new(schema, store, ROOT).unwrap();
    let root = reopened.tree().root();
    reopened.select(root).unwrap();

    assert_eq!(root_label(&reopened), "Voice On");
    assert_eq!(row_names(&reopened), ["Layered", "Label"]);
    assert_eq!(row_text(&reopened, 1), "Pad");
}

#[test]
fn copy_to_another_slot_and_sync_changes() {
    let mut session = open();
    let mut sync = DeviceSync::with_delay(Capture::default(), Immediate::default(), SyncConfig::new());

    let outcome = session.copy_to_device(&mut sync, 2).unwrap();
    assert_eq!(outcome, SyncOutcome::Completed { sent: 2 });
    let starts: Vec<Address> = sync.channel().sent.iter().map(|(a, _)| *a).collect();
    assert_eq!(starts, [SLOT2, SLOT2 + 1]);
    assert_eq!(sync.delay_source().0, 2);
    assert!(!session.store().any_dirty());

    session.enter_edit().unwrap();
    session.write_row(GroupId(0), 1, &FieldValue::Numeric(7)).unwrap();
    session.commit().unwrap();

    let outcome = session.sync_dirty(&mut sync).unwrap();
    assert_eq!(outcome, SyncOutcome::Completed { sent: 1 });
    let (address, bytes) = sync.channel().sent.last().unwrap();
    assert_eq!(*address, ROOT + 1);
    assert_eq!(bytes[0], 7);
    assert!(!session.store().any_dirty());
}

#[test]
fn cancelled_copy_stops_before_the_next_segment() {
    let session = open();
    let mut sync = DeviceSync::with_delay(Capture::default(), Immediate::default(), SyncConfig::new());
    sync.cancel_token().cancel();

    let outcome = session.copy_to_device(&mut sync, 2).unwrap();
    assert_eq!(outcome, SyncOutcome::Cancelled { sent: 0, remaining: 2 });
    assert!(sync.channel().sent.is_empty());
}
