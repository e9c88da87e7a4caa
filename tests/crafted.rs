//! Integration tests decoding hand-built object graphs.

use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use aaf::cfb::ContainerWriter;
use aaf::core::{
    class, datadef, opdef, pid, usage, ClassDef, ClassTable, PropertyDef, TimeStamp, TypeTag, Value, VersionType,
};
use aaf::graph::{definition_ref, write_graph, GraphBuilder};
use aaf::mapper::{write_class_definitions, RESERVED_KEY};
use aaf::{
    Auid, Clip, DecodeErrorKind, DecodeOptions, Decoder, EncodeErrorKind, Error, Item, MobId, Rational, TimeRange,
    Timeline, Track, TrackKind,
};

/// Root, MetaDictionary, Header and ContentStorage. Returns the
/// MetaDictionary and the ContentStorage.
fn skeleton(b: &mut GraphBuilder, version: VersionType) -> (usize, usize) {
    let root = b.root();
    let meta = b.add(class::META_DICTIONARY).unwrap();
    b.set_strong(root, pid::ROOT_META_DICTIONARY, meta).unwrap();

    let header = b.add(class::HEADER).unwrap();
    b.set_strong(root, pid::ROOT_HEADER, header).unwrap();
    b.set(header, pid::BYTE_ORDER, Value::Int16(0x4949)).unwrap();
    b.set(header, pid::LAST_MODIFIED, TimeStamp::now()).unwrap();
    b.set(header, pid::VERSION, version).unwrap();

    let ident = b.add(class::IDENTIFICATION).unwrap();
    b.set(ident, pid::COMPANY_NAME, "Acme").unwrap();
    b.set(ident, pid::PRODUCT_NAME, "crafted").unwrap();
    b.set(ident, pid::PRODUCT_VERSION_STRING, "1").unwrap();
    b.set(ident, pid::PRODUCT_ID, aaf::Auid::random()).unwrap();
    b.set(ident, pid::DATE, TimeStamp::now()).unwrap();
    b.set(ident, pid::GENERATION_AUID, aaf::Auid::random()).unwrap();
    b.push_strong(header, pid::IDENTIFICATION_LIST, ident).unwrap();

    let dict = b.add(class::DICTIONARY).unwrap();
    b.set_strong(header, pid::DICTIONARY, dict).unwrap();
    let content = b.add(class::CONTENT_STORAGE).unwrap();
    b.set_strong(header, pid::CONTENT, content).unwrap();
    (meta, content)
}

fn picture(b: &mut GraphBuilder, obj: usize) {
    b.set_weak(obj, pid::DATA_DEFINITION, definition_ref(pid::DATA_DEFINITIONS, datadef::PICTURE)).unwrap();
}

/// A top-level CompositionMob with one video slot, a sequence of `components`.
fn composition(b: &mut GraphBuilder, content: usize, components: &[usize], length: i64) {
    let mob = b.add(class::COMPOSITION_MOB).unwrap();
    b.set(mob, pid::MOB_ID, MobId::new_umid()).unwrap();
    b.set(mob, pid::MOB_NAME, "crafted").unwrap();
    b.set(mob, pid::MOB_LAST_MODIFIED, TimeStamp::now()).unwrap();
    b.set(mob, pid::CREATION_TIME, TimeStamp::now()).unwrap();
    b.set(mob, pid::USAGE_CODE, usage::TOP_LEVEL).unwrap();

    let slot = b.add(class::TIMELINE_MOB_SLOT).unwrap();
    b.set(slot, pid::SLOT_ID, 1u32).unwrap();
    b.set(slot, pid::SLOT_NAME, "V1").unwrap();
    b.set(slot, pid::EDIT_RATE, Rational::whole(24)).unwrap();
    b.set(slot, pid::ORIGIN, 0i64).unwrap();

    let seq = b.add(class::SEQUENCE).unwrap();
    picture(b, seq);
    b.set(seq, pid::LENGTH, length).unwrap();
    for &c in components {
        b.push_strong(seq, pid::COMPONENTS, c).unwrap();
    }
    b.set_strong(slot, pid::SEGMENT, seq).unwrap();
    b.push_strong(mob, pid::SLOTS, slot).unwrap();
    b.insert_strong(content, pid::MOBS, mob).unwrap();
}

fn finish(b: GraphBuilder) -> Vec<u8> {
    let (graph, table) = b.finish();
    let mut w = ContainerWriter::create();
    write_graph(&graph, &table, &mut w).unwrap();
    w.finalize_to_vec().unwrap()
}

fn filler(b: &mut GraphBuilder, length: i64) -> usize {
    let f = b.add(class::FILLER).unwrap();
    picture(b, f);
    b.set(f, pid::LENGTH, length).unwrap();
    f
}

fn v1_1() -> VersionType {
    VersionType { major: 1, minor: 1 }
}

/// An OperationGroup the mapper does not interpret, over one Filler.
fn repeat_effect_file() -> Vec<u8> {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let (_, content) = skeleton(&mut b, v1_1());
    let og = b.add(class::OPERATION_GROUP).unwrap();
    picture(&mut b, og);
    b.set(og, pid::LENGTH, 48i64).unwrap();
    b.set_weak(og, pid::OPERATION, definition_ref(pid::OPERATION_DEFINITIONS, opdef::VIDEO_REPEAT)).unwrap();
    let filler = b.add(class::FILLER).unwrap();
    picture(&mut b, filler);
    b.set(filler, pid::LENGTH, 12i64).unwrap();
    b.push_strong(og, pid::INPUT_SEGMENTS, filler).unwrap();
    composition(&mut b, content, &[og], 48);
    finish(b)
}

#[test]
fn test_version_gate() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let (_, content) = skeleton(&mut b, VersionType { major: 2, minor: 0 });
    let filler = b.add(class::FILLER).unwrap();
    picture(&mut b, filler);
    composition(&mut b, content, &[filler], 0);

    let mut decoder = Decoder::new(Cursor::new(finish(b)));
    match decoder.decode() {
        Err(Error::UnsupportedVersion(e)) => assert_eq!(e.version, "2.0"),
        other => panic!("expected a version error, got {other:?}"),
    }
    assert_eq!(decoder.stats().instances(), 0);
}

#[test]
fn test_dangling_source_reference() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let (_, content) = skeleton(&mut b, v1_1());
    let missing = MobId::new_umid();
    let clip = b.add(class::SOURCE_CLIP).unwrap();
    picture(&mut b, clip);
    b.set(clip, pid::LENGTH, 24i64).unwrap();
    b.set(clip, pid::START_TIME, 0i64).unwrap();
    b.set(clip, pid::SOURCE_ID, missing).unwrap();
    b.set(clip, pid::SOURCE_MOB_SLOT_ID, 1u32).unwrap();
    composition(&mut b, content, &[clip], 24);

    let err = aaf::decode(Cursor::new(finish(b))).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::DanglingReference));
    assert!(err.to_string().contains(&missing.to_string()));
}

#[test]
fn test_no_composition() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let (_, content) = skeleton(&mut b, v1_1());
    let mob = b.add(class::MASTER_MOB).unwrap();
    b.set(mob, pid::MOB_ID, MobId::new_umid()).unwrap();
    b.set(mob, pid::MOB_LAST_MODIFIED, TimeStamp::now()).unwrap();
    b.set(mob, pid::CREATION_TIME, TimeStamp::now()).unwrap();
    let slot = b.add(class::TIMELINE_MOB_SLOT).unwrap();
    b.set(slot, pid::SLOT_ID, 1u32).unwrap();
    b.set(slot, pid::EDIT_RATE, Rational::whole(24)).unwrap();
    b.set(slot, pid::ORIGIN, 0i64).unwrap();
    let filler = b.add(class::FILLER).unwrap();
    picture(&mut b, filler);
    b.set_strong(slot, pid::SEGMENT, filler).unwrap();
    b.push_strong(mob, pid::SLOTS, slot).unwrap();
    b.insert_strong(content, pid::MOBS, mob).unwrap();

    let err = aaf::decode(Cursor::new(finish(b))).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::NoComposition));
}

#[test]
fn test_opaque_preserved() {
    let first = aaf::decode(Cursor::new(repeat_effect_file())).expect("decode");
    let Item::Opaque(o1) = &first.tracks[0].items[0] else { panic!("not opaque") };
    assert_eq!(o1.kind, "OperationGroup");
    assert_eq!(o1.duration.value, 48);

    let mut bytes = Vec::new();
    aaf::encode(&first, &mut bytes).expect("encode");
    let second = aaf::decode(Cursor::new(bytes)).expect("decode");
    let Item::Opaque(o2) = &second.tracks[0].items[0] else { panic!("not opaque") };
    assert_eq!(o2.payload, o1.payload);
    assert_eq!(second, first);
}

#[test]
fn test_cancelled_decode() {
    let flag = Arc::new(AtomicBool::new(true));
    let opts = DecodeOptions::default().with_cancel(flag);
    let err = Decoder::new(Cursor::new(repeat_effect_file())).decode_with_options(&opts).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::Cancelled));
}

#[test]
fn test_truncated_container() {
    let mut tl = Timeline::new("cut", Rational::whole(24));
    let mut track = Track::new("V1", TrackKind::Video, Rational::whole(24));
    for i in 0..64 {
        track.push(Clip::new(format!("clip {i}"), TimeRange::from_units(0, 24, Rational::whole(24))));
    }
    tl.tracks.push(track);
    let mut bytes = Vec::new();
    aaf::encode(&tl, &mut bytes).expect("encode");

    let sector = 4096;
    let cut = (bytes.len() / 2) / sector * sector;
    bytes.truncate(cut.max(sector));
    let err = aaf::decode(Cursor::new(bytes)).unwrap_err();
    assert!(err.decode_kind().is_some_and(|k| k.is_container()), "unexpected error: {err}");
}

#[test]
fn test_marker_in_sequence() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let (_, content) = skeleton(&mut b, v1_1());
    let head = b.add(class::COMMENT_MARKER).unwrap();
    picture(&mut b, head);
    b.set(head, pid::COMMENT, "head").unwrap();
    let first = filler(&mut b, 10);
    let focus = b.add(class::DESCRIPTIVE_MARKER).unwrap();
    picture(&mut b, focus);
    b.set(focus, pid::LENGTH, 5i64).unwrap();
    b.set(focus, pid::COMMENT, "focus").unwrap();
    let second = filler(&mut b, 10);
    composition(&mut b, content, &[head, first, focus, second], 25);

    let tl = aaf::decode(Cursor::new(finish(b))).expect("decode");
    let track = &tl.tracks[0];
    let kinds: Vec<_> = track.items.iter().map(Item::kind_name).collect();
    assert_eq!(kinds, ["Gap", "Gap", "Gap"]);
    assert_eq!(track.duration().value, 25);
    let placed: Vec<_> = track.markers.iter().map(|m| (m.name.as_str(), m.marked_range)).collect();
    assert_eq!(
        placed,
        [
            ("head", TimeRange::from_units(0, 0, Rational::whole(24))),
            ("focus", TimeRange::from_units(10, 5, Rational::whole(24))),
        ]
    );
    assert!(tl.markers.is_empty());

    let mut bytes = Vec::new();
    aaf::encode(&tl, &mut bytes).expect("encode");
    assert_eq!(aaf::decode(Cursor::new(bytes)).expect("decode"), tl);
}

#[test]
fn test_transition_start_overflow() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let (_, content) = skeleton(&mut b, v1_1());
    let lead = filler(&mut b, 10);
    let tr = b.add(class::TRANSITION).unwrap();
    picture(&mut b, tr);
    b.set(tr, pid::LENGTH, 4i64).unwrap();
    b.set(tr, pid::CUT_POINT, 2i64).unwrap();
    let clip = b.add(class::SOURCE_CLIP).unwrap();
    picture(&mut b, clip);
    b.set(clip, pid::LENGTH, 24i64).unwrap();
    b.set(clip, pid::START_TIME, i64::MAX - 1).unwrap();
    b.set(clip, pid::SOURCE_ID, MobId::ZERO).unwrap();
    b.set(clip, pid::SOURCE_MOB_SLOT_ID, 0u32).unwrap();
    composition(&mut b, content, &[lead, tr, clip], 30);

    let err = aaf::decode(Cursor::new(finish(b))).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::Structure), "unexpected error: {err}");
}

#[test]
fn test_track_length_overflow() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let (_, content) = skeleton(&mut b, v1_1());
    let short = filler(&mut b, 10);
    let endless = filler(&mut b, i64::MAX);
    composition(&mut b, content, &[short, endless], i64::MAX);

    let tl = aaf::decode(Cursor::new(finish(b))).expect("decode");
    assert_eq!(tl.tracks[0].items.len(), 2);
    let err = aaf::encode(&tl, Vec::new()).unwrap_err();
    assert_eq!(err.encode_kind(), Some(EncodeErrorKind::Layout), "unexpected error: {err}");
}

#[test]
fn test_vendor_extensions_roundtrip() {
    let vendor = Auid::new(0x1234_5678, 0x0001, 0x0002, [9; 8]);
    let mut table = ClassTable::builtin();
    table.register(ClassDef {
        id: vendor,
        name: "VendorEffect".into(),
        parent: Some(class::SEGMENT),
        concrete: true,
        properties: vec![PropertyDef::new(0xFFF0, "Knob", TypeTag::Int32).optional()],
    });
    let mut weighted = table.get(class::FILLER).expect("filler class").clone();
    weighted.properties = vec![PropertyDef::new(0xFFF1, "Weight", TypeTag::Int32).optional()];
    table.register(weighted);

    let mut b = GraphBuilder::new(table);
    let (meta, content) = skeleton(&mut b, v1_1());
    let effect = b.add(vendor).unwrap();
    picture(&mut b, effect);
    b.set(effect, pid::LENGTH, 24i64).unwrap();
    b.set(effect, 0xFFF0, Value::Int32(7)).unwrap();
    let gap = filler(&mut b, 10);
    b.set(gap, 0xFFF1, Value::Int32(3)).unwrap();
    composition(&mut b, content, &[effect, gap], 34);
    write_class_definitions(&mut b, meta).unwrap();

    let first = aaf::decode(Cursor::new(finish(b))).expect("decode");
    let items = &first.tracks[0].items;
    let Item::Opaque(o) = &items[0] else { panic!("vendor segment not opaque") };
    assert_eq!(o.kind, "VendorEffect");
    assert_eq!(o.duration.value, 24);
    let Item::Gap(g) = &items[1] else { panic!("filler not a gap") };
    assert_eq!(g.duration.value, 10);
    assert!(g.metadata.contains_key(RESERVED_KEY));

    let mut bytes = Vec::new();
    aaf::encode(&first, &mut bytes).expect("encode");
    let second = aaf::decode(Cursor::new(bytes)).expect("decode");
    assert_eq!(second, first);
}
