//! Integration tests for encoding timelines and decoding them back.

use std::io::Cursor;

use aaf::{
    Clip, DecodeOptions, Decoder, Effect, EncodeOptions, Encoder, Gap, Item, Marker, MediaReference,
    MetadataEncoding, MetadataValue, Nested, Rational, RationalTime, SerializableObject, TimeRange, Timeline, Track,
    TrackKind, Transition,
};
use aaf::core::{class, pid, Value};
use aaf::mapper::{encode_timelines, ORIGINAL_NAME};
use tempfile::NamedTempFile;

fn r24() -> Rational {
    Rational::whole(24)
}

fn rt(v: i64) -> RationalTime {
    RationalTime::new(v, r24())
}

fn encode(tl: &Timeline) -> Vec<u8> {
    let mut out = Vec::new();
    aaf::encode(tl, &mut out).expect("encode");
    out
}

fn decode(bytes: &[u8]) -> Timeline {
    aaf::decode(Cursor::new(bytes)).expect("decode")
}

/// Clip A, one second dissolve, clip B, a gap; one audio track.
fn sample_timeline() -> Timeline {
    let media = MediaReference::new("A001C003").with_available_range(TimeRange::from_units(86400, 480, r24()));

    let mut v1 = Track::new("V1", TrackKind::Video, r24());
    let mut a = Clip::new("A001C003", TimeRange::from_units(86410, 36, r24())).with_media(media.clone());
    a.metadata.insert("take".into(), MetadataValue::Int(3));
    v1.push(a);
    v1.push(Transition::dissolve(rt(12), rt(12)));
    v1.push(Clip::new("B", TimeRange::from_units(112, 36, r24())));
    v1.push(Gap::new(rt(24)));
    v1.markers.push(Marker::new("check focus", TimeRange::from_units(50, 1, r24())).with_color("RED"));

    let mut a1 = Track::new("A1", TrackKind::Audio, r24());
    a1.push(Clip::new("A001C003", TimeRange::from_units(86410, 120, r24())).with_media(media));

    let mut tl = Timeline::new("Edit 1", r24());
    tl.global_start_time = Some(rt(86400));
    tl.metadata.insert("project".into(), "demo".into());
    tl.metadata.insert("approved".into(), true.into());
    tl.tracks = vec![v1, a1];
    tl.markers.push(Marker::new("reel start", TimeRange::from_units(0, 0, r24())));
    tl
}

#[test]
fn test_roundtrip_timeline() {
    let tl = sample_timeline();
    let back = decode(&encode(&tl));
    assert_eq!(back, tl);
}

#[test]
fn test_roundtrip_through_file() {
    let tl = sample_timeline();
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    aaf::encode(&tl, temp.reopen().expect("reopen")).expect("encode");

    let file = std::fs::File::open(temp.path()).expect("open");
    let back = aaf::decode(std::io::BufReader::new(file)).expect("decode");
    assert_eq!(back, tl);
}

#[test]
fn test_decode_is_idempotent() {
    let bytes = encode(&sample_timeline());
    assert_eq!(decode(&bytes), decode(&bytes));
}

#[test]
fn test_dissolve_scenario() {
    let bytes = encode(&sample_timeline());
    for pass in 0..2 {
        let tl = if pass == 0 { decode(&bytes) } else { decode(&encode(&decode(&bytes))) };
        let v1 = &tl.tracks[0];
        let kinds: Vec<_> = v1.items.iter().take(3).map(Item::kind_name).collect();
        assert_eq!(kinds, ["Clip", "Transition", "Clip"]);

        let Item::Transition(t) = &v1.items[1] else { panic!("not a transition") };
        assert_eq!(t.duration().to_seconds(), 1.0);

        let ranges = v1.item_ranges();
        assert_eq!(ranges[0].end_time_exclusive(), ranges[2].start_time);
        assert_eq!(v1.duration(), rt(96));
    }
}

#[test]
fn test_shared_media_between_tracks() {
    let tl = decode(&encode(&sample_timeline()));
    let Item::Clip(v) = &tl.tracks[0].items[0] else { panic!() };
    let Item::Clip(a) = &tl.tracks[1].items[0] else { panic!() };
    assert_eq!(v.media_reference, a.media_reference);
    let media = v.media_reference.as_ref().expect("media");
    assert_eq!(media.available_range, Some(TimeRange::from_units(86400, 480, r24())));
}

#[test]
fn test_roundtrip_speed_effect() {
    let mut clip = Clip::new("fast", TimeRange::from_units(10, 24, r24()));
    clip.effects.push(Effect::LinearTimeWarp { time_scalar: Rational::whole(2) });
    let mut track = Track::new("V1", TrackKind::Video, r24());
    track.push(clip);
    let mut tl = Timeline::new("speed", r24());
    tl.tracks.push(track);

    let back = decode(&encode(&tl));
    assert_eq!(back, tl);

    let mut decoder = Decoder::new(Cursor::new(encode(&tl)));
    let opts = DecodeOptions::default().with_transcribe_linear_speed_effects(false);
    let obj = decoder.decode_with_options(&opts).expect("decode");
    let item = &obj.timelines()[0].tracks[0].items[0];
    assert!(matches!(item, Item::Opaque(o) if o.kind == "OperationGroup"));
}

fn nested_timeline() -> Timeline {
    let mut inner = Track::new("V1", TrackKind::Video, r24());
    inner.push(Clip::new("shot", TimeRange::from_units(100, 48, r24())));
    let mut nested = Nested::new("precomp", TimeRange::from_units(12, 24, r24()));
    nested.tracks.push(inner);
    nested.metadata.insert("layer".into(), "fx".into());

    let mut track = Track::new("V1", TrackKind::Video, r24());
    track.push(nested);
    track.push(Clip::new("after", TimeRange::from_units(0, 10, r24())));
    let mut tl = Timeline::new("nested", r24());
    tl.tracks.push(track);
    tl
}

#[test]
fn test_roundtrip_nested() {
    let tl = nested_timeline();
    assert_eq!(decode(&encode(&tl)), tl);
}

#[test]
fn test_simplified_decode() {
    let bytes = encode(&nested_timeline());
    let opts = DecodeOptions::default().with_simplified(true);
    let obj = Decoder::new(Cursor::new(bytes.clone())).decode_with_options(&opts).expect("decode");
    let SerializableObject::Timeline(tl) = obj else { panic!("expected a bare timeline") };
    let Item::Clip(c) = &tl.tracks[0].items[0] else { panic!("nested kept") };
    assert_eq!(c.name, "shot");
    assert_eq!(c.source_range, TimeRange::from_units(112, 24, r24()));

    let obj = Decoder::new(Cursor::new(bytes)).decode_with_options(&DecodeOptions::default()).expect("decode");
    assert!(matches!(obj, SerializableObject::Collection(c) if c.timelines.len() == 1));
}

#[test]
fn test_attach_markers() {
    let bytes = encode(&sample_timeline());
    let opts = DecodeOptions::default().with_attach_markers(true);
    let obj = Decoder::new(Cursor::new(bytes)).decode_with_options(&opts).expect("decode");
    let tl = &obj.timelines()[0];
    let v1 = &tl.tracks[0];
    assert!(v1.markers.is_empty());
    // 50 falls in clip B, which starts at track time 36 and source time 112
    let Item::Clip(b) = &v1.items[2] else { panic!() };
    assert_eq!(b.markers.len(), 1);
    assert_eq!(b.markers[0].marked_range.start_time, rt(126));
    assert_eq!(b.markers[0].color.as_deref(), Some("RED"));
}

#[test]
fn test_rate_override() {
    let bytes = encode(&sample_timeline());
    let opts = DecodeOptions::default().with_rate(Rational::new(30000, 1001));
    let obj = Decoder::new(Cursor::new(bytes)).decode_with_options(&opts).expect("decode");
    assert_eq!(obj.timelines()[0].rate, Rational::new(30000, 1001));
}

#[test]
fn test_encode_options() {
    let mut track = Track::new("V1", TrackKind::Video, r24());
    track.push(Clip::new("Café au lait, second take", TimeRange::from_units(0, 10, r24())));
    let mut tl = Timeline::new("Café", r24());
    tl.tracks.push(track);

    let opts = EncodeOptions::default()
        .with_metadata_encoding(MetadataEncoding::Ascii)
        .with_clip_name_limit(8);
    let mut out = Vec::new();
    Encoder::new(&mut out).encode_with_options(&tl.clone().into(), &opts).expect("encode");

    let back = decode(&out);
    assert_eq!(back.name, "Caf?");
    let Item::Clip(c) = &back.tracks[0].items[0] else { panic!() };
    assert_eq!(c.name, "Caf? au lait, second take");
    assert!(c.metadata.is_empty());

    // the mobs carry the cut name, the clip keeps the full one as a comment
    let (graph, _) = encode_timelines(&[&tl], &opts).expect("encode");
    let master = graph.instances.iter().find(|i| i.class == class::MASTER_MOB).expect("master mob");
    assert_eq!(master.data(pid::MOB_NAME), Some(&Value::String("Caf? au ".into())));

    let clip = graph.instances.iter().find(|i| i.class == class::SOURCE_CLIP && i.get(pid::COMPONENT_USER_COMMENTS).is_some());
    let comments = clip.expect("clip with comments").get(pid::COMPONENT_USER_COMMENTS).expect("comments");
    let [tv] = comments.value.strong_targets() else { panic!("expected one comment") };
    let tv = &graph.instances[*tv];
    assert_eq!(tv.data(pid::TAG_NAME), Some(&Value::String(ORIGINAL_NAME.into())));
    let Some(Value::Indirect(full)) = tv.data(pid::TAG_VALUE) else { panic!("comment has no value") };
    assert_eq!(full.as_string().as_deref(), Some("Caf? au lait, second take"));
}

#[test]
fn test_encode_simplified() {
    let tl = nested_timeline();
    let opts = EncodeOptions::default().with_simplify(true);
    let (graph, _) = encode_timelines(&[&tl], &opts).expect("encode");
    let compositions = graph.instances.iter().filter(|i| i.class == class::COMPOSITION_MOB).count();
    assert_eq!(compositions, 1);

    let mut out = Vec::new();
    Encoder::new(&mut out).encode_with_options(&tl.clone().into(), &opts).expect("encode");
    let back = decode(&out);
    let Item::Clip(c) = &back.tracks[0].items[0] else { panic!("nested kept") };
    assert_eq!(c.name, "shot");
    assert_eq!(c.source_range, TimeRange::from_units(112, 24, r24()));
    assert_eq!(c.metadata.get("layer"), Some(&MetadataValue::from("fx")));
    assert_eq!(back.tracks[0].duration(), tl.tracks[0].duration());
}

#[test]
fn test_multiple_timelines() {
    let mut collection = aaf::Collection::new("reels");
    collection.timelines.push(sample_timeline());
    collection.timelines.push(nested_timeline());
    let mut out = Vec::new();
    Encoder::new(&mut out)
        .encode_with_options(&collection.into(), &EncodeOptions::default())
        .expect("encode");

    let obj = Decoder::new(Cursor::new(out)).decode_with_options(&DecodeOptions::default()).expect("decode");
    let names: Vec<_> = obj.timelines().iter().map(|t| t.name.clone()).collect();
    assert_eq!(names, ["Edit 1", "nested"]);
}
