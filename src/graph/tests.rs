use super::*;
use crate::cfb::{Container, ContainerWriter};
use crate::core::*;
use crate::util::{Auid, DecodeErrorKind, EncodeErrorKind, MobId};
use interchange::Rational;

/// Root, MetaDictionary, Header with one Identification, empty Dictionary.
/// Returns the ContentStorage.
fn skeleton(b: &mut GraphBuilder) -> usize {
    let root = b.root();
    let meta = b.add(class::META_DICTIONARY).unwrap();
    b.set_strong(root, pid::ROOT_META_DICTIONARY, meta).unwrap();

    let header = b.add(class::HEADER).unwrap();
    b.set_strong(root, pid::ROOT_HEADER, header).unwrap();
    b.set(header, pid::BYTE_ORDER, Value::Int16(0x4949)).unwrap();
    b.set(header, pid::LAST_MODIFIED, TimeStamp::now()).unwrap();
    b.set(header, pid::VERSION, VersionType { major: 1, minor: 1 }).unwrap();

    let ident = b.add(class::IDENTIFICATION).unwrap();
    b.set(ident, pid::COMPANY_NAME, "Acme").unwrap();
    b.set(ident, pid::PRODUCT_NAME, "graph tests").unwrap();
    b.set(ident, pid::PRODUCT_VERSION_STRING, "0.1").unwrap();
    b.set(ident, pid::PRODUCT_ID, Auid::random()).unwrap();
    b.set(ident, pid::DATE, TimeStamp::now()).unwrap();
    b.set(ident, pid::GENERATION_AUID, Auid::random()).unwrap();
    b.push_strong(header, pid::IDENTIFICATION_LIST, ident).unwrap();

    let dict = b.add(class::DICTIONARY).unwrap();
    b.set_strong(header, pid::DICTIONARY, dict).unwrap();
    let content = b.add(class::CONTENT_STORAGE).unwrap();
    b.set_strong(header, pid::CONTENT, content).unwrap();
    content
}

fn master_mob(b: &mut GraphBuilder, id: MobId, source: MobId) -> usize {
    let mob = b.add(class::MASTER_MOB).unwrap();
    b.set(mob, pid::MOB_ID, id).unwrap();
    b.set(mob, pid::MOB_NAME, "clip").unwrap();
    b.set(mob, pid::MOB_LAST_MODIFIED, TimeStamp::now()).unwrap();
    b.set(mob, pid::CREATION_TIME, TimeStamp::now()).unwrap();

    let slot = b.add(class::TIMELINE_MOB_SLOT).unwrap();
    b.set(slot, pid::SLOT_ID, 1u32).unwrap();
    b.set(slot, pid::EDIT_RATE, Rational::new(24, 1)).unwrap();
    b.set(slot, pid::ORIGIN, 0i64).unwrap();

    let clip = b.add(class::SOURCE_CLIP).unwrap();
    b.set_weak(clip, pid::DATA_DEFINITION, definition_ref(pid::DATA_DEFINITIONS, datadef::PICTURE)).unwrap();
    b.set(clip, pid::LENGTH, 48i64).unwrap();
    b.set(clip, pid::SOURCE_ID, source).unwrap();
    b.set(clip, pid::SOURCE_MOB_SLOT_ID, 1u32).unwrap();
    b.set(clip, pid::START_TIME, 0i64).unwrap();

    b.set_strong(slot, pid::SEGMENT, clip).unwrap();
    b.push_strong(mob, pid::SLOTS, slot).unwrap();
    mob
}

fn write(graph: &RawGraph, table: &ClassTable) -> Vec<u8> {
    let mut w = ContainerWriter::create();
    write_graph(graph, table, &mut w).unwrap();
    w.finalize_to_vec().unwrap()
}

fn read(bytes: Vec<u8>) -> crate::util::Result<ResolvedGraph> {
    let c = Container::from_vec(bytes)?;
    let table = load_class_dictionary(&c)?;
    let raw = load_graph(&c, &table, None, &LoadStats::default())?;
    resolve(raw, table)
}

#[test]
fn test_write_then_load() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let content = skeleton(&mut b);
    let a = MobId::new_umid();
    let m = master_mob(&mut b, a, MobId::ZERO);
    b.insert_strong(content, pid::MOBS, m).unwrap();
    let (graph, table) = b.finish();

    let g = read(write(&graph, &table)).unwrap();
    assert_eq!(g.len(), graph.len());

    let mob = g.object(g.mob(a).unwrap());
    assert_eq!(mob.class(), class::MASTER_MOB);
    assert_eq!(mob.string(pid::MOB_NAME), Some("clip"));
    assert_eq!(mob.parent().unwrap().class(), class::CONTENT_STORAGE);

    let slots = mob.strong_vec(pid::SLOTS);
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].rational(pid::EDIT_RATE), Some(Rational::new(24, 1)));
    let clip = slots[0].strong(pid::SEGMENT).unwrap();
    assert!(clip.is_a(class::SOURCE_REFERENCE));
    assert_eq!(clip.i64(pid::LENGTH), Some(48));
    assert_eq!(clip.weak_auid(pid::DATA_DEFINITION), Some(datadef::PICTURE));
    assert_eq!(clip.weak_target(pid::DATA_DEFINITION), Some(WeakTarget::Builtin(datadef::PICTURE)));
    assert!(clip.referenced_mob(pid::SOURCE_ID).is_none());
}

#[test]
fn test_rewrite_is_stable() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let content = skeleton(&mut b);
    let src = MobId::new_umid();
    let a = master_mob(&mut b, src, MobId::ZERO);
    let c = master_mob(&mut b, MobId::new_umid(), src);
    b.insert_strong(content, pid::MOBS, a).unwrap();
    b.insert_strong(content, pid::MOBS, c).unwrap();
    let (graph, table) = b.finish();

    let first = write(&graph, &table);
    let g = read(first.clone()).unwrap();
    let second = write(&g.raw, &g.table);
    assert_eq!(first, second);
}

#[test]
fn test_dangling_mob_reference() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let content = skeleton(&mut b);
    let missing = MobId::new_umid();
    let m = master_mob(&mut b, MobId::new_umid(), missing);
    b.insert_strong(content, pid::MOBS, m).unwrap();
    let (graph, table) = b.finish();

    let err = read(write(&graph, &table)).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::DanglingReference));
    assert!(err.to_string().contains(&missing.to_string()));
}

#[test]
fn test_shared_child_refused_on_write() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    let content = skeleton(&mut b);
    let m = master_mob(&mut b, MobId::new_umid(), MobId::ZERO);
    b.insert_strong(content, pid::MOBS, m).unwrap();
    b.insert_strong(content, pid::MOBS, m).unwrap();
    let (graph, table) = b.finish();

    let mut w = ContainerWriter::create();
    let err = write_graph(&graph, &table, &mut w).unwrap_err();
    assert_eq!(err.encode_kind(), Some(EncodeErrorKind::Layout));
}

#[test]
fn test_cancel_before_first_level() {
    let mut b = GraphBuilder::new(ClassTable::builtin());
    skeleton(&mut b);
    let (graph, table) = b.finish();
    let c = Container::from_vec(write(&graph, &table)).unwrap();
    let flag = std::sync::atomic::AtomicBool::new(true);
    let stats = LoadStats::default();
    let err = load_graph(&c, &table, Some(&flag), &stats).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::Cancelled));
    assert_eq!(stats.instances(), 0);
}
