//! Container round-trip and corruption tests.

use std::io::Cursor;

use super::*;
use crate::util::{Auid, DecodeErrorKind, EncodeErrorKind};

fn sample_clsid() -> Auid {
    Auid::new(0x0d010101, 0x0101, 0x2f00, [0x06, 0x0e, 0x2b, 0x34, 0x02, 0x06, 0x01, 0x01])
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn u32_at(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

fn put_u32(b: &mut [u8], off: usize, v: u32) {
    b[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

#[test]
fn test_roundtrip_both_versions() {
    for size in [SectorSize::S512, SectorSize::S4096] {
        let mut w = ContainerWriter::create().with_sector_size(size);
        w.create_storage("Header-2", sample_clsid()).unwrap();
        w.write_stream("Header-2/properties", pattern(100, 1)).unwrap();
        w.write_stream("big", pattern(10_000, 2)).unwrap();
        w.write_stream("Header-2/Content-3b03/properties", pattern(4095, 3)).unwrap();
        w.write_stream("empty", Vec::new()).unwrap();
        let bytes = w.finalize_to_vec().unwrap();
        assert_eq!(bytes.len() % size.size(), 0);

        let c = Container::from_bytes(&bytes).unwrap();
        assert_eq!(c.sector_size(), size);
        assert_eq!(c.read_stream("Header-2/properties").unwrap(), pattern(100, 1));
        assert_eq!(c.read_stream("big").unwrap(), pattern(10_000, 2));
        assert_eq!(c.read_stream("Header-2/Content-3b03/properties").unwrap(), pattern(4095, 3));
        assert!(c.read_stream("empty").unwrap().is_empty());

        let hdr = c.entry("Header-2").unwrap();
        assert!(c.is_storage(hdr));
        assert_eq!(c.clsid(hdr), sample_clsid());
        assert_eq!(c.path_of(c.entry("Header-2/Content-3b03").unwrap()), "Header-2/Content-3b03");
        assert!(c.entry("Header-2/missing").is_none());
    }
}

#[test]
fn test_random_access() {
    let mut w = ContainerWriter::create().with_sector_size(SectorSize::S512);
    w.write_stream("data", pattern(5000, 9)).unwrap();
    w.write_stream("small", pattern(300, 4)).unwrap();
    let bytes = w.finalize_to_vec().unwrap();
    let c = Container::from_bytes(&bytes).unwrap();

    let id = c.entry("data").unwrap();
    let mut buf = [0u8; 700];
    assert_eq!(c.read_at(id, 1000, &mut buf).unwrap(), 700);
    assert_eq!(&buf[..], &pattern(5000, 9)[1000..1700]);
    assert_eq!(c.read_at(id, 4900, &mut buf).unwrap(), 100);
    assert_eq!(c.read_at(id, 6000, &mut buf).unwrap(), 0);

    let id = c.entry("small").unwrap();
    let mut buf = [0u8; 100];
    assert_eq!(c.read_at(id, 60, &mut buf).unwrap(), 100);
    assert_eq!(&buf[..], &pattern(300, 4)[60..160]);
}

#[test]
fn test_open_from_stream() {
    let mut w = ContainerWriter::create();
    w.write_stream("a/b/c", b"hello".to_vec()).unwrap();
    let mut out = Vec::new();
    w.finalize(&mut out).unwrap();

    let c = Container::open(Cursor::new(out)).unwrap();
    assert_eq!(c.read_stream("a/b/c").unwrap(), b"hello");
    let a = c.entry("a").unwrap();
    let names: Vec<&str> = c.children(a).map(|e| c.name(e)).collect();
    assert_eq!(names, vec!["b"]);
}

#[test]
fn test_many_entries_sorted_children() {
    let mut w = ContainerWriter::create().with_sector_size(SectorSize::S512);
    for i in 0..200 {
        w.write_stream(&format!("dir/item{{{i:x}}}"), pattern(i + 1, i as u8)).unwrap();
    }
    let bytes = w.finalize_to_vec().unwrap();
    let c = Container::from_bytes(&bytes).unwrap();
    let dir = c.entry("dir").unwrap();
    let names: Vec<String> = c.children(dir).map(|e| c.name(e).to_string()).collect();
    assert_eq!(names.len(), 200);
    for pair in names.windows(2) {
        assert!(compare_names(&pair[0], &pair[1]).is_lt());
    }
    assert_eq!(c.read_stream("dir/item{c7}").unwrap(), pattern(200, 199));
}

#[test]
fn test_difat_chain() {
    // Enough sectors to need more than 109 FAT sectors at 512 bytes.
    let mut w = ContainerWriter::create().with_sector_size(SectorSize::S512);
    let big = pattern(110 * 128 * 512, 5);
    w.write_stream("huge", big.clone()).unwrap();
    let bytes = w.finalize_to_vec().unwrap();
    let h = Header::parse(&bytes).unwrap();
    assert!(h.num_fat_sectors > 109);
    assert!(h.num_difat_sectors >= 1);
    let c = Container::from_bytes(&bytes).unwrap();
    assert_eq!(c.read_stream("huge").unwrap(), big);
}

#[test]
fn test_name_limits() {
    let mut w = ContainerWriter::create();
    let err = w.write_stream(&"n".repeat(32), vec![1]).unwrap_err();
    assert_eq!(err.encode_kind(), Some(EncodeErrorKind::NameTooLong));
    assert!(w.write_stream(&"n".repeat(31), vec![1]).is_ok());

    w.write_stream("Same", vec![1]).unwrap();
    w.write_stream("SAME", vec![2]).unwrap();
    let err = w.finalize_to_vec().unwrap_err();
    assert_eq!(err.encode_kind(), Some(EncodeErrorKind::Layout));
}

#[test]
fn test_bad_magic() {
    let mut w = ContainerWriter::create();
    w.write_stream("x", vec![1, 2, 3]).unwrap();
    let mut bytes = w.finalize_to_vec().unwrap();
    bytes[3] = 0;
    let err = Container::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::Header));
}

/// v3 file whose first allocation is a 16-sector stream starting at sector 0.
fn big_stream_v3() -> Vec<u8> {
    let mut w = ContainerWriter::create().with_sector_size(SectorSize::S512);
    w.write_stream("big", pattern(8192, 7)).unwrap();
    w.finalize_to_vec().unwrap()
}

fn fat_offset(bytes: &[u8]) -> usize {
    let first_fat = u32_at(bytes, DIFAT_OFFSET);
    sector_offset(first_fat, 9) as usize
}

#[test]
fn test_truncated_chain() {
    let mut bytes = big_stream_v3();
    let fo = fat_offset(&bytes);
    assert_eq!(u32_at(&bytes, fo), 1);
    put_u32(&mut bytes, fo + 4 * 3, ENDOFCHAIN);
    let err = Container::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::AllocationTable));

    let mut bytes = big_stream_v3();
    let fo = fat_offset(&bytes);
    put_u32(&mut bytes, fo + 4 * 5, FREESECT);
    let err = Container::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::AllocationTable));
}

#[test]
fn test_cyclic_chain() {
    let mut bytes = big_stream_v3();
    let fo = fat_offset(&bytes);
    put_u32(&mut bytes, fo + 4 * 4, 2);
    let err = Container::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::AllocationTable));
    assert!(err.to_string().contains("cyclic"));
}

#[test]
fn test_truncated_file() {
    let bytes = big_stream_v3();
    let cut = &bytes[..1536];
    let err = Container::from_bytes(cut).unwrap_err();
    assert!(err.decode_kind().is_some_and(|k| k.is_container()));
}

#[test]
fn test_directory_out_of_range() {
    let mut w = ContainerWriter::create().with_sector_size(SectorSize::S512);
    w.write_stream("x", vec![1, 2, 3]).unwrap();
    let mut bytes = w.finalize_to_vec().unwrap();
    let dir = sector_offset(u32_at(&bytes, FIRST_DIR_SECTOR_OFFSET), 9) as usize;
    put_u32(&mut bytes, dir + 76, 500);
    let err = Container::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::Directory));
    assert!(err.to_string().contains("offset"));
}

#[test]
fn test_directory_loop() {
    let mut w = ContainerWriter::create().with_sector_size(SectorSize::S512);
    w.write_stream("x", vec![1, 2, 3]).unwrap();
    let mut bytes = w.finalize_to_vec().unwrap();
    let dir = sector_offset(u32_at(&bytes, FIRST_DIR_SECTOR_OFFSET), 9) as usize;
    // entry 1 ("x") points its left sibling at itself
    put_u32(&mut bytes, dir + DIR_ENTRY_SIZE + 68, 1);
    let err = Container::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.decode_kind(), Some(DecodeErrorKind::Directory));
}
