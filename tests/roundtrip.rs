//! Whole-file read/normalize/write round trips against a small synthetic
//! Matroska stream: one `EBML` header and one `Segment` holding `Info`,
//! an empty `Tracks`, and a `Cluster` with one opaque child standing in
//! for a block of frame data this engine never needs to understand.
//!
//! Each test reads and writes through the *same* underlying storage, the
//! way this engine is meant to be used: untouched regions are never
//! rewritten because they are already correct on disk, not because the
//! destination happens to start out zeroed.

use mkv_element::header::Header;
use mkv_element::prelude::*;
use mkv_element::schema::{CLUSTER_ID, INFO_ID, SEGMENT_ID};
use mkv_element::sizing;
use std::io::Cursor;

fn encode_unsigned(id: u32, value: u64) -> Vec<u8> {
    let mut bytes = value.to_be_bytes().to_vec();
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes.remove(0);
    }
    let mut out = Header::minimal(id, bytes.len() as u64).unwrap().encode();
    out.extend(bytes);
    out
}

fn encode_text(id: u32, s: &str) -> Vec<u8> {
    let mut out = Header::minimal(id, s.len() as u64).unwrap().encode();
    out.extend(s.as_bytes());
    out
}

fn wrap_master(id: u32, children: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = children.concat();
    let mut out = Header::minimal(id, body.len() as u64).unwrap().encode();
    out.extend(body);
    out
}

/// An unknown 1-byte-id element: falls back to this engine's opaque
/// `Unsupported` kind, standing in for a `SimpleBlock` whose codec payload
/// this engine never parses.
const FRAME_ID: u32 = 0xA3;
const FRAME_BYTE: u8 = 0xAA;

fn frame_bytes() -> Vec<u8> {
    let mut out = Header::minimal(FRAME_ID, 1).unwrap().encode();
    out.push(FRAME_BYTE);
    out
}

fn sample_file(title: &str) -> Vec<u8> {
    let ebml = wrap_master(
        0x1A45_DFA3,
        &[
            encode_unsigned(0x4286, 1),
            encode_unsigned(0x42F7, 1),
            encode_unsigned(0x42F2, 4),
            encode_unsigned(0x42F3, 8),
            encode_text(0x4282, "matroska"),
            encode_unsigned(0x4287, 4),
            encode_unsigned(0x4285, 2),
        ],
    );
    let info = wrap_master(
        INFO_ID,
        &[
            encode_unsigned(0x2AD7_B1, 1_000_000),
            encode_text(0x4D80, "mkv-element-editor"),
            encode_text(0x5741, "test"),
            encode_text(0x7BA9, title),
        ],
    );
    let tracks = wrap_master(0x1654_AE6B, &[]);
    let cluster = wrap_master(CLUSTER_ID, &[frame_bytes()]);
    let segment = wrap_master(SEGMENT_ID, &[info, tracks, cluster]);

    let mut out = ebml;
    out.extend(segment);
    out
}

fn find_cluster(tree: &mkv_element::tree::Tree, segment: mkv_element::tree::ElementId) -> mkv_element::tree::ElementId {
    tree.children(segment)
        .into_iter()
        .find(|&c| tree.ebml_id(c) == CLUSTER_ID)
        .unwrap()
}

fn find_info(tree: &mkv_element::tree::Tree, segment: mkv_element::tree::ElementId) -> mkv_element::tree::ElementId {
    tree.children(segment)
        .into_iter()
        .find(|&c| tree.ebml_id(c) == INFO_ID)
        .unwrap()
}

/// A freshly-built stream should be both readable and writable by this
/// engine, and normalizing it shouldn't disturb the opaque frame byte
/// sitting inside its `Cluster`.
#[test]
fn normalize_preserves_cluster_payload() {
    let mut storage = Cursor::new(sample_file("Before"));
    let mut file = File::open(&mut storage, true).unwrap();
    assert!(file.check_read_handled());
    assert!(file.check_write_handled());

    file.save_changes(&mut storage).unwrap();

    storage.set_position(0);
    let reopened = File::open(&mut storage, true).unwrap();
    let segment = reopened.segments()[0];
    let cluster = find_cluster(reopened.tree(), segment);
    let data_start = reopened.tree().pos_data_absolute(cluster) as usize;
    let frame = frame_bytes();
    let raw = storage.into_inner();
    assert_eq!(&raw[data_start..data_start + frame.len()], &frame[..]);
}

/// Growing `Info > Title` enough to force the element to be rearranged
/// should still leave the `Cluster`'s own payload byte-for-byte intact,
/// and the new title should read back correctly.
#[test]
fn growing_title_preserves_cluster_and_updates_value() {
    let mut storage = Cursor::new(sample_file("Before"));
    let mut file = File::open(&mut storage, true).unwrap();

    let segment = file.segments()[0];
    let info = find_info(file.tree(), segment);
    let title = file
        .tree()
        .children(info)
        .into_iter()
        .find(|&c| file.tree().name(c) == "Title")
        .unwrap();

    let longer = "A".repeat(200);
    file.tree_mut()
        .set_value(title, mkv_element::tree::Value::Utf8(longer.clone()))
        .unwrap();
    sizing::resize(file.tree_mut(), title, longer.len() as u64).unwrap();

    file.save_changes(&mut storage).unwrap();

    storage.set_position(0);
    let reopened = File::open(&mut storage, true).unwrap();
    let segment2 = reopened.segments()[0];
    let info2 = find_info(reopened.tree(), segment2);
    assert_eq!(mkv_element::accessors::title(reopened.tree(), info2), Some(longer.as_str()));

    let cluster = find_cluster(reopened.tree(), segment2);
    let data_start = reopened.tree().pos_data_absolute(cluster) as usize;
    let frame = frame_bytes();
    let raw = storage.into_inner();
    assert_eq!(&raw[data_start..data_start + frame.len()], &frame[..]);
}

/// The same pipeline against an actual file on disk, not just an
/// in-memory buffer — `save_changes` only needs `Read + Write + Seek`.
#[test]
fn saves_changes_to_a_real_file() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut tmp, &sample_file("Disk")).unwrap();

    let mut handle = tmp.reopen().unwrap();
    let mut file = File::open(&mut handle, true).unwrap();
    file.save_changes(&mut handle).unwrap();

    let mut reread = tmp.reopen().unwrap();
    let reopened = File::open(&mut reread, true).unwrap();
    let info = find_info(reopened.tree(), reopened.segments()[0]);
    assert_eq!(mkv_element::accessors::title(reopened.tree(), info), Some("Disk"));
}
