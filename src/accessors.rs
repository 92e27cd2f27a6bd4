//! Typed accessors for the handful of elements callers need to read or
//! adjust without walking the tree by hand.
//!
//! Ported from the `Parsed` descriptor attributes on `ElementInfo`/
//! `ElementSeek` in `data_elements.py` (`segment_uid`, `timecode_scale`,
//! `duration`, `title`, `muxing_app`, `writing_app`, `seek_id`/
//! `seek_pos`), adapted to free functions over `(tree, id)` pairs since
//! this engine has no per-element wrapper type, only arena indices.

use crate::schema::{SEEK_HEAD_ID, SEEK_ID};
use crate::tree::{ElementId, Tree, Value};
use crate::vint;

fn find_child(tree: &Tree, parent: ElementId, name: &str) -> Option<ElementId> {
    tree.children(parent).into_iter().find(|&c| tree.node(c).name == name)
}

fn atomic_value(tree: &Tree, id: ElementId) -> Option<&Value> {
    match &tree.node(id).kind {
        crate::tree::Kind::Atomic(v) => Some(v),
        _ => None,
    }
}

/// `Info > SegmentUID`, if present.
pub fn segment_uid(tree: &Tree, info: ElementId) -> Option<&[u8]> {
    let child = find_child(tree, info, "SegmentUID")?;
    match atomic_value(tree, child)? {
        Value::Binary(b) => Some(b),
        _ => None,
    }
}

/// `Info > TimestampScale`, defaulting to the Matroska default of
/// 1,000,000 nanoseconds per tick when absent.
pub fn timestamp_scale(tree: &Tree, info: ElementId) -> u64 {
    find_child(tree, info, "TimestampScale")
        .and_then(|c| atomic_value(tree, c))
        .and_then(|v| match v {
            Value::Unsigned(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(1_000_000)
}

/// `Info > Duration`, if present.
pub fn duration(tree: &Tree, info: ElementId) -> Option<f64> {
    let child = find_child(tree, info, "Duration")?;
    match atomic_value(tree, child)? {
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// `Info > Title`, if present.
pub fn title(tree: &Tree, info: ElementId) -> Option<&str> {
    let child = find_child(tree, info, "Title")?;
    match atomic_value(tree, child)? {
        Value::Utf8(s) => Some(s),
        _ => None,
    }
}

/// `Info > MuxingApp`.
pub fn muxing_app(tree: &Tree, info: ElementId) -> Option<&str> {
    let child = find_child(tree, info, "MuxingApp")?;
    match atomic_value(tree, child)? {
        Value::Utf8(s) => Some(s),
        _ => None,
    }
}

/// `Info > WritingApp`.
pub fn writing_app(tree: &Tree, info: ElementId) -> Option<&str> {
    let child = find_child(tree, info, "WritingApp")?;
    match atomic_value(tree, child)? {
        Value::Utf8(s) => Some(s),
        _ => None,
    }
}

/// One resolved entry of a `SeekHead`: the EBML ID it indexes and the
/// `pos_relative` (within the owning `Segment`) it points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekEntry {
    /// The indexed element's EBML ID, as stored in `SeekID`.
    pub target_id: u32,
    /// The indexed element's position, as stored in `SeekPosition`.
    pub target_pos: u64,
}

/// Every `Seek` entry of a `SeekHead`, in child order.
///
/// Ported from `ElementSeek.seek_id`/`seek_pos`.
pub fn seek_entries(tree: &Tree, seek_head: ElementId) -> Vec<SeekEntry> {
    if tree.ebml_id(seek_head) != SEEK_HEAD_ID {
        return Vec::new();
    }
    tree.children(seek_head)
        .into_iter()
        .filter(|&c| tree.ebml_id(c) == SEEK_ID)
        .filter_map(|seek| {
            let id_child = find_child(tree, seek, "SeekID")?;
            let pos_child = find_child(tree, seek, "SeekPosition")?;
            let target_id = match atomic_value(tree, id_child)? {
                Value::Binary(raw) => {
                    let mut slice = raw.as_slice();
                    vint::decode_id(&mut slice).ok()?.0
                }
                _ => return None,
            };
            let target_pos = match atomic_value(tree, pos_child)? {
                Value::Unsigned(n) => *n,
                _ => return None,
            };
            Some(SeekEntry { target_id, target_pos })
        })
        .collect()
}

/// Find the first `SeekHead` entry indexing `target_id`, if any.
pub fn find_seek_entry(tree: &Tree, seek_head: ElementId, target_id: u32) -> Option<SeekEntry> {
    seek_entries(tree, seek_head).into_iter().find(|e| e.target_id == target_id)
}

/// Look up the child element a `SeekHead` entry points to, validating
/// that its recorded position still lands inside `segment`. Per this
/// engine's read-time policy, an out-of-range `SeekPosition` is treated
/// as corrupt and discarded rather than trusted.
pub fn resolve_seek_target(tree: &Tree, segment: ElementId, entry: &SeekEntry) -> Option<ElementId> {
    let segment_size = tree.node(segment).header.size();
    if entry.target_pos >= segment_size {
        return None;
    }
    tree.children(segment)
        .into_iter()
        .find(|&c| tree.ebml_id(c) == entry.target_id && tree.pos_relative(c) as u64 == entry.target_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::schema::INFO_ID;
    use crate::tree::{Kind, Node, ReadState};

    fn info_with_title(title_str: &str) -> (Tree, ElementId) {
        let mut tree = Tree::new();
        let info = tree.alloc(Node {
            header: Header::minimal(INFO_ID, 0).unwrap(),
            name: "Info",
            parent: None,
            pos_relative: 0,
            state: ReadState::Loaded,
            original: None,
            forced_dirty: false,
            kind: Kind::Master {
                children: crate::childlist::SortedList::new(),
            },
        });
        let title_node = tree.alloc(Node {
            header: Header::minimal(0x7BA9, title_str.len() as u64).unwrap(),
            name: "Title",
            parent: None,
            pos_relative: 0,
            state: ReadState::Loaded,
            original: None,
            forced_dirty: false,
            kind: Kind::Atomic(Value::Utf8(title_str.to_string())),
        });
        tree.add_child(info, title_node);
        (tree, info)
    }

    #[test]
    fn reads_title() {
        let (tree, info) = info_with_title("hello");
        assert_eq!(title(&tree, info), Some("hello"));
    }

    #[test]
    fn missing_timestamp_scale_defaults() {
        let (tree, info) = info_with_title("x");
        assert_eq!(timestamp_scale(&tree, info), 1_000_000);
    }
}
