//! Stream reader: parses a byte stream into an element tree.
//!
//! Ported from `ebml/container.py`'s `Container.read`, which walks a
//! region emitting one element after another until the region is
//! exhausted, recursing into masters and, in summary mode, leaving
//! `Cluster`/`Cues` payloads unparsed as a recorded byte span
//! (`File.read_summary`).

use crate::childlist::SortedList;
use crate::dirty;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::schema::{self, Kind as SchemaKind, CLUSTER_ID, SEGMENT_ID};
use crate::tree::{ElementId, Kind, Node, ReadState, Tree, Value};
use crate::vint::VInt;
use std::io::{Read, Seek, SeekFrom};

/// EBML ID of the synthetic document root that owns every level-0
/// element. Matroska streams have no single on-disk root; this id exists
/// purely so every node in the arena has a parent.
pub const DOCUMENT_ID: u32 = 0;

/// Read an entire stream into a tree, returning the tree and the id of
/// its synthetic document root (whose children are the level-0 `EBML`
/// header and `Segment` elements).
///
/// `summary`: collapse `Cluster`/`Cues` payloads into unread spans
/// instead of parsing every block and cue point.
pub fn read_document<R: Read + Seek>(r: &mut R, summary: bool) -> Result<(Tree, ElementId)> {
    let end = r.seek(SeekFrom::End(0))?;

    let mut tree = Tree::new();
    let root = tree.alloc(Node {
        header: Header::minimal(DOCUMENT_ID, 0)?,
        name: "Document",
        parent: None,
        pos_relative: 0,
        state: ReadState::Loaded,
        original: None,
        forced_dirty: false,
        kind: Kind::Master {
            children: SortedList::new(),
        },
    });

    let mut pos = 0u64;
    while pos < end {
        let child = read_element(r, &mut tree, pos, pos as i64, end, summary)?;
        pos += tree.total_size(child);
        tree.add_child(root, child);
    }
    dirty::clear_dirty(&mut tree, root, true);
    Ok((tree, root))
}

/// Read one element at `abs_pos`, recursing into its children if it is a
/// resident master. `region_end` bounds an unknown-size `Segment` or
/// `Cluster`'s effective payload (only those two ids may declare the
/// reserved "unknown length" marker; every other element's size must be
/// concrete).
fn read_element<R: Read + Seek>(
    r: &mut R,
    tree: &mut Tree,
    abs_pos: u64,
    pos_relative: i64,
    region_end: u64,
    summary: bool,
) -> Result<ElementId> {
    r.seek(SeekFrom::Start(abs_pos))?;
    let (header, unknown) = Header::read_from(r)?;
    let entry = schema::lookup(header.id());
    let data_start = abs_pos + header.encoded_width();

    if unknown && !matches!(header.id(), SEGMENT_ID | CLUSTER_ID) {
        return Err(Error::ElementBodySizeUnknown(VInt::new(header.id() as u64)));
    }
    let size = if unknown {
        region_end - data_start
    } else {
        header.size()
    };
    let header = if unknown {
        Header::new(header.id(), header.id_width(), size, VInt::min_width(size))?
    } else {
        header
    };

    let defer_summary = summary && matches!(entry.kind, SchemaKind::MasterDefer);
    let recurse = matches!(entry.kind, SchemaKind::Master)
        || (matches!(entry.kind, SchemaKind::MasterDefer) && !defer_summary);

    let kind = match entry.kind {
        SchemaKind::Master => Kind::Master {
            children: SortedList::new(),
        },
        SchemaKind::MasterDefer if defer_summary => Kind::MasterDefer {
            children: SortedList::new(),
            raw_span: Some((data_start, size)),
        },
        SchemaKind::MasterDefer => Kind::MasterDefer {
            children: SortedList::new(),
            raw_span: None,
        },
        SchemaKind::Void => Kind::Void,
        SchemaKind::Atomic(ak) => {
            let mut buf = vec![0u8; size as usize];
            r.read_exact(&mut buf)?;
            Kind::Atomic(Value::decode(ak, &buf)?)
        }
        SchemaKind::Unsupported => {
            let mut buf = vec![0u8; size as usize];
            r.read_exact(&mut buf)?;
            Kind::Unsupported { raw: buf }
        }
    };

    let id = tree.alloc(Node {
        header,
        name: entry.name,
        parent: None,
        pos_relative,
        state: if defer_summary {
            ReadState::Summary
        } else {
            ReadState::Loaded
        },
        original: None,
        forced_dirty: false,
        kind,
    });

    if recurse {
        let mut cur = 0u64;
        while cur < size {
            let child_abs = data_start + cur;
            let child = read_element(r, tree, child_abs, cur as i64, data_start + size, summary)?;
            cur += tree.total_size(child);
            tree.add_child(id, child);
        }
    }
    dirty::clear_dirty(tree, id, false);
    Ok(id)
}

/// Header-only information obtainable without loading an element's
/// payload.
#[derive(Debug, Clone, Copy)]
pub struct Peek {
    /// EBML ID of the next element.
    pub id: u32,
    /// Declared payload size (meaningless if `is_unknown_size`).
    pub size_declared: u64,
    /// Encoded width of the header itself.
    pub header_width: u64,
    /// Whether the size VINT used the reserved "unknown length" marker.
    pub is_unknown_size: bool,
}

/// Read just the next element's header at the current stream position,
/// without consuming its payload. Leaves the stream positioned right
/// after the header, ready for the caller to skip or read the body.
///
/// Ported from `Container.peek_element`, used to scan forward without
/// paying the cost of a full parse (e.g. probing whether the next
/// element is a `Cluster` before deciding whether to summary-skip it).
pub fn peek_element<R: Read>(r: &mut R) -> Result<Peek> {
    let (header, unknown) = Header::read_from(r)?;
    Ok(Peek {
        id: header.id(),
        size_declared: header.size(),
        header_width: header.encoded_width(),
        is_unknown_size: unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ebml_header_bytes() -> Vec<u8> {
        // EBML(id=0x1A45DFA3) { EBMLVersion(0x4286)=1 }
        let mut buf = Vec::new();
        buf.extend(Header::minimal(0x1A45_DFA3, 3).unwrap().encode());
        buf.extend(Header::minimal(0x4286, 1).unwrap().encode());
        buf.push(1);
        buf
    }

    #[test]
    fn reads_flat_master() {
        let bytes = ebml_header_bytes();
        let mut cur = Cursor::new(bytes);
        let (tree, root) = read_document(&mut cur, false).unwrap();
        let children = tree.children(root);
        assert_eq!(children.len(), 1);
        let ebml = children[0];
        assert_eq!(tree.ebml_id(ebml), 0x1A45_DFA3);
        let grandchildren = tree.children(ebml);
        assert_eq!(grandchildren.len(), 1);
        assert_eq!(tree.ebml_id(grandchildren[0]), 0x4286);
    }

    #[test]
    fn summary_mode_defers_cluster() {
        let mut buf = ebml_header_bytes();
        let segment_data_len = {
            let mut cluster = Header::minimal(CLUSTER_ID, 1).unwrap().encode();
            cluster.push(0xAA);
            cluster.len() as u64
        };
        buf.extend(Header::minimal(SEGMENT_ID, segment_data_len).unwrap().encode());
        let mut cluster_bytes = Header::minimal(CLUSTER_ID, 1).unwrap().encode();
        cluster_bytes.push(0xAA);
        buf.extend(cluster_bytes);

        let mut cur = Cursor::new(buf);
        let (tree, root) = read_document(&mut cur, true).unwrap();
        let segment = tree.children(root)[1];
        let cluster = tree.children(segment)[0];
        match &tree.node(cluster).kind {
            Kind::MasterDefer { raw_span, .. } => assert!(raw_span.is_some()),
            _ => panic!("expected MasterDefer"),
        }
        assert!(tree.children(cluster).is_empty());
    }
}
