//! Gap finder: locates an unoccupied byte range inside a container's
//! child list.
//!
//! Ported from `ebml/container.py`'s `Container.find_gap`.

use crate::sizing;
use crate::tree::{ElementId, Tree};

/// A qualifying gap: its start position (relative to the parent's data
/// area), its size, and the child immediately preceding it (`None` if the
/// gap is at the very start of the region).
#[derive(Debug, Clone, Copy)]
pub struct Gap {
    /// Position of the gap's first byte.
    pub pos: i64,
    /// Size of the gap in bytes.
    pub size: u64,
    /// The child the gap immediately follows, if any.
    pub prev: Option<ElementId>,
}

/// Find the smallest gap of at least `size` bytes (ties broken by
/// earliest start) within `[start, start+region_size)` of `parent`'s
/// children, ignoring Void children.
///
/// `shrink`: treat each child's effective end as `pos + min_total_size()`
/// rather than its current total size — used when probing whether a
/// predecessor could be shrunk to make room.
///
/// `one_byte_ok`: also accept a gap exactly one byte larger than `size`
/// (the caller must then grow the placed element by one byte, since a
/// gap of exactly one leftover byte cannot be filled by a Void).
pub fn find_gap(
    tree: &Tree,
    parent: ElementId,
    size: u64,
    start: i64,
    region_size: Option<u64>,
    shrink: bool,
    one_byte_ok: bool,
) -> Option<Gap> {
    let region_end = region_size.map(|r| start + r as i64);
    let mut intervals: Vec<(i64, i64, ElementId)> = tree
        .children(parent)
        .into_iter()
        .filter(|&c| !tree.is_void(c))
        .map(|c| {
            let pos = tree.pos_relative(c);
            let len = if shrink {
                sizing::min_total_size(tree, c)
            } else {
                tree.total_size(c)
            };
            (pos, pos + len as i64, c)
        })
        .filter(|&(pos, end, _)| end > start && region_end.is_none_or(|re| pos < re))
        .collect();
    intervals.sort_by_key(|&(pos, _, _)| pos);

    let qualifies = |gap_size: u64| -> bool {
        gap_size == size || gap_size >= size + 2 || (gap_size == size + 1 && one_byte_ok)
    };

    let mut best: Option<Gap> = None;
    let mut consider = |pos: i64, end: i64, prev: Option<ElementId>, best: &mut Option<Gap>| {
        if end <= pos {
            return;
        }
        let gap_size = (end - pos) as u64;
        if qualifies(gap_size) && best.map(|b| gap_size < b.size).unwrap_or(true) {
            *best = Some(Gap {
                pos,
                size: gap_size,
                prev,
            });
        }
    };

    let mut cur_pos = start;
    let mut prev = None;
    for &(pos, end, child) in &intervals {
        consider(cur_pos, pos, prev, &mut best);
        cur_pos = cur_pos.max(end);
        prev = Some(child);
    }
    let tail_end = region_end.unwrap_or(i64::MAX);
    consider(cur_pos, tail_end, prev, &mut best);
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::tree::{Kind, Node, ReadState};

    /// Allocates an atomic child whose *total* encoded size (id + size
    /// VINT + data) is exactly `total_size`. `0x80` is a 1-byte id, and
    /// every `total_size` used below stays under 127 bytes of data, so the
    /// size VINT is always 1 byte too: the header overhead is a fixed 2
    /// bytes, and `data_size = total_size - 2`.
    fn atomic_at(tree: &mut Tree, parent: ElementId, pos: i64, total_size: u64) -> ElementId {
        let data_size = total_size - 2;
        let n = Node {
            header: Header::minimal(0x80, data_size).unwrap(),
            name: "X",
            parent: None,
            pos_relative: pos,
            state: ReadState::Loaded,
            original: None,
            forced_dirty: false,
            kind: Kind::Atomic(crate::tree::Value::Binary(vec![0; data_size as usize])),
        };
        let id = tree.alloc(n);
        tree.add_child(parent, id);
        id
    }

    fn master(tree: &mut Tree) -> ElementId {
        let n = Node {
            header: Header::minimal(0x18538067, 0).unwrap(),
            name: "Segment",
            parent: None,
            pos_relative: 0,
            state: ReadState::Loaded,
            original: None,
            forced_dirty: false,
            kind: Kind::Master {
                children: crate::childlist::SortedList::new(),
            },
        };
        tree.alloc(n)
    }

    #[test]
    fn finds_middle_gap() {
        let mut tree = Tree::new();
        let p = master(&mut tree);
        atomic_at(&mut tree, p, 0, 5);
        atomic_at(&mut tree, p, 10, 5); // gap [5,10) size 5
        let g = find_gap(&tree, p, 5, 0, None, false, false).unwrap();
        assert_eq!(g.pos, 5);
        assert_eq!(g.size, 5);
    }

    #[test]
    fn one_byte_gap_rejected_without_flag() {
        let mut tree = Tree::new();
        let p = master(&mut tree);
        atomic_at(&mut tree, p, 0, 5);
        atomic_at(&mut tree, p, 9, 5); // gap [5,9) size 4, want size 3 -> qualifies only w/ one_byte_ok
        assert!(find_gap(&tree, p, 3, 0, None, false, false).is_none());
        assert!(find_gap(&tree, p, 3, 0, None, false, true).is_some());
    }
}
