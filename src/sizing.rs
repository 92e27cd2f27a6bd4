//! Size solver: computes valid `(header_width, data_width)` pairs for an
//! element and resizes it to them.
//!
//! Ported from `ebml/element.py`'s `min_data_size`/`max_data_size`/
//! `valid_data_size_le`/`valid_total_size_le`/`resize`/`resize_total`, and
//! `ElementMaster`'s overrides of the same. The off-by-one rule recurs
//! throughout: a gap of exactly one byte cannot be filled (`Void`'s
//! minimum total size is 2), so `goal - 1` is treated as unreachable
//! unless the caller opts into a one-byte grow.

use crate::error::{Error, Result};
use crate::schema::{AtomicKind, Kind as SchemaKind};
use crate::tree::{ElementId, Kind, Tree, Value};
use crate::vint::{self, VInt, MAX_DATA_SIZE};

/// Minimum data width this element can be resized to.
pub fn min_data_size(tree: &Tree, id: ElementId) -> u64 {
    let entry = tree.schema_of(id);
    let floor = entry.data_size_min;
    match &tree.node(id).kind {
        Kind::Void => floor.min(tree.node(id).header.size()),
        Kind::Placeholder | Kind::Unsupported { .. } => tree.node(id).header.size(),
        Kind::Atomic(v) => v.min_width().max(floor),
        Kind::Master { children } | Kind::MasterDefer { children, .. } => {
            let sum: u64 = children
                .values()
                .filter(|&&c| !tree.is_void(c))
                .map(|&c| min_total_size(tree, c))
                .sum();
            if floor > 0 && sum + 1 == floor {
                sum + 2
            } else {
                sum.max(floor)
            }
        }
    }
}

/// Maximum data width this element can be resized to.
pub fn max_data_size(tree: &Tree, id: ElementId) -> u64 {
    match &tree.node(id).kind {
        Kind::Atomic(Value::Float(_)) => 8,
        Kind::Atomic(Value::Date(_)) => 8,
        Kind::Atomic(Value::Id(_)) => 4,
        Kind::Atomic(_) => MAX_DATA_SIZE,
        Kind::Placeholder | Kind::Unsupported { .. } => tree.node(id).header.size(),
        _ => MAX_DATA_SIZE,
    }
}

/// Minimum total size (header + data) this element can be resized to.
pub fn min_total_size(tree: &Tree, id: ElementId) -> u64 {
    let data = min_data_size(tree, id);
    let id_w = tree.node(id).header.id_width() as u64;
    id_w + min_header_width(tree, id, data) as u64 + data
}

/// Maximum total size (header + data) this element can be resized to.
pub fn max_total_size(tree: &Tree, id: ElementId) -> u64 {
    let data = max_data_size(tree, id);
    8 + tree.node(id).header.id_width() as u64 + data
}

/// Smallest legal header width (id + size VINT) for the given data size,
/// honoring the schema's `header_size_min` floor. Matches the original's
/// refusal to shrink the header just because data shrank: if `data_size`
/// is no larger than the element's current data size, the current header
/// width is kept when it is already large enough.
pub fn min_header_width(tree: &Tree, id: ElementId, data_size: u64) -> u8 {
    let node = tree.node(id);
    let entry = tree.schema_of(id);
    let id_w = node.header.id_width();
    let needed_size_w = VInt::min_width(data_size);
    let floor_total = entry.header_size_min.max(id_w + needed_size_w);
    let floor_size_w = floor_total.saturating_sub(id_w).max(needed_size_w).max(1);
    if data_size <= node.header.size() && node.header.size_width() >= floor_size_w {
        node.header.size_width().max(floor_size_w)
    } else {
        floor_size_w
    }
}

/// Largest legal data width `<= goal`, honoring `min_data_size` and
/// variant-specific allowed widths. `None` if even the minimum exceeds
/// `goal`.
pub fn valid_data_size_le(tree: &Tree, id: ElementId, goal: u64) -> Option<u64> {
    let min = min_data_size(tree, id);
    if goal < min {
        return None;
    }
    match &tree.node(id).kind {
        Kind::Master { .. } | Kind::MasterDefer { .. } => {
            if goal == min + 1 {
                if min < goal { Some(min) } else { None }
            } else {
                Some(goal)
            }
        }
        Kind::Atomic(Value::Float(_)) => {
            if goal >= 8 {
                Some(8)
            } else if goal >= 4 {
                Some(4)
            } else {
                None
            }
        }
        Kind::Atomic(Value::Date(_)) => {
            if goal >= 8 {
                Some(8)
            } else {
                None
            }
        }
        Kind::Atomic(Value::Binary(b)) => {
            if goal >= b.len() as u64 {
                Some(b.len() as u64)
            } else {
                None
            }
        }
        Kind::Placeholder | Kind::Unsupported { .. } => {
            let sz = tree.node(id).header.size();
            if goal >= sz { Some(sz) } else { None }
        }
        Kind::Void => Some(goal.max(min)),
        _ => Some(goal.min(max_data_size(tree, id)).max(min)),
    }
}

/// The core size solver: find `(header_width, data_width)` with
/// `header_width + data_width <= goal`, as close to `goal` as possible,
/// preferring to keep the current header width, then the smallest header
/// width among equally-good solutions.
pub fn valid_total_size_le(tree: &Tree, id: ElementId, goal: u64) -> Option<(u8, u64)> {
    if min_total_size(tree, id) > goal {
        return None;
    }
    let id_w = tree.node(id).header.id_width();
    let cur_size_w = tree.node(id).header.size_width();
    if goal >= cur_size_w as u64 + id_w as u64 {
        if let Some(d) = valid_data_size_le(tree, id, goal - id_w as u64 - cur_size_w as u64) {
            if d + cur_size_w as u64 + id_w as u64 == goal {
                return Some((cur_size_w, d));
            }
        }
    }
    let min_size_w = min_header_width(tree, id, min_data_size(tree, id)).saturating_sub(id_w).max(1);
    let mut best: Option<(u8, u64)> = None;
    for size_w in min_size_w..=8 {
        if (size_w as u64) + (id_w as u64) > goal {
            break;
        }
        let budget = goal - id_w as u64 - size_w as u64;
        if let Some(d) = valid_data_size_le(tree, id, budget) {
            let total = id_w as u64 + size_w as u64 + d;
            if total == goal {
                return Some((size_w, d));
            }
            match best {
                Some((_, bd)) if id_w as u64 + best.unwrap().0 as u64 + bd >= total => {}
                _ => best = Some((size_w, d)),
            }
        }
    }
    best
}

/// Resize this element's data to exactly `data_width`, refusing if
/// invalid. Grows the header width if needed but never shrinks it
/// implicitly (`Header::set_size` semantics).
pub fn resize(tree: &mut Tree, id: ElementId, data_width: u64) -> Result<()> {
    let min = min_data_size(tree, id);
    let max = max_data_size(tree, id);
    if data_width < min || data_width > max {
        return Err(Error::InvalidResize {
            id: VInt::new(tree.ebml_id(id) as u64),
            attempted: data_width,
        });
    }
    tree.node_mut(id).header.set_size(data_width)?;
    Ok(())
}

/// Resize this element's total encoded size to exactly `total`, refusing
/// if no `(header_width, data_width)` pair reaches it exactly.
pub fn resize_total(tree: &mut Tree, id: ElementId, total: u64) -> Result<()> {
    let (size_w, data_w) = valid_total_size_le(tree, id, total)
        .filter(|(size_w, data_w)| {
            tree.node(id).header.id_width() as u64 + *size_w as u64 + data_w == total
        })
        .ok_or_else(|| Error::InvalidResize {
            id: VInt::new(tree.ebml_id(id) as u64),
            attempted: total,
        })?;
    tree.node_mut(id).header.set_size(data_w)?;
    tree.node_mut(id).header.set_size_width(size_w)?;
    Ok(())
}

/// Grow a Master's header's size-VINT width to `to_width`, shifting every
/// child's `pos_relative` back by the difference so absolute positions on
/// disk are preserved (ported from `ElementMaster.expand_header`).
pub fn expand_header(tree: &mut Tree, id: ElementId, to_width: u8) -> Result<()> {
    let cur = tree.node(id).header.size_width();
    if to_width <= cur {
        return Ok(());
    }
    let diff = (to_width - cur) as i64;
    tree.node_mut(id).header.set_size_width(to_width)?;
    let children = tree.children(id);
    for c in children {
        let pos = tree.pos_relative(c);
        tree.set_pos_relative(c, pos - diff);
    }
    let new_size = tree.node(id).header.size() - diff as u64;
    tree.node_mut(id).header.set_size(new_size)?;
    Ok(())
}

/// Does this atomic's value fit in a binary encoding of the given kind
/// without loss (used by consistency checks, not the solver proper).
pub fn atomic_kind_matches(kind: AtomicKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (AtomicKind::Unsigned, Value::Unsigned(_))
            | (AtomicKind::Signed, Value::Signed(_))
            | (AtomicKind::Boolean, Value::Boolean(_))
            | (AtomicKind::Enum, Value::Enum(_))
            | (AtomicKind::BitField, Value::BitField(_))
            | (AtomicKind::Float, Value::Float(_))
            | (AtomicKind::Ascii, Value::Ascii(_))
            | (AtomicKind::Utf8, Value::Utf8(_))
            | (AtomicKind::Date, Value::Date(_))
            | (AtomicKind::Binary, Value::Binary(_))
            | (AtomicKind::Id, Value::Id(_))
    )
}

pub(crate) fn is_schema_master(kind: SchemaKind) -> bool {
    matches!(kind, SchemaKind::Master | SchemaKind::MasterDefer)
}

/// Encode the VINT bytes for `value` at `width`, used by the writer.
pub fn encode_vint(value: u64, width: u8) -> Result<Vec<u8>> {
    vint::encode(value, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::tree::{Node, ReadState};

    fn void_node(size: u64) -> Node {
        Node {
            header: Header::minimal(0xEC, size).unwrap(),
            name: "Void",
            parent: None,
            pos_relative: 0,
            state: ReadState::Loaded,
            original: None,
            forced_dirty: false,
            kind: Kind::Void,
        }
    }

    #[test]
    fn void_min_size_is_two() {
        let mut tree = Tree::new();
        let id = tree.alloc(void_node(10));
        assert_eq!(min_data_size(&tree, id), 0);
        assert_eq!(min_total_size(&tree, id), 2);
    }

    #[test]
    fn atomic_resize_grows_header_then_data() {
        let mut tree = Tree::new();
        let n = Node {
            header: Header::minimal(0x4489, 4).unwrap(),
            name: "Duration",
            parent: None,
            pos_relative: 0,
            state: ReadState::Loaded,
            original: None,
            forced_dirty: false,
            kind: Kind::Atomic(Value::Float(1000.0)),
        };
        let id = tree.alloc(n);
        resize_total(&mut tree, id, 15).unwrap();
        assert_eq!(tree.node(id).header.size(), 8);
        assert_eq!(tree.node(id).header.size_width(), 7);
    }
}
