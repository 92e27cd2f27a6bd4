//! Rearrangement: eliminates overlaps and gaps inside a container,
//! optionally targeting a data-size budget, and fills remaining gaps with
//! Void elements.
//!
//! Ported from `ebml/container.py`'s `Container.place_child`,
//! `Container.rearrange`, `ElementMaster.rearrange_resize`, and
//! `Container.get_overlapping`.

use crate::error::{Error, Result};
use crate::gap::find_gap;
use crate::header::Header;
use crate::schema::VOID_ID;
use crate::sizing;
use crate::tree::{ElementId, Kind, Node, ReadState, Tree};

fn can_grow_by_one(tree: &Tree, id: ElementId) -> bool {
    let target = tree.total_size(id) + 1;
    matches!(sizing::valid_total_size_le(tree, id, target),
        Some((size_w, data_w)) if tree.node(id).header.id_width() as u64 + size_w as u64 + data_w == target)
}

/// Place `child` (already allocated, not yet linked to `parent`) into the
/// smallest gap that fits, honoring the four-step fallback from spec
/// §4.6.
pub fn place_child(
    tree: &mut Tree,
    parent: ElementId,
    child: ElementId,
    start: i64,
    region_size: Option<u64>,
    shrink_child: bool,
    shrink_previous: bool,
    grow_child: bool,
) -> Result<()> {
    let target = tree.total_size(child);

    let one_byte_ok = grow_child && can_grow_by_one(tree, child);
    if let Some(gap) = find_gap(tree, parent, target, start, region_size, false, one_byte_ok) {
        if gap.size == target + 1 {
            sizing::resize_total(tree, child, target + 1)?;
        }
        tree.node_mut(child).pos_relative = gap.pos;
        tree.add_child(parent, child);
        return Ok(());
    }

    if shrink_child {
        let min_total = sizing::min_total_size(tree, child);
        if min_total < target {
            if let Some(gap) = find_gap(tree, parent, min_total, start, region_size, false, false) {
                sizing::resize_total(tree, child, min_total)?;
                tree.node_mut(child).pos_relative = gap.pos;
                tree.add_child(parent, child);
                return Ok(());
            }
        }
    }

    if shrink_previous {
        if let Some(gap) = find_gap(tree, parent, target, start, region_size, true, one_byte_ok) {
            if let Some(prev) = gap.prev {
                let new_prev_total = (gap.pos - tree.pos_relative(prev)) as u64;
                sizing::resize_total(tree, prev, new_prev_total)?;
            }
            tree.node_mut(child).pos_relative = gap.pos;
            tree.add_child(parent, child);
            return Ok(());
        }
    }

    if region_size.is_some() {
        return Err(Error::Inconsistent(format!(
            "no room to place element {:#x} in bounded region",
            tree.ebml_id(child)
        )));
    }

    let append_pos = last_child_end(tree, parent);
    tree.node_mut(child).pos_relative = append_pos;
    tree.add_child(parent, child);
    Ok(())
}

pub(crate) fn last_child_end(tree: &Tree, parent: ElementId) -> i64 {
    tree.children(parent)
        .into_iter()
        .filter(|&c| !tree.is_void(c))
        .map(|c| tree.pos_relative(c) + tree.total_size(c) as i64)
        .max()
        .unwrap_or(0)
}

/// Delete every Void child of `parent`, then fill every remaining gap
/// with a fresh Void. A leftover one-byte gap indicates a bug in an
/// earlier rearrange phase.
pub fn fill_gaps(tree: &mut Tree, parent: ElementId) -> Result<()> {
    for c in tree.children(parent) {
        if tree.is_void(c) {
            tree.remove_child(parent, c);
        }
    }
    loop {
        let children: Vec<ElementId> = tree.children(parent);
        let mut cur = 0i64;
        let mut gap_found = None;
        for c in &children {
            let pos = tree.pos_relative(*c);
            if pos > cur {
                gap_found = Some((cur, (pos - cur) as u64));
                break;
            }
            cur = cur.max(pos + tree.total_size(*c) as i64);
        }
        match gap_found {
            Some((pos, size)) => {
                if size == 1 {
                    return Err(Error::Inconsistent(
                        "unfillable one-byte gap left after rearrange".into(),
                    ));
                }
                insert_void(tree, parent, pos, size)?;
            }
            None => break,
        }
    }
    Ok(())
}

pub(crate) fn insert_void(tree: &mut Tree, parent: ElementId, pos: i64, size: u64) -> Result<()> {
    if size < 2 {
        return Err(Error::Inconsistent(format!(
            "cannot place a Void smaller than 2 bytes (wanted {size})"
        )));
    }
    let id_width = crate::vint::id_byte_length(VOID_ID);
    let mut size_width = 1u8;
    let mut data_size;
    loop {
        data_size = size - id_width as u64 - size_width as u64;
        if crate::vint::VInt::min_width(data_size) <= size_width {
            break;
        }
        size_width += 1;
    }
    let header = Header::new(VOID_ID, id_width, data_size, size_width)?;
    let node = Node {
        header,
        name: "Void",
        parent: None,
        pos_relative: pos,
        state: ReadState::Loaded,
        original: None,
        forced_dirty: true,
        kind: Kind::Void,
    };
    let id = tree.alloc(node);
    tree.add_child(parent, id);
    Ok(())
}

/// Phase 1 of `rearrange`: forward pass eliminating overlaps by shrinking
/// the previous child or pushing the current one forward.
fn eliminate_overlaps(tree: &mut Tree, parent: ElementId) -> Result<()> {
    let mut children: Vec<ElementId> = tree
        .children(parent)
        .into_iter()
        .filter(|&c| !tree.is_void(c))
        .collect();
    children.sort_by_key(|&c| tree.pos_relative(c));

    let mut cur_pos: i64 = 0;
    let mut prev: Option<ElementId> = None;
    for &child in &children {
        let child_pos = tree.pos_relative(child);
        if child_pos < cur_pos {
            // overlap: try to shrink the previous child to land at child_pos
            let mut shrunk = false;
            if let Some(p) = prev {
                let p_pos = tree.pos_relative(p);
                let available = (child_pos - p_pos).max(0) as u64;
                if let Some((size_w, data_w)) = sizing::valid_total_size_le(tree, p, available) {
                    let total = tree.node(p).header.id_width() as u64 + size_w as u64 + data_w;
                    if total as i64 + p_pos <= child_pos && total as i64 + p_pos != child_pos - 1 {
                        sizing::resize_total(tree, p, total)?;
                        shrunk = true;
                    }
                }
            }
            if !shrunk {
                tree.set_pos_relative(child, cur_pos);
            }
        } else if child_pos == cur_pos + 1 {
            // one-byte unfillable gap: pull the child back flush.
            tree.set_pos_relative(child, cur_pos);
        }
        let pos = tree.pos_relative(child);
        cur_pos = cur_pos.max(pos + tree.total_size(child) as i64);
        prev = Some(child);
    }
    Ok(())
}

/// Phase 2: shrink/relocate a suffix of children so the container fits
/// within `goal_size`.
fn fit_budget(tree: &mut Tree, parent: ElementId, goal_size: u64) -> Result<()> {
    let mut children: Vec<ElementId> = tree
        .children(parent)
        .into_iter()
        .filter(|&c| !tree.is_void(c))
        .collect();
    children.sort_by_key(|&c| tree.pos_relative(c));
    if children.is_empty() {
        return Ok(());
    }

    let min_sizes: Vec<u64> = children.iter().map(|&c| sizing::min_total_size(tree, c)).collect();
    let mut suffix_min = vec![0u64; children.len() + 1];
    for i in (0..children.len()).rev() {
        suffix_min[i] = suffix_min[i + 1] + min_sizes[i];
    }

    let mut start_index = None;
    for i in 0..children.len() {
        let pos = tree.pos_relative(children[i]);
        let fits = pos as u64 + suffix_min[i] <= goal_size && pos as u64 + suffix_min[i] != goal_size - 1;
        if fits {
            start_index = Some(i);
            break;
        }
    }
    let Some(start_index) = start_index else {
        return Ok(());
    };

    sizing::resize_total(tree, children[start_index], min_sizes[start_index])?;
    let mut cur = tree.pos_relative(children[start_index]) + min_sizes[start_index] as i64;
    for &c in &children[start_index + 1..] {
        tree.set_pos_relative(c, cur);
        sizing::resize_total(tree, c, sizing::min_total_size(tree, c))?;
        cur += tree.total_size(c) as i64;
    }
    Ok(())
}

/// Full rearrange: eliminate overlaps, optionally fit a budget, recurse
/// into Master children, then fill gaps with Void.
pub fn rearrange(tree: &mut Tree, parent: ElementId, goal_size: Option<u64>) -> Result<()> {
    for c in tree.children(parent) {
        if tree.is_master(c) {
            let goal = tree.node(c).header.size();
            rearrange(tree, c, Some(goal))?;
        }
    }
    eliminate_overlaps(tree, parent)?;
    if let Some(goal) = goal_size {
        fit_budget(tree, parent, goal)?;
    }
    for c in tree.children(parent) {
        if tree.is_master(c) {
            rearrange_if_necessary(tree, c, false, false)?;
        }
    }
    fill_gaps(tree, parent)
}

/// `rearrange` only if the container is not already consecutive and
/// non-overlapping.
pub fn rearrange_if_necessary(
    tree: &mut Tree,
    parent: ElementId,
    prefer_grow: bool,
    allow_shrink: bool,
) -> Result<()> {
    if !is_consecutive(tree, parent) {
        rearrange(tree, parent, None)?;
    }
    rearrange_resize(tree, parent, prefer_grow, allow_shrink)
}

fn is_consecutive(tree: &Tree, parent: ElementId) -> bool {
    let mut children: Vec<ElementId> = tree.children(parent);
    children.sort_by_key(|&c| tree.pos_relative(c));
    let mut cur = 0i64;
    for c in children {
        if tree.pos_relative(c) != cur {
            return false;
        }
        cur += tree.total_size(c) as i64;
    }
    true
}

/// Reconcile the parent's declared data size with the end of its last
/// child: grow if children now extend past it, shrink (if allowed) or
/// pad with a trailing Void otherwise.
pub fn rearrange_resize(
    tree: &mut Tree,
    parent: ElementId,
    _prefer_grow: bool,
    allow_shrink: bool,
) -> Result<()> {
    let end = last_child_end(tree, parent);
    let size = tree.node(parent).header.size() as i64;
    if end == size {
        return Ok(());
    }
    if end > size {
        tree.node_mut(parent).header.set_size(end as u64)?;
        return Ok(());
    }
    // end < size: either shrink to fit exactly, or pad the gap with Void.
    if allow_shrink {
        tree.node_mut(parent).header.set_size(end as u64)?;
    } else if size - end == 1 {
        tree.node_mut(parent).header.set_size(end as u64 + 2)?;
        insert_void(tree, parent, end, 2)?;
    } else {
        insert_void(tree, parent, end, (size - end) as u64)?;
    }
    Ok(())
}

/// Shorthand for `rearrange(goal_size=0)`: pack everything as tightly as
/// possible, then shrink the container to fit.
pub fn make_consecutive(tree: &mut Tree, parent: ElementId) -> Result<()> {
    rearrange(tree, parent, Some(0))?;
    rearrange_resize(tree, parent, false, true)
}

/// Remove one element from each overlapping pair, preferring to keep
/// elements whose EBML ID is in `fixed`, else the larger of the two.
pub fn get_overlapping(tree: &mut Tree, parent: ElementId, fixed: &[u32]) -> Vec<ElementId> {
    let mut children: Vec<ElementId> = tree.children(parent);
    children.sort_by_key(|&c| tree.pos_relative(c));
    let mut removed = Vec::new();
    let mut i = 0;
    while i + 1 < children.len() {
        let a = children[i];
        let b = children[i + 1];
        let a_end = tree.pos_relative(a) + tree.total_size(a) as i64;
        if a_end > tree.pos_relative(b) {
            let a_fixed = fixed.contains(&tree.ebml_id(a));
            let b_fixed = fixed.contains(&tree.ebml_id(b));
            let victim = if a_fixed && !b_fixed {
                b
            } else if b_fixed && !a_fixed {
                a
            } else if tree.total_size(a) >= tree.total_size(b) {
                b
            } else {
                a
            };
            tree.remove_child(parent, victim);
            removed.push(victim);
            children.remove(children.iter().position(|&c| c == victim).unwrap());
            continue;
        }
        i += 1;
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::tree::{Kind, Node, ReadState, Value};

    /// Allocates an atomic child whose *total* encoded size (id width +
    /// size-VINT width + data) is exactly `total_size`, at its minimal
    /// size-VINT width. `id`'s width varies (e.g. `CLUSTER_ID` is 4 bytes,
    /// `0x80`/`0x81` are 1 byte), so the data size is solved for rather
    /// than assumed, the same way `insert_void` above solves for it.
    fn atomic_at(tree: &mut Tree, parent: ElementId, pos: i64, total_size: u64, id: u32) -> ElementId {
        let id_width = crate::vint::id_byte_length(id);
        let mut size_width = 1u8;
        let data_size = loop {
            let data = total_size - id_width as u64 - size_width as u64;
            if crate::vint::VInt::min_width(data) <= size_width {
                break data;
            }
            size_width += 1;
        };
        let header = Header::new(id, id_width, data_size, size_width).unwrap();
        let n = Node {
            header,
            name: "X",
            parent: None,
            pos_relative: pos,
            state: ReadState::Loaded,
            original: None,
            forced_dirty: false,
            kind: Kind::Atomic(Value::Binary(vec![0; data_size as usize])),
        };
        let id = tree.alloc(n);
        tree.add_child(parent, id);
        id
    }

    fn root(tree: &mut Tree) -> ElementId {
        let n = Node {
            header: Header::minimal(0x1853_8067, 0).unwrap(),
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
    fn fill_gaps_pads_a_two_byte_hole_with_void() {
        let mut tree = Tree::new();
        let p = root(&mut tree);
        atomic_at(&mut tree, p, 0, 5, 0x80);
        atomic_at(&mut tree, p, 7, 5, 0x81); // [5,7) is a 2-byte gap
        fill_gaps(&mut tree, p).unwrap();
        let voids: Vec<ElementId> = tree.children(p).into_iter().filter(|&c| tree.is_void(c)).collect();
        assert_eq!(voids.len(), 1);
        assert_eq!(tree.pos_relative(voids[0]), 5);
        assert_eq!(tree.total_size(voids[0]), 2);
    }

    #[test]
    fn fill_gaps_rejects_unfillable_one_byte_hole() {
        let mut tree = Tree::new();
        let p = root(&mut tree);
        atomic_at(&mut tree, p, 0, 5, 0x80);
        atomic_at(&mut tree, p, 6, 5, 0x81); // [5,6) is a 1-byte gap
        assert!(fill_gaps(&mut tree, p).is_err());
    }

    #[test]
    fn eliminate_overlaps_pushes_overlapping_child_forward() {
        let mut tree = Tree::new();
        let p = root(&mut tree);
        atomic_at(&mut tree, p, 0, 10, 0x80);
        atomic_at(&mut tree, p, 5, 4, 0x81); // starts at 5, well inside [0,10)
        eliminate_overlaps(&mut tree, p).unwrap();
        let mut children = tree.children(p);
        children.sort_by_key(|&c| tree.pos_relative(c));
        assert_eq!(tree.pos_relative(children[1]), 10);
    }

    #[test]
    fn rearrange_resize_grows_parent_past_last_child() {
        let mut tree = Tree::new();
        let p = root(&mut tree);
        tree.node_mut(p).header.set_size(5).unwrap();
        atomic_at(&mut tree, p, 0, 10, 0x80);
        rearrange_resize(&mut tree, p, false, false).unwrap();
        assert_eq!(tree.node(p).header.size(), 10);
    }

    #[test]
    fn rearrange_resize_pads_single_byte_shortfall_with_two_byte_void() {
        let mut tree = Tree::new();
        let p = root(&mut tree);
        atomic_at(&mut tree, p, 0, 10, 0x80);
        tree.node_mut(p).header.set_size(11).unwrap();
        rearrange_resize(&mut tree, p, false, false).unwrap();
        assert_eq!(tree.node(p).header.size(), 12);
        let voids: Vec<ElementId> = tree.children(p).into_iter().filter(|&c| tree.is_void(c)).collect();
        assert_eq!(voids.len(), 1);
    }

    #[test]
    fn get_overlapping_keeps_the_fixed_element() {
        let mut tree = Tree::new();
        let p = root(&mut tree);
        let cluster = atomic_at(&mut tree, p, 0, 10, crate::schema::CLUSTER_ID);
        let other = atomic_at(&mut tree, p, 5, 10, 0x81);
        let removed = get_overlapping(&mut tree, p, &[crate::schema::CLUSTER_ID]);
        assert_eq!(removed, vec![other]);
        assert!(tree.children(p).contains(&cluster));
    }
}
