//! Segment normalizer: rearranges a `Segment`'s level-1 children into a
//! consistent, fully-indexed layout without ever moving a `Cluster` or
//! `Cues` element from its absolute position.
//!
//! Ported from `ElementSegment.normalize`/`_add_placeholders`/
//! `_remove_placeholders` in `data_elements.py`. `Cluster`/`Cues` regions
//! are shielded behind a synthetic, engine-internal `Placeholder` element
//! for the duration of the rearrange so the rest of the algorithm can
//! treat them as opaque fixed obstacles, exactly as the original shields
//! them behind `LibInternal`/`LibInternal2`.

use crate::childlist::SortedList;
use crate::dirty;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::rearrange::{self, get_overlapping};
use crate::schema::{self, CLUSTER_ID, CUES_ID, SEEK_HEAD_ID, SEEK_ID, SEEK_ID_ID, SEEK_POSITION_ID, SEGMENT_ID};
use crate::sizing;
use crate::tree::{ElementId, Kind, Node, ReadState, Tree, Value};
use crate::vint::{self, VInt};

/// Synthetic ID for the shielding placeholder. Never written to disk:
/// every placeholder is swapped back for its original element before
/// `normalize` returns.
const PLACEHOLDER_ID: u32 = 0x1FFF_FFFE;

const TO_INDEX: &[&str] = &["Info", "Tracks", "Attachments", "Chapters", "Tags", "Cues"];
const TO_REARRANGE: &[&str] = &["Info", "Tracks", "Attachments", "Chapters", "Tags"];

/// Rearrange `segment`'s children into a consistent layout: a freshly
/// rebuilt `SeekHead` at the front indexing every other level-1 element,
/// no overlaps or unfillable gaps, and `Cluster`/`Cues` left exactly
/// where they were found.
pub fn normalize(tree: &mut Tree, segment: ElementId) -> Result<()> {
    if tree.ebml_id(segment) != SEGMENT_ID {
        return Err(Error::Inconsistent(
            "normalize() called on a non-Segment element".into(),
        ));
    }

    // 1. Drop existing Void and SeekHead children; they're rebuilt below.
    for c in tree.children(segment) {
        if tree.is_void(c) || tree.node(c).name == "SeekHead" {
            tree.remove_child(segment, c);
        }
    }

    // 2. Build a fresh SeekHead indexing every to-index child, at its
    // maximum encoded width so later placement never needs to resize it.
    let (seek_head, seek_entries) = build_seek_head(tree, segment)?;

    // 3. Shield Cluster/Cues regions behind placeholders.
    let restores = add_placeholders(tree, segment)?;

    // 4. Expand the Segment header to its maximum width.
    sizing::expand_header(tree, segment, 8)?;

    // 5. Put every other level-1 child's own contents in a consistent state.
    for c in tree.children(segment) {
        if TO_REARRANGE.contains(&tree.node(c).name) {
            rearrange::rearrange_if_necessary(tree, c, false, true)?;
        }
    }
    rearrange::rearrange_resize(tree, seek_head, false, true)?;
    tree.set_pos_relative(seek_head, 0);

    // 6. Resolve overlaps, keeping SeekHead/Cluster/Cues/placeholders fixed.
    let fixed = [SEEK_HEAD_ID, CLUSTER_ID, CUES_ID, PLACEHOLDER_ID];
    let mut to_replace = get_overlapping(tree, segment, &fixed);

    let clusters_start = tree
        .children(segment)
        .into_iter()
        .filter(|&c| matches!(tree.ebml_id(c), CLUSTER_ID | PLACEHOLDER_ID))
        .map(|c| tree.pos_relative(c))
        .min()
        .unwrap_or(tree.node(segment).header.size() as i64);

    // Prefer to put Info/Tracks before the first Cluster block.
    for preferred in ["Info", "Tracks"] {
        let mut batch: Vec<ElementId> = to_replace
            .iter()
            .copied()
            .filter(|&e| tree.node(e).name == preferred)
            .collect();
        batch.sort_by_key(|&e| tree.total_size(e));
        for elt in batch.into_iter().rev() {
            let placed = rearrange::place_child(
                tree,
                segment,
                elt,
                0,
                Some(clusters_start as u64),
                false,
                false,
                false,
            );
            if placed.is_err() {
                rearrange::place_child(tree, segment, elt, 0, None, false, false, false)?;
            }
            to_replace.retain(|&e| e != elt);
        }
    }
    // Place the rest where they fit best, largest first.
    to_replace.sort_by_key(|&e| tree.total_size(e));
    for elt in to_replace.into_iter().rev() {
        rearrange::place_child(tree, segment, elt, 0, None, false, false, false)?;
    }

    // 7. Grow the Segment to cover its last child (honoring the
    // off-by-one rule), fill internal gaps, then pad a trailing Void.
    let end = rearrange::last_child_end(tree, segment);
    let size = tree.node(segment).header.size() as i64;
    if end == size - 1 {
        tree.node_mut(segment).header.set_size((size + 1) as u64)?;
    } else if end > size {
        tree.node_mut(segment).header.set_size(end as u64)?;
    }
    rearrange::fill_gaps(tree, segment)?;
    let end = rearrange::last_child_end(tree, segment);
    let size = tree.node(segment).header.size() as i64;
    if size > end {
        rearrange::insert_void(tree, segment, end, (size - end) as u64)?;
    }

    // 8. Restore the shielded regions, then finalize the SeekHead's
    // SeekPosition values against everyone's final position.
    remove_placeholders(tree, segment, restores);
    finalize_seek_head(tree, &seek_entries);

    Ok(())
}

fn atomic_node(id: u32, pos_relative: i64, value: Value, data_len: u64) -> Result<Node> {
    Ok(Node {
        header: Header::minimal(id, data_len)?,
        name: schema::lookup(id).name,
        parent: None,
        pos_relative,
        state: ReadState::Loaded,
        original: None,
        forced_dirty: true,
        kind: Kind::Atomic(value),
    })
}

/// Build one `Seek` entry indexing `target`, with its `SeekID`/
/// `SeekPosition` children stored at their maximum width (4 and 8 bytes
/// respectively) so finalizing the position later never needs a resize.
fn build_seek_entry(tree: &mut Tree, target: ElementId, pos_relative: i64) -> Result<ElementId> {
    let id_bytes = vint::encode_id(tree.ebml_id(target), 4);
    let seek_id = tree.alloc(atomic_node(SEEK_ID_ID, 0, Value::Binary(id_bytes), 4)?);
    let seek_id_len = tree.total_size(seek_id) as i64;
    let target_pos = tree.pos_relative(target).max(0) as u64;
    let seek_pos = tree.alloc(atomic_node(
        SEEK_POSITION_ID,
        seek_id_len,
        Value::Unsigned(target_pos),
        8,
    )?);
    let data_len = seek_id_len as u64 + tree.total_size(seek_pos);
    let seek = tree.alloc(Node {
        header: Header::minimal(SEEK_ID, data_len)?,
        name: "Seek",
        parent: None,
        pos_relative,
        state: ReadState::Loaded,
        original: None,
        forced_dirty: true,
        kind: Kind::Master {
            children: SortedList::new(),
        },
    });
    tree.add_child(seek, seek_id);
    tree.add_child(seek, seek_pos);
    Ok(seek)
}

/// Build a fresh `SeekHead` indexing every to-index child of `segment`,
/// attached to `segment` at position 0. Returns the `SeekHead`'s id and
/// the `(Seek entry, indexed target)` pairs needed to finalize positions
/// once the rest of the layout has settled.
fn build_seek_head(tree: &mut Tree, segment: ElementId) -> Result<(ElementId, Vec<(ElementId, ElementId)>)> {
    let targets: Vec<ElementId> = tree
        .children(segment)
        .into_iter()
        .filter(|&c| TO_INDEX.contains(&tree.node(c).name))
        .collect();

    let seek_head = tree.alloc(Node {
        header: Header::minimal(SEEK_HEAD_ID, 0)?,
        name: "SeekHead",
        parent: None,
        pos_relative: 0,
        state: ReadState::Loaded,
        original: None,
        forced_dirty: true,
        kind: Kind::Master {
            children: SortedList::new(),
        },
    });
    tree.add_child(segment, seek_head);

    let mut entries = Vec::new();
    let mut cur = 0i64;
    for &target in &targets {
        let seek = build_seek_entry(tree, target, cur)?;
        cur += tree.total_size(seek) as i64;
        tree.add_child(seek_head, seek);
        entries.push((seek, target));
    }
    Ok((seek_head, entries))
}

fn finalize_seek_head(tree: &mut Tree, entries: &[(ElementId, ElementId)]) {
    for &(seek, target) in entries {
        let pos = tree.pos_relative(target).max(0) as u64;
        if let Some(seek_pos_child) = tree
            .children(seek)
            .into_iter()
            .find(|&c| tree.ebml_id(c) == SEEK_POSITION_ID)
        {
            tree.node_mut(seek_pos_child).kind = Kind::Atomic(Value::Unsigned(pos));
            tree.node_mut(seek_pos_child).forced_dirty = true;
        }
    }
}

struct PlaceholderRestore {
    placeholder: ElementId,
    original: ElementId,
}

fn placeholder_header(total: u64) -> Result<Header> {
    let id_width = vint::id_byte_length(PLACEHOLDER_ID);
    let mut size_width = 1u8;
    loop {
        if total < id_width as u64 + size_width as u64 {
            return Err(Error::Inconsistent(
                "Cluster/Cues region too small to shield with a placeholder".into(),
            ));
        }
        let data = total - id_width as u64 - size_width as u64;
        if VInt::min_width(data) <= size_width {
            return Header::new(PLACEHOLDER_ID, id_width, data, size_width);
        }
        size_width += 1;
    }
}

fn add_placeholders(tree: &mut Tree, segment: ElementId) -> Result<Vec<PlaceholderRestore>> {
    let shielded: Vec<ElementId> = tree
        .children(segment)
        .into_iter()
        .filter(|&c| matches!(tree.ebml_id(c), CLUSTER_ID | CUES_ID))
        .collect();
    let mut restores = Vec::new();
    for original in shielded {
        let pos = tree.pos_relative(original);
        let total = tree.total_size(original);
        tree.remove_child(segment, original);
        let placeholder = tree.alloc(Node {
            header: placeholder_header(total)?,
            name: "Placeholder",
            parent: None,
            pos_relative: pos,
            state: ReadState::Loaded,
            original: None,
            forced_dirty: false,
            kind: Kind::Placeholder,
        });
        tree.add_child(segment, placeholder);
        restores.push(PlaceholderRestore { placeholder, original });
    }
    Ok(restores)
}

fn remove_placeholders(tree: &mut Tree, segment: ElementId, restores: Vec<PlaceholderRestore>) {
    for r in restores {
        let pos = tree.pos_relative(r.placeholder);
        tree.remove_child(segment, r.placeholder);
        tree.set_pos_relative(r.original, pos);
        tree.add_child(segment, r.original);
    }
}
