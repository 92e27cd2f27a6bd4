//! Dirty tracking: per-element flag computed from original position,
//! total size, header width, and value signature, recursing into Master
//! children.
//!
//! Ported from `ebml/element.py`'s `is_dirty`/`set_dirty` and
//! `ElementMaster`'s override that also checks children.

use crate::tree::{ElementId, Kind, Snapshot, Tree, Value};
use sha2::{Digest, Sha512};

/// Binaries at or above this length are fingerprinted by hash instead of
/// being duplicated into the snapshot, per spec §4.9.
const HASH_THRESHOLD: usize = 1024;

/// Compute the value fingerprint used to detect a changed atomic value
/// without keeping a second copy of large binaries around.
pub fn value_signature(kind: &Kind) -> Option<Vec<u8>> {
    match kind {
        Kind::Atomic(Value::Binary(b)) if b.len() >= HASH_THRESHOLD => {
            let mut hasher = Sha512::new();
            hasher.update(b);
            Some(hasher.finalize().to_vec())
        }
        Kind::Atomic(v) => Some(format!("{v:?}").into_bytes()),
        _ => None,
    }
}

/// Snapshot this element's current on-disk image, to be compared against
/// later by [`is_dirty`].
pub fn snapshot(tree: &Tree, id: ElementId) -> Snapshot {
    Snapshot {
        abs_pos: tree.pos_absolute(id) as u64,
        total_size: tree.total_size(id),
        header_width: tree.node(id).header.encoded_width(),
        value_signature: value_signature(&tree.node(id).kind),
    }
}

/// Mark `id` (and, if `recurse`, every descendant) as matching its
/// current on-disk image — the state right after a successful read or
/// write.
pub fn clear_dirty(tree: &mut Tree, id: ElementId, recurse: bool) {
    let snap = snapshot(tree, id);
    let node = tree.node_mut(id);
    node.original = Some(snap);
    node.forced_dirty = false;
    if recurse {
        for c in tree.children(id) {
            clear_dirty(tree, c, true);
        }
    }
}

/// Force `id` (and every descendant) dirty, e.g. before a normalize pass
/// that may rewrite any byte in the subtree (`set_dirty('recurse')` in
/// the original).
pub fn force_dirty_recurse(tree: &mut Tree, id: ElementId) {
    tree.node_mut(id).forced_dirty = true;
    for c in tree.children(id) {
        force_dirty_recurse(tree, c);
    }
}

/// Whether `id` differs from its snapshot, or (for Masters) any
/// descendant does.
pub fn is_dirty(tree: &Tree, id: ElementId) -> bool {
    let node = tree.node(id);
    if node.forced_dirty {
        return true;
    }
    let Some(orig) = &node.original else {
        // never read from disk: always dirty.
        return true;
    };
    if tree.pos_absolute(id) as u64 != orig.abs_pos
        || tree.total_size(id) != orig.total_size
        || node.header.encoded_width() != orig.header_width
    {
        return true;
    }
    if value_signature(&node.kind) != orig.value_signature {
        return true;
    }
    if matches!(node.kind, Kind::Master { .. }) {
        return tree.children(id).iter().any(|&c| is_dirty(tree, c));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::tree::{Node, ReadState};

    fn leaf(size: u64) -> Node {
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
    fn fresh_node_is_dirty() {
        let mut tree = Tree::new();
        let id = tree.alloc(leaf(5));
        assert!(is_dirty(&tree, id));
        clear_dirty(&mut tree, id, false);
        assert!(!is_dirty(&tree, id));
    }

    #[test]
    fn moving_marks_dirty() {
        let mut tree = Tree::new();
        let id = tree.alloc(leaf(5));
        clear_dirty(&mut tree, id, false);
        tree.node_mut(id).pos_relative = 10;
        assert!(is_dirty(&tree, id));
    }

    #[test]
    fn large_binary_uses_hash_signature() {
        let data = vec![7u8; 2048];
        let mut tree = Tree::new();
        let mut n = leaf(2048);
        n.kind = Kind::Atomic(Value::Binary(data));
        let id = tree.alloc(n);
        let sig = value_signature(&tree.node(id).kind).unwrap();
        assert_eq!(sig.len(), 64); // SHA-512 digest length
    }
}
