//! Stream writer: writes only the dirty parts of a tree back to a
//! seekable sink, leaving clean spans untouched on disk.
//!
//! Ported from `ebml/container.py`'s `Container.write`: a master with no
//! dirty descendant is skipped entirely (not even its header is
//! rewritten); a clean atomic reproduces its exact original bytes only if
//! something forces it to be rewritten (e.g. a dirty sibling shifted the
//! absolute write cursor and the whole region is being re-streamed).

use crate::dirty;
use crate::error::{Error, Result};
use crate::tree::{ElementId, Kind, Tree};
use std::io::{Seek, SeekFrom, Write};

/// Write every dirty element in the subtree rooted at `id` to `w`,
/// seeking past clean subtrees instead of touching their bytes.
pub fn write_document<W: Write + Seek>(w: &mut W, tree: &Tree, id: ElementId) -> Result<()> {
    write_element(w, tree, id)
}

fn write_element<W: Write + Seek>(w: &mut W, tree: &Tree, id: ElementId) -> Result<()> {
    if !dirty::is_dirty(tree, id) {
        return Ok(());
    }
    let abs = tree.pos_absolute(id) as u64;
    w.seek(SeekFrom::Start(abs))?;
    let node = tree.node(id);
    match &node.kind {
        Kind::Master { .. } => {
            w.write_all(&node.header.encode())?;
            for c in tree.children(id) {
                write_element(w, tree, c)?;
            }
        }
        Kind::MasterDefer { raw_span, .. } => {
            w.write_all(&node.header.encode())?;
            match raw_span {
                // Still unparsed: only the header can have changed
                // (e.g. its position moved), the payload is untouched.
                Some(_) => {}
                None => {
                    for c in tree.children(id) {
                        write_element(w, tree, c)?;
                    }
                }
            }
        }
        Kind::Atomic(v) => {
            w.write_all(&node.header.encode())?;
            w.write_all(&v.encode(node.header.size())?)?;
        }
        Kind::Void => {
            w.write_all(&node.header.encode())?;
            w.write_all(&vec![0u8; node.header.size() as usize])?;
        }
        Kind::Placeholder => {
            return Err(Error::Inconsistent(
                "attempted to write a placeholder element directly".into(),
            ));
        }
        Kind::Unsupported { raw } => {
            w.write_all(&node.header.encode())?;
            w.write_all(raw)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirty::clear_dirty;
    use crate::io::reader::read_document;
    use std::io::Cursor;

    #[test]
    fn unmodified_read_rewrites_identically() {
        let mut buf = Vec::new();
        buf.extend(crate::header::Header::minimal(0x1A45_DFA3, 3).unwrap().encode());
        buf.extend(crate::header::Header::minimal(0x4286, 1).unwrap().encode());
        buf.push(1);
        let original = buf.clone();

        let mut cur = Cursor::new(buf);
        let (mut tree, root) = read_document(&mut cur, false).unwrap();
        clear_dirty(&mut tree, root, true);

        let mut out = Cursor::new(vec![0u8; original.len()]);
        write_document(&mut out, &tree, root).unwrap();
        // nothing was dirty: the writer should have touched nothing.
        assert_eq!(out.into_inner(), vec![0u8; original.len()]);
    }
}
