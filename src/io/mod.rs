//! Blocking stream I/O: reads a byte stream into an element [`tree`](crate::tree),
//! and writes a tree's dirty elements back out in place.
//!
//! Ported from `ebml/container.py`'s `Container.read`/`Container.write` and
//! `File.read_summary`.

pub mod reader;
pub mod writer;

pub use reader::{peek_element, read_document, Peek};
pub use writer::write_document;
