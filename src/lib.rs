#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
//! An in-place Matroska/EBML editing engine.
//!
//! Reads a stream into an arena-backed element tree, lets a caller inspect
//! and mutate elements in place, then normalizes and writes back only the
//! parts of the file that actually changed — untouched `Cluster`/`Cues`
//! payloads are never re-copied.
//!
//! [`file::File`] is the entry point: [`file::File::open`] parses a stream,
//! [`file::File::save_changes`] normalizes every `Segment` and writes the
//! result back out.

mod error;
pub use error::*;

/// EBML variable-length integer and element ID codecs.
pub mod vint;

/// Element headers: ID, size, and their on-disk widths.
pub mod header;

/// The static table of known Matroska/EBML elements.
pub mod schema;

/// A sorted association list used for each master element's children.
mod childlist;

/// The arena-backed element tree every other module operates on.
pub mod tree;

/// Header-width and data-size arithmetic for resizing an element in place.
pub mod sizing;

/// Dirty tracking: deciding which elements changed since they were read.
pub mod dirty;

/// Finding free space between a master's children.
mod gap;

/// Placing and rearranging children to fit a size budget in place.
pub mod rearrange;

/// Blocking stream I/O: reading a tree from a stream, writing it back.
pub mod io;

/// `Segment` normalization: rebuilding its `SeekHead` and laying its
/// children out consecutively.
pub mod normalize;

/// Typed accessors for the handful of elements callers read most often.
pub mod accessors;

/// The top-level file handle tying parsing, normalization, and writing
/// together.
pub mod file;

/// Common types for working with this crate.
pub mod prelude {
    pub use crate::accessors::*;
    pub use crate::error::*;
    pub use crate::file::File;
    pub use crate::tree::{ElementId, Kind, Tree, Value};
}
