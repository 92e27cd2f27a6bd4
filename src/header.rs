//! EBML element header: an ID VINT followed by a size VINT.
//!
//! Ported from the growth-only semantics of the original `ebml/header.py`:
//! setting `size` may grow the header's encoded width but never shrinks it
//! implicitly. Resizing to a narrower encoding is always an explicit,
//! range-checked operation (`set_encoded_width`), mirroring the size
//! solver's preference for leaving header widths alone.

use crate::error::{Error, Result};
use crate::vint::{self, VInt};
use std::io::Read;

/// Pair of (element ID, payload size) with a separately tracked, mutable
/// encoded width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    id: u32,
    id_width: u8,
    size: u64,
    size_width: u8,
}

impl Header {
    /// Build a header from an already-known canonical ID width and a size
    /// VINT width. `size_width` must be at least `VInt::min_width(size)`.
    pub fn new(id: u32, id_width: u8, size: u64, size_width: u8) -> Result<Self> {
        if size > vint::MAX_DATA_SIZE || size_width < VInt::min_width(size) || size_width > 8 {
            return Err(Error::InvalidResize {
                id: VInt::new(id as u64),
                attempted: size,
            });
        }
        Ok(Self {
            id,
            id_width,
            size,
            size_width,
        })
    }

    /// Build a header at its minimal encoded width for both fields.
    pub fn minimal(id: u32, size: u64) -> Result<Self> {
        let id_width = vint::id_byte_length(id);
        Self::new(id, id_width, size, VInt::min_width(size))
    }

    /// The element's EBML ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The declared payload size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Width in bytes of the encoded ID VINT. IDs are always canonically
    /// encoded, so this never changes after construction.
    pub fn id_width(&self) -> u8 {
        self.id_width
    }

    /// Width in bytes of the encoded size VINT.
    pub fn size_width(&self) -> u8 {
        self.size_width
    }

    /// Total encoded width of id + size VINTs.
    pub fn encoded_width(&self) -> u64 {
        self.id_width as u64 + self.size_width as u64
    }

    /// Smallest legal `size_width` for the current `size`.
    pub fn min_size_width(&self) -> u8 {
        VInt::min_width(self.size)
    }

    /// Set the payload size, growing `size_width` if the current width can
    /// no longer represent it. Never shrinks the width implicitly.
    pub fn set_size(&mut self, size: u64) -> Result<()> {
        if size > vint::MAX_DATA_SIZE {
            return Err(Error::InvalidResize {
                id: VInt::new(self.id as u64),
                attempted: size,
            });
        }
        let needed = VInt::min_width(size);
        if needed > self.size_width {
            self.size_width = needed;
        }
        self.size = size;
        Ok(())
    }

    /// Explicitly set the size VINT's encoded width. Range-checked against
    /// the current size; does not touch `size` itself.
    pub fn set_size_width(&mut self, width: u8) -> Result<()> {
        if !(1..=8).contains(&width) || width < VInt::min_width(self.size) {
            return Err(Error::InvalidResize {
                id: VInt::new(self.id as u64),
                attempted: width as u64,
            });
        }
        self.size_width = width;
        Ok(())
    }

    /// Decode a header from a blocking reader. Returns the header and
    /// whether its size VINT was the reserved "unknown length" marker
    /// (tolerated only for deferred/summary reads, e.g. a live-muxed
    /// Segment).
    pub fn read_from<R: Read>(r: &mut R) -> Result<(Self, bool)> {
        let (id, id_width) = vint::read_id_from(r)?;
        let (size, size_width) = vint::read_from(r)?;
        let header = Self {
            id,
            id_width,
            size: size.value,
            size_width,
        };
        Ok((header, size.is_unknown))
    }

    /// Encode this header's bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vint::encode_id(self.id, self.id_width);
        out.extend(vint::encode(self.size, self.size_width).expect("size_width kept consistent"));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regrowth_never_shrinks() {
        let mut h = Header::minimal(10, 0).unwrap();
        assert_eq!(h.encoded_width(), 2); // 1 byte id + 1 byte size(0)
        h.set_size(0x012233).unwrap();
        assert_eq!(h.size_width(), 4);
        h.set_size(0).unwrap();
        assert_eq!(h.size_width(), 4, "width must not shrink implicitly");
    }

    #[test]
    fn explicit_width_is_range_checked() {
        let mut h = Header::minimal(10, 1000).unwrap();
        assert!(h.set_size_width(1).is_err());
        assert!(h.set_size_width(9).is_err());
        assert!(h.set_size_width(8).is_ok());
    }

    #[test]
    fn round_trip() {
        let h = Header::new(0x1A45DFA3, 4, 512, 3).unwrap();
        let bytes = h.encode();
        let mut cur = std::io::Cursor::new(bytes);
        let (back, unknown) = Header::read_from(&mut cur).unwrap();
        assert!(!unknown);
        assert_eq!(back.id(), h.id());
        assert_eq!(back.size(), h.size());
        assert_eq!(back.size_width(), h.size_width());
    }
}
