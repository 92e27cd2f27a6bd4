use crate::vint::VInt;

/// Error types for this crate.
///
/// Variants map onto the four failure kinds the engine distinguishes:
/// decode-time malformed input, running out of stream, attempts to set an
/// element to an invalid value, and post-hoc tree invariant violations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A VINT's first byte had no leading one bit within 8 bytes, or a
    /// reserved "unknown length" marker was used where a length was
    /// required.
    #[error("invalid variable-length integer encoding")]
    InvalidVInt,

    /// Element header or body ran past the bytes actually available.
    #[error("unexpected end of stream: needed {needed} more bytes")]
    EndOfStream {
        /// Bytes still required when the stream ran out.
        needed: u64,
    },

    /// An element's declared size does not match the schema or the bytes
    /// actually present (e.g. a master element claims a size smaller than
    /// the mandatory fields the schema requires).
    #[error("malformed element {id}: {reason}")]
    DecodeError {
        /// EBML ID of the offending element.
        id: VInt,
        /// Human-readable explanation.
        reason: String,
    },

    /// Attempted to resize an element to a width or total size that no
    /// variant-specific constraint allows.
    #[error("invalid resize of element {id} to {attempted} bytes")]
    InvalidResize {
        /// EBML ID of the element being resized.
        id: VInt,
        /// The rejected size.
        attempted: u64,
    },

    /// Attempted to assign a value outside the variant's or schema's
    /// domain (negative to Unsigned, oversized binary, out-of-range
    /// numeric, etc).
    #[error("value out of domain for element {id}: {reason}")]
    ValueError {
        /// EBML ID of the element whose value was rejected.
        id: VInt,
        /// Human-readable explanation.
        reason: String,
    },

    /// A container or element violates a tree invariant: overlap, gap,
    /// missing mandatory child, duplicate unique child, or a placement
    /// request that has nowhere left to go.
    #[error("inconsistent tree state: {0}")]
    Inconsistent(String),

    /// Missing a schema-mandatory child element.
    #[error("missing mandatory element {0} in parent {1}")]
    MissingElement(VInt, VInt),

    /// Duplicate element in a master element that the schema marks unique.
    #[error("duplicate element {id} in master element {parent}")]
    DuplicateElement {
        /// The duplicate element ID.
        id: VInt,
        /// The parent master element ID.
        parent: VInt,
    },

    /// Element body size is the reserved "unknown length" marker, which
    /// this engine never writes and only tolerates on deferred reads.
    #[error("element body size is unknown, ID: {0}")]
    ElementBodySizeUnknown(VInt),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
