//! Element tree storage: an arena of nodes with parent back-references,
//! per Design Note 9 ("implement as an arena/slotmap with stable indices
//! plus a parent-index field... do not model parent as a co-owning
//! reference").
//!
//! Removing a child unlinks it from its parent's child list; the freed
//! node stays in the arena (unreachable from the root) rather than being
//! physically deallocated, which keeps every other node's `ElementId`
//! stable. This mirrors the original's GC-backed Python objects, where an
//! unlinked `Element` simply becomes unreferenced.

use crate::childlist::SortedList;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::schema::{self, AtomicKind, Kind as SchemaKind, SchemaEntry};
use crate::vint::VInt;

/// Stable index into a [`Tree`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub(crate) u32);

/// How much of an element's payload has actually been read from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Header parsed, payload untouched.
    Unloaded,
    /// Payload span recorded but not parsed into children (MasterDefer).
    Summary,
    /// Fully parsed.
    Loaded,
}

/// A typed atomic value, tagged by [`AtomicKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unsigned integer value.
    Unsigned(u64),
    /// Signed integer value.
    Signed(i64),
    /// Boolean value (stored as its unsigned encoding).
    Boolean(bool),
    /// Enum value (raw integer; label resolved via schema).
    Enum(u64),
    /// Bit field value (raw integer; labels resolved via schema).
    BitField(u64),
    /// Floating point value.
    Float(f64),
    /// ASCII string value.
    Ascii(String),
    /// UTF-8 string value.
    Utf8(String),
    /// Nanoseconds since 2001-01-01T00:00:00Z.
    Date(i64),
    /// Opaque binary value.
    Binary(Vec<u8>),
    /// A nested element ID.
    Id(u32),
}

impl Value {
    /// Minimal byte width needed to encode this value, ignoring any
    /// schema floor.
    pub fn min_width(&self) -> u64 {
        match self {
            Value::Unsigned(v) => unsigned_width(*v),
            Value::Signed(v) => signed_width(*v),
            Value::Boolean(_) => 1,
            Value::Enum(v) | Value::BitField(v) => unsigned_width(*v),
            Value::Float(_) => 4,
            Value::Ascii(s) => s.len() as u64,
            Value::Utf8(s) => s.len() as u64,
            Value::Date(_) => 8,
            Value::Binary(b) => b.len() as u64,
            Value::Id(id) => VInt::min_width(*id as u64) as u64,
        }
    }

    /// Encode this value into exactly `width` bytes, per the encoding
    /// rules in spec §3.
    pub fn encode(&self, width: u64) -> Result<Vec<u8>> {
        let w = width as usize;
        match self {
            Value::Unsigned(v) | Value::Enum(v) | Value::BitField(v) => {
                encode_be_trunc(*v, w)
            }
            Value::Boolean(b) => encode_be_trunc(*b as u64, w),
            Value::Signed(v) => {
                let bytes = v.to_be_bytes();
                if w > 8 {
                    return Err(Error::ValueError {
                        id: VInt::new(0),
                        reason: "signed width exceeds 8 bytes".into(),
                    });
                }
                Ok(bytes[8 - w..].to_vec())
            }
            Value::Float(v) => match w {
                4 => Ok((*v as f32).to_be_bytes().to_vec()),
                8 => Ok(v.to_be_bytes().to_vec()),
                _ => Err(Error::ValueError {
                    id: VInt::new(0),
                    reason: "float width must be 4 or 8".into(),
                }),
            },
            Value::Ascii(s) | Value::Utf8(s) => {
                let mut out = s.as_bytes().to_vec();
                if out.len() > w {
                    return Err(Error::ValueError {
                        id: VInt::new(0),
                        reason: "string longer than requested width".into(),
                    });
                }
                out.resize(w, 0);
                Ok(out)
            }
            Value::Date(v) => {
                if w != 8 {
                    return Err(Error::ValueError {
                        id: VInt::new(0),
                        reason: "date width must be 8".into(),
                    });
                }
                Ok(v.to_be_bytes().to_vec())
            }
            Value::Binary(b) => {
                if b.len() != w {
                    return Err(Error::ValueError {
                        id: VInt::new(0),
                        reason: "binary width must equal content length".into(),
                    });
                }
                Ok(b.clone())
            }
            Value::Id(id) => crate::vint::encode(*id as u64, width as u8),
        }
    }

    /// Decode a value of `kind` from exactly `bytes`.
    pub fn decode(kind: AtomicKind, bytes: &[u8]) -> Result<Self> {
        let unsigned = || -> u64 {
            let mut buf = [0u8; 8];
            buf[8 - bytes.len()..].copy_from_slice(bytes);
            u64::from_be_bytes(buf)
        };
        Ok(match kind {
            AtomicKind::Unsigned => Value::Unsigned(unsigned()),
            AtomicKind::Signed => {
                let mut buf = [0u8; 8];
                let fill = if bytes.first().is_some_and(|b| b & 0x80 != 0) {
                    0xFF
                } else {
                    0
                };
                buf.fill(fill);
                buf[8 - bytes.len()..].copy_from_slice(bytes);
                Value::Signed(i64::from_be_bytes(buf))
            }
            AtomicKind::Boolean => Value::Boolean(unsigned() != 0),
            AtomicKind::Enum => Value::Enum(unsigned()),
            AtomicKind::BitField => Value::BitField(unsigned()),
            AtomicKind::Float => match bytes.len() {
                4 => {
                    let mut b4 = [0u8; 4];
                    b4.copy_from_slice(bytes);
                    Value::Float(f32::from_be_bytes(b4) as f64)
                }
                8 => {
                    let mut b8 = [0u8; 8];
                    b8.copy_from_slice(bytes);
                    Value::Float(f64::from_be_bytes(b8))
                }
                n => {
                    return Err(Error::DecodeError {
                        id: VInt::new(0),
                        reason: format!("float width {n} not in {{4,8}}"),
                    })
                }
            },
            AtomicKind::Ascii => Value::Ascii(
                String::from_utf8_lossy(trim_trailing_nul(bytes)).into_owned(),
            ),
            AtomicKind::Utf8 => Value::Utf8(
                String::from_utf8(trim_trailing_nul(bytes).to_vec()).map_err(|_| {
                    Error::DecodeError {
                        id: VInt::new(0),
                        reason: "invalid utf-8".into(),
                    }
                })?,
            ),
            AtomicKind::Date => {
                if bytes.len() != 8 {
                    return Err(Error::DecodeError {
                        id: VInt::new(0),
                        reason: "date must be 8 bytes".into(),
                    });
                }
                let mut b8 = [0u8; 8];
                b8.copy_from_slice(bytes);
                Value::Date(i64::from_be_bytes(b8))
            }
            AtomicKind::Binary => Value::Binary(bytes.to_vec()),
            AtomicKind::Id => {
                let mut slice = bytes;
                let (v, _) = crate::vint::decode(&mut slice)?;
                Value::Id(v.value as u32)
            }
        })
    }
}

fn trim_trailing_nul(b: &[u8]) -> &[u8] {
    let end = b.iter().rposition(|&c| c != 0).map(|i| i + 1).unwrap_or(0);
    &b[..end]
}

fn encode_be_trunc(v: u64, width: usize) -> Result<Vec<u8>> {
    if width > 8 || (width < 8 && v >> (width * 8) != 0) {
        return Err(Error::ValueError {
            id: VInt::new(v),
            reason: format!("value does not fit in {width} bytes"),
        });
    }
    Ok(v.to_be_bytes()[8 - width..].to_vec())
}

fn unsigned_width(v: u64) -> u64 {
    let bits = 64 - v.leading_zeros() as u64;
    bits.div_ceil(8).max(1)
}

fn signed_width(v: i64) -> u64 {
    for w in 1..=8u32 {
        let bits = 8 * w - 1;
        let lo = -(1i64 << bits.min(63));
        let hi = (1i64 << bits.min(63)) - 1;
        if v >= lo && v <= hi {
            return w as u64;
        }
    }
    8
}

/// What kind of element a node is, and its kind-specific state.
#[derive(Debug, Clone)]
pub enum Kind {
    /// Container with always-resident children.
    Master { children: SortedList<i64, ElementId> },
    /// Container whose children may remain unread in `Summary` state.
    MasterDefer {
        children: SortedList<i64, ElementId>,
        /// Absolute byte range of the unread payload, while `Summary`.
        raw_span: Option<(u64, u64)>,
    },
    /// Typed scalar/string value.
    Atomic(Value),
    /// Padding; data bytes are meaningless.
    Void,
    /// Opaque immovable resident span standing in for unread data (used
    /// internally by the normalizer to shield Cluster/Cues regions).
    Placeholder,
    /// Opaque element this engine cannot interpret or rewrite.
    Unsupported { raw: Vec<u8> },
}

/// A snapshot of an element's on-disk image, used to compute `dirty`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Absolute byte offset at load time.
    pub abs_pos: u64,
    /// Total encoded size (header + data) at load time.
    pub total_size: u64,
    /// Encoded header width at load time.
    pub header_width: u64,
    /// Value fingerprint at load time (see `dirty.rs`).
    pub value_signature: Option<Vec<u8>>,
}

/// One node in the element tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) header: Header,
    pub(crate) name: &'static str,
    pub(crate) parent: Option<ElementId>,
    pub(crate) pos_relative: i64,
    pub(crate) state: ReadState,
    pub(crate) original: Option<Snapshot>,
    pub(crate) forced_dirty: bool,
    pub(crate) kind: Kind,
}

/// An element tree: an arena of [`Node`]s plus the index of the root
/// (always an `EBML` master at the top).
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// An empty arena.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Allocate a new node, returning its stable id.
    pub fn alloc(&mut self, node: Node) -> ElementId {
        let id = ElementId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Immutable access to a node.
    pub fn node(&self, id: ElementId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Mutable access to a node.
    pub fn node_mut(&mut self, id: ElementId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// EBML ID of an element.
    pub fn ebml_id(&self, id: ElementId) -> u32 {
        self.node(id).header.id()
    }

    /// Schema name of an element (e.g. `"Title"`, `"Cluster"`).
    pub fn name(&self, id: ElementId) -> &'static str {
        self.node(id).name
    }

    /// Schema entry for an element.
    pub fn schema_of(&self, id: ElementId) -> SchemaEntry {
        schema::lookup(self.ebml_id(id))
    }

    /// Total encoded size (header + data) of an element.
    pub fn total_size(&self, id: ElementId) -> u64 {
        let n = self.node(id);
        n.header.encoded_width() + n.header.size()
    }

    /// Position relative to the parent's data area.
    pub fn pos_relative(&self, id: ElementId) -> i64 {
        self.node(id).pos_relative
    }

    /// Absolute byte position of the element's header start.
    pub fn pos_absolute(&self, id: ElementId) -> i64 {
        match self.node(id).parent {
            Some(parent) => self.pos_data_absolute(parent) + self.pos_relative(id),
            None => self.pos_relative(id),
        }
    }

    /// Absolute byte position of the element's own data area start.
    pub fn pos_data_absolute(&self, id: ElementId) -> i64 {
        self.pos_absolute(id) + self.node(id).header.encoded_width() as i64
    }

    /// Absolute byte position just past the element.
    pub fn pos_end_absolute(&self, id: ElementId) -> i64 {
        self.pos_absolute(id) + self.total_size(id) as i64
    }

    /// Nesting depth; the root is level 0.
    pub fn level(&self, id: ElementId) -> u32 {
        let mut depth = 0;
        let mut cur = self.node(id).parent;
        while let Some(p) = cur {
            depth += 1;
            cur = self.node(p).parent;
        }
        depth
    }

    /// Children of a Master/MasterDefer element, in position order. Empty
    /// for any other kind.
    pub fn children(&self, id: ElementId) -> Vec<ElementId> {
        match &self.node(id).kind {
            Kind::Master { children } | Kind::MasterDefer { children, .. } => {
                children.values().copied().collect()
            }
            _ => Vec::new(),
        }
    }

    /// True if `id` is a Master or MasterDefer node.
    pub fn is_master(&self, id: ElementId) -> bool {
        matches!(self.node(id).kind, Kind::Master { .. } | Kind::MasterDefer { .. })
    }

    /// True if `id` is a Void node.
    pub fn is_void(&self, id: ElementId) -> bool {
        matches!(self.node(id).kind, Kind::Void)
    }

    /// This element's decoded value, if it is atomic.
    pub fn value(&self, id: ElementId) -> Option<&Value> {
        match &self.node(id).kind {
            Kind::Atomic(v) => Some(v),
            _ => None,
        }
    }

    /// Replace an atomic element's value in place. Does not touch its
    /// header width — callers resize separately via
    /// [`crate::sizing::resize`] once the new value's encoded width is
    /// known, the same way a header grows independently of its data in
    /// this engine.
    pub fn set_value(&mut self, id: ElementId, value: Value) -> Result<()> {
        match &self.node(id).kind {
            Kind::Atomic(_) => {
                self.node_mut(id).kind = Kind::Atomic(value);
                Ok(())
            }
            _ => Err(Error::Inconsistent(format!(
                "element {} is not atomic",
                self.node(id).name
            ))),
        }
    }

    /// Two elements are intrinsically equal if their ID, name, and (for
    /// atomics) value match — excluding position and parent.
    pub fn intrinsic_equal(&self, a: ElementId, b: ElementId) -> bool {
        let na = self.node(a);
        let nb = self.node(b);
        if na.header.id() != nb.header.id() || na.name != nb.name {
            return false;
        }
        match (&na.kind, &nb.kind) {
            (Kind::Atomic(va), Kind::Atomic(vb)) => va == vb,
            (Kind::Void, Kind::Void) => true,
            (Kind::Unsupported { raw: ra }, Kind::Unsupported { raw: rb }) => ra == rb,
            (Kind::Master { .. }, Kind::Master { .. }) => true,
            (Kind::MasterDefer { .. }, Kind::MasterDefer { .. }) => true,
            (Kind::Placeholder, Kind::Placeholder) => true,
            _ => false,
        }
    }

    /// Insert `child` into `parent`'s child list at its current
    /// `pos_relative`, and set the child's parent back-reference.
    pub fn add_child(&mut self, parent: ElementId, child: ElementId) {
        let pos = self.pos_relative(child);
        self.node_mut(child).parent = Some(parent);
        match &mut self.node_mut(parent).kind {
            Kind::Master { children } | Kind::MasterDefer { children, .. } => {
                children.insert(pos, child);
            }
            _ => panic!("add_child on non-master element"),
        }
    }

    /// Remove `child` from `parent`'s child list and null its parent
    /// back-reference. The node itself remains allocated but unreachable.
    pub fn remove_child(&mut self, parent: ElementId, child: ElementId) {
        self.remove_child_raw(parent, child);
        self.node_mut(child).parent = None;
    }

    /// Set an element's `pos_relative`, keeping the parent's child list
    /// sorted. No-op for root elements.
    pub fn set_pos_relative(&mut self, id: ElementId, pos: i64) {
        if let Some(parent) = self.node(id).parent {
            self.remove_child_raw(parent, id);
            self.node_mut(id).pos_relative = pos;
            self.add_child(parent, id);
        } else {
            self.node_mut(id).pos_relative = pos;
        }
    }

    fn remove_child_raw(&mut self, parent: ElementId, child: ElementId) {
        let children = match &mut self.node_mut(parent).kind {
            Kind::Master { children } | Kind::MasterDefer { children, .. } => children,
            _ => panic!("remove_child_raw on non-master element"),
        };
        let old_pos = self.node(child).pos_relative;
        if let Some(i) = children.index_of(old_pos) {
            if children.get(i).map(|e| e.1) == Some(child) {
                children.remove_at(i);
                return;
            }
        }
        // fall back to a linear scan in the unlikely case of stale duplicate keys
        for i in 0..children.len() {
            if children.get(i).map(|e| e.1) == Some(child) {
                children.remove_at(i);
                return;
            }
        }
    }
}
