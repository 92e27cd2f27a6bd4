//! Static Matroska/EBML schema table.
//!
//! Ported from the `Tag`/`TagDict` design in `tags.py`: every known element
//! ID maps to a fixed `SchemaEntry` describing its variant kind, allowed
//! parent, mandatoriness/uniqueness, minimum header/data widths, and (for
//! Enum/BitField atomics) label tables. Unknown IDs fall back to the
//! `Unsupported` variant, exactly as `TagDict.__getitem__` synthesizes an
//! `ElementUnsupported` tag on a miss.
//!
//! The table covers the slice of the Matroska tree needed to exercise the
//! editing engine end-to-end (EBML header, Segment, SeekHead/Seek, Info,
//! Cluster, Cues, and the opaque Tracks/Attachments/Chapters/Tags
//! subtrees) rather than the full specdata.xml tag set, matching
//! SPEC_FULL.md's scope decision.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Which element kind the tree builder should instantiate for a schema
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Container whose children are always resident.
    Master,
    /// Container whose children may remain unread while in summary state.
    MasterDefer,
    /// Typed scalar or string value.
    Atomic(AtomicKind),
    /// Padding element.
    Void,
    /// Opaque element whose ID the schema does not recognize, or whose
    /// content this engine refuses to interpret.
    Unsupported,
}

/// Atomic value encodings, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicKind {
    /// Big-endian unsigned integer, widths 1..=8.
    Unsigned,
    /// Two's-complement signed integer, widths 1..=8.
    Signed,
    /// Unsigned integer interpreted as truthy/falsy.
    Boolean,
    /// Unsigned integer mapped through `enum_labels`.
    Enum,
    /// Unsigned integer interpreted as a bit field via `enum_labels`.
    BitField,
    /// IEEE-754 big-endian float, widths {4, 8}.
    Float,
    /// ASCII string, NUL-padded.
    Ascii,
    /// UTF-8 string, NUL-padded.
    Utf8,
    /// Signed nanoseconds since 2001-01-01T00:00:00Z, width 8 only.
    Date,
    /// Opaque bytes.
    Binary,
    /// A nested VINT-encoded element ID.
    Id,
}

/// Which parents are allowed to contain a given element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRule {
    /// Appears only at Segment top level (no parent master).
    Level0,
    /// May appear under any master (CRC-32, Void).
    Global,
    /// May appear only under the named parent ID.
    Only(u32),
}

/// A single schema entry, the Rust analogue of `tags.py`'s `Tag`.
#[derive(Debug, Clone, Copy)]
pub struct SchemaEntry {
    /// EBML element ID.
    pub id: u32,
    /// Human-readable name.
    pub name: &'static str,
    /// Element variant to instantiate.
    pub kind: Kind,
    /// Allowed parent.
    pub parent: ParentRule,
    /// Must appear in a conforming parent.
    pub mandatory: bool,
    /// May appear more than once in the same parent.
    pub multiple: bool,
    /// Minimum header width in bytes (0 = no floor beyond VINT minimum).
    pub header_size_min: u8,
    /// Minimum data width in bytes.
    pub data_size_min: u64,
    /// Inclusive lower bound on numeric atomic values, if constrained.
    pub min_val: Option<i64>,
    /// Exclusive upper bound on numeric atomic values, if constrained.
    pub max_val: Option<i64>,
    /// Label table for Enum/BitField kinds.
    pub enum_labels: Option<&'static [(u64, &'static str)]>,
    /// Whether this tag may legally nest inside an instance of itself.
    pub recursive: bool,
}

impl SchemaEntry {
    const fn plain(
        id: u32,
        name: &'static str,
        kind: Kind,
        parent: ParentRule,
        mandatory: bool,
        multiple: bool,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            parent,
            mandatory,
            multiple,
            header_size_min: 0,
            data_size_min: 0,
            min_val: None,
            max_val: None,
            enum_labels: None,
            recursive: false,
        }
    }
}

/// EBML element ID for Void, shared across all master parents.
pub const VOID_ID: u32 = 0xEC;
/// EBML element ID for the CRC-32 checksum element.
pub const CRC32_ID: u32 = 0xBF;
/// EBML element ID for the outermost `EBML` header element.
pub const EBML_ID: u32 = 0x1A45_DFA3;
/// EBML element ID for `Segment`.
pub const SEGMENT_ID: u32 = 0x1853_8067;
/// EBML element ID for `Cluster`.
pub const CLUSTER_ID: u32 = 0x1F43_B675;
/// EBML element ID for `Cues`.
pub const CUES_ID: u32 = 0x1C53_BB6B;
/// EBML element ID for `SeekHead`.
pub const SEEK_HEAD_ID: u32 = 0x114D_9B74;
/// EBML element ID for a `Seek` entry inside `SeekHead`.
pub const SEEK_ID: u32 = 0x4DBB;
/// EBML element ID for `Seek > SeekID`.
pub const SEEK_ID_ID: u32 = 0x53AB;
/// EBML element ID for `Seek > SeekPosition`.
pub const SEEK_POSITION_ID: u32 = 0x53AC;
/// EBML element ID for `Info`.
pub const INFO_ID: u32 = 0x1549_A966;

const STEREO_MODE_LABELS: &[(u64, &str)] = &[(0, "mono"), (1, "side-by-side")];
const TRACK_TYPE_LABELS: &[(u64, &str)] = &[
    (0x1, "video"),
    (0x2, "audio"),
    (0x3, "complex"),
    (0x11, "subtitle"),
];

fn entries() -> Vec<SchemaEntry> {
    use Kind::*;
    use ParentRule::*;
    vec![
        SchemaEntry::plain(VOID_ID, "Void", Void, Global, false, true),
        SchemaEntry::plain(CRC32_ID, "CRC32", Atomic(AtomicKind::Binary), Global, false, false),
        SchemaEntry::plain(EBML_ID, "EBML", Master, Level0, true, false),
        SchemaEntry::plain(0x4286, "EBMLVersion", Atomic(AtomicKind::Unsigned), Only(EBML_ID), true, false),
        SchemaEntry::plain(0x42F7, "EBMLReadVersion", Atomic(AtomicKind::Unsigned), Only(EBML_ID), true, false),
        SchemaEntry::plain(0x42F2, "EBMLMaxIDLength", Atomic(AtomicKind::Unsigned), Only(EBML_ID), true, false),
        SchemaEntry::plain(0x42F3, "EBMLMaxSizeLength", Atomic(AtomicKind::Unsigned), Only(EBML_ID), true, false),
        SchemaEntry::plain(0x4282, "DocType", Atomic(AtomicKind::Ascii), Only(EBML_ID), true, false),
        SchemaEntry::plain(0x4287, "DocTypeVersion", Atomic(AtomicKind::Unsigned), Only(EBML_ID), true, false),
        SchemaEntry::plain(0x4285, "DocTypeReadVersion", Atomic(AtomicKind::Unsigned), Only(EBML_ID), true, false),
        SchemaEntry {
            header_size_min: 8,
            ..SchemaEntry::plain(SEGMENT_ID, "Segment", Master, Level0, true, true)
        },
        SchemaEntry::plain(SEEK_HEAD_ID, "SeekHead", Master, Only(SEGMENT_ID), false, true),
        SchemaEntry::plain(SEEK_ID, "Seek", Master, Only(SEEK_HEAD_ID), false, true),
        SchemaEntry::plain(SEEK_ID_ID, "SeekID", Atomic(AtomicKind::Binary), Only(SEEK_ID), true, false),
        SchemaEntry {
            data_size_min: 8,
            ..SchemaEntry::plain(SEEK_POSITION_ID, "SeekPosition", Atomic(AtomicKind::Unsigned), Only(SEEK_ID), true, false)
        },
        SchemaEntry::plain(INFO_ID, "Info", Master, Only(SEGMENT_ID), true, true),
        SchemaEntry::plain(0x73A4, "SegmentUID", Atomic(AtomicKind::Binary), Only(INFO_ID), false, false),
        SchemaEntry::plain(0x2AD7B1, "TimestampScale", Atomic(AtomicKind::Unsigned), Only(INFO_ID), true, false),
        SchemaEntry::plain(0x4489, "Duration", Atomic(AtomicKind::Float), Only(INFO_ID), false, false),
        SchemaEntry::plain(0x4461, "DateUTC", Atomic(AtomicKind::Date), Only(INFO_ID), false, false),
        SchemaEntry {
            data_size_min: 100,
            ..SchemaEntry::plain(0x7BA9, "Title", Atomic(AtomicKind::Utf8), Only(INFO_ID), false, false)
        },
        SchemaEntry::plain(0x4D80, "MuxingApp", Atomic(AtomicKind::Utf8), Only(INFO_ID), true, false),
        SchemaEntry::plain(0x5741, "WritingApp", Atomic(AtomicKind::Utf8), Only(INFO_ID), true, false),
        SchemaEntry::plain(0x1654_AE6B, "Tracks", Master, Only(SEGMENT_ID), false, true),
        SchemaEntry::plain(0xAE, "TrackEntry", Master, Only(0x1654_AE6B), true, true),
        SchemaEntry::plain(0xD7, "TrackNumber", Atomic(AtomicKind::Unsigned), Only(0xAE), true, false),
        SchemaEntry::plain(0x73C5, "TrackUID", Atomic(AtomicKind::Binary), Only(0xAE), true, false),
        SchemaEntry {
            enum_labels: Some(TRACK_TYPE_LABELS),
            ..SchemaEntry::plain(0x83, "TrackType", Atomic(AtomicKind::Enum), Only(0xAE), true, false)
        },
        SchemaEntry {
            enum_labels: Some(STEREO_MODE_LABELS),
            ..SchemaEntry::plain(0x53B8, "StereoMode", Atomic(AtomicKind::Enum), Global, false, false)
        },
        SchemaEntry {
            header_size_min: 4,
            ..SchemaEntry::plain(0x1941_A469, "Attachments", Master, Only(SEGMENT_ID), false, true)
        },
        SchemaEntry {
            header_size_min: 4,
            ..SchemaEntry::plain(0x61A7, "AttachedFile", Master, Only(0x1941_A469), true, true)
        },
        SchemaEntry::plain(0x465C, "FileData", Atomic(AtomicKind::Binary), Only(0x61A7), true, false),
        SchemaEntry::plain(0x4675, "FileUID", Atomic(AtomicKind::Binary), Only(0x61A7), true, false),
        SchemaEntry::plain(0x1043_A770, "Chapters", Master, Only(SEGMENT_ID), false, true),
        SchemaEntry {
            recursive: true,
            ..SchemaEntry::plain(0x45B9, "EditionEntry", Master, Only(0x1043_A770), true, true)
        },
        SchemaEntry::plain(0x1254_C367, "Tags", Master, Only(SEGMENT_ID), false, true),
        SchemaEntry::plain(0x7373, "Tag", Master, Only(0x1254_C367), true, true),
        SchemaEntry {
            ..SchemaEntry::plain(CLUSTER_ID, "Cluster", MasterDefer, Only(SEGMENT_ID), false, true)
        },
        SchemaEntry::plain(0xE7, "Timestamp", Atomic(AtomicKind::Unsigned), Only(CLUSTER_ID), true, false),
        SchemaEntry::plain(CUES_ID, "Cues", MasterDefer, Only(SEGMENT_ID), false, false),
        SchemaEntry::plain(0xBB, "CuePoint", Master, Only(CUES_ID), true, true),
    ]
}

struct Table {
    by_id: HashMap<u32, SchemaEntry>,
    by_name: HashMap<&'static str, u32>,
}

static TABLE: OnceLock<Table> = OnceLock::new();

fn table() -> &'static Table {
    TABLE.get_or_init(|| {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for e in entries() {
            by_name.insert(e.name, e.id);
            by_id.insert(e.id, e);
        }
        Table { by_id, by_name }
    })
}

/// Look up a schema entry by EBML ID. Unknown IDs synthesize an
/// `Unsupported`, globally-allowed, non-mandatory, repeatable entry named
/// `"Unknown"` — mirroring `TagDict.__getitem__`'s fallback.
pub fn lookup(id: u32) -> SchemaEntry {
    table().by_id.get(&id).copied().unwrap_or(SchemaEntry::plain(
        id,
        "Unknown",
        Kind::Unsupported,
        ParentRule::Global,
        false,
        true,
    ))
}

/// Look up a schema entry by name.
pub fn lookup_by_name(name: &str) -> Option<SchemaEntry> {
    table().by_name.get(name).map(|id| table().by_id[id])
}

/// Iterate over every level-0 (top-level, no parent master) schema entry.
pub fn level0s() -> impl Iterator<Item = SchemaEntry> {
    table()
        .by_id
        .values()
        .copied()
        .filter(|e| matches!(e.parent, ParentRule::Level0))
}

/// Children of `parent_id` that the schema marks mandatory.
pub fn required_children(parent_id: u32) -> Vec<SchemaEntry> {
    table()
        .by_id
        .values()
        .copied()
        .filter(|e| e.mandatory && matches_parent(e, parent_id))
        .collect()
}

/// Children of `parent_id` that the schema marks non-repeatable.
pub fn unique_children(parent_id: u32) -> Vec<SchemaEntry> {
    table()
        .by_id
        .values()
        .copied()
        .filter(|e| !e.multiple && matches_parent(e, parent_id))
        .collect()
}

/// Whether `child` may legally nest directly inside `parent_id`.
pub fn is_child(child: &SchemaEntry, parent_id: u32) -> bool {
    matches_parent(child, parent_id) || matches!(child.parent, ParentRule::Global)
}

fn matches_parent(entry: &SchemaEntry, parent_id: u32) -> bool {
    match entry.parent {
        ParentRule::Only(id) => id == parent_id || (entry.recursive && parent_id == entry.id),
        ParentRule::Global => true,
        ParentRule::Level0 => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_falls_back_to_unsupported() {
        let e = lookup(0xDEAD_BEEF);
        assert_eq!(e.name, "Unknown");
        assert!(matches!(e.kind, Kind::Unsupported));
    }

    #[test]
    fn segment_header_floor_matches_tagspy_override() {
        let e = lookup(SEGMENT_ID);
        assert_eq!(e.header_size_min, 8);
    }

    #[test]
    fn seek_position_data_floor_matches_tagspy_override() {
        let e = lookup(SEEK_POSITION_ID);
        assert_eq!(e.data_size_min, 8);
    }

    #[test]
    fn is_child_respects_global_elements() {
        let void = lookup(VOID_ID);
        assert!(is_child(&void, SEGMENT_ID));
        assert!(is_child(&void, INFO_ID));
    }
}
