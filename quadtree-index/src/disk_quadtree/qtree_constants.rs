//! Constants for the disk-based quad-tree implementation.

/// Magic bytes identifying an index file
pub const MAGIC: [u8; 4] = *b"QTDX";

/// Index file format version
pub const VERSION: u16 = 1;

/// Header size in bytes: magic + version + max depth + split threshold
pub const HEADER_SIZE: usize = 4 + 2 + 4 + 4;

/// Fixed part of a serialized node: 4 bounds + depth + child flags + entry count
pub const NODE_FIXED_SIZE: usize = 4 * 8 + 4 + 1 + 4;

/// Serialized entry: offset + length + 4 bounds
pub const ENTRY_SIZE: usize = 8 + 4 + 4 * 8;

/// Size of the length prefix of a record store frame
pub const RECORD_PREFIX_SIZE: usize = 4;

/// Child presence flags of an internal node (all four quadrants)
pub const ALL_CHILDREN: u8 = 0b0000_1111;

/// Default maximum depth of the tree (root is depth 0)
pub const DEFAULT_MAX_DEPTH: u32 = 12;

/// Default number of entries a leaf holds before it splits
pub const DEFAULT_SPLIT_THRESHOLD: u32 = 16;

/// Deepest tree accepted on build or load
pub const MAX_SUPPORTED_DEPTH: u32 = 32;

/// Upper bound on nodes accepted when loading an index file
pub const MAX_NODES: usize = 1 << 28;
