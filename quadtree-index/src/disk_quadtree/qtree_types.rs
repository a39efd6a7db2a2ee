//! Core types shared throughout the disk-based quad-tree.
//!
//! This module defines:
//! - The error taxonomy and result type
//! - Record references and index entries
//! - The index file header
//! - Statistics structures

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounding_box::BoundingBox;

use super::qtree_constants::{MAGIC, MAX_SUPPORTED_DEPTH, VERSION};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in spatial indexing operations
#[derive(Debug, Error)]
pub enum SpatialError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A short read: the input ended before a complete value or record was read.
    #[error("Truncated record at byte {offset}: needed {needed} bytes, {available} available")]
    TruncatedRecord {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// A mutating call on a store that has been switched to read-only mode.
    #[error("Record store {} is read-only", .0.display())]
    ReadOnlyViolation(PathBuf),

    /// The index file violates a structural invariant and must be rebuilt.
    #[error("Index corrupt at byte {offset} ({node_path}): {reason}")]
    IndexCorrupt {
        offset: u64,
        node_path: String,
        reason: String,
    },

    /// API misuse, such as reopening a cursor or appending to a closed store.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SpatialError {
    pub(crate) fn corrupt(offset: u64, node_path: impl Into<String>, reason: impl Into<String>) -> Self {
        SpatialError::IndexCorrupt {
            offset,
            node_path: node_path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error means the index file is unusable until rebuilt.
    pub fn is_corruption(&self) -> bool {
        matches!(self, SpatialError::IndexCorrupt { .. })
    }
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;

// ============================================================================
// References
// ============================================================================

/// Location of one record in the record store.
///
/// `offset` points at the record frame (its length prefix), `length` is the
/// payload length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub offset: u64,
    pub length: u32,
}

impl RecordRef {
    pub fn new(offset: u64, length: u32) -> Self {
        Self { offset, length }
    }

    /// Byte offset just past the end of the record frame.
    ///
    /// Fails when the frame would end beyond `u64::MAX`, which only a damaged
    /// index file can produce.
    pub fn end_offset(&self) -> SpatialResult<u64> {
        self.offset
            .checked_add(super::qtree_constants::RECORD_PREFIX_SIZE as u64 + self.length as u64)
            .ok_or_else(|| {
                SpatialError::InvalidArgument(format!(
                    "record at offset {} with length {} ends past the addressable range",
                    self.offset, self.length
                ))
            })
    }
}

/// A record reference together with the envelope it was indexed under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub bbox: BoundingBox,
    pub record: RecordRef,
}

/// Index of a node in the node arena. The root is always `NodeId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// File Header
// ============================================================================

/// Fixed-size header stored at the beginning of the index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub max_depth: u32,
    pub split_threshold: u32,
}

impl FileHeader {
    pub fn new(max_depth: u32, split_threshold: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            max_depth,
            split_threshold,
        }
    }

    pub fn validate(&self) -> SpatialResult<()> {
        if self.magic != MAGIC {
            return Err(SpatialError::corrupt(0, "header", "invalid file format (bad magic)"));
        }
        if self.version != VERSION {
            return Err(SpatialError::corrupt(
                4,
                "header",
                format!("unsupported file format version {}", self.version),
            ));
        }
        if self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(SpatialError::corrupt(
                6,
                "header",
                format!("max depth {} out of range", self.max_depth),
            ));
        }
        if self.split_threshold == 0 {
            return Err(SpatialError::corrupt(10, "header", "split threshold is zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Shape and usage statistics of an index
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub node_count: u64,
    pub leaf_count: u64,
    pub total_entries: u64,
    /// Deepest node depth present in the tree
    pub tree_depth: u32,
    /// Entry count per depth, index 0 is the root
    pub entries_per_depth: Vec<u64>,
    pub open_cursors: u64,
    pub records_read: u64,
    pub bytes_read: u64,
}
