//! Disk-backed quad-tree implementation.
//!
//! This module provides a region quad-tree whose payloads live in a separate
//! record store:
//! - Length-prefixed record store with append and read-only modes
//! - Arena-allocated nodes with a threshold/depth split policy
//! - Validated, atomically replaced index file
//! - Lazy search cursors that read payloads only on demand
//!
//! The tree is built in memory, written once, and fully decoded on open.
//! Only record payloads stay on disk during queries.

pub mod qtree_types;
pub mod qtree_constants;
pub mod qtree_node;
pub mod record_store;
pub mod persistence;
pub mod cursor;
mod qtree_impl;

pub use qtree_types::{
    SpatialError, SpatialResult, RecordRef, IndexEntry, NodeId, FileHeader, IndexStats,
};
pub use qtree_constants::{DEFAULT_MAX_DEPTH, DEFAULT_SPLIT_THRESHOLD, MAX_SUPPORTED_DEPTH};
pub use qtree_node::{NodeArena, QuadTreeNode, Quadrant, SplitPolicy, TreeShape};
pub use record_store::{RecordIter, RecordStore, StoreMode};
pub use persistence::IntegrityReport;
pub use cursor::{CursorState, QueryMode, SearchCursor};
pub use qtree_impl::{build_index, IndexBuilder, QuadTreeIndex};
