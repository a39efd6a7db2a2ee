//! # Quadtree Index - Disk-Backed Spatial Indexing
//!
//! This crate provides a region quad-tree over axis-aligned bounding boxes.
//! Payloads are kept in a length-prefixed record store; the tree only holds
//! references into it and is persisted to its own index file.
//!
//! ## Features
//!
//! - **Endian-Aware Codec**: Big- or little-endian record stores
//! - **Lazy Search**: Cursors buffer one node at a time and read payloads on demand
//! - **Crash Safe**: The index file is replaced atomically
//! - **Validated Loading**: Corrupt index files are rejected with a byte offset and node path
//! - **Thread Safe**: One loaded index serves cursors on many threads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quadtree_index::{build_index, BoundingBox, IndexConfig, QuadTreeIndex, ByteOrder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let records = vec![
//!     (BoundingBox::new(0.0, 0.0, 10.0, 10.0), b"A".to_vec()),
//!     (BoundingBox::new(20.0, 20.0, 30.0, 30.0), b"B".to_vec()),
//! ];
//! let index = build_index(
//!     dir.path().join("places.qtx"),
//!     dir.path().join("places.rec"),
//!     records,
//!     IndexConfig::default(),
//! )?;
//!
//! let mut cursor = index.open_cursor(BoundingBox::new(0.0, 0.0, 5.0, 5.0))?;
//! while let Some((record, payload)) = cursor.next_record()? {
//!     println!("{:?}: {:?}", record, payload);
//! }
//!
//! // Later, from another process
//! let index = QuadTreeIndex::open(
//!     dir.path().join("places.qtx"),
//!     dir.path().join("places.rec"),
//!     ByteOrder::Big,
//! )?;
//! assert_eq!(index.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod bounding_box;
pub mod codec;
pub mod config;
pub mod disk_quadtree;
pub mod geometry;

pub use bounding_box::BoundingBox;
pub use codec::{ByteOrder, EndianReader, EndianWriter};
pub use config::{IndexConfig, IndexConfigBuilder};
pub use geometry::{Geometry, Point};

pub use disk_quadtree::{
    build_index, CursorState, IndexBuilder, IndexStats, IntegrityReport, QuadTreeIndex,
    QueryMode, RecordRef, RecordStore, SearchCursor, SpatialError, SpatialResult, StoreMode,
};
