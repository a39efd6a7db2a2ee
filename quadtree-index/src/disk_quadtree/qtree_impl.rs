//! QuadTreeIndex and IndexBuilder implementation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bounding_box::BoundingBox;
use crate::codec::ByteOrder;
use crate::config::IndexConfig;
use crate::geometry::Geometry;

use super::cursor::{QueryMode, SearchCursor};
use super::persistence::{check_tree, read_index_file, write_index_file, IntegrityReport};
use super::qtree_node::{NodeArena, SplitPolicy};
use super::qtree_types::{
    FileHeader, IndexEntry, IndexStats, RecordRef, SpatialError, SpatialResult,
};
use super::record_store::RecordStore;

/// A loaded, read-only quad-tree index over a record store.
///
/// The tree is fully decoded on open and never changes afterwards; records
/// are read from the store only when a cursor dereferences them. Cloning is
/// cheap and clones share the same tree, store handle and counters.
#[derive(Clone)]
pub struct QuadTreeIndex {
    inner: Arc<QuadTreeIndexInner>,
}

struct QuadTreeIndexInner {
    index_path: PathBuf,
    header: FileHeader,
    arena: NodeArena,
    config: IndexConfig,
    store: Arc<RecordStore>,
    /// Cursors currently in the Open state
    open_cursors: AtomicU64,
}

impl QuadTreeIndex {
    /// Open an index file together with its record store.
    ///
    /// The index file is validated completely; any structural problem is
    /// reported as [`SpatialError::IndexCorrupt`] and nothing is returned.
    pub fn open(
        index_path: impl AsRef<Path>,
        store_path: impl AsRef<Path>,
        store_order: ByteOrder,
    ) -> SpatialResult<Self> {
        let index_path = index_path.as_ref();
        let (header, arena) = read_index_file(index_path)?;
        let store = RecordStore::open(store_path, store_order)?;

        log::debug!(
            "Opened index {} ({} nodes, {} entries)",
            index_path.display(),
            arena.len(),
            arena.entry_count()
        );
        Ok(Self::from_parts(index_path, header, arena, store))
    }

    fn from_parts(index_path: &Path, header: FileHeader, arena: NodeArena, store: RecordStore) -> Self {
        let config = IndexConfig::from_loaded(
            header.max_depth,
            header.split_threshold,
            store.byte_order(),
            arena.root().bounds,
        );
        Self {
            inner: Arc::new(QuadTreeIndexInner {
                index_path: index_path.to_path_buf(),
                header,
                arena,
                config,
                store: Arc::new(store),
                open_cursors: AtomicU64::new(0),
            }),
        }
    }

    /// Start a lazy search for entries whose box overlaps `query`.
    pub fn open_cursor(&self, query: BoundingBox) -> SpatialResult<SearchCursor> {
        self.open_cursor_with_mode(query, QueryMode::Intersects)
    }

    /// Start a lazy search with an explicit match mode.
    pub fn open_cursor_with_mode(
        &self,
        query: BoundingBox,
        mode: QueryMode,
    ) -> SpatialResult<SearchCursor> {
        let mut cursor = SearchCursor::new(self);
        cursor.open_with_mode(query, mode)?;
        Ok(cursor)
    }

    /// Collect every reference whose box overlaps `query`.
    pub fn find_intersecting(&self, query: &BoundingBox) -> SpatialResult<Vec<RecordRef>> {
        self.open_cursor(*query)?.collect()
    }

    /// Collect every reference whose box lies completely inside `query`.
    pub fn find_within(&self, query: &BoundingBox) -> SpatialResult<Vec<RecordRef>> {
        self.open_cursor_with_mode(*query, QueryMode::Within)?.collect()
    }

    /// Read one record payload directly from the store.
    pub fn read(&self, record: RecordRef) -> SpatialResult<Vec<u8>> {
        self.inner.store.read(record)
    }

    pub fn stats(&self) -> IndexStats {
        let shape = self.inner.arena.shape();
        IndexStats {
            node_count: shape.node_count,
            leaf_count: shape.leaf_count,
            total_entries: shape.entries_per_depth.iter().sum(),
            tree_depth: shape.tree_depth,
            entries_per_depth: shape.entries_per_depth,
            open_cursors: self.inner.open_cursors.load(Ordering::Relaxed),
            records_read: self.inner.store.records_read(),
            bytes_read: self.inner.store.bytes_read(),
        }
    }

    /// Walk the tree and check its invariants against the record store.
    ///
    /// With `verify_records` set every referenced frame prefix is read back.
    pub fn check_integrity(&self, verify_records: bool) -> SpatialResult<IntegrityReport> {
        let report = check_tree(&self.inner.arena, Some(&self.inner.store), verify_records)?;
        log::debug!(
            "Integrity check of {}: {} nodes, {} entries, valid={}",
            self.inner.index_path.display(),
            report.nodes_checked,
            report.entries_checked,
            report.is_valid
        );
        Ok(report)
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    pub fn header(&self) -> &FileHeader {
        &self.inner.header
    }

    pub fn root_bounds(&self) -> BoundingBox {
        self.inner.arena.root().bounds
    }

    pub fn path(&self) -> &Path {
        &self.inner.index_path
    }

    /// Number of indexed records.
    pub fn len(&self) -> u64 {
        self.inner.arena.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.arena.is_empty()
    }

    pub(crate) fn arena(&self) -> &NodeArena {
        &self.inner.arena
    }

    pub(crate) fn register_cursor(&self) -> Arc<RecordStore> {
        self.inner.open_cursors.fetch_add(1, Ordering::Relaxed);
        Arc::clone(&self.inner.store)
    }

    pub(crate) fn release_cursor(&self) {
        self.inner.open_cursors.fetch_sub(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for QuadTreeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadTreeIndex")
            .field("path", &self.inner.index_path)
            .field("root_bounds", &self.root_bounds())
            .field("nodes", &self.inner.arena.len())
            .field("entries", &self.len())
            .finish()
    }
}

// ============================================================================
// Build
// ============================================================================

/// Incremental builder: appends payloads to a new record store and indexes
/// them in memory; [`IndexBuilder::finish`] writes the index file.
pub struct IndexBuilder {
    config: IndexConfig,
    policy: SplitPolicy,
    arena: NodeArena,
    store: RecordStore,
}

impl IndexBuilder {
    /// Create a builder writing a fresh record store at `store_path`.
    ///
    /// The configuration must carry explicit root bounds. A store already at
    /// `store_path` is replaced only by [`IndexBuilder::finish`]; dropping the
    /// builder leaves it as it was.
    pub fn create(store_path: impl AsRef<Path>, config: IndexConfig) -> SpatialResult<Self> {
        config.validate()?;
        let root_bounds = config.root_bounds().ok_or_else(|| {
            SpatialError::InvalidArgument("incremental build needs explicit root bounds".into())
        })?;
        let store = RecordStore::create(store_path, config.byte_order())?;

        log::debug!(
            "Building index over {} (max depth {}, split threshold {})",
            root_bounds,
            config.max_depth(),
            config.split_threshold()
        );
        Ok(Self {
            policy: SplitPolicy {
                max_depth: config.max_depth(),
                split_threshold: config.split_threshold(),
            },
            arena: NodeArena::new(root_bounds),
            config,
            store,
        })
    }

    /// Append `payload` to the store and index it under `bbox`.
    ///
    /// The box and the node budget are checked before anything is written,
    /// so a rejected insert leaves no orphan record behind.
    pub fn insert(&mut self, bbox: BoundingBox, payload: &[u8]) -> SpatialResult<RecordRef> {
        self.arena.check_insert(&bbox, &self.policy)?;

        let record = self.store.append(payload)?;
        self.arena.insert(IndexEntry { bbox, record }, &self.policy)?;
        Ok(record)
    }

    /// Index a payload under the envelope of `geometry`.
    pub fn insert_geometry<G: Geometry + ?Sized>(
        &mut self,
        geometry: &G,
        payload: &[u8],
    ) -> SpatialResult<RecordRef> {
        self.insert(geometry.envelope(), payload)
    }

    /// Number of records inserted so far.
    pub fn len(&self) -> u64 {
        self.arena.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Seal the record store, persist the index atomically and return the
    /// ready-to-query index.
    pub fn finish(self, index_path: impl AsRef<Path>) -> SpatialResult<QuadTreeIndex> {
        let index_path = index_path.as_ref();
        self.store.seal()?;

        let header = FileHeader::new(self.config.max_depth(), self.config.split_threshold());
        write_index_file(index_path, &header, &self.arena, self.config.sync_on_finish())?;

        log::debug!(
            "Finished index {} with {} entries in {} nodes",
            index_path.display(),
            self.arena.entry_count(),
            self.arena.len()
        );
        Ok(QuadTreeIndex::from_parts(index_path, header, self.arena, self.store))
    }
}

/// Build an index in one pass.
///
/// When the configuration has no root bounds, the union of all input boxes is
/// used; an empty input then yields an empty index over a zero-size root at
/// the origin.
pub fn build_index<I, P>(
    index_path: impl AsRef<Path>,
    store_path: impl AsRef<Path>,
    records: I,
    config: IndexConfig,
) -> SpatialResult<QuadTreeIndex>
where
    I: IntoIterator<Item = (BoundingBox, P)>,
    P: AsRef<[u8]>,
{
    match config.root_bounds() {
        Some(_) => {
            let mut builder = IndexBuilder::create(store_path, config)?;
            for (bbox, payload) in records {
                builder.insert(bbox, payload.as_ref())?;
            }
            builder.finish(index_path)
        }
        None => {
            let records: Vec<(BoundingBox, P)> = records.into_iter().collect();
            let mut root_bounds: Option<BoundingBox> = None;
            for (bbox, _) in &records {
                if !bbox.is_valid() {
                    return Err(SpatialError::InvalidArgument(format!(
                        "cannot index invalid bounding box {}",
                        bbox
                    )));
                }
                root_bounds = Some(match root_bounds {
                    Some(bounds) => bounds.union(bbox),
                    None => *bbox,
                });
            }

            let config = config.with_root_bounds(root_bounds.unwrap_or_default());
            let mut builder = IndexBuilder::create(store_path, config)?;
            for (bbox, payload) in &records {
                builder.insert(*bbox, payload.as_ref())?;
            }
            builder.finish(index_path)
        }
    }
}
