use quadtree_index::{
    build_index, BoundingBox, ByteOrder, IndexConfig, QuadTreeIndex, SpatialResult,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{fs, io};
use tempfile::TempDir;

/// Runs a test between a setup and a teardown step.
///
/// The teardown runs even when the test returns an error or panics; the
/// failure is then reported with the context's directory for inspection.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> SpatialResult<()>,
    B: Fn() -> SpatialResult<TestContext>,
    A: Fn(TestContext) -> SpatialResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let test_ctx = ctx.clone();
    let result = std::panic::catch_unwind(AssertUnwindSafe(move || test(test_ctx)));
    let dir = ctx.dir().to_path_buf();

    if let Err(e) = after(ctx) {
        eprintln!("Warning: after run failed for {}: {:?}", dir.display(), e);
    }

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => panic!("Test failed in {}: {:?}", dir.display(), e),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Files of one test: a private directory holding an index and its store.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
    index_path: PathBuf,
    store_path: PathBuf,
}

impl TestContext {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Build an index from `records` at this context's paths.
    pub fn build(
        &self,
        records: &[(BoundingBox, Vec<u8>)],
        config: IndexConfig,
    ) -> SpatialResult<QuadTreeIndex> {
        build_index(
            &self.index_path,
            &self.store_path,
            records.iter().map(|(bbox, payload)| (*bbox, payload.as_slice())),
            config,
        )
    }

    pub fn open(&self, order: ByteOrder) -> SpatialResult<QuadTreeIndex> {
        QuadTreeIndex::open(&self.index_path, &self.store_path, order)
    }
}

pub fn create_test_context() -> SpatialResult<TestContext> {
    let dir = tempfile::Builder::new().prefix("quadtree-test-").tempdir()?;
    let index_path = dir.path().join("test.qtx");
    let store_path = dir.path().join("test.rec");
    Ok(TestContext {
        dir: Arc::new(dir),
        index_path,
        store_path,
    })
}

pub fn cleanup(ctx: TestContext) -> SpatialResult<()> {
    match fs::remove_dir_all(ctx.dir()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Config for small trees that split early, without fsync.
pub fn test_config(max_depth: u32, split_threshold: u32) -> IndexConfig {
    IndexConfig::builder()
        .max_depth(max_depth)
        .split_threshold(split_threshold)
        .sync_on_finish(false)
        .build()
        .expect("valid test config")
}

/// Random boxes inside `extent`; about one in five is a point. Each payload
/// is the record's position in the returned vector, big-endian.
pub fn random_records(count: usize, seed: u64, extent: BoundingBox) -> Vec<(BoundingBox, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let max_size = (extent.width().min(extent.height()) / 20.0).max(f64::MIN_POSITIVE);
    (0..count)
        .map(|i| {
            let x = rng.gen_range(extent.min_x..=extent.max_x);
            let y = rng.gen_range(extent.min_y..=extent.max_y);
            let bbox = if rng.gen_bool(0.2) {
                BoundingBox::new(x, y, x, y)
            } else {
                BoundingBox::new(
                    x,
                    y,
                    (x + rng.gen_range(0.0..max_size)).min(extent.max_x),
                    (y + rng.gen_range(0.0..max_size)).min(extent.max_y),
                )
            };
            (bbox, (i as u64).to_be_bytes().to_vec())
        })
        .collect()
}

/// Random query boxes, some reaching past `extent`.
pub fn random_queries(count: usize, seed: u64, extent: BoundingBox) -> Vec<BoundingBox> {
    let mut rng = StdRng::seed_from_u64(seed);
    let margin = extent.width().max(extent.height()) / 10.0;
    (0..count)
        .map(|_| {
            let x = rng.gen_range(extent.min_x - margin..extent.max_x);
            let y = rng.gen_range(extent.min_y - margin..extent.max_y);
            BoundingBox::new(
                x,
                y,
                x + rng.gen_range(0.0..extent.width() / 4.0),
                y + rng.gen_range(0.0..extent.height() / 4.0),
            )
        })
        .collect()
}

/// Positions of the records a linear scan finds for `query`.
pub fn brute_force(records: &[(BoundingBox, Vec<u8>)], query: &BoundingBox) -> BTreeSet<u64> {
    records
        .iter()
        .enumerate()
        .filter(|(_, (bbox, _))| query.overlaps(bbox))
        .map(|(i, _)| i as u64)
        .collect()
}

/// Decodes a payload written by [`random_records`].
pub fn record_id(payload: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let n = payload.len().min(8);
    bytes[..n].copy_from_slice(&payload[..n]);
    u64::from_be_bytes(bytes)
}
