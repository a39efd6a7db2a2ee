use serde::{Deserialize, Serialize};

use crate::bounding_box::BoundingBox;
use crate::codec::ByteOrder;
use crate::disk_quadtree::qtree_constants::{
    DEFAULT_MAX_DEPTH, DEFAULT_SPLIT_THRESHOLD, MAX_SUPPORTED_DEPTH,
};
use crate::disk_quadtree::qtree_types::{SpatialError, SpatialResult};

/// Build and open parameters of a quad-tree index.
///
/// Characteristics:
/// - `max_depth`: deepest level a node may be created at (root is 0)
/// - `split_threshold`: entries a leaf holds before it splits
/// - `byte_order`: encoding of the record store length prefixes
/// - `root_bounds`: extent of the root node; when `None`, a one-shot build
///   uses the union of all input boxes
/// - `sync_on_finish`: fsync store and index files when a build finishes
///
/// Usage: start from `IndexConfig::default()` or `IndexConfig::builder()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    max_depth: u32,
    split_threshold: u32,
    byte_order: ByteOrder,
    root_bounds: Option<BoundingBox>,
    sync_on_finish: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            byte_order: ByteOrder::default(),
            root_bounds: None,
            sync_on_finish: true,
        }
    }
}

impl IndexConfig {
    #[inline]
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder {
            config: IndexConfig::default(),
        }
    }

    #[inline]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[inline]
    pub fn split_threshold(&self) -> u32 {
        self.split_threshold
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    #[inline]
    pub fn root_bounds(&self) -> Option<BoundingBox> {
        self.root_bounds
    }

    #[inline]
    pub fn sync_on_finish(&self) -> bool {
        self.sync_on_finish
    }

    /// Returns a copy with the root bounds replaced.
    pub(crate) fn with_root_bounds(&self, bounds: BoundingBox) -> IndexConfig {
        IndexConfig {
            root_bounds: Some(bounds),
            ..self.clone()
        }
    }

    /// Reassembles the configuration of a loaded index. The values come from
    /// an already validated file, so no further checks are made.
    pub(crate) fn from_loaded(
        max_depth: u32,
        split_threshold: u32,
        byte_order: ByteOrder,
        root_bounds: BoundingBox,
    ) -> IndexConfig {
        IndexConfig {
            max_depth,
            split_threshold,
            byte_order,
            root_bounds: Some(root_bounds),
            sync_on_finish: false,
        }
    }

    /// Checks the parameters against the limits the file format supports.
    pub fn validate(&self) -> SpatialResult<()> {
        if self.split_threshold == 0 {
            return Err(SpatialError::InvalidArgument(
                "split threshold must be at least 1".into(),
            ));
        }
        if self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(SpatialError::InvalidArgument(format!(
                "max depth {} exceeds the supported maximum {}",
                self.max_depth, MAX_SUPPORTED_DEPTH
            )));
        }
        if let Some(bounds) = self.root_bounds {
            if !bounds.is_valid() || !bounds.min_x.is_finite() || !bounds.max_x.is_finite()
                || !bounds.min_y.is_finite() || !bounds.max_y.is_finite()
            {
                return Err(SpatialError::InvalidArgument(format!(
                    "root bounds {} must be finite and not inverted",
                    bounds
                )));
            }
        }
        Ok(())
    }
}

/// Consuming builder for [`IndexConfig`].
#[derive(Debug, Clone)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    #[inline]
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    #[inline]
    pub fn split_threshold(mut self, split_threshold: u32) -> Self {
        self.config.split_threshold = split_threshold;
        self
    }

    #[inline]
    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.config.byte_order = byte_order;
        self
    }

    #[inline]
    pub fn root_bounds(mut self, root_bounds: BoundingBox) -> Self {
        self.config.root_bounds = Some(root_bounds);
        self
    }

    #[inline]
    pub fn sync_on_finish(mut self, sync_on_finish: bool) -> Self {
        self.config.sync_on_finish = sync_on_finish;
        self
    }

    pub fn build(self) -> SpatialResult<IndexConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IndexConfig::default();
        assert_eq!(config.max_depth(), DEFAULT_MAX_DEPTH);
        assert_eq!(config.split_threshold(), DEFAULT_SPLIT_THRESHOLD);
        assert_eq!(config.byte_order(), ByteOrder::Big);
        assert_eq!(config.root_bounds(), None);
        assert!(config.sync_on_finish());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = IndexConfig::builder()
            .max_depth(4)
            .split_threshold(2)
            .byte_order(ByteOrder::Little)
            .root_bounds(BoundingBox::new(0.0, 0.0, 100.0, 100.0))
            .sync_on_finish(false)
            .build()
            .unwrap();

        assert_eq!(config.max_depth(), 4);
        assert_eq!(config.split_threshold(), 2);
        assert_eq!(config.byte_order(), ByteOrder::Little);
        assert_eq!(config.root_bounds(), Some(BoundingBox::new(0.0, 0.0, 100.0, 100.0)));
        assert!(!config.sync_on_finish());
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(IndexConfig::builder().split_threshold(0).build().is_err());
        assert!(IndexConfig::builder()
            .max_depth(MAX_SUPPORTED_DEPTH + 1)
            .build()
            .is_err());
        assert!(IndexConfig::builder()
            .root_bounds(BoundingBox::new(10.0, 0.0, 0.0, 10.0))
            .build()
            .is_err());
        assert!(IndexConfig::builder()
            .root_bounds(BoundingBox::new(0.0, 0.0, f64::INFINITY, 10.0))
            .build()
            .is_err());
    }

    #[test]
    fn test_with_root_bounds() {
        let config = IndexConfig::default();
        let bounded = config.with_root_bounds(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(bounded.root_bounds(), Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(bounded.max_depth(), config.max_depth());
    }
}
