use std::hash::Hash;

use crate::disk_quadtree::qtree_types::{SpatialError, SpatialResult};

/// An axis-aligned 2D bounding box represented by minimum and maximum coordinates.
///
/// `BoundingBox` is an immutable value type: every operation returns a new box.
/// A box may be degenerate (zero width or height, a point) but never inverted.
/// All comparisons are plain IEEE-754 comparisons without epsilon; callers that
/// need a fuzzy query should widen the query box with [`BoundingBox::expand_by`].
///
/// # Examples
///
/// ```rust
/// use quadtree_index::BoundingBox;
///
/// let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
/// let b = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
///
/// // Touching corners count as overlap
/// assert!(a.overlaps(&b));
/// assert_eq!(a.intersection(&b), Some(BoundingBox::new(10.0, 10.0, 10.0, 10.0)));
/// ```
#[derive(Clone, Copy, PartialEq, Default, Debug, serde::Deserialize, serde::Serialize)]
pub struct BoundingBox {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

impl Eq for BoundingBox {}

impl PartialOrd for BoundingBox {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoundingBox {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.min_x
            .total_cmp(&other.min_x)
            .then(self.min_y.total_cmp(&other.min_y))
            .then(self.max_x.total_cmp(&other.max_x))
            .then(self.max_y.total_cmp(&other.max_y))
    }
}

impl Hash for BoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.min_x.to_bits().hash(state);
        self.min_y.to_bits().hash(state);
        self.max_x.to_bits().hash(state);
        self.max_y.to_bits().hash(state);
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BoundingBox({}, {}, {}, {})", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl BoundingBox {
    /// Creates a new bounding box with the specified coordinates.
    ///
    /// No validation is performed; use [`BoundingBox::try_new`] for input that
    /// comes from outside the process.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Creates a new bounding box, rejecting inverted or NaN coordinates.
    pub fn try_new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> SpatialResult<BoundingBox> {
        let bbox = BoundingBox::new(min_x, min_y, max_x, max_y);
        if bbox.is_valid() {
            Ok(bbox)
        } else {
            Err(SpatialError::InvalidArgument(format!("invalid bounding box {}", bbox)))
        }
    }

    /// Creates the smallest box containing two corner points, in any order.
    pub fn from_points(x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingBox {
        BoundingBox::new(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
    }

    /// Returns the width of the bounding box.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Returns the height of the bounding box.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns the area of the bounding box.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns the center point of the bounding box.
    ///
    /// Stays finite for any finite box, even one spanning most of the `f64` range.
    pub fn center(&self) -> (f64, f64) {
        (midpoint(self.min_x, self.max_x), midpoint(self.min_y, self.max_y))
    }

    /// Checks if this bounding box contains a point. Points on the boundary are inside.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Checks if `other` lies fully inside this box (equal boxes contain each other).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x && other.max_x <= self.max_x
            && other.min_y >= self.min_y && other.max_y <= self.max_y
    }

    /// Checks if this box shares at least one boundary or interior point with `other`.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x && self.max_x >= other.min_x
            && self.min_y <= other.max_y && self.max_y >= other.min_y
    }

    /// Returns the smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Returns the common region of the two boxes, or `None` if they do not overlap.
    ///
    /// Boxes that only touch yield a degenerate (zero width or height) box.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.overlaps(other) {
            return None;
        }
        Some(BoundingBox::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }

    /// Returns a copy grown by `delta` on every side.
    pub fn expand_by(&self, delta: f64) -> BoundingBox {
        BoundingBox::new(
            self.min_x - delta,
            self.min_y - delta,
            self.max_x + delta,
            self.max_y + delta,
        )
    }

    /// Splits the box at its midpoints into the four quadrants, in
    /// NW, NE, SW, SE order (Y grows northward).
    pub fn quadrants(&self) -> [BoundingBox; 4] {
        let (mid_x, mid_y) = self.center();
        [
            BoundingBox::new(self.min_x, mid_y, mid_x, self.max_y),
            BoundingBox::new(mid_x, mid_y, self.max_x, self.max_y),
            BoundingBox::new(self.min_x, self.min_y, mid_x, mid_y),
            BoundingBox::new(mid_x, self.min_y, self.max_x, mid_y),
        ]
    }

    /// Checks if this bounding box is a point (zero area).
    pub fn is_point(&self) -> bool {
        self.min_x == self.max_x && self.min_y == self.max_y
    }

    /// Checks if this bounding box is valid (min <= max on both axes, no NaN).
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }
}

fn midpoint(min: f64, max: f64) -> f64 {
    let span = max - min;
    if span.is_finite() {
        min + span / 2.0
    } else {
        min / 2.0 + max / 2.0
    }
}
