//! The geometry collaborator seen by the index.
//!
//! The index never looks inside a geometry; it only needs its envelope.

use crate::bounding_box::BoundingBox;

/// Anything that can report an axis-aligned bounding box.
pub trait Geometry {
    /// Returns the envelope (bounding box) of this geometry.
    fn envelope(&self) -> BoundingBox;
}

impl Geometry for BoundingBox {
    fn envelope(&self) -> BoundingBox {
        *self
    }
}

impl<G: Geometry + ?Sized> Geometry for &G {
    fn envelope(&self) -> BoundingBox {
        (**self).envelope()
    }
}

/// A point geometry, mostly useful in tests and benchmarks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Geometry for Point {
    fn envelope(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_envelope_is_degenerate() {
        let env = Point::new(3.0, 4.0).envelope();
        assert!(env.is_point());
        assert_eq!(env, BoundingBox::new(3.0, 4.0, 3.0, 4.0));
    }

    #[test]
    fn test_bbox_envelope_is_itself() {
        let bbox = BoundingBox::new(0.0, 1.0, 2.0, 3.0);
        assert_eq!(bbox.envelope(), bbox);
        assert_eq!((&bbox).envelope(), bbox);
    }
}
