// THEORY:
// The `blob` module holds the two "dumb" data containers that flow between the
// detection stages within a single detection call.
//
// - `Blob` is one external contour of a cleaned mask, already measured: area,
//   perimeter, bounding box, centroid. It knows how to derive its own circularity
//   but makes no decision about what kind of object it is.
// - `Candidate` is a blob that the sphere detector accepted and ranged: where it is
//   in the image and how far away it is estimated to be.
//
// Neither persists beyond the call that produced it; there is no tracking across
// frames.

use crate::core_modules::moment::{self, BoundingBox};

/// A measured external contour.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Enclosed polygon area in square pixels.
    pub area: f64,
    /// Closed arc length of the contour.
    pub perimeter: f64,
    pub bounding_box: BoundingBox,
    /// Moment centroid, `None` when the contour encloses no area.
    pub centroid: Option<(f64, f64)>,
}

impl Blob {
    pub fn circularity(&self) -> f64 {
        moment::circularity(self.area, self.perimeter)
    }
}

/// A ranged sphere detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub center_x: u32,
    pub center_y: u32,
    pub distance_mm: f64,
    /// Bounding-box major axis in pixels.
    pub pixel_extent: u32,
}
