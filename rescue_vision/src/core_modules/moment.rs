// THEORY:
// The `moment` module measures a single traced contour. A contour is the closed
// polyline through the boundary pixels of one connected region of a mask; every
// shape test the detector makes is derived from four measurements of it:
//
// 1.  **Spatial moments** (m00, m10, m01), integrated over the polygon with Green's
//     theorem. m00 is the enclosed area; m10/m00 and m01/m00 are the centroid. A
//     contour that encloses nothing (a single pixel, a one-pixel-wide line) has
//     m00 == 0 and therefore no centroid.
// 2.  **Perimeter**: the closed arc length of the polyline.
// 3.  **Bounding box**: the axis-aligned pixel extent, inclusive of both ends.
// 4.  **Circularity**: 4*pi*area / perimeter^2. 1.0 for a perfect disc, lower for
//     anything elongated or ragged, and defined as 0 when the perimeter is 0.

use imageproc::geometry::arc_length;
use imageproc::point::Point;
use std::f64::consts::PI;

/// Raw spatial moments of a closed polygon, orientation-normalised so m00 >= 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContourMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl ContourMoments {
    pub fn of(points: &[Point<i32>]) -> Self {
        if points.len() < 3 {
            return Self::default();
        }

        let mut m00 = 0.0;
        let mut m10 = 0.0;
        let mut m01 = 0.0;
        for (i, current) in points.iter().enumerate() {
            let next = points[(i + 1) % points.len()];
            let (x0, y0) = (current.x as f64, current.y as f64);
            let (x1, y1) = (next.x as f64, next.y as f64);
            let cross = x0 * y1 - x1 * y0;
            m00 += cross;
            m10 += cross * (x0 + x1);
            m01 += cross * (y0 + y1);
        }

        let sign = if m00 < 0.0 { -1.0 } else { 1.0 };
        Self {
            m00: sign * m00 / 2.0,
            m10: sign * m10 / 6.0,
            m01: sign * m01 / 6.0,
        }
    }

    /// `None` for degenerate contours with zero area.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 > 0.0 {
            Some((self.m10 / self.m00, self.m01 / self.m00))
        } else {
            None
        }
    }
}

/// Axis-aligned bounding box in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn of(points: &[Point<i32>]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for point in points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        Self {
            x: min_x.max(0) as u32,
            y: min_y.max(0) as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        }
    }

    /// The larger side, used as the apparent diameter of a sphere.
    pub fn major_axis(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Width over height; 0 for an empty box.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

pub fn perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    arc_length(points, true)
}

pub fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter > 0.0 {
        4.0 * PI * area / (perimeter * perimeter)
    } else {
        0.0
    }
}
