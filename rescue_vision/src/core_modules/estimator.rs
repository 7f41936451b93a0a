// THEORY:
// The `Estimator` converts image measurements into the real-world quantities the
// motion controller steers by.
//
// 1.  **Distance law**: an object of known size looks smaller the farther away it is,
//     so `distance_mm = scale / pixel_extent + offset`. Extents at or below the
//     trust floor, and results beyond the maximum range, are rejected (`None`) and
//     the caller drops the candidate.
// 2.  **Bearing law**: `angle = offset_from_center * (fov / resolution)`, computed
//     independently per axis. Right of center is a positive horizontal angle; above
//     center is a positive vertical angle. This is a linear small-angle model, not
//     a pinhole projection, and it drifts toward the edges of the image.
// 3.  **Safe-zone distance**: the zone is a flat painted area, so its apparent area
//     (not its width) is what shrinks with distance. The area is that of the
//     zone's bounding box: `distance_mm = base_area / (w * h) * base_distance`.

use crate::config::{ReplyShape, SafeZoneConfig, Settings};

/// Angle limit used when the configured one is negative or NaN.
pub const DEFAULT_MAX_REPORT_ANGLE_DEG: f64 = 90.0;

/// Horizontal and vertical angles relative to the optical axis, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bearing {
    pub horizontal_deg: f64,
    pub vertical_deg: f64,
}

/// What crosses the protocol boundary for one detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOutcome {
    pub horizontal_angle_deg: f64,
    pub vertical_angle_deg: Option<f64>,
    pub distance_cm: f64,
}

impl DetectionOutcome {
    /// Integer reply values: angles clamped to `±max_angle_deg`, everything truncated toward zero.
    /// A negative or NaN limit falls back to `DEFAULT_MAX_REPORT_ANGLE_DEG`.
    pub fn report(&self, shape: ReplyShape, max_angle_deg: f64) -> Vec<i64> {
        let limit = if max_angle_deg >= 0.0 { max_angle_deg } else { DEFAULT_MAX_REPORT_ANGLE_DEG };
        let clamp = |angle: f64| angle.clamp(-limit, limit).trunc() as i64;
        let distance = self.distance_cm.trunc() as i64;
        match shape {
            ReplyShape::AngleDistance => vec![clamp(self.horizontal_angle_deg), distance],
            ReplyShape::AngleElevationDistance => vec![
                clamp(self.horizontal_angle_deg),
                clamp(self.vertical_angle_deg.unwrap_or(0.0)),
                distance,
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Estimator {
    distance_scale: f64,
    distance_offset: f64,
    min_pixel_extent: u32,
    max_distance_mm: f64,
    horizontal_fov_deg: f64,
    vertical_fov_deg: f64,
    safe_zone_base_area: f64,
    safe_zone_base_distance_mm: f64,
}

impl Estimator {
    pub fn from_settings(settings: &Settings) -> Self {
        let SafeZoneConfig { base_area, base_distance_mm, .. } = settings.safe_zone;
        Self {
            distance_scale: settings.target.distance_scale,
            distance_offset: settings.target.distance_offset,
            min_pixel_extent: settings.target.min_pixel_extent,
            max_distance_mm: settings.target.max_distance_mm,
            horizontal_fov_deg: settings.camera.horizontal_fov_deg,
            vertical_fov_deg: settings.camera.vertical_fov_deg,
            safe_zone_base_area: base_area,
            safe_zone_base_distance_mm: base_distance_mm,
        }
    }

    /// `None` when the extent is too small to trust or the result is out of range.
    pub fn distance_mm(&self, pixel_extent: u32) -> Option<f64> {
        if pixel_extent <= self.min_pixel_extent {
            return None;
        }
        let distance = self.distance_scale / pixel_extent as f64 + self.distance_offset;
        if distance > self.max_distance_mm {
            return None;
        }
        Some(distance)
    }

    pub fn bearing(&self, x: f64, y: f64, width: u32, height: u32) -> Bearing {
        Bearing {
            horizontal_deg: angle_from_center(x, width, self.horizontal_fov_deg),
            vertical_deg: -angle_from_center(y, height, self.vertical_fov_deg),
        }
    }

    /// `box_area` is the zone's bounding-box area in px².
    pub fn safe_zone_distance_mm(&self, box_area: f64) -> f64 {
        self.safe_zone_base_area / box_area.max(1.0) * self.safe_zone_base_distance_mm
    }

    pub fn outcome(&self, x: f64, y: f64, width: u32, height: u32, distance_mm: f64) -> DetectionOutcome {
        let bearing = self.bearing(x, y, width, height);
        DetectionOutcome {
            horizontal_angle_deg: bearing.horizontal_deg,
            vertical_angle_deg: Some(bearing.vertical_deg),
            distance_cm: distance_mm / 10.0,
        }
    }
}

fn angle_from_center(position: f64, resolution: u32, fov_deg: f64) -> f64 {
    if resolution == 0 {
        return 0.0;
    }
    let center = resolution as f64 / 2.0;
    (position - center) * (fov_deg / resolution as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> Estimator {
        Estimator::from_settings(&Settings::default())
    }

    #[test]
    fn distance_rejects_tiny_extents() {
        let e = estimator();
        assert_eq!(e.distance_mm(0), None);
        assert_eq!(e.distance_mm(5), None);
        assert!(e.distance_mm(6).is_some());
    }

    #[test]
    fn distance_rejects_out_of_range() {
        let mut settings = Settings::default();
        settings.target.distance_scale = 60000.0;
        let e = Estimator::from_settings(&settings);
        // 60000 / 10 = 6000 mm, past the 5000 mm ceiling.
        assert_eq!(e.distance_mm(10), None);
        assert_eq!(e.distance_mm(12), Some(5000.0));
    }

    #[test]
    fn distance_decreases_with_extent() {
        let e = estimator();
        let distances: Vec<f64> = (6..400).filter_map(|px| e.distance_mm(px)).collect();
        assert_eq!(distances.len(), 394);
        assert!(distances.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(e.distance_mm(40), Some(375.0));
    }

    #[test]
    fn bearing_signs_follow_image_axes() {
        let e = estimator();
        let center = e.bearing(320.0, 240.0, 640, 480);
        assert_eq!(center, Bearing { horizontal_deg: 0.0, vertical_deg: 0.0 });

        let upper_right = e.bearing(480.0, 120.0, 640, 480);
        assert!((upper_right.horizontal_deg - 15.0).abs() < 1e-9);
        assert!((upper_right.vertical_deg - 11.25).abs() < 1e-9);

        let lower_left = e.bearing(0.0, 480.0, 640, 480);
        assert!((lower_left.horizontal_deg + 30.0).abs() < 1e-9);
        assert!((lower_left.vertical_deg + 22.5).abs() < 1e-9);
    }

    #[test]
    fn safe_zone_distance_is_inverse_in_area() {
        let e = estimator();
        assert!((e.safe_zone_distance_mm(32214.0) - 520.0).abs() < 1e-9);
        assert!(e.safe_zone_distance_mm(8000.0) > e.safe_zone_distance_mm(16000.0));
        assert!(e.safe_zone_distance_mm(0.0).is_finite());
    }

    #[test]
    fn report_clamps_and_truncates() {
        let outcome = DetectionOutcome {
            horizontal_angle_deg: -4.9,
            vertical_angle_deg: Some(120.0),
            distance_cm: 37.9,
        };
        assert_eq!(outcome.report(ReplyShape::AngleDistance, 90.0), vec![-4, 37]);
        assert_eq!(outcome.report(ReplyShape::AngleElevationDistance, 90.0), vec![-4, 90, 37]);
    }

    #[test]
    fn report_survives_a_bad_angle_limit() {
        let outcome = DetectionOutcome {
            horizontal_angle_deg: -4.9,
            vertical_angle_deg: Some(120.0),
            distance_cm: 37.9,
        };
        for limit in [-90.0, -1.0, f64::NAN] {
            assert_eq!(outcome.report(ReplyShape::AngleElevationDistance, limit), vec![-4, 90, 37]);
        }
        assert_eq!(outcome.report(ReplyShape::AngleElevationDistance, 0.0), vec![0, 0, 37]);
    }
}
