// THEORY:
// The `TargetDetector` composes the lower stages (segmenter -> blob detector ->
// estimator) into the three questions the robot actually asks:
//
// 1.  **Where are the spheres of color X?** Segment, close lightly, keep contours
//     rounder than the circularity threshold, range them, drop the ones that cannot
//     be ranged, sort nearest first.
// 2.  **Where is the safe zone?** Segment the team's zone color(s), close more
//     heavily (the painted area is large and often broken up by wear), then accept
//     the first contour that is big enough, elongated enough and explicitly NOT
//     round. The last condition keeps a ball lying in view from being taken for the
//     zone. Contour order is whatever the tracer produces; the first match wins,
//     not the largest.
// 3.  **Is a ball in the sleeve?** Look at the central third of the frame and
//     record which colors are present there. The judgement itself lives in
//     `judge_catch`.
//
// Absence is a first-class result everywhere: an empty Vec or `None`, never an error.

use crate::config::{SafeZoneConfig, Settings};
use crate::core_modules::blob::{Blob, Candidate};
use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::color_class::ColorTable;
use crate::core_modules::estimator::Estimator;
use crate::core_modules::moment::BoundingBox;
use crate::core_modules::segmenter::{HsvFrame, Segmenter, count_nonzero};
use image::{GrayImage, RgbImage, imageops};
use std::collections::BTreeSet;
use tracing::debug;

/// Colors probed inside the sleeve window.
pub const CATCH_COLORS: [&str; 5] = ["red", "blue", "black", "yellow", "white"];
/// The sleeve itself is white.
pub const SLEEVE_COLOR: &str = "white";
pub const BLACK: &str = "black";
pub const YELLOW: &str = "yellow";

/// Result of one sphere detection pass.
#[derive(Debug, Clone)]
pub struct SphereDetection {
    /// Ranged candidates, nearest first.
    pub candidates: Vec<Candidate>,
    /// The cleaned mask the candidates were traced from.
    pub mask: GrayImage,
}

impl SphereDetection {
    pub fn nearest(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

/// The accepted safe-zone contour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeZone {
    pub rect: BoundingBox,
    pub contour_area: f64,
}

#[derive(Debug, Clone)]
pub struct TargetDetector {
    segmenter: Segmenter,
    estimator: Estimator,
    min_contour_area: f64,
    circularity_threshold: f64,
    sphere_close_iterations: u8,
    safe_zone_close_iterations: u8,
    safe_zone: SafeZoneConfig,
}

impl TargetDetector {
    pub fn from_settings(settings: &Settings) -> Self {
        let colors = ColorTable::from_config(&settings.colors);
        Self {
            segmenter: Segmenter::new(colors, settings.vision.blur_sigma),
            estimator: Estimator::from_settings(settings),
            min_contour_area: settings.target.min_contour_area,
            circularity_threshold: settings.target.circularity_threshold,
            sphere_close_iterations: settings.vision.sphere_close_iterations,
            safe_zone_close_iterations: settings.vision.safe_zone_close_iterations,
            safe_zone: settings.safe_zone.clone(),
        }
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// All spheres of `color` in the frame, nearest first.
    pub fn detect_color(&self, frame: &RgbImage, color: &str) -> SphereDetection {
        if is_empty_frame(frame) {
            return SphereDetection { candidates: Vec::new(), mask: GrayImage::new(0, 0) };
        }
        let hsv = self.segmenter.prepare(frame);
        self.detect_color_hsv(&hsv, color)
    }

    fn detect_color_hsv(&self, hsv: &HsvFrame, color: &str) -> SphereDetection {
        let segmentation = self.segmenter.segment(hsv, color);
        let (blobs, mask) =
            blob_detector::extract(&segmentation.mask, self.sphere_close_iterations, self.min_contour_area);

        let mut candidates: Vec<Candidate> = blobs
            .iter()
            .filter(|blob| blob.circularity() > self.circularity_threshold)
            .filter_map(|blob| self.range(blob))
            .collect();
        candidates.sort_by(|a, b| a.distance_mm.total_cmp(&b.distance_mm));

        debug!(color, blobs = blobs.len(), spheres = candidates.len(), "sphere pass");
        SphereDetection { candidates, mask }
    }

    fn range(&self, blob: &Blob) -> Option<Candidate> {
        let (cx, cy) = blob.centroid?;
        let pixel_extent = blob.bounding_box.major_axis();
        let distance_mm = self.estimator.distance_mm(pixel_extent)?;
        Some(Candidate {
            center_x: cx as u32,
            center_y: cy as u32,
            distance_mm,
            pixel_extent,
        })
    }

    /// Walks `colors` in order and returns the nearest sphere of the first color
    /// that yields any.
    pub fn nearest_in_priority<'c>(&self, frame: &RgbImage, colors: &[&'c str]) -> Option<(&'c str, Candidate)> {
        if is_empty_frame(frame) {
            return None;
        }
        let hsv = self.segmenter.prepare(frame);
        colors.iter().find_map(|&color| {
            self.detect_color_hsv(&hsv, color)
                .nearest()
                .map(|candidate| (color, *candidate))
        })
    }

    /// The first contour of the zone color(s) that passes every geometric filter.
    /// With no team color both red and blue zones are considered.
    pub fn detect_safe_zone(&self, frame: &RgbImage, team_color: Option<&str>) -> Option<SafeZone> {
        if is_empty_frame(frame) {
            return None;
        }
        let colors: Vec<&str> = match team_color {
            Some(color) => vec![color],
            None => vec!["red", "blue"],
        };

        let hsv = self.segmenter.prepare(frame);
        let segmentation = self.segmenter.segment_union(&hsv, &colors);
        let (blobs, _) = blob_detector::extract(
            &segmentation.mask,
            self.safe_zone_close_iterations,
            self.min_contour_area,
        );

        let zone = blobs
            .iter()
            .find(|blob| self.is_safe_zone(blob))
            .map(|blob| SafeZone { rect: blob.bounding_box, contour_area: blob.area });
        debug!(?colors, blobs = blobs.len(), found = zone.is_some(), "safe zone pass");
        zone
    }

    /// Every condition must hold: area in range, both sides above their floors,
    /// width/height ratio in range, and not round.
    pub fn is_safe_zone(&self, blob: &Blob) -> bool {
        let cfg = &self.safe_zone;
        let bbox = &blob.bounding_box;
        let ratio = bbox.aspect_ratio();

        (cfg.min_area..=cfg.max_area).contains(&blob.area)
            && bbox.width > cfg.min_width
            && bbox.height > cfg.min_height
            && (cfg.ratio_min..=cfg.ratio_max).contains(&ratio)
            && blob.circularity() < cfg.circularity_ceiling
    }

    /// Colors present in the central third of the frame. A color counts when it
    /// yields a sphere there or when its cleaned mask has more than
    /// `pixel_threshold` pixels.
    pub fn sleeve_colors(&self, frame: &RgbImage, pixel_threshold: u32) -> BTreeSet<String> {
        let (width, height) = frame.dimensions();
        let window = imageops::crop_imm(frame, width / 3, height / 3, width / 3, height / 3).to_image();
        if is_empty_frame(&window) {
            return BTreeSet::new();
        }

        let hsv = self.segmenter.prepare(&window);
        CATCH_COLORS
            .iter()
            .filter(|&&color| {
                let detection = self.detect_color_hsv(&hsv, color);
                !detection.candidates.is_empty() || count_nonzero(&detection.mask) > pixel_threshold
            })
            .map(|color| color.to_string())
            .collect()
    }
}

/// Decides whether a ball sits in the sleeve from the colors seen in it.
///
/// These rules were tuned on the field and are kept exactly:
/// - fewer than two colors: no judgement, not caught;
/// - sleeve + yellow + anything else: not caught;
/// - sleeve + yellow alone: caught;
/// - sleeve + team color or black: caught;
/// - anything else: not caught.
pub fn judge_catch(present: &BTreeSet<String>, team_color: &str) -> bool {
    if present.len() < 2 {
        return false;
    }
    let has_sleeve = present.contains(SLEEVE_COLOR);
    let has_yellow = present.contains(YELLOW);
    let has_target = present.contains(team_color) || present.contains(BLACK);

    if has_sleeve && has_yellow && present.len() >= 3 {
        false
    } else if has_sleeve && has_yellow {
        true
    } else {
        has_sleeve && has_target
    }
}

fn is_empty_frame(frame: &RgbImage) -> bool {
    frame.width() == 0 || frame.height() == 0
}
