// THEORY:
// The `BlobDetector` is the engine of the spatial grouping stage. It turns a binary
// mask into a list of measured `Blob`s.
//
// Algorithm steps:
// 1.  **Closing**: the mask is dilated and then eroded with a 3x3 square, `k` times
//     each. Dilating first closes small gaps inside a target (glare, seams) before
//     anything is thrown away; the erosion then restores the outline and removes
//     the speckle the dilation could not merge.
// 2.  **External contours**: the mask is traced and only outer borders without a
//     parent are kept. Holes and regions nested inside holes are not of interest at
//     this scale.
// 3.  **Measurement**: each contour is reduced to area, perimeter, bounding box and
//     centroid (see `moment`).
// 4.  **Area filter**: contours smaller than the configured minimum are sensor
//     noise and are dropped here, so no caller ever sees them.
//
// The detector is stateless; it has no memory of previous frames.

use crate::core_modules::blob::Blob;
use crate::core_modules::moment::{self, BoundingBox, ContourMoments};
use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

pub mod blob_detector {
    use super::*;

    /// Dilate-then-erode with a 3x3 square, `iterations` times each.
    pub fn close(mask: &GrayImage, iterations: u8) -> GrayImage {
        if iterations == 0 {
            return mask.clone();
        }
        // An L-infinity radius of k equals k passes of a 3x3 square kernel.
        let dilated = dilate(mask, Norm::LInf, iterations);
        erode(&dilated, Norm::LInf, iterations)
    }

    /// Measures every external contour of an already-cleaned mask, dropping
    /// those with an area below `min_area`.
    pub fn find_blobs(mask: &GrayImage, min_area: f64) -> Vec<Blob> {
        find_contours::<i32>(mask)
            .into_iter()
            .filter(|contour| matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none())
            .filter_map(|contour| {
                let moments = ContourMoments::of(&contour.points);
                let area = moments.m00;
                if area < min_area {
                    return None;
                }
                Some(Blob {
                    area,
                    perimeter: moment::perimeter(&contour.points),
                    bounding_box: BoundingBox::of(&contour.points),
                    centroid: moments.centroid(),
                })
            })
            .collect()
    }

    /// Closing followed by blob extraction; returns the cleaned mask as well.
    pub fn extract(mask: &GrayImage, iterations: u8, min_area: f64) -> (Vec<Blob>, GrayImage) {
        let cleaned = close(mask, iterations);
        let blobs = find_blobs(&cleaned, min_area);
        (blobs, cleaned)
    }
}
