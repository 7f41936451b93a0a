// THEORY:
// The `Segmenter` is the first stage of every detection. It answers one question
// per pixel: "does this pixel belong to color class X?"
//
// Pipeline ordering:
// 1.  **Smoothing**: the RGB frame is blurred with a fixed Gaussian before anything
//     else, so single-pixel sensor noise does not survive into the masks. The mask
//     itself is never blurred; it stays strictly binary.
// 2.  **Color-space conversion**: the smoothed frame is converted once into an
//     `HsvFrame`. Callers that need several classes from the same image (the sleeve
//     check, the safe zone) segment them all from this one conversion.
// 3.  **Thresholding**: a pixel is 255 in the mask if it lies inside ANY interval of
//     the class, else 0. An unknown or disabled class yields an all-zero mask.

use crate::core_modules::color_class::ColorTable;
use crate::core_modules::pixel::pixel::HsvPixel;
use image::{GrayImage, Luma, RgbImage, imageops};
use tracing::debug;

pub const MASK_ON: u8 = 255;
pub const MASK_OFF: u8 = 0;

/// A frame after smoothing and HSV conversion, row-major.
#[derive(Debug, Clone)]
pub struct HsvFrame {
    width: u32,
    height: u32,
    pixels: Vec<HsvPixel>,
}

impl HsvFrame {
    /// Blurs `frame` with the given sigma (skipped when not positive) and converts it to HSV.
    pub fn from_rgb(frame: &RgbImage, blur_sigma: f32) -> Self {
        let smoothed;
        let source = if blur_sigma > 0.0 {
            smoothed = imageops::blur(frame, blur_sigma);
            &smoothed
        } else {
            frame
        };

        let pixels = source.pixels().map(HsvPixel::from).collect();
        Self {
            width: frame.width(),
            height: frame.height(),
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> HsvPixel {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// A binary mask plus its foreground pixel count (diagnostics only).
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub mask: GrayImage,
    pub pixel_count: u32,
}

/// Turns an HSV frame and a class name into a binary mask.
#[derive(Debug, Clone)]
pub struct Segmenter {
    colors: ColorTable,
    blur_sigma: f32,
}

impl Segmenter {
    pub fn new(colors: ColorTable, blur_sigma: f32) -> Self {
        Self { colors, blur_sigma }
    }

    pub fn colors(&self) -> &ColorTable {
        &self.colors
    }

    /// Smooths and converts a raw frame, ready for `segment`.
    pub fn prepare(&self, frame: &RgbImage) -> HsvFrame {
        HsvFrame::from_rgb(frame, self.blur_sigma)
    }

    pub fn segment(&self, hsv: &HsvFrame, color: &str) -> Segmentation {
        let Some(class) = self.colors.get(color) else {
            debug!(color, "no usable HSV range, mask is empty");
            return Segmentation {
                mask: GrayImage::new(hsv.width(), hsv.height()),
                pixel_count: 0,
            };
        };

        let mut pixel_count = 0u32;
        let mask = GrayImage::from_fn(hsv.width(), hsv.height(), |x, y| {
            if class.matches(hsv.get(x, y)) {
                pixel_count += 1;
                Luma([MASK_ON])
            } else {
                Luma([MASK_OFF])
            }
        });

        debug!(color, pixel_count, "segmented");
        Segmentation { mask, pixel_count }
    }

    /// Segments every listed class and ORs the masks together.
    pub fn segment_union(&self, hsv: &HsvFrame, colors: &[&str]) -> Segmentation {
        let mut union = GrayImage::new(hsv.width(), hsv.height());
        for color in colors {
            let part = self.segment(hsv, color);
            for (dst, src) in union.pixels_mut().zip(part.mask.pixels()) {
                dst.0[0] |= src.0[0];
            }
        }
        let pixel_count = count_nonzero(&union);
        Segmentation { mask: union, pixel_count }
    }
}

pub fn count_nonzero(mask: &GrayImage) -> u32 {
    mask.pixels().filter(|p| p.0[0] != MASK_OFF).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use image::Rgb;

    fn segmenter() -> Segmenter {
        Segmenter::new(ColorTable::from_config(&Settings::default().colors), 0.0)
    }

    /// A 4x1 frame: pure red, pale magenta-red, blue, black.
    fn strip() -> RgbImage {
        let colors = [[230, 10, 10], [230, 120, 150], [20, 40, 220], [0, 0, 0]];
        RgbImage::from_fn(4, 1, |x, _| Rgb(colors[x as usize]))
    }

    #[test]
    fn red_mask_is_the_union_of_both_hue_bands() {
        let seg = segmenter();
        let hsv = seg.prepare(&strip());
        assert!(hsv.get(0, 0).hue <= 11);
        assert!(hsv.get(1, 0).hue >= 150);

        let red = seg.segment(&hsv, "red");
        let values: Vec<u8> = red.mask.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![MASK_ON, MASK_ON, MASK_OFF, MASK_OFF]);
        assert_eq!(red.pixel_count, 2);
    }

    #[test]
    fn single_interval_classes() {
        let seg = segmenter();
        let hsv = seg.prepare(&strip());
        let blue = seg.segment(&hsv, "blue");
        assert_eq!(blue.mask.get_pixel(2, 0).0[0], MASK_ON);
        assert_eq!(blue.pixel_count, 1);

        let black = seg.segment(&hsv, "black");
        assert_eq!(black.mask.get_pixel(3, 0).0[0], MASK_ON);
        assert_eq!(black.mask.get_pixel(0, 0).0[0], MASK_OFF);
    }

    #[test]
    fn unknown_class_gives_an_empty_mask_of_the_frame_size() {
        let seg = segmenter();
        let hsv = seg.prepare(&strip());
        let none = seg.segment(&hsv, "purple");
        assert_eq!(none.mask.dimensions(), (4, 1));
        assert_eq!(none.pixel_count, 0);
        assert_eq!(count_nonzero(&none.mask), 0);
    }

    #[test]
    fn union_combines_classes() {
        let seg = segmenter();
        let hsv = seg.prepare(&strip());
        let both = seg.segment_union(&hsv, &["red", "blue"]);
        assert_eq!(both.pixel_count, 3);
        assert_eq!(both.mask.get_pixel(3, 0).0[0], MASK_OFF);
    }

    #[test]
    fn blur_does_not_change_the_frame_size() {
        let frame = RgbImage::from_pixel(32, 24, Rgb([200, 20, 20]));
        let hsv = HsvFrame::from_rgb(&frame, 1.1);
        assert_eq!((hsv.width(), hsv.height()), (32, 24));
        assert!(segmenter().segment(&hsv, "red").pixel_count > 0);
    }
}
