// THEORY (HSV Pixel):
// The `pixel` module is the most fundamental unit of the color pipeline. It turns a
// single RGB pixel into the 8-bit HSV triple every color threshold is written in.
// Nothing here looks at neighbors; blurring and masking belong to the segmenter.
//
// The 8-bit convention:
// - Hue is stored as half-degrees, so the full circle fits in [0, 179].
// - Saturation and value are scaled to [0, 255].
// Because hue is circular, red sits on both ends of the range (near 0 and near
// 179). That is why the red class owns two intervals.

pub mod pixel {
    use image::Rgb;

    pub type Channel = u8;
    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;

    /// Largest hue the 8-bit convention can produce.
    pub const HUE_MAX: Hue = 179;

    /// A single pixel in 8-bit HSV.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HsvPixel {
        /// Hue in half-degrees (0-179).
        pub hue: Hue,
        /// Saturation (0-255).
        pub saturation: Saturation,
        /// Value, the brightest channel (0-255).
        pub value: Value,
    }

    impl HsvPixel {
        pub fn new(hue: Hue, saturation: Saturation, value: Value) -> Self {
            Self { hue, saturation, value }
        }

        /// Converts one RGB pixel.
        ///
        /// - Value is the maximum channel.
        /// - Saturation is chroma relative to value; black has zero saturation.
        /// - Hue is the color-wheel angle halved and rounded, wrapping 180 back to 0.
        pub fn from_rgb(red: Channel, green: Channel, blue: Channel) -> Self {
            let r = red as f32;
            let g = green as f32;
            let b = blue as f32;

            let maximum_channel = r.max(g).max(b);
            let minimum_channel = r.min(g).min(b);
            let chroma = maximum_channel - minimum_channel;

            let saturation = if maximum_channel > 0.0 {
                (255.0 * chroma / maximum_channel).round()
            } else {
                0.0
            };

            if chroma <= 0.0 {
                return Self::new(0, saturation as Saturation, maximum_channel as Value);
            }

            let mut hue_degrees = if maximum_channel == r {
                60.0 * (g - b) / chroma
            } else if maximum_channel == g {
                120.0 + 60.0 * (b - r) / chroma
            } else {
                240.0 + 60.0 * (r - g) / chroma
            };
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }

            let mut hue = (hue_degrees / 2.0).round() as u16;
            if hue > HUE_MAX as u16 {
                hue = 0;
            }

            Self::new(hue as Hue, saturation as Saturation, maximum_channel as Value)
        }
    }

    impl From<&Rgb<u8>> for HsvPixel {
        fn from(rgb: &Rgb<u8>) -> Self {
            let [red, green, blue] = rgb.0;
            Self::from_rgb(red, green, blue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn primaries_land_on_their_half_degree_hues() {
        assert_eq!(HsvPixel::from_rgb(255, 0, 0), HsvPixel::new(0, 255, 255));
        assert_eq!(HsvPixel::from_rgb(0, 255, 0), HsvPixel::new(60, 255, 255));
        assert_eq!(HsvPixel::from_rgb(0, 0, 255), HsvPixel::new(120, 255, 255));
        assert_eq!(HsvPixel::from_rgb(255, 255, 0), HsvPixel::new(30, 255, 255));
    }

    #[test]
    fn grays_have_no_hue_or_saturation() {
        assert_eq!(HsvPixel::from_rgb(0, 0, 0), HsvPixel::new(0, 0, 0));
        assert_eq!(HsvPixel::from_rgb(128, 128, 128), HsvPixel::new(0, 0, 128));
        assert_eq!(HsvPixel::from_rgb(255, 255, 255), HsvPixel::new(0, 0, 255));
    }

    #[test]
    fn magenta_red_wraps_to_the_top_of_the_hue_range() {
        // Slightly bluish red sits just below 360 degrees.
        let pixel = HsvPixel::from_rgb(255, 0, 20);
        assert!(pixel.hue >= 170, "hue was {}", pixel.hue);
        assert!(pixel.hue <= HUE_MAX);
    }
}
