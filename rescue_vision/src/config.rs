// THEORY:
// The `config` module is the single, explicit schema for every tunable in the
// system. It replaces the loose dictionaries a field deployment accumulates with
// typed sections, each of which falls back to the values the robot was calibrated
// with. A JSON file may override any subset of fields; anything absent keeps its
// default.
//
// Color ranges are always a list of one or two `(low, high)` HSV intervals per
// class. Validation of those intervals happens later, in `ColorTable::from_config`,
// so that one bad class degrades to "never detected" instead of refusing to start.

use crate::core_modules::color_class::HsvInterval;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root of the configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraConfig,
    pub target: TargetConfig,
    pub vision: VisionConfig,
    /// Class name -> one or two HSV intervals.
    pub colors: BTreeMap<String, Vec<HsvInterval>>,
    pub safe_zone: SafeZoneConfig,
    pub serial: SerialConfig,
    pub protocol: ProtocolConfig,
    /// Scheduling tick of the polling loop, in milliseconds.
    pub tick_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            target: TargetConfig::default(),
            vision: VisionConfig::default(),
            colors: default_color_ranges(),
            safe_zone: SafeZoneConfig::default(),
            serial: SerialConfig::default(),
            protocol: ProtocolConfig::default(),
            tick_ms: 100,
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file. Fields missing from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Horizontal field of view in degrees.
    pub horizontal_fov_deg: f64,
    /// Vertical field of view in degrees, only reported in the three-value reply shape.
    pub vertical_fov_deg: f64,
    /// Directory of still frames for the replay source. `None` means the live
    /// camera at `index` when built with the `camera` feature, otherwise no camera.
    pub image_dir: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
            horizontal_fov_deg: 60.0,
            vertical_fov_deg: 45.0,
            image_dir: None,
        }
    }
}

/// Sphere filtering and the pixel-size to distance law.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Contours smaller than this many square pixels are treated as noise.
    pub min_contour_area: f64,
    /// Contours must be strictly rounder than this to count as a sphere.
    pub circularity_threshold: f64,
    /// Extents at or below this are too small to range.
    pub min_pixel_extent: u32,
    pub max_distance_mm: f64,
    pub distance_scale: f64,
    pub distance_offset: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            min_contour_area: 20.0,
            circularity_threshold: 0.65,
            min_pixel_extent: 5,
            max_distance_mm: 5000.0,
            distance_scale: 15000.0,
            distance_offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Gaussian sigma applied to the frame before HSV conversion. 1.1 matches a 5x5 kernel.
    pub blur_sigma: f32,
    pub sphere_close_iterations: u8,
    pub safe_zone_close_iterations: u8,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            sphere_close_iterations: 1,
            safe_zone_close_iterations: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeZoneConfig {
    pub min_area: f64,
    pub max_area: f64,
    pub min_width: u32,
    pub min_height: u32,
    /// Accepted width / height range.
    pub ratio_min: f64,
    pub ratio_max: f64,
    /// Anything at least this circular is a ball, not the zone.
    pub circularity_ceiling: f64,
    /// Distance at which the zone's contour area equals `base_area`.
    pub base_distance_mm: f64,
    pub base_area: f64,
}

impl Default for SafeZoneConfig {
    fn default() -> Self {
        Self {
            min_area: 500.0,
            max_area: 50000.0,
            min_width: 50,
            min_height: 20,
            ratio_min: 2.0,
            ratio_max: 4.0,
            circularity_ceiling: 0.75,
            base_distance_mm: 520.0,
            base_area: 32214.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    /// Pause after a read so the rest of a multi-byte command can arrive.
    pub grace_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            timeout_ms: 100,
            grace_ms: 10,
        }
    }
}

/// Arity of ball replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyShape {
    /// `[angle,distance_cm]`
    AngleDistance,
    /// `[h_angle,v_angle,distance_cm]`
    AngleElevationDistance,
}

impl ReplyShape {
    pub fn arity(self) -> usize {
        match self {
            ReplyShape::AngleDistance => 2,
            ReplyShape::AngleElevationDistance => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub team_color: String,
    pub reply_shape: ReplyShape,
    /// Try black balls before yellow when the team color yields nothing.
    pub prioritize_black: bool,
    /// Mask pixels inside the sleeve window above which a color counts as present.
    pub catch_pixel_threshold: u32,
    /// Answer ticks without inbound data with the zero-vector.
    pub reply_when_idle: bool,
    pub max_report_angle_deg: f64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            team_color: "red".to_string(),
            reply_shape: ReplyShape::AngleDistance,
            prioritize_black: true,
            catch_pixel_threshold: 50,
            reply_when_idle: true,
            max_report_angle_deg: 90.0,
        }
    }
}

fn default_color_ranges() -> BTreeMap<String, Vec<HsvInterval>> {
    let mut colors = BTreeMap::new();
    colors.insert(
        "red".to_string(),
        vec![
            HsvInterval::new([0, 153, 77], [11, 255, 255]),
            HsvInterval::new([150, 30, 50], [179, 255, 255]),
        ],
    );
    colors.insert("blue".to_string(), vec![HsvInterval::new([88, 146, 61], [179, 255, 255])]);
    colors.insert("black".to_string(), vec![HsvInterval::new([0, 0, 0], [179, 255, 46])]);
    colors.insert("yellow".to_string(), vec![HsvInterval::new([19, 111, 78], [63, 237, 226])]);
    colors.insert("white".to_string(), vec![HsvInterval::new([0, 0, 200], [179, 255, 255])]);
    colors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_json(
            r#"{ "protocol": { "team_color": "blue" }, "serial": { "baud_rate": 115200 } }"#,
        )
        .expect("valid json");

        assert_eq!(settings.protocol.team_color, "blue");
        assert_eq!(settings.protocol.reply_shape, ReplyShape::AngleDistance);
        assert_eq!(settings.serial.baud_rate, 115200);
        assert_eq!(settings.serial.port, "/dev/ttyS0");
        assert_eq!(settings.camera.width, 640);
        assert_eq!(settings.colors["red"].len(), 2);
    }

    #[test]
    fn reply_shape_parses_snake_case() {
        let settings =
            Settings::from_json(r#"{ "protocol": { "reply_shape": "angle_elevation_distance" } }"#)
                .expect("valid json");
        assert_eq!(settings.protocol.reply_shape.arity(), 3);
    }

    #[test]
    fn color_table_replaces_defaults_wholesale() {
        let settings = Settings::from_json(
            r#"{ "colors": { "green": [ { "low": [40, 80, 80], "high": [80, 255, 255] } ] } }"#,
        )
        .expect("valid json");
        assert_eq!(settings.colors.len(), 1);
        assert!(settings.colors.contains_key("green"));
    }

    #[test]
    fn garbage_is_a_config_error() {
        assert!(Settings::from_json("{ not json").is_err());
    }
}
