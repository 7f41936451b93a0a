// THEORY:
// This file is the main entry point for the `rescue_vision` library crate.
//
// The crate is the onboard "eyes" of a rescue robot. It answers a motion
// controller that asks, over a serial line, where the nearest target sphere is,
// where the painted safe zone is, and whether a ball is held in the sleeve.
//
// The layers, bottom up:
// - `core_modules`: color segmentation, contour measurement, ranging and the
//   detection policies. Pure functions of one frame; no state between frames.
// - `protocol`: the wire commands, the serial session and the engine that
//   dispatches one command per tick.
// - `frame_source` and `pipeline`: the owned handles and the polling loop.
//   `camera` (feature `camera`) adds the live OpenCV source.
//
// `RescuePipeline` is the high-level interface; `TargetDetector` is exported for
// tools that only need detection.

#[cfg(feature = "camera")]
pub mod camera;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod frame_source;
pub mod pipeline;
pub mod protocol;

pub use crate::config::Settings;
pub use crate::core_modules::target_detector::TargetDetector;
pub use crate::error::{RescueError, Result};
pub use crate::pipeline::RescuePipeline;
