// THEORY:
// The `error` module names the genuine faults of the system. "Nothing detected",
// "no frame" and "no serial data" are NOT errors and never appear here; they are
// modelled as empty results by the detection and protocol layers. What remains are
// I/O faults (serial port, image files) and configuration that cannot be parsed.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RescueError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to open serial port {port}: {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),

    #[cfg(feature = "camera")]
    #[error("camera error: {0}")]
    Camera(#[from] opencv::Error),

    #[error("invalid color range for class `{class}`: {reason}")]
    InvalidColorRange { class: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RescueError>;
