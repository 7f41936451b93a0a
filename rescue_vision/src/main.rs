// The robot-side binary: load settings, open the camera and the serial port,
// poll until ctrl-c.
//
// Usage: rescue_vision [settings.json]

use anyhow::Context;
use rescue_vision::frame_source::{FrameSource, ImageReplaySource};
use rescue_vision::protocol::serial::SerialSession;
use rescue_vision::{RescuePipeline, Settings};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // --- 1. Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- 2. Settings ---
    let settings = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Settings::from_file(&path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    info!(team = %settings.protocol.team_color, port = %settings.serial.port, "rescue vision starting");

    // --- 3. Peripherals ---
    let source: Box<dyn FrameSource> = match &settings.camera.image_dir {
        Some(dir) => Box::new(ImageReplaySource::new(dir)),
        None => live_camera(),
    };
    let session = SerialSession::open(&settings.serial);

    // --- 4. Loop ---
    let mut pipeline = RescuePipeline::new(&settings, source, session);
    pipeline.run().await;

    info!("rescue vision stopped");
    Ok(())
}

#[cfg(feature = "camera")]
fn live_camera() -> Box<dyn FrameSource> {
    Box::new(rescue_vision::camera::OpenCvCamera::new())
}

#[cfg(not(feature = "camera"))]
fn live_camera() -> Box<dyn FrameSource> {
    tracing::warn!("built without the `camera` feature and no camera.image_dir set, running without frames");
    Box::new(rescue_vision::frame_source::NoCamera)
}
