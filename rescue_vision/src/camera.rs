// THEORY:
// `OpenCvCamera` is the live `FrameSource`: an OpenCV capture on a device index,
// or on a video file for bench replays.
//
// 1.  **Open**: a device is asked for MJPG at the configured resolution and frame
//     rate. The driver may settle on something else; frames are taken at whatever
//     size it delivers, and the bearing law uses the real frame dimensions.
// 2.  **Read**: one `read` per frame. A failed or empty read is "no frame", never
//     an error; the loop keeps serving the protocol.
// 3.  **Convert**: OpenCV hands out BGR rows, the vision core wants `RgbImage`.

use crate::config::CameraConfig;
use crate::error::Result;
use crate::frame_source::FrameSource;
use image::RgbImage;
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
enum CaptureDevice {
    /// `camera.index` from the settings.
    Configured,
    File(PathBuf),
}

pub struct OpenCvCamera {
    device: CaptureDevice,
    capture: Option<VideoCapture>,
}

impl Default for OpenCvCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenCvCamera {
    /// The device at `camera.index`, opened on `init`.
    pub fn new() -> Self {
        Self { device: CaptureDevice::Configured, capture: None }
    }

    /// A video file, played once from the start.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self { device: CaptureDevice::File(path.into()), capture: None }
    }

    pub fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    fn open(&self, camera: &CameraConfig) -> Result<Option<VideoCapture>> {
        let mut capture = match &self.device {
            CaptureDevice::Configured => VideoCapture::new(camera.index as i32, videoio::CAP_ANY)?,
            CaptureDevice::File(path) => VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?,
        };
        if !capture.is_opened()? {
            return Ok(None);
        }

        if let CaptureDevice::Configured = self.device {
            let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G')?;
            capture.set(videoio::CAP_PROP_FOURCC, fourcc as f64)?;
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, camera.width as f64)?;
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, camera.height as f64)?;
            capture.set(videoio::CAP_PROP_FPS, camera.fps as f64)?;
        }
        debug!(
            width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)?,
            height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)?,
            fps = capture.get(videoio::CAP_PROP_FPS)?,
            "capture negotiated"
        );
        Ok(Some(capture))
    }

    fn read(capture: &mut VideoCapture) -> Result<Option<RgbImage>> {
        let mut frame = Mat::default();
        if !capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        let mut rgb = Mat::default();
        imgproc::cvt_color(&frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        Ok(RgbImage::from_raw(width, height, rgb.data_bytes()?.to_vec()))
    }
}

impl FrameSource for OpenCvCamera {
    fn init(&mut self, camera: &CameraConfig) -> bool {
        self.release();
        match self.open(camera) {
            Ok(Some(capture)) => {
                self.capture = Some(capture);
                true
            }
            Ok(None) => {
                warn!(device = ?self.device, "capture did not open");
                false
            }
            Err(e) => {
                warn!(device = ?self.device, error = %e, "capture failed");
                false
            }
        }
    }

    fn get_frame(&mut self) -> Option<RgbImage> {
        let capture = self.capture.as_mut()?;
        match Self::read(capture) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "frame read failed");
                None
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                warn!(error = %e, "capture release failed");
            }
        }
    }
}
