// THEORY:
// Frames come from a collaborator the vision core does not own. The `FrameSource`
// trait is that boundary: initialise with the camera settings, hand out the latest
// frame or nothing, release.
//
// The robot build feeds frames from a directory of stills (`ImageReplaySource`),
// which is also how a field recording is replayed on the bench. A missing or empty
// source is not fatal; the loop keeps serving the protocol with zero replies.

use crate::config::CameraConfig;
use crate::error::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub trait FrameSource {
    /// `false` when the source cannot produce frames.
    fn init(&mut self, camera: &CameraConfig) -> bool;
    fn get_frame(&mut self) -> Option<RgbImage>;
    fn release(&mut self);
}

/// Used when no source is configured. Never yields a frame.
#[derive(Debug, Default)]
pub struct NoCamera;

impl FrameSource for NoCamera {
    fn init(&mut self, _camera: &CameraConfig) -> bool {
        false
    }

    fn get_frame(&mut self) -> Option<RgbImage> {
        None
    }

    fn release(&mut self) {}
}

/// Cycles through still images, resized to the configured resolution.
#[derive(Debug, Default)]
pub struct ImageReplaySource {
    dir: Option<PathBuf>,
    frames: Vec<RgbImage>,
    cursor: usize,
}

impl ImageReplaySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()), ..Self::default() }
    }

    /// A source over frames already in memory.
    pub fn from_frames(frames: Vec<RgbImage>) -> Self {
        Self { dir: None, frames, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageReplaySource {
    fn init(&mut self, camera: &CameraConfig) -> bool {
        if let Some(dir) = &self.dir {
            match load_frames(dir) {
                Ok(frames) => self.frames = frames,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cannot read frame directory");
                    self.frames.clear();
                }
            }
        }

        for frame in &mut self.frames {
            if frame.dimensions() != (camera.width, camera.height) {
                *frame = imageops::resize(frame, camera.width, camera.height, FilterType::Triangle);
            }
        }
        self.cursor = 0;

        info!(frames = self.frames.len(), width = camera.width, height = camera.height, "replay source ready");
        !self.frames.is_empty()
    }

    fn get_frame(&mut self) -> Option<RgbImage> {
        if self.frames.is_empty() {
            return None;
        }
        let frame = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Some(frame)
    }

    fn release(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }
}

/// Every decodable image in `dir`, in file-name order.
pub fn load_frames(dir: &Path) -> Result<Vec<RgbImage>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let frames = paths
        .iter()
        .filter_map(|path| match image::open(path) {
            Ok(image) => Some(image.to_rgb8()),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping file");
                None
            }
        })
        .collect();
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rescue_vision_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn replays_in_name_order_and_resizes() {
        let dir = scratch_dir("replay");
        RgbImage::from_pixel(320, 240, Rgb([200, 0, 0])).save(dir.join("b.png")).expect("write b");
        RgbImage::from_pixel(640, 480, Rgb([0, 0, 200])).save(dir.join("a.png")).expect("write a");
        std::fs::write(dir.join("notes.txt"), "not an image").expect("write notes");

        let mut source = ImageReplaySource::new(&dir);
        assert!(source.init(&CameraConfig::default()));
        assert_eq!(source.len(), 2);

        let first = source.get_frame().expect("frame");
        let second = source.get_frame().expect("frame");
        let third = source.get_frame().expect("frame");
        assert_eq!(first.dimensions(), (640, 480));
        assert_eq!(second.dimensions(), (640, 480));
        assert_eq!(first.get_pixel(10, 10), &Rgb([0, 0, 200]));
        assert_eq!(second.get_pixel(10, 10), &Rgb([200, 0, 0]));
        assert_eq!(third, first);

        source.release();
        assert!(source.get_frame().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_or_empty_directory_fails_init() {
        let camera = CameraConfig::default();
        let mut missing = ImageReplaySource::new("/no/such/frames/here");
        assert!(!missing.init(&camera));
        assert!(missing.get_frame().is_none());

        let dir = scratch_dir("empty");
        let mut empty = ImageReplaySource::new(&dir);
        assert!(!empty.init(&camera));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_camera_never_yields() {
        let mut source = NoCamera;
        assert!(!source.init(&CameraConfig::default()));
        assert!(source.get_frame().is_none());
    }
}
