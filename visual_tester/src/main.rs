// Bench tool: runs still frames or a recorded video through the detector and
// writes annotated copies.
//
// Usage: visual_tester <input_image_dir_or_video> <output_dir> [settings.json]
//
// For every input frame two PNGs are written: `<name>_annotated.png` with a box
// around every sphere (in the class color) and the safe zone (magenta), and
// `<name>_mask.png` with the union of the cleaned sphere masks. Video input needs
// the `camera` feature; its frames are named `frame_00000` onwards.

use anyhow::{Context, Result, bail};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use rescue_vision::core_modules::target_detector::judge_catch;
use rescue_vision::{Settings, TargetDetector};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SAFE_ZONE_COLOR: Rgb<u8> = Rgb([255, 0, 255]);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        println!("Usage: visual_tester <input_image_dir_or_video> <output_dir> [settings.json]");
        return Ok(());
    }
    let input = PathBuf::from(&args[1]);
    let output_dir = PathBuf::from(&args[2]);
    let settings = match args.get(3) {
        Some(path) => Settings::from_file(Path::new(path)).with_context(|| format!("loading {path}"))?,
        None => Settings::default(),
    };
    std::fs::create_dir_all(&output_dir).with_context(|| format!("creating {}", output_dir.display()))?;

    // --- 2. Detector Initialization ---
    let detector = TargetDetector::from_settings(&settings);
    if is_video(&input) {
        let frames = process_video(&input, &output_dir, &detector, &settings)?;
        println!("Processed {frames} video frames. Output saved to {}", output_dir.display());
        return Ok(());
    }
    let inputs = collect_inputs(&input)?;
    if inputs.is_empty() {
        bail!("no input images at {}", input.display());
    }

    // --- 3. Main Processing Loop ---
    for path in &inputs {
        let frame = match image::open(path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping");
                continue;
            }
        };
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("frame");

        save_annotated(&detector, &settings, &frame, &output_dir, stem)?;
    }

    println!("Processing complete. Output saved to {}", output_dir.display());
    Ok(())
}

fn save_annotated(
    detector: &TargetDetector,
    settings: &Settings,
    frame: &RgbImage,
    output_dir: &Path,
    stem: &str,
) -> Result<()> {
    let (annotated, mask) = annotate(detector, settings, frame);
    annotated.save(output_dir.join(format!("{stem}_annotated.png")))?;
    mask.save(output_dir.join(format!("{stem}_mask.png")))?;
    Ok(())
}

fn is_video(input: &Path) -> bool {
    let extension = input.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    input.is_file() && matches!(extension.as_deref(), Some("mp4" | "avi" | "mkv" | "mov" | "mjpeg"))
}

/// Annotates every frame of a video file. Returns the number of frames written.
#[cfg(feature = "camera")]
fn process_video(input: &Path, output_dir: &Path, detector: &TargetDetector, settings: &Settings) -> Result<usize> {
    use rescue_vision::camera::OpenCvCamera;
    use rescue_vision::frame_source::FrameSource;

    let mut video = OpenCvCamera::from_file(input);
    if !video.init(&settings.camera) {
        bail!("cannot open video {}", input.display());
    }

    let mut count = 0;
    while let Some(frame) = video.get_frame() {
        save_annotated(detector, settings, &frame, output_dir, &format!("frame_{count:05}"))?;
        count += 1;
    }
    video.release();
    Ok(count)
}

#[cfg(not(feature = "camera"))]
fn process_video(input: &Path, _output_dir: &Path, _detector: &TargetDetector, _settings: &Settings) -> Result<usize> {
    bail!("{} is a video; rebuild with `--features camera` to read it", input.display())
}

fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(input)
        .with_context(|| format!("reading {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Draws every detection onto a copy of `frame` and returns it with the mask union.
fn annotate(detector: &TargetDetector, settings: &Settings, frame: &RgbImage) -> (RgbImage, GrayImage) {
    let mut output = frame.clone();
    let mut mask_union = GrayImage::new(frame.width(), frame.height());
    let classes: Vec<String> = detector.segmenter().colors().names().map(str::to_string).collect();

    // --- 4. Spheres ---
    for class in &classes {
        let detection = detector.detect_color(frame, class);
        for (dst, src) in mask_union.pixels_mut().zip(detection.mask.pixels()) {
            dst.0[0] = dst.0[0].max(src.0[0]);
        }

        let color = box_color(class);
        for ball in &detection.candidates {
            let half = (ball.pixel_extent / 2) as i32;
            let rect = Rect::at(ball.center_x as i32 - half, ball.center_y as i32 - half)
                .of_size(ball.pixel_extent.max(1), ball.pixel_extent.max(1));
            draw_hollow_rect_mut(&mut output, rect, color);
            draw_cross_mut(&mut output, color, ball.center_x as i32, ball.center_y as i32);
        }
        if let Some(nearest) = detection.nearest() {
            info!(class, count = detection.candidates.len(), distance_mm = nearest.distance_mm, "spheres");
        }
    }

    // --- 5. Safe Zone ---
    let team = settings.protocol.team_color.as_str();
    if let Some(zone) = detector.detect_safe_zone(frame, Some(team)) {
        let rect = Rect::at(zone.rect.x as i32, zone.rect.y as i32).of_size(zone.rect.width, zone.rect.height);
        draw_hollow_rect_mut(&mut output, rect, SAFE_ZONE_COLOR);
        let distance_mm = detector.estimator().safe_zone_distance_mm(zone.rect.area());
        info!(box_area = zone.rect.area(), contour_area = zone.contour_area, distance_mm, "safe zone");
    }

    // --- 6. Sleeve ---
    let present = detector.sleeve_colors(frame, settings.protocol.catch_pixel_threshold);
    info!(?present, caught = judge_catch(&present, team), "sleeve");

    (output, mask_union)
}

fn box_color(class: &str) -> Rgb<u8> {
    match class {
        "red" => Rgb([255, 0, 0]),
        "blue" => Rgb([0, 0, 255]),
        "yellow" => Rgb([255, 255, 0]),
        "black" => Rgb([0, 255, 0]),
        "white" => Rgb([0, 255, 255]),
        _ => Rgb([255, 128, 0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn annotation_marks_the_ball_and_keeps_dimensions() {
        let settings = Settings::default();
        let detector = TargetDetector::from_settings(&settings);
        let mut frame = RgbImage::from_pixel(320, 240, Rgb([128, 128, 128]));
        draw_filled_circle_mut(&mut frame, (160, 120), 20, Rgb([220, 20, 20]));

        let (annotated, mask) = annotate(&detector, &settings, &frame);
        assert_eq!(annotated.dimensions(), (320, 240));
        assert_eq!(mask.dimensions(), (320, 240));
        assert_eq!(mask.get_pixel(160, 120).0[0], 255);
        assert_eq!(mask.get_pixel(5, 5).0[0], 0);
        assert!(annotated.pixels().zip(frame.pixels()).any(|(a, b)| a != b));
    }

    #[test]
    fn only_existing_video_files_count_as_video() {
        let dir = std::env::temp_dir().join(format!("visual_tester_inputs_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let clip = dir.join("run.MP4");
        let still = dir.join("shot.png");
        std::fs::write(&clip, b"").unwrap();
        std::fs::write(&still, b"").unwrap();

        assert!(is_video(&clip));
        assert!(!is_video(&still));
        assert!(!is_video(&dir));
        assert!(!is_video(&dir.join("missing.avi")));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
