pub mod blob;
pub mod blob_detector;
pub mod color_class;
pub mod estimator;
pub mod moment;
pub mod pixel;
pub mod segmenter;
pub mod target_detector;
