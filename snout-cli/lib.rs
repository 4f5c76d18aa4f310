//! Snout-print identity pipeline: region detection, cropping, scale-space
//! features, persisted blobs and ratio-test comparison.

pub mod analysis;
pub mod codec;
pub mod config;
pub mod crop;
pub mod detector;
pub mod draw;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use analysis::{AnalysisResult, SnoutAnalyzer, SnoutFeatures};
pub use config::AnalyzerConfig;
pub use detector::{FullFrameDetector, ManualRegionDetector, RegionDetector};
#[cfg(feature = "onnx")]
pub use onnx::OnnxSnoutDetector;

pub use snout_core::{self, BoundingBox, DescriptorSet, DetectionResult, Keypoint, MatchResult};
pub use snout_match;
pub use snout_sift;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SnoutError {
    #[error("Detector error: {0}")]
    Detector(#[from] detector::DetectorError),
    #[error("Detector took {elapsed:?}, over its {limit:?} deadline")]
    DetectorTimeout { limit: Duration, elapsed: Duration },
    #[error("Extraction error: {0}")]
    Extraction(#[from] snout_sift::SiftError),
    #[error("Crop error: {0}")]
    Crop(#[from] crop::CropError),
    #[error("Codec error: {0}")]
    Codec(#[from] codec::CodecError),
    #[error("Match error: {0}")]
    Match(#[from] snout_match::MatchError),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type SnoutResult<T> = Result<T, SnoutError>;
