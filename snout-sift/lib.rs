//! Scale-space keypoints and 128-float gradient descriptors.
//!
//! The pipeline follows the classic difference-of-Gaussians design: an
//! optionally doubled base image, Gaussian and DoG pyramids, subpixel
//! extremum localization with contrast and edge rejection, histogram
//! orientation assignment and a 4x4x8 descriptor grid.

pub mod builder;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod extractor;
pub mod extrema;
pub mod image;
pub mod orientation;
pub mod pyramid;
pub mod types;

pub use builder::ExtractorBuilder;
pub use config::SiftConfig;
pub use error::{SiftError, SiftResult};
pub use extractor::SiftExtractor;
pub use image::GrayFloatImage;
pub use types::ScaleSpaceExtremum;
