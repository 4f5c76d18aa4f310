use crate::codec;
use crate::config::AnalyzerConfig;
use crate::crop::{self, CropWindow};
use crate::detector::{DetectorError, FullFrameDetector, RegionDetector};
use crate::{SnoutError, SnoutResult};
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use snout_core::{DescriptorSet, DetectionResult, Keypoint, MatchResult};
use snout_match::RatioMatcher;
use snout_sift::SiftExtractor;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Persistable outcome of analyzing one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub keypoints_json: String,
    pub descriptors_json: String,
    pub confidence: f32,
    /// Detection box as integer `[x, y, width, height]` in source pixels
    pub bbox: [i32; 4],
}

/// Features of the best detection, before encoding
#[derive(Debug, Clone)]
pub struct SnoutFeatures {
    pub detection: DetectionResult,
    /// Padded region the features were extracted from
    pub window: CropWindow,
    /// Keypoints in crop coordinates
    pub keypoints: Vec<Keypoint>,
    pub descriptors: DescriptorSet,
}

/// Detect, crop, describe and compare snout prints.
///
/// Holds no per-call state; share one instance across workers by reference
/// or `Arc`.
pub struct SnoutAnalyzer<D> {
    detector: Arc<D>,
    extractor: SiftExtractor,
    matcher: RatioMatcher,
    padding_factor: f32,
    detector_timeout: Option<Duration>,
}

impl SnoutAnalyzer<Box<dyn RegionDetector>> {
    /// Analyzer with the detector `config` asks for: the ONNX model when a
    /// path is set, otherwise the full frame
    pub fn from_config(config: &AnalyzerConfig) -> SnoutResult<Self> {
        config.validate()?;
        let detector: Box<dyn RegionDetector> = match &config.model_path {
            Some(path) => load_model(path, config)?,
            None => Box::new(FullFrameDetector::new()),
        };
        Self::new(detector, config)
    }
}

#[cfg(feature = "onnx")]
fn load_model(path: &std::path::Path, config: &AnalyzerConfig) -> SnoutResult<Box<dyn RegionDetector>> {
    let detector =
        crate::onnx::OnnxSnoutDetector::from_file(path, config.backend, config.confidence_floor, config.nms_iou)?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn load_model(path: &std::path::Path, _config: &AnalyzerConfig) -> SnoutResult<Box<dyn RegionDetector>> {
    Err(crate::config::ConfigError::Invalid(format!(
        "model_path {} requires the `onnx` feature",
        path.display()
    ))
    .into())
}

impl<D: RegionDetector + 'static> SnoutAnalyzer<D> {
    pub fn new(detector: D, config: &AnalyzerConfig) -> SnoutResult<Self> {
        config.validate()?;
        Ok(Self {
            detector: Arc::new(detector),
            extractor: SiftExtractor::new(config.sift.clone())?,
            matcher: RatioMatcher::with_ratio(config.ratio_threshold)?,
            padding_factor: config.padding_factor,
            detector_timeout: config.detector_timeout(),
        })
    }

    /// Analyze encoded image bytes.
    ///
    /// Undecodable bytes and images without a detection give `Ok(None)`.
    pub fn analyze(&self, image_bytes: &[u8]) -> SnoutResult<Option<AnalysisResult>> {
        let image = match image::load_from_memory(image_bytes) {
            Ok(image) => image,
            Err(e) => {
                log::debug!("treating undecodable image as no detection: {}", e);
                return Ok(None);
            }
        };
        self.analyze_image(&image)
    }

    pub fn analyze_image(&self, image: &DynamicImage) -> SnoutResult<Option<AnalysisResult>> {
        let Some(features) = self.extract(image)? else {
            return Ok(None);
        };
        let (keypoints_json, descriptors_json) = codec::encode(&features.keypoints, &features.descriptors)?;
        Ok(Some(AnalysisResult {
            keypoints_json,
            descriptors_json,
            confidence: features.detection.confidence,
            bbox: features.detection.rect.to_pixels(),
        }))
    }

    /// Detect, crop and extract without encoding
    pub fn extract(&self, image: &DynamicImage) -> SnoutResult<Option<SnoutFeatures>> {
        let t0 = Instant::now();
        let detections = self.detect(image)?;
        let Some(&detection) = detections.first() else {
            log::debug!("{}: no detection in {:?} image", self.detector.name(), image.dimensions());
            return Ok(None);
        };

        let (window, cropped) = crop::crop(image, &detection.rect, self.padding_factor)?;
        let gray = cropped.to_luma8();
        let (keypoints, descriptors) =
            self.extractor
                .detect_and_compute(gray.as_raw(), gray.width() as usize, gray.height() as usize)?;

        log::debug!(
            "detection {:.3} at {:?}, crop {}x{}, {} keypoints in {:.2?}",
            detection.confidence,
            detection.rect.to_pixels(),
            window.width,
            window.height,
            keypoints.len(),
            t0.elapsed()
        );
        Ok(Some(SnoutFeatures {
            detection,
            window,
            keypoints,
            descriptors,
        }))
    }

    /// Run the detector, on its own thread when a deadline is set so a hung
    /// backend leaves the calling worker free
    fn detect(&self, image: &DynamicImage) -> SnoutResult<Vec<DetectionResult>> {
        let Some(limit) = self.detector_timeout else {
            return Ok(self.detector.detect(image)?);
        };

        let t0 = Instant::now();
        let (tx, rx) = mpsc::channel();
        let detector = Arc::clone(&self.detector);
        let image = image.clone();
        thread::Builder::new()
            .name("snout-detect".into())
            .spawn(move || {
                // nobody is listening once the deadline has passed
                let _ = tx.send(detector.detect(&image));
            })?;

        match rx.recv_timeout(limit) {
            Ok(detections) => Ok(detections?),
            Err(RecvTimeoutError::Timeout) => {
                let elapsed = t0.elapsed();
                log::warn!("{} took over its {:?} deadline, abandoning it", self.detector.name(), limit);
                Err(SnoutError::DetectorTimeout { limit, elapsed })
            }
            Err(RecvTimeoutError::Disconnected) => Err(DetectorError::Inference(format!(
                "{} stopped without a result",
                self.detector.name()
            ))
            .into()),
        }
    }

    /// Compare two descriptor sets; either side empty gives zero matches
    pub fn compare(&self, query: &DescriptorSet, train: &DescriptorSet) -> SnoutResult<MatchResult> {
        Ok(self.matcher.compare(query, train)?)
    }

    /// Compare two persisted descriptor blobs.
    ///
    /// A missing or blank blob on either side gives zero matches.
    pub fn compare_blobs(&self, query: Option<&str>, train: Option<&str>) -> SnoutResult<MatchResult> {
        let (Some(query), Some(train)) = (non_blank(query), non_blank(train)) else {
            return Ok(MatchResult::empty());
        };
        let query = codec::decode_descriptors(query)?;
        let train = codec::decode_descriptors(train)?;
        self.compare(&query, &train)
    }

    pub fn detector(&self) -> &D {
        self.detector.as_ref()
    }

    pub fn extractor(&self) -> &SiftExtractor {
        &self.extractor
    }
}

fn non_blank(blob: Option<&str>) -> Option<&str> {
    blob.filter(|b| !b.trim().is_empty())
}
