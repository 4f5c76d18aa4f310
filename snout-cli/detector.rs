//! Region proposal behind a swappable trait.

use image::{DynamicImage, GenericImageView};
use snout_core::{BoundingBox, ComputeBackend, DetectionResult};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Failed to load detection model: {0}")]
    ModelLoad(String),
    #[error("Model does not have the expected layout: {0}")]
    ModelMismatch(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Compute backend {0:?} is not available in this build")]
    UnsupportedBackend(ComputeBackend),
}

pub type DetectorResult<T> = Result<T, DetectorError>;

/// Proposes candidate snout regions for an image.
///
/// Implementations must be safe for concurrent read-only use and return
/// results in descending confidence with their floor already applied.
pub trait RegionDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> DetectorResult<Vec<DetectionResult>>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "detector"
    }
}

impl<D: RegionDetector + ?Sized> RegionDetector for Box<D> {
    fn detect(&self, image: &DynamicImage) -> DetectorResult<Vec<DetectionResult>> {
        (**self).detect(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<D: RegionDetector + ?Sized> RegionDetector for Arc<D> {
    fn detect(&self, image: &DynamicImage) -> DetectorResult<Vec<DetectionResult>> {
        (**self).detect(image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Drop proposals below `floor` or without area, then sort best first.
///
/// The sort is stable, so equal confidences keep their input order.
pub fn rank_detections(mut detections: Vec<DetectionResult>, floor: f32) -> Vec<DetectionResult> {
    detections.retain(|d| {
        d.confidence.is_finite() && d.confidence >= floor && d.rect.is_finite() && d.rect.area() > 0.0
    });
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}

/// Greedy non-maximum suppression over proposals sorted best first
pub fn non_maximum_suppression(detections: Vec<DetectionResult>, iou_threshold: f32) -> Vec<DetectionResult> {
    let mut kept: Vec<DetectionResult> = Vec::with_capacity(detections.len().min(16));
    for d in detections {
        if kept.iter().all(|k| k.rect.iou(&d.rect) <= iou_threshold) {
            kept.push(d);
        }
    }
    kept
}

/// Proposes the whole frame, for uploads that are already snout close-ups
#[derive(Debug, Clone, Copy, Default)]
pub struct FullFrameDetector;

impl FullFrameDetector {
    pub fn new() -> Self {
        Self
    }
}

impl RegionDetector for FullFrameDetector {
    fn detect(&self, image: &DynamicImage) -> DetectorResult<Vec<DetectionResult>> {
        let (w, h) = image.dimensions();
        let frame = DetectionResult::new(BoundingBox::new(0.0, 0.0, w as f32, h as f32), 1.0);
        Ok(rank_detections(vec![frame], 0.0))
    }

    fn name(&self) -> &str {
        "full-frame"
    }
}

/// Proposes caller-supplied regions such as operator annotations
#[derive(Debug, Clone)]
pub struct ManualRegionDetector {
    regions: Vec<DetectionResult>,
    confidence_floor: f32,
}

impl ManualRegionDetector {
    pub fn new(regions: Vec<DetectionResult>, confidence_floor: f32) -> Self {
        Self {
            regions,
            confidence_floor,
        }
    }

    /// A single box at full confidence
    pub fn single(rect: BoundingBox) -> Self {
        Self::new(vec![DetectionResult::new(rect, 1.0)], 0.0)
    }
}

impl RegionDetector for ManualRegionDetector {
    fn detect(&self, image: &DynamicImage) -> DetectorResult<Vec<DetectionResult>> {
        let (w, h) = image.dimensions();
        let clipped = self
            .regions
            .iter()
            .map(|d| DetectionResult::new(d.rect.clip(w, h), d.confidence))
            .collect();
        let ranked = rank_detections(clipped, self.confidence_floor);
        if ranked.len() < self.regions.len() {
            log::debug!(
                "{} of {} manual regions discarded by floor {} or clipping",
                self.regions.len() - ranked.len(),
                self.regions.len(),
                self.confidence_floor
            );
        }
        Ok(ranked)
    }

    fn name(&self) -> &str {
        "manual"
    }
}
