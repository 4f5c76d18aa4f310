use crate::config::SiftConfig;
use crate::descriptor::DescriptorGenerator;
use crate::error::SiftResult;
use crate::extrema::ExtremaDetector;
use crate::image::GrayFloatImage;
use crate::orientation::OrientationAssigner;
use crate::pyramid::ScaleSpace;
use crate::types::ScaleSpaceExtremum;
use rayon::prelude::*;
use snout_core::{DescriptorSet, Keypoint};
use std::collections::HashSet;
use std::time::Instant;

/// Scale and rotation invariant keypoint detector and descriptor.
///
/// Holds only configuration, so one instance can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct SiftExtractor {
    cfg: SiftConfig,
}

impl SiftExtractor {
    /// Creates a new extractor with validation
    pub fn new(cfg: SiftConfig) -> SiftResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Detect keypoints and compute descriptors on a row-major 8-bit image.
    ///
    /// `descriptors[i]` belongs to `keypoints[i]`. A textureless image gives
    /// two empty collections.
    pub fn detect_and_compute(&self, img: &[u8], width: usize, height: usize) -> SiftResult<(Vec<Keypoint>, DescriptorSet)> {
        let image = GrayFloatImage::from_luma8(img, width, height)?;
        self.detect_and_compute_float(&image)
    }

    /// Same as [`detect_and_compute`](Self::detect_and_compute) on a float image
    pub fn detect_and_compute_float(&self, image: &GrayFloatImage) -> SiftResult<(Vec<Keypoint>, DescriptorSet)> {
        let t0 = Instant::now();
        let cfg = &self.cfg;

        let base = ScaleSpace::base_image(image, cfg);
        let n_octaves = ScaleSpace::number_of_octaves(base.width(), base.height());
        let space = ScaleSpace::build(base, n_octaves, cfg);

        let extrema = ExtremaDetector::find_scale_space_extrema(&space, cfg);
        let oriented: Vec<ScaleSpaceExtremum> = extrema
            .par_iter()
            .flat_map_iter(|ext| OrientationAssigner::assign(&space.gaussians[ext.octave][ext.layer], ext, cfg))
            .collect();

        let mut kept = Self::remove_duplicates(oriented);
        if cfg.max_features > 0 && kept.len() > cfg.max_features {
            kept.sort_by(|a, b| b.keypoint.response.total_cmp(&a.keypoint.response));
            kept.truncate(cfg.max_features);
        }

        let rows: Vec<Vec<f32>> = kept
            .par_iter()
            .map(|ext| DescriptorGenerator::describe(&space.gaussians[ext.octave][ext.layer], ext, cfg))
            .collect();

        let keypoints: Vec<Keypoint> = kept
            .iter()
            .map(|ext| self.to_input_coordinates(ext.keypoint))
            .collect();

        log::debug!(
            "extracted {} keypoints from {}x{} image over {} octaves in {:.2?}",
            keypoints.len(),
            image.width(),
            image.height(),
            n_octaves,
            t0.elapsed()
        );

        let descriptors = DescriptorSet::with_cols(cfg.descriptor_len(), rows)?;
        Ok((keypoints, descriptors))
    }

    /// Drop keypoints identical in position, size and angle, keeping the first
    fn remove_duplicates(extrema: Vec<ScaleSpaceExtremum>) -> Vec<ScaleSpaceExtremum> {
        let mut seen = HashSet::with_capacity(extrema.len());
        extrema
            .into_iter()
            .filter(|e| {
                let k = &e.keypoint;
                seen.insert((k.x.to_bits(), k.y.to_bits(), k.size.to_bits(), k.angle.to_bits()))
            })
            .collect()
    }

    /// Undo the base-image doubling on coordinates, size and packed octave
    fn to_input_coordinates(&self, mut kp: Keypoint) -> Keypoint {
        if self.cfg.upsample_base {
            kp.x *= 0.5;
            kp.y *= 0.5;
            kp.size *= 0.5;
            kp.octave = (kp.octave & !255) | ((kp.octave - 1) & 255);
        }
        kp
    }

    /// Get extractor configuration
    pub fn config(&self) -> &SiftConfig {
        &self.cfg
    }

    /// Length of every descriptor this extractor emits
    pub fn descriptor_len(&self) -> usize {
        self.cfg.descriptor_len()
    }
}
