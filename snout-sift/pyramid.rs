use crate::config::SiftConfig;
use crate::image::GrayFloatImage;
use rayon::prelude::*;

/// Gaussian and difference-of-Gaussian pyramids.
///
/// Each octave holds `n_octave_layers + 3` Gaussian images and
/// `n_octave_layers + 2` DoG images.
#[derive(Debug, Clone)]
pub struct ScaleSpace {
    pub n_octave_layers: usize,
    pub gaussians: Vec<Vec<GrayFloatImage>>,
    pub dogs: Vec<Vec<GrayFloatImage>>,
}

impl ScaleSpace {
    /// Number of octaves that fit a base image of the given size
    pub fn number_of_octaves(width: usize, height: usize) -> usize {
        let min_dim = width.min(height).max(1) as f32;
        let n = (min_dim.log2() - 2.0).round() as i32 + 1;
        n.max(1) as usize
    }

    /// Incremental blur applied to go from one layer to the next
    pub fn layer_sigmas(sigma: f32, n_octave_layers: usize) -> Vec<f32> {
        let k = 2f32.powf(1.0 / n_octave_layers as f32);
        let mut sigmas = Vec::with_capacity(n_octave_layers + 3);
        sigmas.push(sigma);
        for i in 1..n_octave_layers + 3 {
            let sig_prev = k.powi(i as i32 - 1) * sigma;
            let sig_total = sig_prev * k;
            sigmas.push((sig_total * sig_total - sig_prev * sig_prev).sqrt());
        }
        sigmas
    }

    /// Bring the input to blur level `sigma`, optionally doubling it first
    pub fn base_image(img: &GrayFloatImage, cfg: &SiftConfig) -> GrayFloatImage {
        let (src, assumed) = if cfg.upsample_base {
            (img.double_size(), cfg.assumed_blur * 2.0)
        } else {
            (img.clone(), cfg.assumed_blur)
        };
        let sig_diff = (cfg.sigma * cfg.sigma - assumed * assumed).max(0.01).sqrt();
        src.gaussian_blur(sig_diff)
    }

    /// Build both pyramids from an already blurred base image
    pub fn build(base: GrayFloatImage, n_octaves: usize, cfg: &SiftConfig) -> Self {
        let n_layers = cfg.n_octave_layers;
        let sigmas = Self::layer_sigmas(cfg.sigma, n_layers);

        let mut gaussians: Vec<Vec<GrayFloatImage>> = Vec::with_capacity(n_octaves);
        let mut next_base = Some(base);
        for octave in 0..n_octaves {
            let first = match next_base.take() {
                Some(b) => b,
                None => gaussians[octave - 1][n_layers].half_size(),
            };
            let mut layers = Vec::with_capacity(n_layers + 3);
            layers.push(first);
            for sigma in sigmas.iter().skip(1) {
                let blurred = layers[layers.len() - 1].gaussian_blur(*sigma);
                layers.push(blurred);
            }
            log::trace!(
                "octave {}: {}x{}",
                octave,
                layers[0].width(),
                layers[0].height()
            );
            gaussians.push(layers);
        }

        let dogs = gaussians
            .par_iter()
            .map(|layers| {
                layers
                    .windows(2)
                    .map(|pair| pair[1].subtract(&pair[0]))
                    .collect()
            })
            .collect();

        Self {
            n_octave_layers: n_layers,
            gaussians,
            dogs,
        }
    }

    pub fn n_octaves(&self) -> usize {
        self.gaussians.len()
    }
}
