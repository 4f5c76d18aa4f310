use crate::config::SiftConfig;
use crate::image::GrayFloatImage;
use crate::pyramid::ScaleSpace;
use crate::types::ScaleSpaceExtremum;
use rayon::prelude::*;
use snout_core::Keypoint;

/// Scale-space extrema detection and subpixel localization
pub struct ExtremaDetector;

impl ExtremaDetector {
    /// Find and refine DoG extrema across all octaves.
    ///
    /// Output order is octave, then layer, then row-major position.
    pub fn find_scale_space_extrema(space: &ScaleSpace, cfg: &SiftConfig) -> Vec<ScaleSpaceExtremum> {
        let n_layers = space.n_octave_layers;
        let threshold = 0.5 * cfg.contrast_threshold / n_layers as f32;

        let slots: Vec<(usize, usize)> = (0..space.n_octaves())
            .flat_map(|o| (1..=n_layers).map(move |l| (o, l)))
            .collect();

        slots
            .into_par_iter()
            .flat_map_iter(|(octave, layer)| Self::extrema_in_layer(space, cfg, octave, layer, threshold))
            .collect()
    }

    fn extrema_in_layer(
        space: &ScaleSpace,
        cfg: &SiftConfig,
        octave: usize,
        layer: usize,
        threshold: f32,
    ) -> Vec<ScaleSpaceExtremum> {
        let dogs = &space.dogs[octave];
        let img = &dogs[layer];
        let prev = &dogs[layer - 1];
        let next = &dogs[layer + 1];
        let (w, h) = (img.width(), img.height());
        let border = cfg.image_border.max(1);
        let mut found = Vec::new();

        for r in border..h.saturating_sub(border) {
            for c in border..w.saturating_sub(border) {
                let val = img.get(c, r);
                if val.abs() <= threshold {
                    continue;
                }
                if !Self::is_extremum(val, c, r, prev, img, next) {
                    continue;
                }
                if let Some(ext) = Self::localize(space, cfg, octave, layer, c, r) {
                    found.push(ext);
                }
            }
        }
        log::trace!("octave {} layer {}: {} extrema", octave, layer, found.len());
        found
    }

    /// Compare against the 26 neighbours in the 3x3x3 cube
    fn is_extremum(
        val: f32,
        c: usize,
        r: usize,
        prev: &GrayFloatImage,
        img: &GrayFloatImage,
        next: &GrayFloatImage,
    ) -> bool {
        let is_max = val > 0.0;
        for plane in [prev, img, next] {
            for y in r - 1..=r + 1 {
                for x in c - 1..=c + 1 {
                    let n = plane.get(x, y);
                    if is_max && val < n {
                        return false;
                    }
                    if !is_max && val > n {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Iteratively fit a 3-D quadratic and reject low-contrast or edge responses
    fn localize(
        space: &ScaleSpace,
        cfg: &SiftConfig,
        octave: usize,
        layer: usize,
        c: usize,
        r: usize,
    ) -> Option<ScaleSpaceExtremum> {
        let n_layers = space.n_octave_layers;
        let dogs = &space.dogs[octave];
        let (w, h) = (dogs[0].width() as isize, dogs[0].height() as isize);
        let border = cfg.image_border.max(1) as isize;

        let (mut c, mut r, mut layer) = (c as isize, r as isize, layer as isize);
        let (mut xc, mut xr, mut xi) = (0.0f32, 0.0f32, 0.0f32);
        let mut converged = false;

        for _ in 0..cfg.max_interp_steps {
            let (img, prev, next) = Self::planes(dogs, layer);
            let (cu, ru) = (c as usize, r as usize);
            let gradient = Self::gradient(img, prev, next, cu, ru);
            let hessian = Self::hessian(img, prev, next, cu, ru);
            let offset = solve3(&hessian, &gradient);
            xc = -offset[0];
            xr = -offset[1];
            xi = -offset[2];

            if xi.abs() < 0.5 && xr.abs() < 0.5 && xc.abs() < 0.5 {
                converged = true;
                break;
            }
            if !(xi.abs() < 1e6 && xr.abs() < 1e6 && xc.abs() < 1e6) {
                return None;
            }

            c += xc.round() as isize;
            r += xr.round() as isize;
            layer += xi.round() as isize;

            if layer < 1
                || layer > n_layers as isize
                || c < border
                || c >= w - border
                || r < border
                || r >= h - border
            {
                return None;
            }
        }

        if !converged {
            return None;
        }

        let (img, prev, next) = Self::planes(dogs, layer);
        let (cu, ru) = (c as usize, r as usize);
        let gradient = Self::gradient(img, prev, next, cu, ru);
        let t = gradient[0] * xc + gradient[1] * xr + gradient[2] * xi;
        let contrast = img.get(cu, ru) + t * 0.5;
        if contrast.abs() * (n_layers as f32) < cfg.contrast_threshold {
            return None;
        }

        // principal curvature ratio
        let v2 = img.get(cu, ru) * 2.0;
        let dxx = img.get(cu + 1, ru) + img.get(cu - 1, ru) - v2;
        let dyy = img.get(cu, ru + 1) + img.get(cu, ru - 1) - v2;
        let dxy = (img.get(cu + 1, ru + 1) - img.get(cu - 1, ru + 1) - img.get(cu + 1, ru - 1)
            + img.get(cu - 1, ru - 1))
            * 0.25;
        let tr = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let edge = cfg.edge_threshold;
        if det <= 0.0 || tr * tr * edge >= (edge + 1.0) * (edge + 1.0) * det {
            return None;
        }

        let scale = (1usize << octave) as f32;
        let layer_u = layer as usize;
        let sub_layer = (((xi + 0.5) * 255.0).round() as i32).clamp(0, 255);
        let keypoint = Keypoint {
            x: (c as f32 + xc) * scale,
            y: (r as f32 + xr) * scale,
            size: cfg.sigma * 2f32.powf((layer as f32 + xi) / n_layers as f32) * scale * 2.0,
            angle: -1.0,
            response: contrast.abs(),
            octave: octave as i32 + ((layer_u as i32) << 8) + (sub_layer << 16),
            class_id: -1,
        };

        Some(ScaleSpaceExtremum {
            keypoint,
            octave,
            layer: layer_u,
            column: cu,
            row: ru,
        })
    }

    fn planes(dogs: &[GrayFloatImage], layer: isize) -> (&GrayFloatImage, &GrayFloatImage, &GrayFloatImage) {
        let l = layer as usize;
        (&dogs[l], &dogs[l - 1], &dogs[l + 1])
    }

    /// Central differences in x, y and scale
    fn gradient(img: &GrayFloatImage, prev: &GrayFloatImage, next: &GrayFloatImage, c: usize, r: usize) -> [f32; 3] {
        [
            (img.get(c + 1, r) - img.get(c - 1, r)) * 0.5,
            (img.get(c, r + 1) - img.get(c, r - 1)) * 0.5,
            (next.get(c, r) - prev.get(c, r)) * 0.5,
        ]
    }

    fn hessian(img: &GrayFloatImage, prev: &GrayFloatImage, next: &GrayFloatImage, c: usize, r: usize) -> [[f32; 3]; 3] {
        let v2 = img.get(c, r) * 2.0;
        let dxx = img.get(c + 1, r) + img.get(c - 1, r) - v2;
        let dyy = img.get(c, r + 1) + img.get(c, r - 1) - v2;
        let dss = next.get(c, r) + prev.get(c, r) - v2;
        let dxy = (img.get(c + 1, r + 1) - img.get(c - 1, r + 1) - img.get(c + 1, r - 1) + img.get(c - 1, r - 1)) * 0.25;
        let dxs = (next.get(c + 1, r) - next.get(c - 1, r) - prev.get(c + 1, r) + prev.get(c - 1, r)) * 0.25;
        let dys = (next.get(c, r + 1) - next.get(c, r - 1) - prev.get(c, r + 1) + prev.get(c, r - 1)) * 0.25;
        [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]]
    }
}

/// Solve `a * x = b` by Cramer's rule; a singular system yields zero
fn solve3(a: &[[f32; 3]; 3], b: &[f32; 3]) -> [f32; 3] {
    let det3 = |m: &[[f32; 3]; 3]| -> f32 {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]) - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };
    let det = det3(a);
    if det.abs() < f32::EPSILON * 1e-3 || !det.is_finite() {
        return [0.0; 3];
    }
    let mut x = [0.0f32; 3];
    for (col, out) in x.iter_mut().enumerate() {
        let mut m = *a;
        for row in 0..3 {
            m[row][col] = b[row];
        }
        *out = det3(&m) / det;
    }
    x
}
