use crate::config::SiftConfig;
use crate::image::GrayFloatImage;
use crate::types::ScaleSpaceExtremum;
use std::f32::consts::PI;

const ORI_SIG_FCTR: f32 = 1.5;
const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;

/// Dominant gradient orientation assignment
pub struct OrientationAssigner;

impl OrientationAssigner {
    /// Gaussian-weighted, smoothed histogram of gradient directions around
    /// `(px, py)`. Returns the histogram and its maximum.
    pub fn histogram(img: &GrayFloatImage, px: isize, py: isize, radius: isize, sigma: f32, bins: usize) -> (Vec<f32>, f32) {
        let expf_scale = -1.0 / (2.0 * sigma * sigma);
        let (w, h) = (img.width() as isize, img.height() as isize);
        let mut raw = vec![0.0f32; bins];

        for i in -radius..=radius {
            let y = py + i;
            if y <= 0 || y >= h - 1 {
                continue;
            }
            for j in -radius..=radius {
                let x = px + j;
                if x <= 0 || x >= w - 1 {
                    continue;
                }
                let (xu, yu) = (x as usize, y as usize);
                let dx = img.get(xu + 1, yu) - img.get(xu - 1, yu);
                let dy = img.get(xu, yu - 1) - img.get(xu, yu + 1);
                let weight = (((i * i + j * j) as f32) * expf_scale).exp();
                let mag = (dx * dx + dy * dy).sqrt();
                let ori = dy.atan2(dx).to_degrees().rem_euclid(360.0);

                let mut bin = ((bins as f32 / 360.0) * ori).round() as isize;
                if bin >= bins as isize {
                    bin -= bins as isize;
                }
                if bin < 0 {
                    bin += bins as isize;
                }
                raw[bin as usize] += weight * mag;
            }
        }

        // circular [1 4 6 4 1] / 16 smoothing
        let n = bins as isize;
        let at = |k: isize| raw[k.rem_euclid(n) as usize];
        let hist: Vec<f32> = (0..n)
            .map(|k| {
                (at(k - 2) + at(k + 2)) * (1.0 / 16.0) + (at(k - 1) + at(k + 1)) * (4.0 / 16.0) + at(k) * (6.0 / 16.0)
            })
            .collect();
        let max = hist.iter().cloned().fold(0.0f32, f32::max);
        (hist, max)
    }

    /// One oriented copy of `ext` per histogram peak above the peak ratio
    pub fn assign(gaussian: &GrayFloatImage, ext: &ScaleSpaceExtremum, cfg: &SiftConfig) -> Vec<ScaleSpaceExtremum> {
        let scl_octv = ext.octave_scale();
        let bins = cfg.orientation_bins;
        let radius = (ORI_RADIUS * scl_octv).round() as isize;
        let (hist, omax) = Self::histogram(
            gaussian,
            ext.column as isize,
            ext.row as isize,
            radius,
            ORI_SIG_FCTR * scl_octv,
            bins,
        );
        if omax <= 0.0 {
            return Vec::new();
        }

        let mag_thr = omax * cfg.orientation_peak_ratio;
        let mut oriented = Vec::new();
        for j in 0..bins {
            let l = if j > 0 { j - 1 } else { bins - 1 };
            let r = if j < bins - 1 { j + 1 } else { 0 };
            if hist[j] > hist[l] && hist[j] > hist[r] && hist[j] >= mag_thr {
                let mut bin = j as f32 + 0.5 * (hist[l] - hist[r]) / (hist[l] - 2.0 * hist[j] + hist[r]);
                if bin < 0.0 {
                    bin += bins as f32;
                } else if bin >= bins as f32 {
                    bin -= bins as f32;
                }
                let mut angle = 360.0 - (360.0 / bins as f32) * bin;
                if (angle - 360.0).abs() < f32::EPSILON {
                    angle = 0.0;
                }
                let mut copy = *ext;
                copy.keypoint.angle = angle;
                oriented.push(copy);
            }
        }
        oriented
    }
}

/// Degrees to radians, kept next to the histogram code that mixes both
#[inline]
pub(crate) fn deg_to_rad(deg: f32) -> f32 {
    deg * PI / 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize, horizontal: bool) -> GrayFloatImage {
        let data = (0..w * h)
            .map(|i| {
                let (x, y) = (i % w, i / w);
                if horizontal {
                    x as f32 / w as f32
                } else {
                    y as f32 / h as f32
                }
            })
            .collect();
        GrayFloatImage::from_vec(w, h, data).unwrap()
    }

    #[test]
    fn test_horizontal_ramp_peaks_at_zero_degrees() {
        let img = ramp(32, 32, true);
        let (hist, max) = OrientationAssigner::histogram(&img, 16, 16, 6, 3.0, 36);
        assert!(max > 0.0);
        let peak = hist.iter().enumerate().fold(0, |best, (i, v)| if *v > hist[best] { i } else { best });
        assert_eq!(peak, 0);
    }

    #[test]
    fn test_vertical_ramp_points_down() {
        // intensity grows with y, so dy = I(y-1) - I(y+1) is negative: 270 degrees
        let img = ramp(32, 32, false);
        let (hist, _) = OrientationAssigner::histogram(&img, 16, 16, 6, 3.0, 36);
        let peak = hist.iter().enumerate().fold(0, |best, (i, v)| if *v > hist[best] { i } else { best });
        assert_eq!(peak, 27);
    }

    #[test]
    fn test_flat_patch_has_no_orientation() {
        let img = GrayFloatImage::from_vec(16, 16, vec![0.3; 256]).unwrap();
        let (_, max) = OrientationAssigner::histogram(&img, 8, 8, 4, 2.0, 36);
        assert_eq!(max, 0.0);
    }

    #[test]
    fn test_deg_to_rad() {
        assert!((deg_to_rad(180.0) - PI).abs() < 1e-6);
    }
}
