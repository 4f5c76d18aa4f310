use crate::config::SiftConfig;
use crate::image::GrayFloatImage;
use crate::orientation::deg_to_rad;
use crate::types::ScaleSpaceExtremum;
use snout_core::Descriptor;

const DESCR_SCL_FCTR: f32 = 3.0;
const DESCR_MAG_SCALE: f32 = 512.0;

/// Gradient-histogram descriptor over a rotated `d x d` grid of cells
pub struct DescriptorGenerator;

impl DescriptorGenerator {
    /// Describe an oriented extremum using the Gaussian image it was found in.
    ///
    /// Components are quantized to integers in `0..=255` but stored as floats.
    pub fn describe(gaussian: &GrayFloatImage, ext: &ScaleSpaceExtremum, cfg: &SiftConfig) -> Descriptor {
        let octave_scale = (1usize << ext.octave) as f32;
        let px = ext.keypoint.x / octave_scale;
        let py = ext.keypoint.y / octave_scale;
        let mut angle = 360.0 - ext.keypoint.angle;
        if (angle - 360.0).abs() < f32::EPSILON {
            angle = 0.0;
        }
        Self::compute(gaussian, px, py, angle, ext.octave_scale(), cfg)
    }

    fn compute(img: &GrayFloatImage, px: f32, py: f32, ori: f32, scl: f32, cfg: &SiftConfig) -> Descriptor {
        let d = cfg.descriptor_width;
        let n = cfg.descriptor_hist_bins;
        let (w, h) = (img.width() as isize, img.height() as isize);
        let (cx, cy) = (px.round() as isize, py.round() as isize);

        let (sin_t, cos_t) = deg_to_rad(ori).sin_cos();
        let bins_per_deg = n as f32 / 360.0;
        let exp_scale = -1.0 / (d as f32 * d as f32 * 0.5);
        let hist_width = DESCR_SCL_FCTR * scl;
        let max_radius = ((w * w + h * h) as f32).sqrt();
        let radius = (hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5)
            .round()
            .min(max_radius) as isize;
        let cos_t = cos_t / hist_width;
        let sin_t = sin_t / hist_width;

        let row_stride = (d + 2) * (n + 2);
        let mut hist = vec![0.0f32; (d + 2) * row_stride];
        let half_d = d as f32 / 2.0 - 0.5;

        for i in -radius..=radius {
            for j in -radius..=radius {
                let c_rot = j as f32 * cos_t - i as f32 * sin_t;
                let r_rot = j as f32 * sin_t + i as f32 * cos_t;
                let rbin = r_rot + half_d;
                let cbin = c_rot + half_d;
                let r = cy + i;
                let c = cx + j;

                if !(rbin > -1.0 && rbin < d as f32 && cbin > -1.0 && cbin < d as f32) {
                    continue;
                }
                if !(r > 0 && r < h - 1 && c > 0 && c < w - 1) {
                    continue;
                }

                let (ru, cu) = (r as usize, c as usize);
                let dx = img.get(cu + 1, ru) - img.get(cu - 1, ru);
                let dy = img.get(cu, ru - 1) - img.get(cu, ru + 1);
                let grad_ori = dy.atan2(dx).to_degrees().rem_euclid(360.0);
                let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
                let mag = (dx * dx + dy * dy).sqrt() * weight;
                let obin = (grad_ori - ori) * bins_per_deg;

                Self::accumulate(&mut hist, d, n, rbin, cbin, obin, mag);
            }
        }

        let mut dst = vec![0.0f32; d * d * n];
        for i in 0..d {
            for j in 0..d {
                let idx = ((i + 1) * (d + 2) + (j + 1)) * (n + 2);
                hist[idx] += hist[idx + n];
                hist[idx + 1] += hist[idx + n + 1];
                let out = (i * d + j) * n;
                dst[out..out + n].copy_from_slice(&hist[idx..idx + n]);
            }
        }

        Self::normalize(&mut dst, cfg.descriptor_clamp);
        dst
    }

    /// Trilinear distribution of one sample into the padded histogram
    fn accumulate(hist: &mut [f32], d: usize, n: usize, rbin: f32, cbin: f32, obin: f32, mag: f32) {
        let r0 = rbin.floor();
        let c0 = cbin.floor();
        let o0 = obin.floor();
        let (rbin, cbin, obin) = (rbin - r0, cbin - c0, obin - o0);
        let mut o0 = o0 as isize;
        if o0 < 0 {
            o0 += n as isize;
        }
        if o0 >= n as isize {
            o0 -= n as isize;
        }

        let v_r1 = mag * rbin;
        let v_r0 = mag - v_r1;
        let v_rc11 = v_r1 * cbin;
        let v_rc10 = v_r1 - v_rc11;
        let v_rc01 = v_r0 * cbin;
        let v_rc00 = v_r0 - v_rc01;
        let v_rco111 = v_rc11 * obin;
        let v_rco110 = v_rc11 - v_rco111;
        let v_rco101 = v_rc10 * obin;
        let v_rco100 = v_rc10 - v_rco101;
        let v_rco011 = v_rc01 * obin;
        let v_rco010 = v_rc01 - v_rco011;
        let v_rco001 = v_rc00 * obin;
        let v_rco000 = v_rc00 - v_rco001;

        let idx = (((r0 as isize + 1) * (d as isize + 2) + c0 as isize + 1) * (n as isize + 2) + o0) as usize;
        let row = (d + 2) * (n + 2);
        hist[idx] += v_rco000;
        hist[idx + 1] += v_rco001;
        hist[idx + n + 2] += v_rco010;
        hist[idx + n + 3] += v_rco011;
        hist[idx + row] += v_rco100;
        hist[idx + row + 1] += v_rco101;
        hist[idx + row + n + 2] += v_rco110;
        hist[idx + row + n + 3] += v_rco111;
    }

    /// Unit-normalize, clamp large components, renormalize and quantize
    fn normalize(dst: &mut [f32], clamp: f32) {
        let nrm2: f32 = dst.iter().map(|v| v * v).sum();
        let thr = nrm2.sqrt() * clamp;
        let mut nrm2 = 0.0f32;
        for v in dst.iter_mut() {
            *v = v.min(thr);
            nrm2 += *v * *v;
        }
        let scale = DESCR_MAG_SCALE / nrm2.sqrt().max(f32::EPSILON);
        for v in dst.iter_mut() {
            *v = (*v * scale).round().clamp(0.0, 255.0);
        }
    }
}
