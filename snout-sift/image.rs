use crate::error::{SiftError, SiftResult};
use rayon::prelude::*;

/// Row-major single channel float image, intensities in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct GrayFloatImage {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl GrayFloatImage {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Wrap an existing buffer, validating its length
    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> SiftResult<Self> {
        if width == 0 || height == 0 {
            return Err(SiftError::InvalidImageSize { width, height });
        }
        if data.len() != width * height {
            return Err(SiftError::InvalidImageData {
                expected_len: width * height,
                actual_len: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Convert a row-major 8-bit grayscale buffer
    pub fn from_luma8(img: &[u8], width: usize, height: usize) -> SiftResult<Self> {
        let data = img.iter().map(|&p| p as f32 / 255.0).collect();
        Self::from_vec(width, height, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn put(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    /// Separable Gaussian blur with reflect-101 borders
    pub fn gaussian_blur(&self, sigma: f32) -> Self {
        if sigma <= 0.0 {
            return self.clone();
        }
        let kernel = gaussian_kernel(sigma);
        let radius = (kernel.len() / 2) as isize;
        let (w, h) = (self.width, self.height);

        let mut horizontal = vec![0.0f32; w * h];
        horizontal
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                let src = &self.data[y * w..(y + 1) * w];
                for (x, out) in row.iter_mut().enumerate() {
                    let mut acc = 0.0;
                    for (k, &weight) in kernel.iter().enumerate() {
                        let sx = reflect_101(x as isize + k as isize - radius, w);
                        acc += weight * src[sx];
                    }
                    *out = acc;
                }
            });

        let mut data = vec![0.0f32; w * h];
        data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, &weight) in kernel.iter().enumerate() {
                    let sy = reflect_101(y as isize + k as isize - radius, h);
                    acc += weight * horizontal[sy * w + x];
                }
                *out = acc;
            }
        });

        Self {
            width: w,
            height: h,
            data,
        }
    }

    /// Pixel-wise `self - other`; both images must share dimensions
    pub fn subtract(&self, other: &GrayFloatImage) -> Self {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        let data = self
            .data
            .par_iter()
            .zip(other.data.par_iter())
            .map(|(a, b)| a - b)
            .collect();
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Keep every second pixel in both directions
    pub fn half_size(&self) -> Self {
        let w = (self.width / 2).max(1);
        let h = (self.height / 2).max(1);
        let mut out = Self::zeros(w, h);
        for y in 0..h {
            for x in 0..w {
                out.put(x, y, self.get((2 * x).min(self.width - 1), (2 * y).min(self.height - 1)));
            }
        }
        out
    }

    /// Upsample by two using bilinear interpolation on pixel centres
    pub fn double_size(&self) -> Self {
        let w = self.width * 2;
        let h = self.height * 2;
        let mut data = vec![0.0f32; w * h];
        data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            let sy = (y as f32 + 0.5) * 0.5 - 0.5;
            for (x, out) in row.iter_mut().enumerate() {
                let sx = (x as f32 + 0.5) * 0.5 - 0.5;
                *out = self.bilinear_sample(sx, sy);
            }
        });
        Self {
            width: w,
            height: h,
            data,
        }
    }

    /// Sample at fractional coordinates, clamping to the image edge
    pub fn bilinear_sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);
        let x1 = x.floor() as usize;
        let y1 = y.floor() as usize;
        let x2 = (x1 + 1).min(self.width - 1);
        let y2 = (y1 + 1).min(self.height - 1);

        let fx = x - x1 as f32;
        let fy = y - y1 as f32;

        let top = self.get(x1, y1) * (1.0 - fx) + self.get(x2, y1) * fx;
        let bottom = self.get(x1, y2) * (1.0 - fx) + self.get(x2, y2) * fx;

        top * (1.0 - fy) + bottom * fy
    }
}

/// Normalized 1-D Gaussian kernel with radius `round(4 * sigma)`
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = ((sigma * 4.0).round() as usize).max(1);
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

#[inline]
fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}
