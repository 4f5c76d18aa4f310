#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row-major 8-bit grayscale image
pub type Image = Vec<u8>;

/// Axis-aligned box in source-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from corner coordinates `(x1, y1)`–`(x2, y2)`
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Intersection over union, 0 when either box is empty
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let iy = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Intersect with the `[0, width] x [0, height]` frame
    pub fn clip(&self, width: u32, height: u32) -> BoundingBox {
        let x1 = self.x.clamp(0.0, width as f32);
        let y1 = self.y.clamp(0.0, height as f32);
        let x2 = self.right().clamp(0.0, width as f32);
        let y2 = self.bottom().clamp(0.0, height as f32);
        BoundingBox::from_corners(x1, y1, x2.max(x1), y2.max(y1))
    }

    /// Integer `[x, y, width, height]`, truncated the way callers persist it
    pub fn to_pixels(&self) -> [i32; 4] {
        [self.x as i32, self.y as i32, self.width as i32, self.height as i32]
    }
}

/// One region proposal. Index 0 of a detector's output is the best one.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectionResult {
    pub rect: BoundingBox,
    pub confidence: f32,
}

impl DetectionResult {
    pub fn new(rect: BoundingBox, confidence: f32) -> Self {
        Self { rect, confidence }
    }
}

/// Scale-space keypoint in crop coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Subpixel x coordinate
    pub x: f32,
    /// Subpixel y coordinate
    pub y: f32,
    /// Diameter of the meaningful neighbourhood
    pub size: f32,
    /// Dominant orientation in degrees, -1 when not computed
    pub angle: f32,
    pub response: f32,
    /// Packed pyramid position: octave in the low byte, layer in the second,
    /// interpolated layer offset in the third
    pub octave: i32,
    pub class_id: i32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self {
            x,
            y,
            size,
            angle: -1.0,
            response: 0.0,
            octave: 0,
            class_id: -1,
        }
    }

    /// Unpack `(octave, layer, scale)` from the packed `octave` field
    pub fn unpack_octave(&self) -> (i32, i32, f32) {
        let mut octave = self.octave & 255;
        let layer = (self.octave >> 8) & 255;
        if octave >= 128 {
            octave |= -128;
        }
        let scale = if octave >= 0 {
            1.0 / (1 << octave) as f32
        } else {
            (1 << -octave) as f32
        };
        (octave, layer, scale)
    }
}

/// Fixed-length float descriptor, compared by Euclidean distance
pub type Descriptor = Vec<f32>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorSetError {
    #[error("descriptor row {row} has length {actual}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Ordered descriptors of equal length. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptorSet {
    cols: usize,
    rows: Vec<Descriptor>,
}

impl DescriptorSet {
    /// Empty set with unknown descriptor length
    pub fn empty() -> Self {
        Self::default()
    }

    /// Take ownership of `rows`, inferring the length from the first row
    pub fn from_rows(rows: Vec<Descriptor>) -> Result<Self, DescriptorSetError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        Self::with_cols(cols, rows)
    }

    /// Take ownership of `rows`, checking every row has length `cols`
    pub fn with_cols(cols: usize, rows: Vec<Descriptor>) -> Result<Self, DescriptorSetError> {
        if let Some((row, d)) = rows.iter().enumerate().find(|(_, d)| d.len() != cols) {
            return Err(DescriptorSetError::RaggedRow {
                row,
                expected: cols,
                actual: d.len(),
            });
        }
        Ok(Self { cols, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Length shared by every descriptor
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> &[Descriptor] {
        &self.rows
    }

    pub fn get(&self, idx: usize) -> Option<&[f32]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Candidate pairing between a query and a train descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchCandidate {
    #[cfg_attr(feature = "serde", serde(rename = "queryIdx"))]
    pub query_index: usize,
    #[cfg_attr(feature = "serde", serde(rename = "trainIdx"))]
    pub train_index: usize,
    pub distance: f32,
}

impl MatchCandidate {
    pub fn new(query_index: usize, train_index: usize, distance: f32) -> Self {
        Self {
            query_index,
            train_index,
            distance,
        }
    }
}

/// A candidate that passed the ratio test
pub type GoodMatch = MatchCandidate;

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MatchResult {
    pub good_match_count: usize,
    pub matches: Vec<GoodMatch>,
}

impl MatchResult {
    /// The zero-match result
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_matches(matches: Vec<GoodMatch>) -> Self {
        Self {
            good_match_count: matches.len(),
            matches,
        }
    }
}

/// Compute backend a detector runs its model on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ComputeBackend {
    #[default]
    Cpu,
    Accelerator,
}

/// Number of worker threads to use when none is configured
pub fn default_threads() -> usize {
    num_cpus::get().max(1)
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
