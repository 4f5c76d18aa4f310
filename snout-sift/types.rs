use snout_core::Keypoint;

/// Refined scale-space extremum, before orientation assignment.
///
/// `keypoint` is expressed in base-image coordinates (the upsampled base
/// when `upsample_base` is on); `column`/`row` address the octave image.
#[derive(Debug, Clone, Copy)]
pub struct ScaleSpaceExtremum {
    pub keypoint: Keypoint,
    pub octave: usize,
    pub layer: usize,
    pub column: usize,
    pub row: usize,
}

impl ScaleSpaceExtremum {
    /// Keypoint scale relative to its own octave
    pub fn octave_scale(&self) -> f32 {
        self.keypoint.size * 0.5 / (1usize << self.octave) as f32
    }
}
