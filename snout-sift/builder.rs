use crate::config::SiftConfig;
use crate::error::SiftResult;
use crate::extractor::SiftExtractor;

/// Builder for creating a `SiftExtractor`
#[derive(Debug, Clone, Default)]
pub struct ExtractorBuilder {
    config: SiftConfig,
}

impl ExtractorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of layers per octave
    pub fn octave_layers(mut self, n: usize) -> Self {
        self.config.n_octave_layers = n;
        self
    }

    /// Set the DoG contrast threshold
    pub fn contrast_threshold(mut self, threshold: f32) -> Self {
        self.config.contrast_threshold = threshold;
        self
    }

    /// Set the edge rejection threshold
    pub fn edge_threshold(mut self, threshold: f32) -> Self {
        self.config.edge_threshold = threshold;
        self
    }

    /// Set the base blur
    pub fn sigma(mut self, sigma: f32) -> Self {
        self.config.sigma = sigma;
        self
    }

    /// Enable or disable doubling the input before detection
    pub fn upsample_base(mut self, enable: bool) -> Self {
        self.config.upsample_base = enable;
        self
    }

    /// Keep only the strongest `n` keypoints (0 keeps all)
    pub fn max_features(mut self, n: usize) -> Self {
        self.config.max_features = n;
        self
    }

    /// Apply the sparse preset
    pub fn preset_sparse(mut self) -> Self {
        self.config = SiftConfig::sparse_preset();
        self
    }

    /// Apply the dense preset
    pub fn preset_dense(mut self) -> Self {
        self.config = SiftConfig::dense_preset();
        self
    }

    /// Build the `SiftExtractor`
    pub fn build(self) -> SiftResult<SiftExtractor> {
        SiftExtractor::new(self.config)
    }

    /// Generate a summary of the builder's configuration
    pub fn summary(&self) -> String {
        self.config.summary()
    }

    /// Create a builder from an existing `SiftConfig`
    pub fn from_config(config: SiftConfig) -> Self {
        Self { config }
    }

    /// Convert the builder into a `SiftConfig`
    pub fn to_config(self) -> SiftConfig {
        self.config
    }
}
