use crate::error::{SiftError, SiftResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scale-space extractor configuration.
///
/// The defaults reproduce the reference SIFT parameters; descriptors produced
/// with different `descriptor_width`/`descriptor_hist_bins` are not comparable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SiftConfig {
    /// Layers per octave in which extrema are searched
    pub n_octave_layers: usize,
    /// Minimum DoG contrast, divided by `n_octave_layers` during filtering
    pub contrast_threshold: f32,
    /// Maximum principal-curvature ratio; larger keeps more edge-like points
    pub edge_threshold: f32,
    /// Blur of the base image
    pub sigma: f32,
    /// Blur assumed to be present in the input
    pub assumed_blur: f32,
    /// Double the input before building the pyramid
    pub upsample_base: bool,
    /// Keep only the strongest `max_features` keypoints, 0 keeps all
    pub max_features: usize,
    /// Pixels ignored at each octave border
    pub image_border: usize,
    pub max_interp_steps: usize,
    pub orientation_bins: usize,
    /// Secondary orientation peaks within this ratio of the max spawn keypoints
    pub orientation_peak_ratio: f32,
    /// Spatial cells per side of the descriptor grid
    pub descriptor_width: usize,
    /// Orientation bins per descriptor cell
    pub descriptor_hist_bins: usize,
    /// Clamp applied to normalized descriptor components
    pub descriptor_clamp: f32,
    /// Metadata
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            n_octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
            assumed_blur: 0.5,
            upsample_base: true,
            max_features: 0,
            image_border: 5,
            max_interp_steps: 5,
            orientation_bins: 36,
            orientation_peak_ratio: 0.8,
            descriptor_width: 4,
            descriptor_hist_bins: 8,
            descriptor_clamp: 0.2,
            name: None,
        }
    }
}

impl SiftConfig {
    /// Reference parameters
    pub fn reference() -> Self {
        Self {
            name: Some("Reference".to_string()),
            ..Self::default()
        }
    }

    /// Fewer, stronger keypoints; cheaper to store and match
    pub fn sparse_preset() -> Self {
        Self {
            contrast_threshold: 0.08,
            edge_threshold: 8.0,
            max_features: 500,
            name: Some("Sparse".to_string()),
            ..Self::default()
        }
    }

    /// More keypoints on low-contrast muzzle ridges
    pub fn dense_preset() -> Self {
        Self {
            contrast_threshold: 0.02,
            edge_threshold: 12.0,
            name: Some("Dense".to_string()),
            ..Self::default()
        }
    }

    /// Length of every descriptor this configuration produces
    pub fn descriptor_len(&self) -> usize {
        self.descriptor_width * self.descriptor_width * self.descriptor_hist_bins
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "SiftConfig: layers={}, contrast={}, edge={}, sigma={}, upsample={}, max_features={}, descriptor={}",
            self.n_octave_layers,
            self.contrast_threshold,
            self.edge_threshold,
            self.sigma,
            self.upsample_base,
            self.max_features,
            self.descriptor_len()
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> SiftResult<()> {
        if self.n_octave_layers == 0 {
            return Err(SiftError::InvalidConfig("n_octave_layers must be > 0".into()));
        }
        if !(self.sigma > 0.0) {
            return Err(SiftError::InvalidConfig(format!("sigma must be > 0, got {}", self.sigma)));
        }
        if !(self.contrast_threshold >= 0.0) {
            return Err(SiftError::InvalidConfig(format!(
                "contrast_threshold must be >= 0, got {}",
                self.contrast_threshold
            )));
        }
        if !(self.edge_threshold > 0.0) {
            return Err(SiftError::InvalidConfig(format!(
                "edge_threshold must be > 0, got {}",
                self.edge_threshold
            )));
        }
        if self.orientation_bins < 3 {
            return Err(SiftError::InvalidConfig("orientation_bins must be >= 3".into()));
        }
        if !(self.orientation_peak_ratio > 0.0 && self.orientation_peak_ratio <= 1.0) {
            return Err(SiftError::InvalidConfig(format!(
                "orientation_peak_ratio must be in (0, 1], got {}",
                self.orientation_peak_ratio
            )));
        }
        if self.descriptor_width == 0 || self.descriptor_hist_bins == 0 {
            return Err(SiftError::InvalidConfig("descriptor grid must be non-empty".into()));
        }
        if !(self.descriptor_clamp > 0.0) {
            return Err(SiftError::InvalidConfig("descriptor_clamp must be > 0".into()));
        }
        Ok(())
    }

    /// Save configuration to JSON file
    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON file
    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save configuration to TOML file
    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Load configuration from TOML file
    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize and validate from JSON string
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserialize and validate from TOML string
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = SiftConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.descriptor_len(), 128);
    }

    #[test]
    fn test_presets_are_valid() {
        for cfg in [SiftConfig::reference(), SiftConfig::sparse_preset(), SiftConfig::dense_preset()] {
            assert!(cfg.validate().is_ok(), "{}", cfg.summary());
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let cfg = SiftConfig {
            n_octave_layers: 0,
            ..SiftConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SiftError::InvalidConfig(_))));

        let cfg = SiftConfig {
            sigma: f32::NAN,
            ..SiftConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = SiftConfig {
            orientation_peak_ratio: 1.5,
            ..SiftConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_toml_and_json_round_trip() {
        let cfg = SiftConfig::dense_preset();
        let back = SiftConfig::from_toml(&cfg.to_toml().unwrap()).unwrap();
        assert_eq!(cfg, back);
        let back = SiftConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(cfg, back);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg = SiftConfig::from_toml("contrast_threshold = 0.03\n").unwrap();
        assert_eq!(cfg.contrast_threshold, 0.03);
        assert_eq!(cfg.n_octave_layers, 3);
    }
}
