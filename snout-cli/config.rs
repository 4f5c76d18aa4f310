use serde::{Deserialize, Serialize};
use snout_core::ComputeBackend;
use snout_sift::{SiftConfig, SiftError};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid TOML config: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("Failed to write TOML config: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid extractor configuration: {0}")]
    Sift(#[from] SiftError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Pipeline configuration shared by every analyze and compare call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Fraction of the detection size added around the box before cropping
    pub padding_factor: f32,
    /// Lowe's ratio threshold for the matcher
    pub ratio_threshold: f32,
    /// Minimum detector confidence
    pub confidence_floor: f32,
    pub backend: ComputeBackend,
    /// Deadline for one detector call, unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector_timeout_ms: Option<u64>,
    /// ONNX snout model; the full frame is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// IoU above which overlapping model proposals are suppressed
    pub nms_iou: f32,
    /// Rayon worker count, all cores when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_threads: Option<usize>,
    pub sift: SiftConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            padding_factor: crate::crop::DEFAULT_PADDING,
            ratio_threshold: snout_match::DEFAULT_RATIO,
            confidence_floor: 0.5,
            backend: ComputeBackend::Cpu,
            detector_timeout_ms: None,
            model_path: None,
            nms_iou: 0.45,
            n_threads: None,
            sift: SiftConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.padding_factor.is_finite() || self.padding_factor < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "padding_factor must be finite and >= 0, got {}",
                self.padding_factor
            )));
        }
        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "ratio_threshold must be in (0, 1], got {}",
                self.ratio_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ConfigError::Invalid(format!(
                "confidence_floor must be in [0, 1], got {}",
                self.confidence_floor
            )));
        }
        if !(self.nms_iou > 0.0 && self.nms_iou <= 1.0) {
            return Err(ConfigError::Invalid(format!("nms_iou must be in (0, 1], got {}", self.nms_iou)));
        }
        if self.detector_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("detector_timeout_ms must be > 0".into()));
        }
        if self.n_threads == Some(0) {
            return Err(ConfigError::Invalid("n_threads must be > 0".into()));
        }
        self.sift.validate()?;
        Ok(())
    }

    pub fn detector_timeout(&self) -> Option<Duration> {
        self.detector_timeout_ms.map(Duration::from_millis)
    }

    /// Load and validate, choosing the format from the file extension.
    ///
    /// Anything other than `.json` is read as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AnalyzerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.padding_factor, 1.0);
        assert_eq!(cfg.ratio_threshold, 0.7);
        assert_eq!(cfg.confidence_floor, 0.5);
        assert_eq!(cfg.backend, ComputeBackend::Cpu);
        assert_eq!(cfg.detector_timeout(), None);
    }

    #[test]
    fn test_partial_toml() {
        let cfg = AnalyzerConfig::from_toml(
            r#"
ratio_threshold = 0.8
backend = "accelerator"
detector_timeout_ms = 2500

[sift]
contrast_threshold = 0.03
"#,
        )
        .unwrap();
        assert_eq!(cfg.ratio_threshold, 0.8);
        assert_eq!(cfg.backend, ComputeBackend::Accelerator);
        assert_eq!(cfg.detector_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(cfg.sift.contrast_threshold, 0.03);
        assert_eq!(cfg.sift.n_octave_layers, 3);
        assert_eq!(cfg.padding_factor, 1.0);
    }

    #[test]
    fn test_round_trips() {
        let cfg = AnalyzerConfig {
            model_path: Some(PathBuf::from("models/snout.onnx")),
            n_threads: Some(4),
            ..AnalyzerConfig::default()
        };
        assert_eq!(AnalyzerConfig::from_toml(&cfg.to_toml().unwrap()).unwrap(), cfg);
        assert_eq!(AnalyzerConfig::from_json(&cfg.to_json().unwrap()).unwrap(), cfg);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            AnalyzerConfig::from_toml("ratio_threshold = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AnalyzerConfig::from_toml("padding_factor = -0.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AnalyzerConfig::from_json(r#"{"sift":{"n_octave_layers":0}}"#),
            Err(ConfigError::Sift(_))
        ));
        assert!(matches!(AnalyzerConfig::from_toml("backend = \"tpu\""), Err(ConfigError::TomlDe(_))));
    }
}
