#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SiftError {
    #[error("Invalid image dimensions: {width}x{height} (must be > 0)")]
    InvalidImageSize { width: usize, height: usize },
    #[error("Image data length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidImageData { expected_len: usize, actual_len: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Descriptor(#[from] snout_core::DescriptorSetError),
}

pub type SiftResult<T> = Result<T, SiftError>;
