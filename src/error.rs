//! Error types for the stylization engine.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the pictoon library.
#[derive(Error, Debug)]
pub enum Error {
    /// Null, empty, zero-size or undecodable input image.
    #[error("invalid image: {reason}")]
    InvalidImage { reason: String },

    /// Channel count or color space outside the supported set.
    #[error("unsupported image format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Unknown style identifier or parameter preset.
    #[error("invalid style '{style}': {reason}")]
    InvalidStyle { style: String, reason: String },

    /// Checkpoint file missing at its expected location.
    #[error("model '{style}' not found at {}", path.display())]
    ModelNotFound { style: String, path: PathBuf },

    /// Checkpoint could not be deserialized or bound to the network.
    #[error("invalid checkpoint {}: {reason}", path.display())]
    Checkpoint { path: PathBuf, reason: String },

    /// The external matting model failed or returned undecodable bytes.
    #[error("background removal failed: {reason}")]
    Segmentation { reason: String },

    /// Numeric failure inside a forward pass.
    #[error("model inference failed: {reason}")]
    Inference { reason: String },

    /// Filter parameter or configuration value out of range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Malformed configuration file.
    #[error("invalid configuration {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`Error`] for callers mapping errors onto
/// exit codes, HTTP statuses or exception classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidImage,
    UnsupportedFormat,
    InvalidStyle,
    ModelNotFound,
    Segmentation,
    Inference,
    InvalidParameter,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidImage { .. } => ErrorKind::InvalidImage,
            Error::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Error::InvalidStyle { .. } => ErrorKind::InvalidStyle,
            Error::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            Error::Segmentation { .. } => ErrorKind::Segmentation,
            Error::Inference { .. } => ErrorKind::Inference,
            Error::InvalidParameter { .. } | Error::Config { .. } => ErrorKind::InvalidParameter,
            Error::Checkpoint { .. } | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error was caused by the caller's input rather than by
    /// the engine or its environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidImage
                | ErrorKind::UnsupportedFormat
                | ErrorKind::InvalidStyle
                | ErrorKind::InvalidParameter
        )
    }

    pub(crate) fn invalid_image(reason: impl Into<String>) -> Self {
        Error::InvalidImage { reason: reason.into() }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Error::UnsupportedFormat { reason: reason.into() }
    }

    pub(crate) fn invalid_style(style: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidStyle {
            style: style.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn inference(reason: impl Into<String>) -> Self {
        Error::Inference { reason: reason.into() }
    }
}

/// Result type alias for pictoon operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::invalid_image("empty").kind(), ErrorKind::InvalidImage);
        assert_eq!(
            Error::invalid_style("pixel-art:huge", "unknown preset").kind(),
            ErrorKind::InvalidStyle
        );
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::unsupported("2 channels").is_client_error());
        assert!(!Error::inference("nan").is_client_error());
        let missing = Error::ModelNotFound {
            style: "cartoon".into(),
            path: PathBuf::from("models/x"),
        };
        assert!(!missing.is_client_error());
        assert!(missing.to_string().contains("cartoon"));
    }
}
