//! # Application Error Types
//!
//! This module defines common error types used throughout the scale calibrator.
//! It provides structured error handling for configuration, decoding and OCR failures.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Request validation errors (missing fields, oversized payloads)
    Validation(String),
    /// Payload or image decoding errors
    Decode(String),
    /// OCR processing errors
    Ocr(String),
    /// Network/listener errors
    Network(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Decode(msg) => write!(f, "[DECODE] {}", msg),
            AppError::Ocr(msg) => write!(f, "[OCR] {}", msg),
            AppError::Network(msg) => write!(f, "[NETWORK] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::ocr_errors::OcrError> for AppError {
    fn from(err: crate::ocr_errors::OcrError) -> Self {
        AppError::Ocr(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::Decode(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the service
pub mod error_logging {
    use tracing::error;

    /// Log OCR processing errors with image and processing context
    pub fn log_ocr_error(
        error: &impl std::fmt::Display,
        operation: &str,
        image_size: Option<u64>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            image_size_bytes = ?image_size,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "OCR processing failed"
        );
    }

    /// Log payload decoding errors with request context
    pub fn log_decode_error(
        error: &impl std::fmt::Display,
        operation: &str,
        payload_size: Option<usize>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            payload_size_bytes = ?payload_size,
            "Payload decoding failed"
        );
    }

    /// Log network/communication errors with connection context
    pub fn log_network_error(error: &impl std::fmt::Display, operation: &str, endpoint: Option<&str>) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            "Network operation failed"
        );
    }

    /// Log internal application errors with component context
    pub fn log_internal_error(error: &impl std::fmt::Display, component: &str, operation: &str) {
        error!(
            error = %error,
            component = %component,
            operation = %operation,
            "Internal application error"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_prefixes() {
        assert_eq!(
            AppError::Config("bad port".to_string()).to_string(),
            "[CONFIG] bad port"
        );
        assert_eq!(
            AppError::Decode("truncated".to_string()).to_string(),
            "[DECODE] truncated"
        );
    }

    #[test]
    fn test_ocr_error_conversion() {
        let err: AppError = crate::ocr_errors::OcrError::Timeout("30s".to_string()).into();
        match err {
            AppError::Ocr(msg) => assert!(msg.contains("OCR_TIMEOUT")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
