//! # OCR Processing Module
//!
//! Text recognition is an external collaborator: it receives the encoded image
//! and returns whatever text it can read, with no accuracy guarantee. This module
//! defines the [`TextRecognizer`] seam and the Tesseract implementation behind it.
//!
//! ## Supported Image Formats
//!
//! - PNG (Portable Network Graphics)
//! - JPEG/JPG (Joint Photographic Experts Group)
//! - BMP (Bitmap)
//! - TIFF/TIF (Tagged Image File Format)
//!
//! ## Dependencies
//!
//! - `leptess`: Rust bindings for Tesseract OCR and Leptonica
//! - `image`: Image format detection

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::errors::error_logging;
use crate::instance_manager::OcrInstanceManager;
use crate::observability;
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;

/// Image → text collaborator contract
///
/// Implementations are called from the blocking thread pool and must be shareable
/// across requests.
pub trait TextRecognizer: Send + Sync {
    /// Short engine name for logs and metrics
    fn name(&self) -> &'static str;

    /// Recognize text in an encoded image (PNG, JPEG, ...). Empty text is a valid result.
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError>;
}

/// Tesseract-backed recognizer using pooled engine instances
pub struct TesseractRecognizer {
    config: OcrConfig,
    instance_manager: Arc<OcrInstanceManager>,
}

impl TesseractRecognizer {
    pub fn new(config: OcrConfig) -> Self {
        Self::with_instance_manager(config, Arc::new(OcrInstanceManager::new()))
    }

    pub fn with_instance_manager(config: OcrConfig, instance_manager: Arc<OcrInstanceManager>) -> Self {
        Self {
            config,
            instance_manager,
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    fn extract(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        let instance = self
            .instance_manager
            .get_instance(&self.config)
            .map_err(|e| OcrError::Initialization(e.to_string()))?;

        let extracted_text = {
            let mut tess = instance.lock();
            tess.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageLoad(format!("Failed to load image for OCR: {e}")))?;

            tess.get_utf8_text().map_err(|e| {
                OcrError::Extraction(format!("Failed to extract text from image: {e}"))
            })?
        };

        Ok(clean_recognized_text(&extracted_text))
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        let span = observability::ocr_span("recognize");
        let _enter = span.enter();

        let start_time = Instant::now();
        let image_size = image_bytes.len() as u64;

        validate_image_bytes(image_bytes, &self.config)
            .map_err(|e| OcrError::Validation(e.to_string()))?;

        match self.extract(image_bytes) {
            Ok(text) => {
                let duration = start_time.elapsed();
                observability::record_ocr_metrics(true, duration, image_size);
                info!(
                    duration_ms = duration.as_millis() as u64,
                    characters = text.len(),
                    "OCR extraction completed"
                );
                Ok(text)
            }
            Err(err) => {
                let duration = start_time.elapsed();
                observability::record_ocr_metrics(false, duration, image_size);
                error_logging::log_ocr_error(&err, "tesseract_recognize", Some(image_size), Some(duration));
                Err(err)
            }
        }
    }
}

/// Trim every line and drop blank ones
pub fn clean_recognized_text(text: &str) -> String {
    text.trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Validate an encoded image payload against size and format limits
///
/// Checks, in order: non-empty payload, general size limit, format detection from
/// the leading bytes, the format-specific size limit and the estimated decode memory.
/// Payloads whose format cannot be detected fall back to the general limit and are
/// left for the decoder to reject.
pub fn validate_image_bytes(bytes: &[u8], config: &OcrConfig) -> anyhow::Result<()> {
    if bytes.is_empty() {
        return Err(anyhow::anyhow!("Image validation failed: payload is empty"));
    }

    let size = bytes.len() as u64;
    if size > config.max_file_size {
        return Err(anyhow::anyhow!(
            "Image validation failed: payload too large ({} bytes, maximum allowed: {} bytes)",
            size,
            config.max_file_size
        ));
    }

    if bytes.len() < config.min_format_bytes {
        info!("Payload of {size} bytes too short for format detection, using general size limit");
        return Ok(());
    }

    let header = &bytes[..bytes.len().min(config.buffer_size)];
    let format = match image::guess_format(header) {
        Ok(format) => format,
        Err(_) => {
            info!("Could not determine image format, using general size limit");
            return Ok(());
        }
    };

    let format_limit = config.format_limits.limit_for(format, config.max_file_size);
    if size > format_limit {
        return Err(anyhow::anyhow!(
            "Image too large for {:?} format: {} bytes (maximum allowed: {} bytes)",
            format,
            size,
            format_limit
        ));
    }

    let estimated_memory_mb = estimate_memory_usage(size, &format);
    if estimated_memory_mb > config.memory_limit_mb {
        return Err(anyhow::anyhow!(
            "Estimated memory usage too high: {}MB (maximum allowed: {}MB)",
            estimated_memory_mb,
            config.memory_limit_mb
        ));
    }

    Ok(())
}

/// Estimate memory usage for image processing based on payload size and format
///
/// | Format | Factor |
/// |--------|--------|
/// | PNG    | 3.0x   |
/// | JPEG   | 2.5x   |
/// | BMP    | 1.2x   |
/// | TIFF   | 4.0x   |
///
/// ```rust
/// use scale_calibrator::ocr::estimate_memory_usage;
/// use image::ImageFormat;
///
/// assert_eq!(estimate_memory_usage(1024 * 1024, &ImageFormat::Png), 3.0);
/// assert_eq!(estimate_memory_usage(2 * 1024 * 1024, &ImageFormat::Jpeg), 5.0);
/// ```
pub fn estimate_memory_usage(file_size: u64, format: &image::ImageFormat) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let file_size_mb = file_size as f64 / (1024.0 * 1024.0);

    let memory_factor = match format {
        image::ImageFormat::Png => 3.0,
        image::ImageFormat::Jpeg => 2.5,
        image::ImageFormat::Bmp => 1.2,
        image::ImageFormat::Tiff => 4.0,
        _ => 3.0,
    };

    file_size_mb * memory_factor
}

/// Whether the payload is in a format Tesseract can read and passes the size limits
pub fn is_supported_image_format(bytes: &[u8], config: &OcrConfig) -> bool {
    if validate_image_bytes(bytes, config).is_err() {
        return false;
    }

    let header = &bytes[..bytes.len().min(config.buffer_size)];
    match image::guess_format(header) {
        Ok(format) => {
            let supported = matches!(
                format,
                image::ImageFormat::Png
                    | image::ImageFormat::Jpeg
                    | image::ImageFormat::Bmp
                    | image::ImageFormat::Tiff
            );
            if !supported {
                warn!("Detected unsupported image format: {format:?}");
            }
            supported
        }
        Err(e) => {
            info!("Could not determine image format - {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_clean_recognized_text() {
        let raw = "  Scale: 4.2 m  \n\n   \n  wall  \n";
        assert_eq!(clean_recognized_text(raw), "Scale: 4.2 m\nwall");
        assert_eq!(clean_recognized_text(""), "");
    }

    #[test]
    fn test_empty_payload_rejected() {
        let config = OcrConfig::default();
        assert!(validate_image_bytes(&[], &config).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let config = OcrConfig {
            max_file_size: 16,
            ..Default::default()
        };
        assert!(validate_image_bytes(&[0u8; 32], &config).is_err());
    }

    #[test]
    fn test_format_specific_limit() {
        let mut config = OcrConfig::default();
        config.format_limits.png_max = 10;
        let mut payload = PNG_MAGIC.to_vec();
        payload.extend_from_slice(&[0u8; 16]);
        let err = validate_image_bytes(&payload, &config).unwrap_err();
        assert!(err.to_string().contains("Png"));
    }

    #[test]
    fn test_unknown_format_uses_general_limit() {
        let config = OcrConfig::default();
        assert!(validate_image_bytes(b"definitely not an image", &config).is_ok());
        assert!(!is_supported_image_format(b"definitely not an image", &config));
    }

    #[test]
    fn test_png_header_is_supported() {
        let config = OcrConfig::default();
        let mut payload = PNG_MAGIC.to_vec();
        payload.extend_from_slice(&[0u8; 16]);
        assert!(is_supported_image_format(&payload, &config));
    }

    #[test]
    fn test_estimate_memory_usage() {
        assert_eq!(estimate_memory_usage(1024 * 1024, &image::ImageFormat::Bmp), 1.2);
        assert_eq!(estimate_memory_usage(0, &image::ImageFormat::Png), 0.0);
    }
}
