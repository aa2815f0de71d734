//! # OCR Configuration Module
//!
//! This module defines configuration structures for the text recognition
//! collaborator, including format limits, engine settings and the call timeout.

// Constants for OCR configuration
pub const DEFAULT_LANGUAGES: &str = "eng";
pub const FORMAT_DETECTION_BUFFER_SIZE: usize = 32;
pub const MIN_FORMAT_BYTES: usize = 8;
pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024; // 20MB limit for image payloads
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Format-specific size limits for different image formats
#[derive(Debug, Clone)]
pub struct FormatSizeLimits {
    /// PNG format limit (higher due to better compression)
    pub png_max: u64,
    /// JPEG format limit (moderate due to lossy compression)
    pub jpeg_max: u64,
    /// BMP format limit (lower due to uncompressed nature)
    pub bmp_max: u64,
    /// TIFF format limit (can be large, multi-page support)
    pub tiff_max: u64,
}

impl Default for FormatSizeLimits {
    fn default() -> Self {
        Self {
            png_max: 15 * 1024 * 1024,  // 15MB for PNG
            jpeg_max: 10 * 1024 * 1024, // 10MB for JPEG
            bmp_max: 5 * 1024 * 1024,   // 5MB for BMP
            tiff_max: 20 * 1024 * 1024, // 20MB for TIFF
        }
    }
}

impl FormatSizeLimits {
    /// Size limit for a detected format, falling back to `general` for other formats
    pub fn limit_for(&self, format: image::ImageFormat, general: u64) -> u64 {
        match format {
            image::ImageFormat::Png => self.png_max,
            image::ImageFormat::Jpeg => self.jpeg_max,
            image::ImageFormat::Bmp => self.bmp_max,
            image::ImageFormat::Tiff => self.tiff_max,
            _ => general,
        }
    }

    /// Validate format size limits
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        for (name, value) in [
            ("png_max", self.png_max),
            ("jpeg_max", self.jpeg_max),
            ("bmp_max", self.bmp_max),
            ("tiff_max", self.tiff_max),
        ] {
            if value == 0 {
                return Err(crate::errors::AppError::Config(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        // Ensure format limits are reasonable compared to each other
        if self.bmp_max > self.png_max {
            return Err(crate::errors::AppError::Config(format!(
                "bmp_max ({}) should not exceed png_max ({})",
                self.bmp_max, self.png_max
            )));
        }
        if self.jpeg_max > self.png_max {
            return Err(crate::errors::AppError::Config(format!(
                "jpeg_max ({}) should not exceed png_max ({})",
                self.jpeg_max, self.png_max
            )));
        }

        Ok(())
    }
}

/// Page Segmentation Mode for Tesseract OCR
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSegMode {
    /// Fully automatic page segmentation
    Auto = 3,
    /// Assume a single uniform block of text
    SingleBlock = 6,
    /// Treat the image as a single text line
    SingleLine = 7,
    /// Find as much text as possible in no particular order
    #[default]
    SparseText = 11,
}

impl PageSegMode {
    /// Convert PSM mode to string value for Tesseract
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSegMode::Auto => "3",
            PageSegMode::SingleBlock => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SparseText => "11",
        }
    }

    /// Parse the numeric Tesseract value
    pub fn from_value(value: &str) -> Option<Self> {
        match value.trim() {
            "3" => Some(PageSegMode::Auto),
            "6" => Some(PageSegMode::SingleBlock),
            "7" => Some(PageSegMode::SingleLine),
            "11" => Some(PageSegMode::SparseText),
            _ => None,
        }
    }
}

/// Tesseract model type for different accuracy/speed trade-offs
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ModelType {
    /// Fast model (tessdata_fast) - faster processing, lower accuracy
    #[default]
    Fast,
    /// Best model (tessdata_best) - slower processing, higher accuracy
    Best,
}

impl ModelType {
    /// Get the tessdata directory name for this model type
    pub fn tessdata_dir(&self) -> &'static str {
        match self {
            ModelType::Fast => "tessdata_fast",
            ModelType::Best => "tessdata_best",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "fast" => Some(ModelType::Fast),
            "best" => Some(ModelType::Best),
            _ => None,
        }
    }
}

/// Configuration structure for OCR processing
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// OCR language codes (e.g., "eng", "eng+fra")
    pub languages: String,
    /// Tesseract model type (Fast vs Best accuracy)
    pub model_type: ModelType,
    /// Buffer size for format detection in bytes
    pub buffer_size: usize,
    /// Minimum bytes required for format detection
    pub min_format_bytes: usize,
    /// Maximum allowed payload size in bytes (general limit)
    pub max_file_size: u64,
    /// Format-specific size limits
    pub format_limits: FormatSizeLimits,
    /// Page segmentation mode for OCR
    pub psm_mode: PageSegMode,
    /// Character whitelist restricting OCR output to annotation-relevant characters
    pub character_whitelist: Option<String>,
    /// Timeout for a single OCR call in seconds
    pub operation_timeout_secs: u64,
    /// Estimated decode memory ceiling in MB
    pub memory_limit_mb: f64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.to_string(),
            model_type: ModelType::default(),
            buffer_size: FORMAT_DETECTION_BUFFER_SIZE,
            min_format_bytes: MIN_FORMAT_BYTES,
            max_file_size: MAX_FILE_SIZE,
            format_limits: FormatSizeLimits::default(),
            psm_mode: PageSegMode::default(),
            character_whitelist: Some(
                "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz.,:=- ".to_string(),
            ),
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            memory_limit_mb: 80.0,
        }
    }
}

impl OcrConfig {
    /// Validate OCR configuration parameters
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        // Validate languages string
        if self.languages.trim().is_empty() {
            return Err(crate::errors::AppError::Config(
                "languages cannot be empty".to_string(),
            ));
        }

        // Validate buffer sizes
        if self.buffer_size == 0 {
            return Err(crate::errors::AppError::Config(
                "buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.min_format_bytes == 0 {
            return Err(crate::errors::AppError::Config(
                "min_format_bytes must be greater than 0".to_string(),
            ));
        }
        if self.min_format_bytes > self.buffer_size {
            return Err(crate::errors::AppError::Config(format!(
                "min_format_bytes ({}) cannot exceed buffer_size ({})",
                self.min_format_bytes, self.buffer_size
            )));
        }

        if self.max_file_size == 0 {
            return Err(crate::errors::AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        if self.operation_timeout_secs == 0 {
            return Err(crate::errors::AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout_secs > 300 {
            return Err(crate::errors::AppError::Config(
                "operation_timeout_secs cannot be greater than 300 seconds".to_string(),
            ));
        }

        if self.memory_limit_mb <= 0.0 {
            return Err(crate::errors::AppError::Config(
                "memory_limit_mb must be greater than 0".to_string(),
            ));
        }

        if let Some(whitelist) = &self.character_whitelist {
            // Annotations cannot be recognized without digits and the unit letters
            if !whitelist.contains("0123456789") || !whitelist.contains('m') || !whitelist.contains('c') {
                return Err(crate::errors::AppError::Config(
                    "character_whitelist must include digits and the letters 'c' and 'm'".to_string(),
                ));
            }
        }

        self.format_limits.validate()?;

        Ok(())
    }

    pub fn operation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.operation_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(unused_assignments)]
    fn test_format_size_limits_validation() {
        let mut config = FormatSizeLimits::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Test invalid png_max
        config.png_max = 0;
        assert!(config.validate().is_err());
        config.png_max = 15 * 1024 * 1024;

        // Test bmp_max > png_max
        config.bmp_max = 20 * 1024 * 1024;
        assert!(config.validate().is_err());
        config.bmp_max = 5 * 1024 * 1024;

        // Test jpeg_max > png_max
        config.jpeg_max = 20 * 1024 * 1024;
        assert!(config.validate().is_err());
        config.jpeg_max = 10 * 1024 * 1024;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_limit_for_format() {
        let limits = FormatSizeLimits::default();
        assert_eq!(limits.limit_for(image::ImageFormat::Png, 1), 15 * 1024 * 1024);
        assert_eq!(limits.limit_for(image::ImageFormat::Gif, 42), 42);
    }

    #[test]
    fn test_psm_round_trip_values() {
        assert_eq!(PageSegMode::default(), PageSegMode::SparseText);
        assert_eq!(PageSegMode::from_value("7"), Some(PageSegMode::SingleLine));
        assert_eq!(PageSegMode::from_value("99"), None);
    }

    #[test]
    fn test_model_type_names() {
        assert_eq!(ModelType::Fast.tessdata_dir(), "tessdata_fast");
        assert_eq!(ModelType::from_name("Best"), Some(ModelType::Best));
        assert_eq!(ModelType::from_name("huge"), None);
        assert_eq!(ModelType::default(), ModelType::Fast);
    }

    #[test]
    fn test_ocr_config_validation() {
        let mut config = OcrConfig::default();
        assert!(config.validate().is_ok());

        config.languages = "  ".to_string();
        assert!(config.validate().is_err());
        config.languages = "eng".to_string();

        config.operation_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.operation_timeout_secs = 30;

        config.min_format_bytes = 64;
        assert!(config.validate().is_err());
        config.min_format_bytes = 8;

        config.character_whitelist = Some("abc".to_string());
        assert!(config.validate().is_err());
        config.character_whitelist = None;

        assert!(config.validate().is_ok());
    }
}
