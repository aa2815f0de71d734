//! # OCR Instance Manager Module
//!
//! Keeps initialized Tesseract engines keyed by language and model so each
//! calibration request does not pay the engine start-up cost.

use leptess::LepTess;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::ocr_config::{ModelType, OcrConfig};

/// Thread-safe pool of Tesseract instances
///
/// One instance exists per language/model combination. Each instance sits behind
/// its own mutex, so concurrent requests for the same combination are serialized
/// while different combinations run in parallel.
pub struct OcrInstanceManager {
    instances: Mutex<HashMap<String, Arc<Mutex<LepTess>>>>,
}

impl OcrInstanceManager {
    /// Create an empty pool; instances are created on first use
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn key(languages: &str, model_type: ModelType) -> String {
        format!("{}:{}", languages, model_type.tessdata_dir())
    }

    /// Get or create an OCR instance for the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if Tesseract cannot be initialized (missing language data,
    /// invalid variables).
    pub fn get_instance(&self, config: &OcrConfig) -> anyhow::Result<Arc<Mutex<LepTess>>> {
        let key = Self::key(&config.languages, config.model_type);

        if let Some(instance) = self.instances.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        info!(
            languages = %config.languages,
            model = %config.model_type.tessdata_dir(),
            "Creating new OCR instance"
        );

        let tessdata_path = Self::get_tessdata_path(config.model_type);

        let mut tess = LepTess::new(tessdata_path.as_deref(), &config.languages)
            .map_err(|e| anyhow::anyhow!("Failed to initialize Tesseract OCR instance: {}", e))?;

        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            config.psm_mode.as_str(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to set PSM mode: {}", e))?;

        if let Some(whitelist) = &config.character_whitelist {
            tess.set_variable(leptess::Variable::TesseditCharWhitelist, whitelist)
                .map_err(|e| anyhow::anyhow!("Failed to set character whitelist: {}", e))?;
            info!(
                "Configured Tesseract with character whitelist: {} characters",
                whitelist.len()
            );
        }

        let instance = Arc::new(Mutex::new(tess));

        // Another request may have raced us; keep whichever landed first
        let mut instances = self.instances.lock();
        let stored = instances
            .entry(key)
            .or_insert_with(|| Arc::clone(&instance));
        Ok(Arc::clone(stored))
    }

    /// Get the tessdata path for the specified model type
    ///
    /// Falls back to Tesseract's default lookup when no model-specific directory exists.
    fn get_tessdata_path(model_type: ModelType) -> Option<String> {
        if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
            if !prefix.trim().is_empty() {
                return Some(prefix);
            }
        }

        let possible_paths = match model_type {
            ModelType::Fast => [
                "/usr/share/tesseract-ocr/5/tessdata_fast",
                "/usr/share/tesseract-ocr/4.00/tessdata_fast",
                "/usr/share/tessdata_fast",
                "/usr/local/share/tessdata_fast",
            ],
            ModelType::Best => [
                "/usr/share/tesseract-ocr/5/tessdata_best",
                "/usr/share/tesseract-ocr/4.00/tessdata_best",
                "/usr/share/tessdata_best",
                "/usr/local/share/tessdata_best",
            ],
        };

        for path in possible_paths {
            if std::path::Path::new(path).exists() {
                info!("Using tessdata path: {}", path);
                return Some(path.to_string());
            }
        }

        info!(
            "No specific tessdata path found for model type {:?}, using default",
            model_type
        );
        None
    }

    /// Drop every cached instance
    pub fn clear(&self) {
        let mut instances = self.instances.lock();
        let count = instances.len();
        instances.clear();
        if count > 0 {
            info!("Cleared {count} OCR instances");
        }
    }

    /// Number of cached instances
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}

impl Default for OcrInstanceManager {
    fn default() -> Self {
        Self::new()
    }
}
