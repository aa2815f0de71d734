//! # Unified Application Configuration
//!
//! Consolidates the server, OCR, line scanning and observability settings into a
//! single structure loaded from environment variables and validated at startup.

use crate::errors::{AppError, AppResult};
use crate::line_scanner::LineScanConfig;
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::{ModelType, OcrConfig, PageSegMode};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Default request body ceiling; base64 inflates the image by a third
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 25 * 1024 * 1024;

/// HTTP API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// API port
    pub port: u16,
    /// Maximum accepted request body in bytes
    pub max_request_bytes: usize,
    /// Whether to allow privileged ports (< 1024)
    pub allow_privileged_ports: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            allow_privileged_ports: false,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("Server host cannot be empty".to_string()));
        }

        if self.port == 0 {
            return Err(AppError::Config("Server port cannot be 0".to_string()));
        }

        if !self.allow_privileged_ports && self.port < 1024 {
            return Err(AppError::Config(format!(
                "Server port {} is privileged. Set ALLOW_PRIVILEGED_PORTS=true or use port >= 1024",
                self.port
            )));
        }

        if self.max_request_bytes == 0 {
            return Err(AppError::Config(
                "Max request bytes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// API server configuration
    pub server: ServerConfig,
    /// OCR processing configuration
    pub ocr: OcrConfig,
    /// Reference line scan configuration
    pub line_scan: LineScanConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, value))),
        _ => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Server
        config.server.host = env::var("HOST").unwrap_or_else(|_| config.server.host.clone());
        config.server.port = env_or("PORT", config.server.port)?;
        config.server.max_request_bytes = env_or("MAX_REQUEST_BYTES", config.server.max_request_bytes)?;
        config.server.allow_privileged_ports = env::var("ALLOW_PRIVILEGED_PORTS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        // OCR
        if let Ok(languages) = env::var("OCR_LANGUAGES") {
            config.ocr.languages = languages;
        }
        if let Ok(model) = env::var("OCR_MODEL_TYPE") {
            config.ocr.model_type = ModelType::from_name(&model).ok_or_else(|| {
                AppError::Config(format!("OCR_MODEL_TYPE must be 'fast' or 'best', got {}", model))
            })?;
        }
        if let Ok(psm) = env::var("OCR_PSM") {
            config.ocr.psm_mode = PageSegMode::from_value(&psm).ok_or_else(|| {
                AppError::Config(format!("OCR_PSM must be one of 3, 6, 7, 11, got {}", psm))
            })?;
        }
        config.ocr.operation_timeout_secs = env_or("OCR_TIMEOUT_SECS", config.ocr.operation_timeout_secs)?;

        // Line scan
        config.line_scan.row_fraction = env_or("SCAN_ROW_FRACTION", config.line_scan.row_fraction)?;
        config.line_scan.dark_threshold = env_or("SCAN_DARK_THRESHOLD", config.line_scan.dark_threshold)?;
        config.line_scan.light_threshold = env_or("SCAN_LIGHT_THRESHOLD", config.line_scan.light_threshold)?;

        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.server.validate()?;
        self.ocr.validate()?;
        self.line_scan.validate()?;
        self.observability.validate().map_err(AppError::Config)?;

        if self.observability.enable_metrics_export && self.server.port == self.observability.metrics_port {
            return Err(AppError::Config(
                "Server port and metrics port cannot be the same".to_string(),
            ));
        }

        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: bind={}, max_request_bytes={}, metrics_port={}, ocr_languages={}, ocr_timeout_secs={}, scan_row_fraction={}, thresholds={}/{}, environment={}",
            self.server.bind_address(),
            self.server.max_request_bytes,
            self.observability.metrics_port,
            self.ocr.languages,
            self.ocr.operation_timeout_secs,
            self.line_scan.row_fraction,
            self.line_scan.dark_threshold,
            self.line_scan.light_threshold,
            self.observability.environment
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.line_scan.dark_threshold, 200);
        assert_eq!(config.line_scan.light_threshold, 230);
    }

    #[test]
    fn test_server_config_validation() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        // Privileged port without opt-in
        config.port = 80;
        assert!(config.validate().is_err());
        config.allow_privileged_ports = true;
        assert!(config.validate().is_ok());

        config.port = 0;
        assert!(config.validate().is_err());
        config.port = 8080;

        config.max_request_bytes = 0;
        assert!(config.validate().is_err());
        config.max_request_bytes = DEFAULT_MAX_REQUEST_BYTES;

        config.host = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_collision_rejected() {
        let mut config = AppConfig::default();
        config.server.port = config.observability.metrics_port;
        assert!(config.validate().is_err());

        // No collision when the metrics server is off
        config.observability.enable_metrics_export = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_scan_config_rejected() {
        let mut config = AppConfig::default();
        config.line_scan.row_fraction = 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().starts_with("[CONFIG]"));
    }

    #[test]
    fn test_env_or_parsing() {
        env::set_var("SCALE_CALIBRATOR_TEST_PORT", "9191");
        assert_eq!(env_or("SCALE_CALIBRATOR_TEST_PORT", 1u16).unwrap(), 9191);

        env::set_var("SCALE_CALIBRATOR_TEST_PORT", "not-a-port");
        assert!(env_or("SCALE_CALIBRATOR_TEST_PORT", 1u16).is_err());
        env::remove_var("SCALE_CALIBRATOR_TEST_PORT");

        assert_eq!(env_or("SCALE_CALIBRATOR_TEST_MISSING", 7u8).unwrap(), 7);
    }

    #[test]
    fn test_summary_mentions_bind_address() {
        let summary = AppConfig::default().summary();
        assert!(summary.contains("bind=0.0.0.0:8080"));
        assert!(summary.contains("thresholds=200/230"));
    }
}
