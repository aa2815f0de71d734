//! Health check functionality module.
//!
//! This module provides:
//! - OCR engine availability checks
//! - Readiness checks for the metrics server probe
//! - A periodic recorder that publishes health status as metrics

use anyhow::Result;
use leptess::LepTess;
use std::time::{Duration, Instant};

use crate::ocr_config::OcrConfig;

const HEALTH_RECORD_INTERVAL: Duration = Duration::from_secs(60);

/// Perform readiness checks
pub async fn perform_readiness_checks(ocr_config: &OcrConfig) -> Result<()> {
    check_ocr_health(&ocr_config.languages).await
}

/// Check OCR engine availability by initializing Tesseract for the configured languages
pub async fn check_ocr_health(languages: &str) -> Result<()> {
    let languages = languages.to_string();
    // Engine start-up reads language data from disk
    let result = tokio::task::spawn_blocking(move || LepTess::new(None, &languages).map(|_| ()))
        .await
        .map_err(|e| anyhow::anyhow!("OCR health check task failed: {}", e))?;

    match result {
        Ok(()) => {
            tracing::debug!("OCR health check passed");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("OCR health check failed: {}", e)),
    }
}

/// Start a background task to periodically record health check metrics
pub fn start_health_metrics_recorder(ocr_config: OcrConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_RECORD_INTERVAL);

        loop {
            interval.tick().await;

            let check_start = Instant::now();
            let ocr_healthy = check_ocr_health(&ocr_config.languages).await.is_ok();
            super::metrics::record_health_check_metrics("ocr", ocr_healthy, check_start.elapsed());
        }
    })
}
