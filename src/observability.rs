//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels
//! - Optional OpenTelemetry trace export
//! - Metrics collection and Prometheus export
//! - Health check endpoints for monitoring

pub mod health_checks;
pub mod metrics;
pub mod tracing_mod;

use anyhow::Result;

use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::OcrConfig;

pub use self::metrics::{
    record_calibration_metrics, record_error_metrics, record_health_check_metrics, record_ocr_metrics,
    record_request_metrics,
};
pub use self::tracing_mod::{calibration_span, ocr_span};

/// Initialize the complete observability stack with custom configuration
pub async fn init_observability_with_config(config: &ObservabilityConfig, ocr: &OcrConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    tracing_mod::init_tracing_with_config(config)?;
    tracing_mod::init_opentelemetry_tracing_with_config(config)?;

    if config.enable_metrics_export {
        let metrics_handle = metrics::init_metrics_with_config(config)?;
        metrics::start_metrics_server(metrics_handle, config, ocr.clone()).await?;
    } else {
        tracing::info!("Metrics export disabled");
    }

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        metrics_port = %config.metrics_port,
        "Observability stack initialized successfully"
    );
    Ok(())
}

