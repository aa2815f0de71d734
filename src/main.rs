use anyhow::Result;
use scale_calibrator::calibration::CalibrationService;
use scale_calibrator::config::AppConfig;
use scale_calibrator::errors::error_logging;
use scale_calibrator::observability;
use scale_calibrator::ocr::TesseractRecognizer;
use scale_calibrator::server;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        error_logging::log_config_error(&e, "environment", "load_config");
        anyhow::anyhow!("Failed to load configuration: {}. Please check your environment variables.", e)
    })?;

    config.validate().map_err(|e| {
        error_logging::log_config_error(&e, "app_config", "validate_config");
        anyhow::anyhow!("Configuration validation failed: {}. Please check your configuration values.", e)
    })?;

    observability::init_observability_with_config(&config.observability, &config.ocr).await?;
    info!("{}", config.summary());

    let recognizer = Arc::new(TesseractRecognizer::new(config.ocr.clone()));
    let service = Arc::new(CalibrationService::new(
        recognizer,
        config.ocr.clone(),
        config.line_scan,
    ));
    info!(recognizer = service.recognizer_name(), "Calibration service initialized");

    if let Err(e) = server::serve(&config.server, service).await {
        error_logging::log_network_error(&e, "serve_api", Some(&config.server.bind_address()));
        return Err(e);
    }

    Ok(())
}
