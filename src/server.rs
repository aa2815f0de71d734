//! # HTTP API
//!
//! `POST /scale` accepts `{"image": "<base64>"}` and answers with a
//! [`CalibrationResponse`]. Unavailable calibrations are normal `200` answers;
//! only payload faults (`400`) and recognizer faults (`500`/`504`) are errors.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::calibration::{CalibrationError, CalibrationResponse, CalibrationService};
use crate::config::ServerConfig;
use crate::errors::error_logging;
use crate::observability;
use crate::ocr_errors::OcrError;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CalibrationService>,
}

/// Body of `POST /scale`
#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
}

/// Build the API router
pub fn router(service: Arc<CalibrationService>, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/scale", post(scale))
        .route("/health/live", get(health_live))
        .layer(middleware::from_fn(track_request_metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

async fn health_live() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "scale-calibrator",
    })
}

async fn track_request_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    observability::record_request_metrics(&method, response.status().as_u16(), start.elapsed());
    response
}

fn reject(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(CalibrationResponse::error(message))).into_response()
}

/// Strip an optional `data:<mime>;base64,` prefix and surrounding whitespace
pub fn strip_data_url(encoded: &str) -> &str {
    let trimmed = encoded.trim();
    match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, payload)| payload),
        None => trimmed,
    }
}

/// Decode the image field of a request body
///
/// Returns the client-facing error message on failure.
pub fn decode_image_field(request: &ScaleRequest) -> Result<Vec<u8>, &'static str> {
    let encoded = request
        .image
        .as_deref()
        .map(strip_data_url)
        .filter(|encoded| !encoded.is_empty())
        .ok_or("Missing image")?;

    // MIME-style payloads wrap lines; the padded engine rejects any whitespace
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    base64::engine::general_purpose::STANDARD
        .decode(&compact)
        .map_err(|e| {
            error_logging::log_decode_error(&e, "decode_base64", Some(compact.len()));
            "Invalid base64"
        })
}

fn calibration_error_status(err: &CalibrationError) -> StatusCode {
    match err {
        CalibrationError::InvalidImage(_) => StatusCode::BAD_REQUEST,
        CalibrationError::Recognition(OcrError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        CalibrationError::Recognition(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn scale(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ScaleRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error_logging::log_decode_error(&e, "parse_request_json", Some(body.len()));
            return reject(StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e));
        }
    };

    let image_bytes = match decode_image_field(&request) {
        Ok(bytes) => bytes,
        Err(message) => return reject(StatusCode::BAD_REQUEST, message),
    };

    match Arc::clone(&state.service).calibrate_async(image_bytes).await {
        Ok(report) => (StatusCode::OK, Json(CalibrationResponse::from(&report))).into_response(),
        Err(err) => {
            observability::record_error_metrics(err.label(), "server");
            reject(calibration_error_status(&err), err.to_string())
        }
    }
}

/// Serve the API until ctrl-c or SIGTERM
pub async fn serve(config: &ServerConfig, service: Arc<CalibrationService>) -> anyhow::Result<()> {
    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind API listener on {}: {}", addr, e))?;
    tracing::info!(address = %addr, "Scale calibration API listening");

    axum::serve(listener, router(service, config.max_request_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error_logging::log_internal_error(&e, "server", "install_ctrl_c_handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error_logging::log_internal_error(&e, "server", "install_sigterm_handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_data_url() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("  AAAA\n"), "AAAA");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
    }

    #[test]
    fn test_missing_image_field() {
        let request = ScaleRequest { image: None };
        assert_eq!(decode_image_field(&request), Err("Missing image"));

        let request = ScaleRequest {
            image: Some("   ".to_string()),
        };
        assert_eq!(decode_image_field(&request), Err("Missing image"));
    }

    #[test]
    fn test_invalid_base64() {
        let request = ScaleRequest {
            image: Some("not base64!!".to_string()),
        };
        assert_eq!(decode_image_field(&request), Err("Invalid base64"));
    }

    #[test]
    fn test_valid_base64_with_data_url() {
        let request = ScaleRequest {
            image: Some("data:image/png;base64,aGVsbG8=".to_string()),
        };
        assert_eq!(decode_image_field(&request), Ok(b"hello".to_vec()));
    }

    #[test]
    fn test_line_wrapped_base64() {
        let request = ScaleRequest {
            image: Some("aGVs\nbG8=".to_string()),
        };
        assert_eq!(decode_image_field(&request), Ok(b"hello".to_vec()));

        let request = ScaleRequest {
            image: Some("data:image/png;base64,aGVs\r\n bG8=\n".to_string()),
        };
        assert_eq!(decode_image_field(&request), Ok(b"hello".to_vec()));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            calibration_error_status(&CalibrationError::InvalidImage("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            calibration_error_status(&CalibrationError::Recognition(OcrError::Timeout("slow".into()))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            calibration_error_status(&CalibrationError::Recognition(OcrError::Extraction("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
