//! Metrics collection and Prometheus export module.
//!
//! This module provides:
//! - Rate limiting and optional bearer authentication for the metrics endpoint
//! - Prometheus metrics server with liveness and readiness probes
//! - Metrics recording functions for calibration, OCR and HTTP requests

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use crate::errors::error_logging;
use crate::observability_config::ObservabilityConfig;
use crate::ocr_config::OcrConfig;

/// Simple sliding-window rate limiter keyed by client IP
#[derive(Debug)]
pub struct RateLimiter {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window_secs,
        }
    }

    /// Check if request is allowed for the given IP
    ///
    /// Clients with no requests left in the window are dropped, so the map
    /// only holds clients seen within the last window.
    pub fn is_allowed(&self, ip: &str) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(self.window_secs);

        let mut requests = self.requests.lock();
        requests.retain(|_, times| {
            times.retain(|&time| now.duration_since(time) < window);
            !times.is_empty()
        });

        let in_window = requests.get(ip).map_or(0, Vec::len);
        if in_window >= self.max_requests as usize {
            return false;
        }

        requests.entry(ip.to_string()).or_default().push(now);
        true
    }

    /// Number of clients with requests inside the current window
    pub fn tracked_clients(&self) -> usize {
        self.requests.lock().len()
    }
}

/// Check a bearer token against `METRICS_AUTH_TOKEN`; no token configured means open access
pub fn is_authorized(authorization: Option<&str>) -> bool {
    let expected_token = match std::env::var("METRICS_AUTH_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => return true,
    };

    authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected_token)
}

/// Initialize metrics collection with Prometheus exporter and configuration
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    tracing::info!(
        metrics_enabled = %config.enable_metrics_export,
        "Metrics collection initialized"
    );
    Ok(handle)
}

fn text_response(status: hyper::StatusCode, body: impl Into<String>) -> hyper::Response<String> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn route_metrics_request(
    req: hyper::Request<hyper::body::Incoming>,
    metrics_handle: PrometheusHandle,
    ocr_config: OcrConfig,
) -> hyper::Response<String> {
    let authorized = is_authorized(
        req.headers()
            .get(hyper::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    );
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    drop(req);

    if !authorized {
        let mut response = text_response(hyper::StatusCode::UNAUTHORIZED, "Unauthorized");
        response.headers_mut().insert(
            hyper::header::WWW_AUTHENTICATE,
            hyper::header::HeaderValue::from_static("Bearer"),
        );
        return response;
    }

    match (&method, path.as_str()) {
        (&hyper::Method::GET, "/metrics") => {
            let mut response = hyper::Response::new(metrics_handle.render());
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            response
        }
        (&hyper::Method::GET, "/health/live") => text_response(hyper::StatusCode::OK, "OK"),
        (&hyper::Method::GET, "/health/ready") => {
            match super::health_checks::perform_readiness_checks(&ocr_config).await {
                Ok(()) => text_response(hyper::StatusCode::OK, "OK"),
                Err(e) => text_response(
                    hyper::StatusCode::SERVICE_UNAVAILABLE,
                    format!("NOT READY: {}", e),
                ),
            }
        }
        _ => text_response(hyper::StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Start the Prometheus metrics server with health probes on a background task
pub async fn start_metrics_server(
    metrics_handle: PrometheusHandle,
    config: &ObservabilityConfig,
    ocr_config: OcrConfig,
) -> Result<()> {
    // Localhost unless explicitly configured
    let addr = if config.metrics_bind_all_interfaces {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), config.metrics_port)
    } else {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.metrics_port)
    };

    // 10 requests per minute per IP
    let rate_limiter = Arc::new(RateLimiter::new(10, 60));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        "Metrics server listening on {} (bind_all: {})",
        addr,
        config.metrics_bind_all_interfaces
    );

    super::health_checks::start_health_metrics_recorder(ocr_config.clone());

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let metrics_handle = metrics_handle.clone();
                    let rate_limiter = rate_limiter.clone();
                    let ocr_config = ocr_config.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let metrics_handle = metrics_handle.clone();
                                let rate_limiter = rate_limiter.clone();
                                let ocr_config = ocr_config.clone();
                                let peer_ip = peer_addr.ip().to_string();
                                async move {
                                    if !rate_limiter.is_allowed(&peer_ip) {
                                        return Ok::<_, std::convert::Infallible>(text_response(
                                            hyper::StatusCode::TOO_MANY_REQUESTS,
                                            "Rate limit exceeded",
                                        ));
                                    }
                                    Ok(route_metrics_request(req, metrics_handle, ocr_config).await)
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            error_logging::log_network_error(
                                &err,
                                "serve_metrics_connection",
                                Some(&peer_addr.to_string()),
                            );
                        }
                    });
                }
                Err(e) => {
                    error_logging::log_network_error(&e, "accept_tcp_connection", Some(&addr.to_string()));
                }
            }
        }
    });

    Ok(())
}

/// Record OCR operation metrics
pub fn record_ocr_metrics(success: bool, duration: Duration, image_size: u64) {
    metrics::counter!("ocr_operations_total", "result" => if success { "success" } else { "failure" })
        .increment(1);
    metrics::histogram!("ocr_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("ocr_image_size_bytes").record(image_size as f64);
}

/// Record one calibration attempt; `outcome` is `calibrated`, an unavailable reason or an error label
pub fn record_calibration_metrics(outcome: &str, duration: Duration) {
    let outcome = outcome.to_string();
    metrics::counter!("calibration_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("calibration_duration_seconds").record(duration.as_secs_f64());
}

/// Record request metrics
pub fn record_request_metrics(method: &str, status: u16, duration: Duration) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("requests_total", "method" => method, "status" => status).increment(1);
    metrics::histogram!("request_duration_seconds").record(duration.as_secs_f64());
}

/// Record health check metrics
pub fn record_health_check_metrics(check_type: &str, success: bool, duration: Duration) {
    let check_type = check_type.to_string();
    metrics::counter!(
        "health_checks_total",
        "type" => check_type.clone(),
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    metrics::histogram!("health_check_duration_seconds", "type" => check_type.clone())
        .record(duration.as_secs_f64());
    metrics::gauge!("health_check_status", "type" => check_type).set(if success { 1.0 } else { 0.0 });
}

/// Record error rate metrics
pub fn record_error_metrics(error_type: &str, component: &str) {
    let error_type = error_type.to_string();
    let component = component.to_string();
    metrics::counter!("errors_total", "type" => error_type, "component" => component).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_blocks_after_limit() {
        let limiter = RateLimiter::new(2, 60);
        assert!(limiter.is_allowed("10.0.0.1"));
        assert!(limiter.is_allowed("10.0.0.1"));
        assert!(!limiter.is_allowed("10.0.0.1"));
        // Other clients keep their own budget
        assert!(limiter.is_allowed("10.0.0.2"));
    }

    #[test]
    fn test_rate_limiter_forgets_idle_clients() {
        // A zero-length window expires every request immediately
        let limiter = RateLimiter::new(5, 0);
        for i in 0..100 {
            assert!(limiter.is_allowed(&format!("10.0.1.{}", i)));
        }
        assert_eq!(limiter.tracked_clients(), 1);

        let blocked = RateLimiter::new(0, 60);
        assert!(!blocked.is_allowed("10.0.0.3"));
        assert_eq!(blocked.tracked_clients(), 0);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_ocr_metrics(true, Duration::from_millis(5), 1024);
        record_calibration_metrics("calibrated", Duration::from_millis(7));
        record_request_metrics("POST", 200, Duration::from_millis(9));
        record_health_check_metrics("ocr", false, Duration::from_millis(1));
        record_error_metrics("decode", "server");
    }
}
