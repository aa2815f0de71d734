//! # Observability Tests Module
//!
//! Configuration and recording helpers for logging, tracing and metrics.

#[cfg(test)]
mod tests {
    use scale_calibrator::observability;
    use scale_calibrator::observability::metrics::{is_authorized, RateLimiter};
    use scale_calibrator::observability_config::{presets, ObservabilityConfig};
    use std::time::Duration;

    /// Recording helpers must be safe to call before a recorder is installed
    #[test]
    fn test_recording_helpers_without_recorder() {
        observability::record_ocr_metrics(true, Duration::from_millis(120), 48_000);
        observability::record_calibration_metrics("no_line", Duration::from_millis(150));
        observability::record_request_metrics("POST", 400, Duration::from_millis(2));
        observability::record_health_check_metrics("ocr", true, Duration::from_millis(30));
        observability::record_error_metrics("ocr_timeout", "server");
    }

    #[test]
    fn test_spans_carry_names() {
        let span = observability::ocr_span("recognize");
        let _enter = span.enter();
        let span = observability::calibration_span(1024);
        let _enter = span.enter();
    }

    #[test]
    fn test_production_preset_samples() {
        let config = presets::production();
        assert!(config.enable_trace_sampling);
        assert!(config.trace_sampling_ratio < 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_otlp_endpoint_must_be_http() {
        let config = ObservabilityConfig {
            otlp_endpoint: Some("grpc://collector:4317".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ObservabilityConfig {
            otlp_endpoint: Some("http://collector:4317".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_metrics_rate_limiter() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.is_allowed("127.0.0.1"));
        assert!(!limiter.is_allowed("127.0.0.1"));
    }

    #[test]
    fn test_metrics_rate_limiter_keeps_active_clients_only() {
        let limiter = RateLimiter::new(3, 60);
        assert!(limiter.is_allowed("127.0.0.1"));
        assert!(limiter.is_allowed("127.0.0.2"));
        assert_eq!(limiter.tracked_clients(), 2);

        let expiring = RateLimiter::new(3, 0);
        assert!(expiring.is_allowed("127.0.0.1"));
        assert!(expiring.is_allowed("127.0.0.2"));
        assert_eq!(expiring.tracked_clients(), 1);
    }

    #[test]
    fn test_metrics_auth_open_without_token() {
        if std::env::var("METRICS_AUTH_TOKEN").is_err() {
            assert!(is_authorized(None));
            assert!(is_authorized(Some("Bearer anything")));
        }
    }
}
