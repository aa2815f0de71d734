//! # Calibration Orchestrator
//!
//! Runs one request through the pipeline: decode the image, recognize its text,
//! parse the first length annotation, scan the reference line and compute the
//! ratio. Each stage may end the request early; nothing is retried.
//!
//! [`CalibrationService`] is built once at startup and shared behind an `Arc`.
//! It holds configuration and the recognizer only, so concurrent requests never
//! observe each other.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::{error_logging, AppError};
use crate::line_scanner::{LineScanConfig, PixelGrid, PixelSpan, ReferenceLineScanner};
use crate::measurement::{MeasurementParser, NormalizedMeasurement};
use crate::observability;
use crate::ocr::{validate_image_bytes, TextRecognizer};
use crate::ocr_config::OcrConfig;
use crate::ocr_errors::OcrError;
use crate::scale::{self, ScaleResult, UnavailableReason};

/// Faults that stop a calibration before a result can be produced
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// The payload is not a decodable image or fails the size limits
    InvalidImage(String),
    /// The text recognizer failed or timed out
    Recognition(OcrError),
}

impl CalibrationError {
    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            CalibrationError::InvalidImage(_) => "invalid_image",
            CalibrationError::Recognition(OcrError::Timeout(_)) => "ocr_timeout",
            CalibrationError::Recognition(_) => "ocr_failure",
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::InvalidImage(msg) => write!(f, "Invalid image: {}", msg),
            CalibrationError::Recognition(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for CalibrationError {}

impl From<OcrError> for CalibrationError {
    fn from(err: OcrError) -> Self {
        CalibrationError::Recognition(err)
    }
}

impl From<CalibrationError> for AppError {
    fn from(err: CalibrationError) -> Self {
        match err {
            CalibrationError::InvalidImage(msg) => AppError::Decode(msg),
            CalibrationError::Recognition(err) => AppError::from(err),
        }
    }
}

/// Everything a request produced, including the stages that finished before an early stop
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    pub recognized_text: String,
    pub measurement: Option<NormalizedMeasurement>,
    pub span: Option<PixelSpan>,
    pub result: ScaleResult,
}

impl CalibrationReport {
    pub fn px_per_meter(&self) -> Option<f64> {
        self.result.as_ref().ok().map(|calibration| calibration.px_per_meter)
    }

    pub fn unavailable_reason(&self) -> Option<UnavailableReason> {
        self.result.as_ref().err().copied()
    }

    /// Metrics label for the outcome
    pub fn outcome_label(&self) -> &'static str {
        match &self.result {
            Ok(_) => "calibrated",
            Err(reason) => reason.label(),
        }
    }
}

/// Wire shape of a calibration response
///
/// `px_per_meter` is always present (`null` unless every stage succeeded); the
/// other fields are omitted when their stage did not run or did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_length: Option<u32>,
    #[serde(default)]
    pub px_per_meter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CalibrationResponse {
    /// Response carrying only an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            measurement_text: None,
            real_meters: None,
            pixel_length: None,
            px_per_meter: None,
            error: Some(message.into()),
        }
    }
}

impl From<&CalibrationReport> for CalibrationResponse {
    fn from(report: &CalibrationReport) -> Self {
        Self {
            measurement_text: report.measurement.as_ref().map(|m| m.display_text.clone()),
            real_meters: report.measurement.as_ref().map(|m| m.value_in_meters),
            pixel_length: report.span.map(|span| span.length()),
            px_per_meter: report.px_per_meter(),
            error: report.unavailable_reason().map(|reason| reason.message().to_string()),
        }
    }
}

/// Stateless calibration pipeline
pub struct CalibrationService {
    parser: MeasurementParser,
    scanner: ReferenceLineScanner,
    recognizer: Arc<dyn TextRecognizer>,
    ocr_config: OcrConfig,
}

impl CalibrationService {
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        ocr_config: OcrConfig,
        scan_config: LineScanConfig,
    ) -> Self {
        Self {
            parser: MeasurementParser::new(),
            scanner: ReferenceLineScanner::new(scan_config),
            recognizer,
            ocr_config,
        }
    }

    /// Replace the annotation parser
    pub fn with_parser(mut self, parser: MeasurementParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn recognizer_name(&self) -> &'static str {
        self.recognizer.name()
    }

    /// Upper bound on the blocking work of one request
    pub fn timeout(&self) -> Duration {
        self.ocr_config.operation_timeout()
    }

    /// Validate and decode an encoded image
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CalibrationError> {
        validate_image_bytes(bytes, &self.ocr_config)
            .map_err(|e| CalibrationError::InvalidImage(e.to_string()))?;

        image::load_from_memory(bytes).map_err(|e| CalibrationError::InvalidImage(e.to_string()))
    }

    /// Run the text stages and the line stage over an already decoded image
    ///
    /// Stops at the first stage that produces nothing. Pure apart from logging.
    pub fn evaluate(&self, image: &DynamicImage, recognized_text: &str) -> CalibrationReport {
        let mut report = CalibrationReport {
            recognized_text: recognized_text.to_string(),
            measurement: None,
            span: None,
            result: Err(UnavailableReason::NoMeasurement),
        };

        let Some(measurement) = self.parser.parse(recognized_text) else {
            debug!("No length annotation in recognized text");
            return report;
        };
        report.measurement = Some(measurement.clone());

        let grid = PixelGrid::from_image(image);
        let span = match grid.as_ref().map(|grid| self.scanner.scan(grid)) {
            Ok(Some(span)) => span,
            Ok(None) => {
                debug!("No reference line on scan row");
                report.result = Err(UnavailableReason::NoLine);
                return report;
            }
            Err(e) => {
                // Only reachable for images with zero area
                warn!(error = %e, "Decoded image has no pixels to scan");
                report.result = Err(UnavailableReason::NoLine);
                return report;
            }
        };
        report.span = Some(span);

        report.result = scale::calibrate(&measurement, &span);
        report
    }

    /// Full pipeline over an encoded image, on the calling thread
    pub fn calibrate(&self, bytes: &[u8]) -> Result<CalibrationReport, CalibrationError> {
        self.calibrate_until(bytes, None)
    }

    /// Full pipeline that gives up before recognition once `deadline` has passed
    pub fn calibrate_before(
        &self,
        bytes: &[u8],
        deadline: Instant,
    ) -> Result<CalibrationReport, CalibrationError> {
        self.calibrate_until(bytes, Some(deadline))
    }

    fn calibrate_until(
        &self,
        bytes: &[u8],
        deadline: Option<Instant>,
    ) -> Result<CalibrationReport, CalibrationError> {
        let span = observability::calibration_span(bytes.len());
        let _enter = span.enter();
        let start_time = Instant::now();

        let outcome = self.run(bytes, deadline);
        let duration = start_time.elapsed();

        match &outcome {
            Ok(report) => {
                observability::record_calibration_metrics(report.outcome_label(), duration);
                info!(
                    outcome = report.outcome_label(),
                    px_per_meter = ?report.px_per_meter(),
                    duration_ms = duration.as_millis() as u64,
                    "Calibration finished"
                );
            }
            Err(err) => {
                observability::record_calibration_metrics(err.label(), duration);
                match err {
                    CalibrationError::InvalidImage(_) => {
                        error_logging::log_decode_error(err, "decode_image", Some(bytes.len()))
                    }
                    CalibrationError::Recognition(ocr_err) => error_logging::log_ocr_error(
                        ocr_err,
                        "calibration_recognize",
                        Some(bytes.len() as u64),
                        Some(duration),
                    ),
                }
            }
        }

        outcome
    }

    fn run(
        &self,
        bytes: &[u8],
        deadline: Option<Instant>,
    ) -> Result<CalibrationReport, CalibrationError> {
        let image = self.decode(bytes)?;
        debug!(
            width = image.width(),
            height = image.height(),
            "Image decoded"
        );

        // Blocking tasks queued behind a stuck engine must not take it next
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(CalibrationError::Recognition(OcrError::Timeout(
                "deadline passed before recognition".to_string(),
            )));
        }

        let text = self.recognizer.recognize(bytes)?;
        debug!(
            recognizer = self.recognizer.name(),
            characters = text.len(),
            "Text recognized"
        );

        Ok(self.evaluate(&image, &text))
    }

    /// Full pipeline on the blocking pool, bounded by the configured timeout
    ///
    /// The timeout ends the wait, not the work. A recognition call that is
    /// already running cannot be cancelled; it keeps its pooled engine locked
    /// until it returns. A task that only starts after the deadline skips
    /// recognition and ends with [`OcrError::Timeout`].
    pub async fn calibrate_async(
        self: Arc<Self>,
        bytes: Vec<u8>,
    ) -> Result<CalibrationReport, CalibrationError> {
        let timeout = self.timeout();
        let deadline = Instant::now() + timeout;
        let service = Arc::clone(&self);
        let task = tokio::task::spawn_blocking(move || service.calibrate_before(&bytes, deadline));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => {
                error_logging::log_internal_error(&join_error, "calibration", "join_blocking_task");
                Err(CalibrationError::Recognition(OcrError::Extraction(format!(
                    "calibration task failed: {}",
                    join_error
                ))))
            }
            Err(_) => {
                observability::record_calibration_metrics("ocr_timeout", timeout);
                let err = OcrError::Timeout(format!(
                    "operation exceeded {} seconds",
                    timeout.as_secs()
                ));
                error_logging::log_ocr_error(&err, "calibration_recognize", None, Some(timeout));
                Err(CalibrationError::Recognition(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedText(&'static str);

    #[derive(Default)]
    struct CountingText {
        calls: AtomicUsize,
    }

    impl TextRecognizer for CountingText {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Scale: 4.2 m".to_string())
        }
    }

    impl TextRecognizer for FixedText {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingRecognizer;

    impl TextRecognizer for FailingRecognizer {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
            Err(OcrError::Initialization("no language data".to_string()))
        }
    }

    fn service(recognizer: impl TextRecognizer + 'static) -> CalibrationService {
        CalibrationService::new(
            Arc::new(recognizer),
            OcrConfig::default(),
            LineScanConfig::default(),
        )
    }

    /// White 500x100 image with a black bar from x=start to x=end-1 across the middle rows
    fn bar_image(start: u32, end: u32) -> DynamicImage {
        let mut img = GrayImage::from_pixel(500, 100, Luma([255]));
        for y in 45..55 {
            for x in start..end {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_evaluate_full_result() {
        let svc = service(FixedText(""));
        let report = svc.evaluate(&bar_image(40, 460), "Scale: 4.2 m");
        assert_eq!(report.px_per_meter(), Some(100.0));
        assert_eq!(report.span.map(|s| s.length()), Some(420));
        assert_eq!(report.outcome_label(), "calibrated");
    }

    #[test]
    fn test_evaluate_stops_without_measurement() {
        let svc = service(FixedText(""));
        let report = svc.evaluate(&bar_image(40, 460), "hello world");
        assert_eq!(report.unavailable_reason(), Some(UnavailableReason::NoMeasurement));
        assert!(report.measurement.is_none());
        assert!(report.span.is_none());
    }

    #[test]
    fn test_evaluate_keeps_measurement_without_line() {
        let svc = service(FixedText(""));
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 50, Luma([255])));
        let report = svc.evaluate(&blank, "4200 mm");
        assert_eq!(report.unavailable_reason(), Some(UnavailableReason::NoLine));
        assert_eq!(report.measurement.as_ref().map(|m| m.value_in_meters), Some(4.2));

        let response = CalibrationResponse::from(&report);
        assert_eq!(response.measurement_text.as_deref(), Some("4200.0 mm"));
        assert_eq!(response.real_meters, Some(4.2));
        assert_eq!(response.pixel_length, None);
        assert_eq!(response.px_per_meter, None);
        assert_eq!(response.error.as_deref(), Some("No measurable line found"));
    }

    #[test]
    fn test_zero_measurement_is_unavailable() {
        let svc = service(FixedText(""));
        let report = svc.evaluate(&bar_image(10, 50), "0 m");
        assert_eq!(
            report.unavailable_reason(),
            Some(UnavailableReason::DegenerateMeasurement)
        );
        assert_eq!(report.span.map(|s| s.length()), Some(40));
    }

    #[test]
    fn test_calibrate_rejects_garbage() {
        let svc = service(FixedText("4 m"));
        let err = svc.calibrate(b"not an image at all").unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidImage(_)));
        assert!(err.to_string().starts_with("Invalid image: "));
    }

    #[test]
    fn test_calibrate_propagates_recognizer_failure() {
        let svc = service(FailingRecognizer);
        let err = svc.calibrate(&png_bytes(&bar_image(10, 50))).unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::Recognition(OcrError::Initialization(_))
        ));
        assert_eq!(err.label(), "ocr_failure");
    }

    #[test]
    fn test_calibrate_is_idempotent() {
        let svc = service(FixedText("Scale: 4.2 m"));
        let bytes = png_bytes(&bar_image(40, 460));
        let first = svc.calibrate(&bytes).unwrap();
        let second = svc.calibrate(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_response_serializes_null_ratio() {
        let response = CalibrationResponse::error("No measurement found");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("px_per_meter").unwrap().is_null());
        assert!(json.get("measurement_text").is_none());
        assert_eq!(json["error"], "No measurement found");
    }

    #[test]
    fn test_expired_deadline_skips_recognition() {
        let recognizer = Arc::new(CountingText::default());
        let svc = CalibrationService::new(
            recognizer.clone(),
            OcrConfig::default(),
            LineScanConfig::default(),
        );
        let bytes = png_bytes(&bar_image(40, 460));

        let err = svc.calibrate_before(&bytes, Instant::now()).unwrap_err();
        assert!(matches!(err, CalibrationError::Recognition(OcrError::Timeout(_))));
        assert_eq!(err.label(), "ocr_timeout");
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);

        let later = Instant::now() + Duration::from_secs(60);
        let report = svc.calibrate_before(&bytes, later).unwrap();
        assert_eq!(report.px_per_meter(), Some(100.0));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_calibrate_async_matches_sync() {
        let svc = Arc::new(service(FixedText("Scale: 4.2 m")));
        let bytes = png_bytes(&bar_image(40, 460));
        let sync = svc.calibrate(&bytes).unwrap();
        let async_report = Arc::clone(&svc).calibrate_async(bytes).await.unwrap();
        assert_eq!(sync, async_report);
    }
}
