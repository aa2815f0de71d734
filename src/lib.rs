//! # Scale Calibrator
//!
//! Derives a pixels-per-meter ratio from a floor-plan style image: OCR finds a
//! length annotation such as `4.2 m`, a row scan measures the drawn reference
//! line, and the two are combined into a calibration served over HTTP.

pub mod calibration;
pub mod config;
pub mod errors;
pub mod instance_manager;
pub mod line_scanner;
pub mod measurement;
pub mod observability;
pub mod observability_config;
pub mod ocr;
pub mod ocr_config;
pub mod ocr_errors;
pub mod scale;
pub mod server;

// Re-export types for easier access
pub use calibration::{CalibrationReport, CalibrationResponse, CalibrationService};
pub use measurement::{MeasurementParser, NormalizedMeasurement};
pub use scale::{px_per_meter, UnavailableReason};
