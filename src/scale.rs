//! # Scale Calculator Module
//!
//! Combines a normalized measurement and a reference line length into a
//! pixels-per-meter ratio, and defines the reasons a calibration can be unavailable.

use serde::Serialize;
use std::fmt;

use crate::line_scanner::PixelSpan;
use crate::measurement::NormalizedMeasurement;

/// Why a calibration could not be completed
///
/// None of these are faults: they are reported as normal responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// The recognized text holds no length annotation
    NoMeasurement,
    /// The scan row holds no dark pixel
    NoLine,
    /// The annotation normalizes to zero, a negative or a non-finite length
    DegenerateMeasurement,
    /// The reference line has zero length
    DegenerateLine,
}

impl UnavailableReason {
    /// Human-readable message returned to clients
    pub fn message(&self) -> &'static str {
        match self {
            UnavailableReason::NoMeasurement => "No measurement found",
            UnavailableReason::NoLine => "No measurable line found",
            UnavailableReason::DegenerateMeasurement => "Measurement must be greater than zero",
            UnavailableReason::DegenerateLine => "Reference line has zero length",
        }
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            UnavailableReason::NoMeasurement => "no_measurement",
            UnavailableReason::NoLine => "no_line",
            UnavailableReason::DegenerateMeasurement => "degenerate_measurement",
            UnavailableReason::DegenerateLine => "degenerate_line",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A completed calibration with the inputs it was derived from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    pub px_per_meter: f64,
    pub measurement: NormalizedMeasurement,
    pub span: PixelSpan,
}

/// Outcome of the calculator stage
pub type ScaleResult = Result<Calibration, UnavailableReason>;

/// Pixels per meter, or the reason the ratio cannot be computed
///
/// Requires a finite `real_meters > 0` and `pixel_length > 0`.
///
/// # Examples
///
/// ```rust
/// use scale_calibrator::scale::{px_per_meter, UnavailableReason};
///
/// assert_eq!(px_per_meter(400, 4.0), Ok(100.0));
/// assert_eq!(px_per_meter(400, 0.0), Err(UnavailableReason::DegenerateMeasurement));
/// ```
pub fn px_per_meter(pixel_length: u32, real_meters: f64) -> Result<f64, UnavailableReason> {
    if !real_meters.is_finite() || real_meters <= 0.0 {
        return Err(UnavailableReason::DegenerateMeasurement);
    }
    if pixel_length == 0 {
        return Err(UnavailableReason::DegenerateLine);
    }
    Ok(pixel_length as f64 / real_meters)
}

/// Combine a measurement and a line span
pub fn calibrate(measurement: &NormalizedMeasurement, span: &PixelSpan) -> ScaleResult {
    let ratio = px_per_meter(span.length(), measurement.value_in_meters)?;
    Ok(Calibration {
        px_per_meter: ratio,
        measurement: measurement.clone(),
        span: *span,
    })
}
