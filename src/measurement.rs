//! # Measurement Text Module
//!
//! Extracts the first length annotation (e.g. "4.2 m", "1200mm", "3,5m") from
//! recognized text and normalizes it to meters.
//!
//! ## Matching Rules
//!
//! - A decimal number using `.` or `,` as the fractional separator, no thousands separator
//! - Optional whitespace
//! - A case-sensitive unit token: `mm`, `cm` or `m`
//!
//! The unit alternation is ordered `mm|cm|m` so that the two-letter units win over a
//! bare `m` at the same position. Only the leftmost match is used.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace, warn};

use crate::errors::{AppError, AppResult};

/// Default pattern with named capture groups `value` and `unit`
pub const DEFAULT_MEASUREMENT_PATTERN: &str = r"(?P<value>[0-9]+(?:[.,][0-9]+)?)\s*(?P<unit>mm|cm|m)";

lazy_static! {
    static ref DEFAULT_REGEX: Regex =
        Regex::new(DEFAULT_MEASUREMENT_PATTERN).expect("Default measurement pattern should be valid");
}

/// Length units accepted in annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Millimeter,
    Centimeter,
    Meter,
}

impl LengthUnit {
    /// Parse a unit token exactly as written (case-sensitive)
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "mm" => Some(LengthUnit::Millimeter),
            "cm" => Some(LengthUnit::Centimeter),
            "m" => Some(LengthUnit::Meter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthUnit::Millimeter => "mm",
            LengthUnit::Centimeter => "cm",
            LengthUnit::Meter => "m",
        }
    }

    /// Convert a value expressed in this unit to meters
    pub fn to_meters(&self, value: f64) -> f64 {
        match self {
            LengthUnit::Millimeter => value / 1000.0,
            LengthUnit::Centimeter => value / 100.0,
            LengthUnit::Meter => value,
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw annotation found in text, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementMatch {
    /// The numeral as written (may use `,` as the fractional separator)
    pub numeral: String,
    /// The unit token
    pub unit: LengthUnit,
    /// Byte offset of the match start in the source text
    pub start_pos: usize,
    /// Byte offset of the match end in the source text
    pub end_pos: usize,
}

impl MeasurementMatch {
    /// The numeral with `,` replaced by `.`
    pub fn canonical_numeral(&self) -> String {
        self.numeral.replace(',', ".")
    }

    /// Parse the numeral as a floating-point value in the annotation's unit
    pub fn value(&self) -> Option<f64> {
        self.canonical_numeral().parse::<f64>().ok()
    }

    /// Normalize to meters, with the parsed value and unit as display text
    pub fn normalize(&self) -> Option<NormalizedMeasurement> {
        let value = self.value()?;
        Some(NormalizedMeasurement {
            value_in_meters: self.unit.to_meters(value),
            display_text: format!("{} {}", format_parsed_value(value), self.unit),
            unit: self.unit,
        })
    }
}

/// Render a parsed value in shortest round-trip form
///
/// Whole numbers keep a trailing `.0` and very large or very small magnitudes
/// use a signed two-digit exponent, so `4200` renders as `4200.0` and `04.20`
/// as `4.2`.
///
/// ```rust
/// use scale_calibrator::measurement::format_parsed_value;
///
/// assert_eq!(format_parsed_value(4200.0), "4200.0");
/// assert_eq!(format_parsed_value(4.2), "4.2");
/// assert_eq!(format_parsed_value(0.00005), "5e-05");
/// ```
pub fn format_parsed_value(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let scientific = format!("{:e}", value);
        let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// A measurement converted to meters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMeasurement {
    pub value_in_meters: f64,
    /// e.g. `"4.2 m"`, `"3.5 m"`, `"4200.0 mm"`
    pub display_text: String,
    pub unit: LengthUnit,
}

impl NormalizedMeasurement {
    /// Whether the measurement can be used as a divisor
    pub fn is_usable(&self) -> bool {
        self.value_in_meters.is_finite() && self.value_in_meters > 0.0
    }
}

/// Finds length annotations in recognized text
#[derive(Debug, Clone)]
pub struct MeasurementParser {
    pattern: Regex,
}

impl MeasurementParser {
    /// Create a parser with the default `mm|cm|m` pattern
    ///
    /// # Examples
    ///
    /// ```rust
    /// use scale_calibrator::measurement::MeasurementParser;
    ///
    /// let parser = MeasurementParser::new();
    /// let measurement = parser.parse("Scale: 1200mm").unwrap();
    /// assert_eq!(measurement.value_in_meters, 1.2);
    /// assert_eq!(measurement.display_text, "1200.0 mm");
    /// ```
    pub fn new() -> Self {
        Self {
            pattern: DEFAULT_REGEX.clone(),
        }
    }

    /// Create a parser with a custom pattern
    ///
    /// The pattern must define the named groups `value` and `unit`. Unit tokens
    /// outside `mm`, `cm` and `m` are never accepted, whatever the pattern matches.
    pub fn with_pattern(pattern: &str) -> AppResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| AppError::Config(format!("measurement pattern is not a valid regex: {}", e)))?;

        let names: Vec<&str> = pattern.capture_names().flatten().collect();
        for required in ["value", "unit"] {
            if !names.contains(&required) {
                return Err(AppError::Config(format!(
                    "measurement pattern must define a '{}' capture group",
                    required
                )));
            }
        }

        debug!(pattern = %pattern.as_str(), "Using custom measurement pattern");
        Ok(Self { pattern })
    }

    /// Find the first annotation in scan order
    pub fn find_first(&self, text: &str) -> Option<MeasurementMatch> {
        let captures = self.pattern.captures(text)?;
        let value = captures.name("value")?;
        let unit_match = captures.name("unit")?;
        let whole = captures.get(0)?;

        let Some(unit) = LengthUnit::from_token(unit_match.as_str()) else {
            warn!(unit = %unit_match.as_str(), "Pattern matched an unsupported unit token");
            return None;
        };

        trace!(
            numeral = %value.as_str(),
            unit = %unit,
            start = whole.start(),
            "Measurement annotation matched"
        );

        Some(MeasurementMatch {
            numeral: value.as_str().to_string(),
            unit,
            start_pos: whole.start(),
            end_pos: whole.end(),
        })
    }

    /// Find the first annotation and normalize it to meters
    ///
    /// Returns `None` when the text holds no annotation. A zero value is returned
    /// as-is; callers check [`NormalizedMeasurement::is_usable`].
    pub fn parse(&self, text: &str) -> Option<NormalizedMeasurement> {
        let found = self.find_first(text)?;
        let normalized = found.normalize();
        if normalized.is_none() {
            warn!(numeral = %found.numeral, "Matched numeral could not be parsed");
        }
        normalized
    }

    pub fn has_measurement(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Get the regex pattern as a string
    pub fn pattern_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Default for MeasurementParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper around the default parser
pub fn find_measurement_in_text(text: &str) -> Option<NormalizedMeasurement> {
    MeasurementParser::new().parse(text)
}
