//! # Reference Line Scanner Module
//!
//! Measures, in pixels, the reference line drawn across the image. The line is
//! assumed horizontal and vertically centered, so a single row is examined.
//!
//! ## Scanning Algorithm
//!
//! ```text
//! row   = floor(height * row_fraction)          (0.5 by default)
//! start = first x where intensity < dark        (200 by default)
//! end   = first x > start where intensity > light (230 by default), else width
//! ```
//!
//! Using a lower threshold to enter the line and a higher one to leave it keeps
//! anti-aliased edge pixels from ending the span right after it starts.
//!
//! Colour images are reduced to ITU-R 601-2 luma (`L = R*299/1000 + G*587/1000
//! + B*114/1000`) in fixed point, so thresholds mean the same thing as for the
//! usual `"L"` conversion of imaging libraries. Alpha is discarded.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::{AppError, AppResult};

/// ITU-R 601-2 luma with 16-bit fixed-point weights, rounded to nearest
pub fn luma_601([r, g, b]: [u8; 3]) -> u8 {
    let weighted = u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471;
    ((weighted + 0x8000) >> 16) as u8
}

pub const DEFAULT_ROW_FRACTION: f64 = 0.5;
pub const DEFAULT_DARK_THRESHOLD: u8 = 200;
pub const DEFAULT_LIGHT_THRESHOLD: u8 = 230;

/// Single-channel intensity grid, 0 (black) to 255 (white)
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelGrid {
    /// Build a grid from row-major samples
    pub fn new(width: u32, height: u32, samples: Vec<u8>) -> AppResult<Self> {
        if width == 0 || height == 0 {
            return Err(AppError::Validation(format!(
                "pixel grid dimensions must be non-zero ({}x{})",
                width, height
            )));
        }
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(AppError::Validation(format!(
                "pixel grid expects {} samples for {}x{}, got {}",
                expected,
                width,
                height,
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Convert a decoded image to grayscale intensities
    pub fn from_image(image: &DynamicImage) -> AppResult<Self> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let pixels = rgb.pixels().map(|pixel| luma_601(pixel.0)).collect();
        Self::new(width, height, pixels)
    }

    pub fn from_luma(gray: GrayImage) -> AppResult<Self> {
        let (width, height) = gray.dimensions();
        Self::new(width, height, gray.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Intensity at (x, y), or `None` outside the grid
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// All samples of row `y`, or `None` outside the grid
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        self.samples.get(start..start + self.width as usize)
    }
}

/// Horizontal extent of the reference line on the scan row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSpan {
    /// Scan row the span was found on
    pub row: u32,
    /// First dark pixel (inclusive)
    pub start_x: u32,
    /// First recovered-background pixel, or the image width (exclusive)
    pub end_x: u32,
}

impl PixelSpan {
    pub fn length(&self) -> u32 {
        self.end_x.saturating_sub(self.start_x)
    }
}

/// Scan row position and intensity thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineScanConfig {
    /// Scan row as a fraction of the image height, truncated
    pub row_fraction: f64,
    /// Pixels strictly below this start the line
    pub dark_threshold: u8,
    /// Pixels strictly above this end the line
    pub light_threshold: u8,
}

impl Default for LineScanConfig {
    fn default() -> Self {
        Self {
            row_fraction: DEFAULT_ROW_FRACTION,
            dark_threshold: DEFAULT_DARK_THRESHOLD,
            light_threshold: DEFAULT_LIGHT_THRESHOLD,
        }
    }
}

impl LineScanConfig {
    /// Validate line scan configuration
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..1.0).contains(&self.row_fraction) {
            return Err(AppError::Config(format!(
                "row_fraction must be in [0, 1), got {}",
                self.row_fraction
            )));
        }
        if self.dark_threshold == 0 {
            return Err(AppError::Config(
                "dark_threshold must be greater than 0".to_string(),
            ));
        }
        if self.light_threshold < self.dark_threshold {
            return Err(AppError::Config(format!(
                "light_threshold ({}) must be >= dark_threshold ({})",
                self.light_threshold, self.dark_threshold
            )));
        }
        if self.light_threshold == u8::MAX {
            return Err(AppError::Config(
                "light_threshold must be below 255".to_string(),
            ));
        }
        Ok(())
    }
}

/// Finds the reference line on a fixed scan row
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceLineScanner {
    config: LineScanConfig,
}

impl ReferenceLineScanner {
    pub fn new(config: LineScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LineScanConfig {
        &self.config
    }

    /// Row examined for a grid of the given height
    pub fn scan_row(&self, height: u32) -> u32 {
        let row = (height as f64 * self.config.row_fraction) as u32;
        row.min(height.saturating_sub(1))
    }

    /// Locate the reference line, or `None` when the row has no dark pixel
    pub fn scan(&self, grid: &PixelGrid) -> Option<PixelSpan> {
        let row_index = self.scan_row(grid.height());
        let row = grid.row(row_index)?;

        let start = row
            .iter()
            .position(|&intensity| intensity < self.config.dark_threshold)?;

        let end = row[start + 1..]
            .iter()
            .position(|&intensity| intensity > self.config.light_threshold)
            .map(|offset| start + 1 + offset)
            .unwrap_or(row.len());

        trace!(row = row_index, start, end, "Reference line bounds located");

        let span = PixelSpan {
            row: row_index,
            start_x: start as u32,
            end_x: end as u32,
        };

        debug!(
            row = span.row,
            start_x = span.start_x,
            end_x = span.end_x,
            pixel_length = span.length(),
            "Reference line measured"
        );
        Some(span)
    }

    /// Convenience wrapper for decoded images
    pub fn scan_image(&self, image: &DynamicImage) -> AppResult<Option<PixelSpan>> {
        let grid = PixelGrid::from_image(image)?;
        Ok(self.scan(&grid))
    }
}

/// Measure the reference line with the default row and thresholds
pub fn measure_pixel_length(grid: &PixelGrid) -> Option<u32> {
    ReferenceLineScanner::default().scan(grid).map(|span| span.length())
}
