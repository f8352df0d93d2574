//! Page and circle geometry in device pixels.
//!
//! Every millimetre value is converted with [`mm_to_px`] and rounded to a
//! whole pixel before it takes part in any radius or offset computation.
//! Radii are derived from whole-pixel diameters, so they are either integers
//! or exact halves and the same settings always give bit-identical layouts.

use crate::pipeline::error::BatchError;
use common::model::batch::BatchSettings;

pub const MM_PER_INCH: f64 = 25.4;

/// Largest raster a single job may allocate, in bytes. Applies to the RGB
/// page and to the RGBA square the source is resized to.
pub const MAX_RASTER_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Converts millimetres to whole device pixels at `dpi`.
///
/// `None` when the result is not finite, negative or does not fit in `u32`.
pub fn mm_to_px(mm: f64, dpi: f64) -> Option<u32> {
    let px = (mm * (dpi / MM_PER_INCH)).round();
    if px.is_finite() && px >= 0.0 && px <= u32::MAX as f64 {
        Some(px as u32)
    } else {
        None
    }
}

fn raster_bytes(width: u32, height: u32, channels: u64) -> Option<u64> {
    (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(channels))
}

/// Resolved layout shared by every job of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryConfig {
    pub dpi: f64,
    pub page_width: u32,
    pub page_height: u32,
    pub center_x: f64,
    pub center_y: f64,
    /// Radius of the outer edge of the circle, border included.
    pub outer_radius: f64,
    /// Ring painted inside the outer edge; 0 disables the border.
    pub border_thickness: u32,
    /// White gap between the ring and the image.
    pub inner_margin: u32,
}

impl GeometryConfig {
    /// Builds the pixel layout with the circle centred on the page.
    pub fn from_settings(settings: &BatchSettings) -> Result<Self, BatchError> {
        let dpi = settings.dpi;
        if !dpi.is_finite() || dpi <= 0.0 {
            return Err(BatchError::InvalidGeometry(format!(
                "dpi must be a positive number, got {}",
                dpi
            )));
        }

        let lengths = [
            ("pageWidthMm", Some(settings.page_width_mm)),
            ("pageHeightMm", Some(settings.page_height_mm)),
            ("outerDiameterMm", Some(settings.outer_diameter_mm)),
            ("borderThicknessMm", settings.border_thickness_mm),
            ("innerMarginMm", settings.inner_margin_mm),
        ];
        for (field, value) in lengths {
            if let Some(mm) = value {
                if !mm.is_finite() || mm < 0.0 {
                    return Err(BatchError::InvalidGeometry(format!(
                        "{} must be a non-negative number, got {}",
                        field, mm
                    )));
                }
            }
        }

        let to_px = |field: &str, mm: f64| {
            mm_to_px(mm, dpi).ok_or_else(|| {
                BatchError::InvalidGeometry(format!(
                    "{} of {} mm is too large at {} dpi",
                    field, mm, dpi
                ))
            })
        };
        let page_width = to_px("pageWidthMm", settings.page_width_mm)?;
        let page_height = to_px("pageHeightMm", settings.page_height_mm)?;
        let outer_diameter = to_px("outerDiameterMm", settings.outer_diameter_mm)?;
        let border_thickness = match settings.border_thickness_mm {
            Some(mm) => to_px("borderThicknessMm", mm)?,
            None => 0,
        };
        let inner_margin = match settings.inner_margin_mm {
            Some(mm) => to_px("innerMarginMm", mm)?,
            None => 0,
        };

        let geometry = GeometryConfig {
            dpi,
            page_width,
            page_height,
            center_x: page_width as f64 / 2.0,
            center_y: page_height as f64 / 2.0,
            outer_radius: outer_diameter as f64 / 2.0,
            border_thickness,
            inner_margin,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Checks the invariants the renderer relies on. Called once per batch.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.page_width == 0 || self.page_height == 0 {
            return Err(BatchError::InvalidGeometry(format!(
                "page must be at least 1x1 px, got {}x{}",
                self.page_width, self.page_height
            )));
        }
        if !self.dpi.is_finite() || self.dpi <= 0.0 {
            return Err(BatchError::InvalidGeometry(format!(
                "dpi must be a positive number, got {}",
                self.dpi
            )));
        }
        if !self.center_x.is_finite() || !self.center_y.is_finite() {
            return Err(BatchError::InvalidGeometry(
                "circle center must be finite".to_string(),
            ));
        }
        if !self.outer_radius.is_finite() || self.outer_radius < 0.0 {
            return Err(BatchError::InvalidGeometry(format!(
                "outer radius must be non-negative, got {}",
                self.outer_radius
            )));
        }
        if self.inner_radius() < 0.0 {
            return Err(BatchError::InvalidGeometry(format!(
                "border ({} px) and margin ({} px) do not fit inside radius {} px",
                self.border_thickness, self.inner_margin, self.outer_radius
            )));
        }
        let page_bytes = raster_bytes(self.page_width, self.page_height, 3);
        if page_bytes.is_none_or(|bytes| bytes > MAX_RASTER_BYTES) {
            return Err(BatchError::InvalidGeometry(format!(
                "page of {}x{} px exceeds the raster budget of {} bytes",
                self.page_width, self.page_height, MAX_RASTER_BYTES
            )));
        }
        let size = self.draw_size();
        if raster_bytes(size, size, 4).is_none_or(|bytes| bytes > MAX_RASTER_BYTES) {
            return Err(BatchError::InvalidGeometry(format!(
                "circle of {} px exceeds the raster budget of {} bytes",
                size, MAX_RASTER_BYTES
            )));
        }
        Ok(())
    }

    /// Radius of the clip region the source image is drawn into.
    pub fn inner_radius(&self) -> f64 {
        self.outer_radius - self.border_thickness as f64 - self.inner_margin as f64
    }

    /// Side of the square the source image is stretched to.
    pub fn draw_size(&self) -> u32 {
        (self.inner_radius() * 2.0).round().max(0.0) as u32
    }

    /// Top-left corner of the draw square on the page. May be negative when
    /// the circle is larger than the page.
    pub fn draw_origin(&self) -> (i64, i64) {
        let r = self.inner_radius();
        (
            (self.center_x - r).floor() as i64,
            (self.center_y - r).floor() as i64,
        )
    }

    /// Pixels per metre for the PNG pHYs chunk.
    pub fn pixels_per_meter(&self) -> u32 {
        (self.dpi / MM_PER_INCH * 1000.0).round() as u32
    }
}
