//! Single-image transform: source image → printable page with a circular crop.
//!
//! The page is a white canvas the size of the configured sheet. The source
//! image is stretched to the bounding square of the inner circle and only the
//! pixels inside the circle are kept. An optional black ring is painted at the
//! outer edge, with a white margin between ring and image. The page is encoded
//! as an 8-bit RGB PNG whose pHYs chunk carries the configured DPI.

use crate::pipeline::error::TransformError;
use crate::pipeline::geometry::GeometryConfig;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader, RgbImage, RgbaImage};
use log::debug;
use png::{BitDepth, ColorType, PixelDimensions, Unit};
use rayon::prelude::*;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

const WHITE: [u8; 3] = [255, 255, 255];
const BORDER: [u8; 3] = [0, 0, 0];

/// One caller-supplied image.
#[derive(Debug, Clone)]
pub struct InputItem {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputItem {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A rendered page ready to be stored in the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A failed transform, tagged with the name of the input it came from.
#[derive(Debug)]
pub struct JobFailure {
    pub name: String,
    pub error: TransformError,
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// Archive entry name for an input file name.
///
/// `photo.JPG` → `modified_photo.png`, `photo` → `modified_photo.png`.
/// Only the last extension is dropped, and a leading dot is not treated as
/// one (`.hidden` → `modified_.hidden.png`). Directory components are
/// discarded so entries never escape the archive root.
pub fn output_name(input_name: &str) -> String {
    let base = input_name.rsplit(['/', '\\']).next().unwrap_or(input_name);
    let stem = match base.rfind('.') {
        Some(pos) if pos > 0 => &base[..pos],
        _ => base,
    };
    format!("modified_{}.png", stem)
}

/// Renders one input on the blocking thread pool.
///
/// The await on the blocking task is the only suspension point of a job.
pub async fn transform(
    item: InputItem,
    geometry: Arc<GeometryConfig>,
) -> Result<OutputImage, JobFailure> {
    let InputItem { name, bytes } = item;
    let handle = tokio::task::spawn_blocking(move || render_page(&bytes, &geometry));

    let rendered = match handle.await {
        Ok(result) => result,
        Err(e) => Err(TransformError::Load(format!("render task failed: {}", e))),
    };

    match rendered {
        Ok(bytes) => Ok(OutputImage {
            name: output_name(&name),
            bytes,
        }),
        Err(error) => Err(JobFailure { name, error }),
    }
}

/// Decodes `bytes`, composes the page and returns it PNG-encoded.
pub fn render_page(bytes: &[u8], geometry: &GeometryConfig) -> Result<Vec<u8>, TransformError> {
    let start = Instant::now();
    let source = decode(bytes)?;
    let page = compose_page(&source, geometry);
    drop(source);
    let encoded = encode_png(&page, geometry)?;
    debug!(
        "rendered {}x{} page in {:?} ({} bytes)",
        page.width(),
        page.height(),
        start.elapsed(),
        encoded.len()
    );
    Ok(encoded)
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, TransformError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| TransformError::Load(e.to_string()))?;
    if reader.format().is_none() {
        return Err(TransformError::Decode("unrecognised image format".to_string()));
    }

    let img = reader.decode().map_err(|e| match e {
        ImageError::Decoding(_) | ImageError::Unsupported(_) => {
            TransformError::Decode(e.to_string())
        }
        other => TransformError::Load(other.to_string()),
    })?;

    if img.width() == 0 || img.height() == 0 {
        return Err(TransformError::Load("image has no pixels".to_string()));
    }
    Ok(img)
}

/// Draws the clipped source and the optional border on a white page.
fn compose_page(source: &DynamicImage, geometry: &GeometryConfig) -> RgbImage {
    let width = geometry.page_width;
    let mut page = RgbImage::from_pixel(width, geometry.page_height, image::Rgb(WHITE));

    let size = geometry.draw_size();
    let fitted: Option<RgbaImage> = if size > 0 {
        Some(source.resize_exact(size, size, FilterType::Lanczos3).to_rgba8())
    } else {
        None
    };

    let (origin_x, origin_y) = geometry.draw_origin();
    let inner = geometry.inner_radius();
    let inner_sq = inner * inner;
    let outer = geometry.outer_radius;
    let outer_sq = outer * outer;
    let ring_start = (outer - geometry.border_thickness as f64).max(0.0);
    let ring_start_sq = ring_start * ring_start;
    let has_border = geometry.border_thickness > 0;

    let row_len = width as usize * 3;
    page.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = y as f64 + 0.5 - geometry.center_y;
            if dy.abs() > outer.max(inner) {
                return;
            }
            for x in 0..width as usize {
                let dx = x as f64 + 0.5 - geometry.center_x;
                let dist_sq = dx * dx + dy * dy;
                let px = &mut row[x * 3..x * 3 + 3];

                if has_border && dist_sq <= outer_sq && dist_sq >= ring_start_sq {
                    px.copy_from_slice(&BORDER);
                    continue;
                }
                if dist_sq > inner_sq {
                    continue;
                }
                let Some(fitted) = fitted.as_ref() else {
                    continue;
                };
                let sx = x as i64 - origin_x;
                let sy = y as i64 - origin_y;
                if sx < 0 || sy < 0 || sx >= size as i64 || sy >= size as i64 {
                    continue;
                }
                let src = fitted.get_pixel(sx as u32, sy as u32).0;
                let alpha = src[3] as u32;
                for c in 0..3 {
                    // Composite over white.
                    px[c] = ((src[c] as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
                }
            }
        });

    page
}

fn encode_png(page: &RgbImage, geometry: &GeometryConfig) -> Result<Vec<u8>, TransformError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, page.width(), page.height());
        encoder.set_color(ColorType::Rgb);
        encoder.set_depth(BitDepth::Eight);
        let ppm = geometry.pixels_per_meter();
        encoder.set_pixel_dims(Some(PixelDimensions {
            xppu: ppm,
            yppu: ppm,
            unit: Unit::Meter,
        }));
        let mut writer = encoder
            .write_header()
            .map_err(|e| TransformError::Encode(e.to_string()))?;
        writer
            .write_image_data(page.as_raw())
            .map_err(|e| TransformError::Encode(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| TransformError::Encode(e.to_string()))?;
    }
    Ok(out)
}
