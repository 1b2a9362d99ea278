//! Page preprocessing
//!
//! Resizes pages to the render width so detection, crops and the scroll
//! video share one coordinate system.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

pub const JPEG_QUALITY: u8 = 100;

/// Output size for a page scaled to `target_width`, keeping aspect ratio
pub fn target_dimensions(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    if width == 0 || width == target_width {
        return (width, height);
    }
    let scaled = (target_width as f64 / width as f64 * height as f64) as u32;
    (target_width, scaled.max(1))
}

/// Save an RGB image as JPEG at full quality
pub fn save_jpeg(image: &RgbImage, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
    encoder
        .encode_image(image)
        .with_context(|| format!("Failed to encode {:?}", path))?;
    Ok(())
}

/// Resize a page to `target_width` and save it as JPEG.
/// Returns the output dimensions.
pub fn resize_page(input: &Path, output: &Path, target_width: u32) -> Result<(u32, u32)> {
    let image = image::open(input).with_context(|| format!("Failed to open {:?}", input))?;
    let resized = resize_to_width(image, target_width);
    save_jpeg(&resized, output)?;
    debug!("Resized {:?} to {}x{}", input, resized.width(), resized.height());
    Ok(resized.dimensions())
}

pub fn resize_to_width(image: DynamicImage, target_width: u32) -> RgbImage {
    let (width, height) = target_dimensions(image.width(), image.height(), target_width);
    let rgb = image.into_rgb8();
    if (width, height) == rgb.dimensions() {
        return rgb;
    }
    image::imageops::resize(&rgb, width, height, FilterType::Triangle)
}
