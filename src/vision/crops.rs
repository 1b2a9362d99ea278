//! Bubble crops and annotated pages

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::preprocess::save_jpeg;
use crate::config::NamingConfig;
use crate::layout::{segment_key, BoundingRect, PageLayout, TextBox};

const BOX_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const GROUP_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Pixel region `(x, y, width, height)` of a rect clamped to the image,
/// or `None` when nothing is left
pub fn clamp_rect(rect: &BoundingRect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x_min = rect.min_x.trunc().max(0.0) as u32;
    let y_min = rect.min_y.trunc().max(0.0) as u32;
    let x_max = (rect.max_x.trunc().max(0.0) as u32).min(width);
    let y_max = (rect.max_y.trunc().max(0.0) as u32).min(height);

    if x_max <= x_min || y_max <= y_min {
        return None;
    }
    Some((x_min, y_min, x_max - x_min, y_max - y_min))
}

/// Save one crop per group in reading order as `{basename}{ordinal}{ext}`.
/// Groups clamped to nothing are skipped. Returns the written paths.
pub fn write_crops(
    image: &RgbImage,
    layout: &PageLayout,
    basename: &str,
    output_dir: &Path,
    naming: &NamingConfig,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(layout.order.len());

    for (i, rect) in layout.ordered_bounds().enumerate() {
        let key = segment_key(basename, i + 1, naming.crop_suffix_length);
        let Some((x, y, w, h)) = clamp_rect(rect, image.width(), image.height()) else {
            warn!("Skipping crop {}: outside the page", key);
            continue;
        };

        let crop = image::imageops::crop_imm(image, x, y, w, h).to_image();
        let path = output_dir.join(format!("{}{}", key, naming.image_extension));
        save_jpeg(&crop, &path)?;
        written.push(path);
    }

    Ok(written)
}

/// Copy of the page with every raw detection polygon outlined
pub fn draw_polygons(image: &RgbImage, boxes: &[TextBox]) -> RgbImage {
    let mut canvas = image.clone();
    for text_box in boxes {
        let points = text_box.points();
        for (i, start) in points.iter().enumerate() {
            let end = points[(i + 1) % points.len()];
            draw_line_segment_mut(
                &mut canvas,
                (start.x as f32, start.y as f32),
                (end.x as f32, end.y as f32),
                BOX_COLOR,
            );
        }
    }
    canvas
}

/// Copy of the page with the padded group rectangles outlined
pub fn draw_groups(image: &RgbImage, layout: &PageLayout) -> RgbImage {
    let mut canvas = image.clone();
    for rect in layout.ordered_bounds() {
        let width = (rect.width().trunc() as u32).max(1);
        let height = (rect.height().trunc() as u32).max(1);
        let outline = Rect::at(rect.min_x.trunc() as i32, rect.min_y.trunc() as i32).of_size(width, height);
        draw_hollow_rect_mut(&mut canvas, outline, GROUP_COLOR);
    }
    canvas
}
