//! Vision Layer
//!
//! Text detection on page images and the image work around it:
//! - OCR collaborators returning raw text-line polygons
//! - Page resizing to the render width
//! - Annotated debug images and bubble crops

pub mod crops;
pub mod ocr;
pub mod preprocess;

use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::DetectorConfig;
use crate::layout::{Point, TextBox};

pub use ocr::{CommandDetector, SidecarDetector};

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// Precomputed `{basename}.json` files next to the pages
    #[default]
    Sidecar,
    /// External program printing detections on stdout
    Command,
}

/// Source of raw text-line polygons for a page image
pub trait TextDetector {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Detect text lines. A page without text yields an empty list.
    fn detect(&mut self, image_path: &Path) -> Result<Vec<TextBox>>;
}

/// Build a detector for one worker
pub fn create_detector(config: &DetectorConfig) -> Box<dyn TextDetector + Send> {
    match config.backend {
        OcrBackend::Sidecar => Box::new(SidecarDetector::new(
            config.sidecar_dir.as_ref().map(PathBuf::from),
        )),
        OcrBackend::Command => Box::new(CommandDetector::new(&config.command, &config.args)),
    }
}

/// Parse PaddleOCR-style detection JSON into text boxes.
///
/// Accepted shapes, at any nesting depth:
/// - a bare polygon `[[x, y], [x, y], ...]`
/// - a recognition entry `[polygon, [text, score]]`
/// - an object with a `points`, `polygon` or `box` array
///
/// `null` parses as no boxes. Empty polygons are dropped with a warning.
pub fn parse_detections(json: &str) -> Result<Vec<TextBox>> {
    let value: Value = serde_json::from_str(json)?;
    let mut boxes = Vec::new();
    collect_polygons(&value, &mut boxes);
    Ok(boxes)
}

fn collect_polygons(value: &Value, boxes: &mut Vec<TextBox>) {
    match value {
        Value::Array(items) => {
            if let Some(points) = as_polygon(items) {
                push_polygon(points, boxes);
            } else {
                for item in items {
                    collect_polygons(item, boxes);
                }
            }
        }
        Value::Object(map) => {
            let polygon = ["points", "polygon", "box"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array));
            match polygon {
                Some(items) => push_polygon(as_polygon(items).unwrap_or_default(), boxes),
                None => {
                    for item in map.values() {
                        collect_polygons(item, boxes);
                    }
                }
            }
        }
        _ => {}
    }
}

fn push_polygon(points: Vec<Point>, boxes: &mut Vec<TextBox>) {
    match TextBox::new(points) {
        Ok(text_box) => boxes.push(text_box),
        Err(e) => warn!("Dropping detection: {}", e),
    }
}

/// A non-empty array whose items are all `[x, y]` number pairs
fn as_polygon(items: &[Value]) -> Option<Vec<Point>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| match item.as_array().map(Vec::as_slice) {
            Some([x, y]) => Some(Point::new(x.as_f64()?, y.as_f64()?)),
            _ => None,
        })
        .collect()
}
