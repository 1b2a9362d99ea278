//! Per-page detection stage
//!
//! detect -> group -> order -> annotate -> crop -> gap map

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

use super::Outcome;
use crate::config::AppConfig;
use crate::layout::analyze_page;
use crate::storage::artifacts::write_gap_json;
use crate::storage::{file_stem, WorkDirs};
use crate::vision::crops::{draw_groups, draw_polygons, write_crops};
use crate::vision::preprocess::save_jpeg;
use crate::vision::TextDetector;

/// Process one resized page. Pages without text still get a gap map with
/// a single whole-page segment.
pub fn process_page(
    detector: &mut (dyn TextDetector + Send),
    page: &Path,
    dirs: &WorkDirs,
    config: &AppConfig,
) -> Result<Outcome> {
    let basename = file_stem(page);
    let naming = &config.naming;

    let boxes = detector
        .detect(page)
        .with_context(|| format!("{} detection failed for {:?}", detector.name(), page))?;
    let image = image::open(page)
        .with_context(|| format!("Failed to open {:?}", page))?
        .into_rgb8();

    let layout = analyze_page(
        &boxes,
        image.width() as f64,
        image.height() as f64,
        &config.layout,
    );
    debug!(
        "{}: {} boxes in {} groups",
        basename,
        boxes.len(),
        layout.groups.len()
    );

    write_gap_json(&dirs.image_gaps, &basename, &layout.gaps, naming.crop_suffix_length)?;
    if layout.is_empty() {
        info!("{}: no text found", basename);
        return Ok(Outcome::Skipped);
    }

    let image_name = format!("{}{}", basename, naming.image_extension);
    save_jpeg(&draw_polygons(&image, &boxes), &dirs.image_boxed.join(&image_name))?;
    save_jpeg(&draw_groups(&image, &layout), &dirs.image_grouped.join(&image_name))?;

    let crops = write_crops(&image, &layout, &basename, &dirs.image_crops, naming)?;
    debug!("{}: wrote {} crops", basename, crops.len());
    Ok(Outcome::Processed)
}

/// [`process_page`], falling back to a single whole-page gap entry when
/// it fails so the page still takes its place in the scroll. The original
/// error is returned either way.
pub fn detect_page(
    detector: &mut (dyn TextDetector + Send),
    page: &Path,
    dirs: &WorkDirs,
    config: &AppConfig,
) -> Result<Outcome> {
    let err = match process_page(detector, page, dirs, config) {
        Ok(outcome) => return Ok(outcome),
        Err(err) => err,
    };

    // A gap map written before the failure already covers the page
    let basename = file_stem(page);
    if dirs.image_gaps.join(format!("{}.json", basename)).exists() {
        return Err(err);
    }

    match write_fallback_gap(page, dirs, config) {
        Ok(height) => warn!(
            "{}: detection failed, page scrolls as one {}px segment",
            basename,
            height
        ),
        Err(e) => warn!("{}: no fallback gap written: {:#}", basename, e),
    }
    Err(err)
}

/// Write `{basename}001: page_height` for a page. Returns the height.
pub fn write_fallback_gap(page: &Path, dirs: &WorkDirs, config: &AppConfig) -> Result<u32> {
    let (_, height) = image::image_dimensions(page)
        .with_context(|| format!("Failed to read dimensions of {:?}", page))?;
    write_gap_json(
        &dirs.image_gaps,
        &file_stem(page),
        &[height as f64],
        config.naming.crop_suffix_length,
    )?;
    Ok(height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirsConfig;
    use crate::layout::{Point, TextBox};
    use crate::storage::artifacts::{read_segment_map, SegmentMap};
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    struct FixedDetector(Vec<TextBox>);

    impl TextDetector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _image_path: &Path) -> Result<Vec<TextBox>> {
            Ok(self.0.clone())
        }
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> TextBox {
        TextBox::new(vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
        .unwrap()
    }

    fn setup() -> (tempfile::TempDir, WorkDirs, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let dirs = WorkDirs::new(root.path(), &DirsConfig::default());
        dirs.create_all().unwrap();
        let page = dirs.image_resized.join("0001_p01.jpg");
        RgbImage::from_pixel(900, 1000, Rgb([255, 255, 255]))
            .save(&page)
            .unwrap();
        (root, dirs, page)
    }

    #[test]
    fn test_process_page_writes_artifacts() {
        let (_root, dirs, page) = setup();
        let config = AppConfig::default();
        let mut detector = FixedDetector(vec![
            rect(100.0, 100.0, 300.0, 130.0),
            rect(100.0, 135.0, 280.0, 160.0),
            rect(600.0, 600.0, 800.0, 640.0),
        ]);

        let outcome = process_page(&mut detector, &page, &dirs, &config).unwrap();
        assert_eq!(outcome, Outcome::Processed);

        assert!(dirs.image_boxed.join("0001_p01.jpg").exists());
        assert!(dirs.image_grouped.join("0001_p01.jpg").exists());
        assert!(dirs.image_crops.join("0001_p01001.jpg").exists());
        assert!(dirs.image_crops.join("0001_p01002.jpg").exists());

        let gaps = read_segment_map(&dirs.image_gaps.join("0001_p01.json")).unwrap();
        assert_eq!(gaps.len(), 2);
        assert!((gaps.values().sum::<f64>() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_process_page_without_text() {
        let (_root, dirs, page) = setup();
        let mut detector = FixedDetector(Vec::new());

        let outcome = process_page(&mut detector, &page, &dirs, &AppConfig::default()).unwrap();
        assert_eq!(outcome, Outcome::Skipped);

        let gaps = read_segment_map(&dirs.image_gaps.join("0001_p01.json")).unwrap();
        assert_eq!(gaps.get("0001_p01001"), Some(&1000.0));
        assert!(!dirs.image_crops.join("0001_p01001.jpg").exists());
    }

    struct BrokenDetector;

    impl TextDetector for BrokenDetector {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn detect(&mut self, _image_path: &Path) -> Result<Vec<TextBox>> {
            anyhow::bail!("detector crashed")
        }
    }

    #[test]
    fn test_detect_page_failure_keeps_page_height() {
        let (_root, dirs, page) = setup();

        let err = detect_page(&mut BrokenDetector, &page, &dirs, &AppConfig::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("detector crashed"));

        let gaps = read_segment_map(&dirs.image_gaps.join("0001_p01.json")).unwrap();
        assert_eq!(gaps, SegmentMap::from([("0001_p01001".to_string(), 1000.0)]));
    }

    #[test]
    fn test_process_page_missing_image() {
        let (_root, dirs, _) = setup();
        let mut detector = FixedDetector(Vec::new());
        let missing = dirs.image_resized.join("missing.jpg");
        assert!(process_page(&mut detector, &missing, &dirs, &AppConfig::default()).is_err());
    }
}
