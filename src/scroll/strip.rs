//! Virtual page strip
//!
//! Pages are stacked top to bottom into one tall strip that is never
//! materialized. Frames are composed from only the pages that intersect
//! the viewport, with a small cache of decoded pages.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Decoded pages kept around; a viewport rarely spans more than two
const CACHE_SIZE: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct StripPage {
    pub path: PathBuf,
    pub height: u32,
    /// Offset of the page's first row in the strip
    pub top: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PageStrip {
    pages: Vec<StripPage>,
    total_height: u32,
}

impl PageStrip {
    /// Stack pages in the given order, reading only their headers
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut heights = Vec::with_capacity(paths.len());
        for path in paths {
            let (_, height) = image::image_dimensions(path)
                .with_context(|| format!("Failed to read dimensions of {:?}", path))?;
            heights.push((path.clone(), height));
        }
        Ok(Self::from_heights(heights))
    }

    pub fn from_heights(pages: Vec<(PathBuf, u32)>) -> Self {
        let mut strip = Self::default();
        for (path, height) in pages {
            strip.pages.push(StripPage {
                path,
                height,
                top: strip.total_height,
            });
            strip.total_height += height;
        }
        strip
    }

    #[cfg(test)]
    pub fn pages(&self) -> &[StripPage] {
        &self.pages
    }

    pub fn total_height(&self) -> u32 {
        self.total_height
    }

    /// Pages intersecting rows `[top, top + height)`
    pub fn visible(&self, top: u32, height: u32) -> impl Iterator<Item = &StripPage> + '_ {
        let bottom = top.saturating_add(height);
        let first = self
            .pages
            .partition_point(|page| page.top + page.height <= top);
        self.pages[first..]
            .iter()
            .take_while(move |page| page.top < bottom)
            .filter(|page| page.height > 0)
    }
}

/// Builds viewport frames from a strip
pub struct FrameComposer {
    strip: PageStrip,
    width: u32,
    height: u32,
    cache: VecDeque<(PathBuf, RgbImage)>,
}

impl FrameComposer {
    pub fn new(strip: PageStrip, width: u32, height: u32) -> Self {
        Self {
            strip,
            width,
            height,
            cache: VecDeque::with_capacity(CACHE_SIZE),
        }
    }

    pub fn strip(&self) -> &PageStrip {
        &self.strip
    }

    fn page(&mut self, path: &Path) -> Result<&RgbImage> {
        if let Some(pos) = self.cache.iter().position(|(p, _)| p == path) {
            if let Some(entry) = self.cache.remove(pos) {
                self.cache.push_back(entry);
            }
        } else {
            let image = image::open(path)
                .with_context(|| format!("Failed to open {:?}", path))?
                .into_rgb8();
            if self.cache.len() == CACHE_SIZE {
                self.cache.pop_front();
            }
            self.cache.push_back((path.to_path_buf(), image));
        }

        self.cache
            .back()
            .map(|(_, image)| image)
            .context("page cache is empty")
    }

    /// Frame showing strip rows `[top, top + height)`. Pages narrower than
    /// the frame are padded with black, wider ones are cut on the right.
    pub fn compose(&mut self, top: u32) -> Result<RgbImage> {
        let mut frame = RgbImage::from_pixel(self.width, self.height, Rgb([0, 0, 0]));
        let bottom = top + self.height;

        let visible: Vec<StripPage> = self.strip.visible(top, self.height).cloned().collect();
        for page in visible {
            let src_start = top.saturating_sub(page.top);
            let src_end = (bottom - page.top).min(page.height);
            if src_end <= src_start {
                continue;
            }
            let dest_y = page.top.saturating_sub(top);
            let width = self.width;

            let image = self.page(&page.path)?;
            let copy_width = width.min(image.width());
            let copy_height = (src_end - src_start).min(image.height().saturating_sub(src_start));
            if copy_width == 0 || copy_height == 0 {
                continue;
            }

            let part = image::imageops::crop_imm(image, 0, src_start, copy_width, copy_height).to_image();
            image::imageops::replace(&mut frame, &part, 0, dest_y as i64);
        }

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_page(dir: &Path, name: &str, width: u32, height: u32, value: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_strip_offsets() {
        let strip = PageStrip::from_heights(vec![
            (PathBuf::from("a"), 100),
            (PathBuf::from("b"), 50),
            (PathBuf::from("c"), 200),
        ]);
        let tops: Vec<u32> = strip.pages().iter().map(|p| p.top).collect();
        assert_eq!(tops, vec![0, 100, 150]);
        assert_eq!(strip.total_height(), 350);
    }

    #[test]
    fn test_strip_visible_pages() {
        let strip = PageStrip::from_heights(vec![
            (PathBuf::from("a"), 100),
            (PathBuf::from("b"), 50),
            (PathBuf::from("c"), 200),
        ]);
        let names = |top, height| -> Vec<String> {
            strip
                .visible(top, height)
                .map(|p| p.path.to_string_lossy().into_owned())
                .collect()
        };
        assert_eq!(names(0, 100), vec!["a"]);
        assert_eq!(names(90, 20), vec!["a", "b"]);
        assert_eq!(names(100, 300), vec!["b", "c"]);
        assert_eq!(names(340, 100), vec!["c"]);
    }

    #[test]
    fn test_from_paths_reads_heights() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_page(dir.path(), "a.png", 10, 30, 0);
        let b = write_page(dir.path(), "b.png", 10, 20, 0);
        let strip = PageStrip::from_paths(&[a, b]).unwrap();
        assert_eq!(strip.total_height(), 50);
        assert_eq!(strip.pages()[1].top, 30);
    }

    #[test]
    fn test_compose_spans_page_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_page(dir.path(), "a.png", 8, 10, 50);
        let b = write_page(dir.path(), "b.png", 8, 10, 200);
        let strip = PageStrip::from_paths(&[a, b]).unwrap();

        let mut composer = FrameComposer::new(strip, 8, 6);
        let frame = composer.compose(7).unwrap();
        assert_eq!(frame.dimensions(), (8, 6));
        // Rows 7..10 from the first page, 10..13 from the second
        assert_eq!(frame.get_pixel(0, 2)[0], 50);
        assert_eq!(frame.get_pixel(0, 3)[0], 200);
        assert_eq!(frame.get_pixel(7, 5)[0], 200);
    }

    #[test]
    fn test_compose_pads_narrow_pages() {
        let dir = tempfile::tempdir().unwrap();
        let narrow = write_page(dir.path(), "narrow.png", 4, 10, 255);
        let strip = PageStrip::from_paths(&[narrow]).unwrap();

        let mut composer = FrameComposer::new(strip, 8, 10);
        let frame = composer.compose(0).unwrap();
        assert_eq!(frame.get_pixel(3, 0)[0], 255);
        assert_eq!(frame.get_pixel(4, 0)[0], 0);
    }

    #[test]
    fn test_compose_below_content_is_black() {
        let dir = tempfile::tempdir().unwrap();
        let page = write_page(dir.path(), "p.png", 4, 4, 255);
        let strip = PageStrip::from_paths(&[page]).unwrap();

        let mut composer = FrameComposer::new(strip, 4, 8);
        let frame = composer.compose(0).unwrap();
        assert_eq!(frame.get_pixel(0, 3)[0], 255);
        assert_eq!(frame.get_pixel(0, 4)[0], 0);
    }
}
