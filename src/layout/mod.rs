//! Text Layout Engine
//!
//! Turns the raw OCR boxes of one page into bubbles, a reading order and a
//! per-bubble scroll allocation:
//! - Grouping of lines into bubbles by gap distance
//! - Padded bounds and centers per bubble
//! - Greedy top-right-first reading order
//! - Gap allocation that sums exactly to the page height

pub mod gaps;
pub mod geometry;
pub mod grouping;
pub mod order;

pub use gaps::allocate_gaps;
pub use geometry::{BoundingRect, Point, TextBox};
pub use grouping::{bounds_and_centers, group_boxes, Group};
pub use order::order_groups;

use serde::{Deserialize, Serialize};

/// Thresholds shared by the layout stages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Maximum gap distance (px) for two lines to join the same bubble
    pub distance_threshold: f64,
    /// Padding (px) added around each bubble
    pub margin: f64,
    /// Scroll spans shorter than this (px) are merged into the next bubble
    pub min_segment_height: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 32.0,
            margin: 16.0,
            min_segment_height: 96.0,
        }
    }
}

/// Everything computed for one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub groups: Vec<Group>,
    /// Padded bounds, index-aligned with `groups`
    pub bounds: Vec<BoundingRect>,
    /// Centers of the padded bounds, index-aligned with `groups`
    pub centers: Vec<Point>,
    /// Group indices in reading order
    pub order: Vec<usize>,
    /// Scroll span per group, index-aligned with `order`
    pub gaps: Vec<f64>,
}

impl PageLayout {
    /// Padded bounds in reading order
    pub fn ordered_bounds(&self) -> impl Iterator<Item = &BoundingRect> + '_ {
        self.order.iter().map(move |&i| &self.bounds[i])
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Run grouping, ordering and gap allocation for one page
pub fn analyze_page(
    boxes: &[TextBox],
    page_width: f64,
    page_height: f64,
    config: &LayoutConfig,
) -> PageLayout {
    let groups = group_boxes(boxes, config.distance_threshold);
    let (bounds, centers) = bounds_and_centers(boxes, &groups, config.margin);
    let order = order_groups(&centers, &bounds, page_width);
    let gaps = allocate_gaps(&bounds, &order, page_height, config.min_segment_height);

    PageLayout {
        groups,
        bounds,
        centers,
        order,
        gaps,
    }
}

/// Join key for the `ordinal`-th (1-based) bubble of a page
pub fn segment_key(basename: &str, ordinal: usize, suffix_length: usize) -> String {
    format!("{}{:0width$}", basename, ordinal, width = suffix_length)
}
