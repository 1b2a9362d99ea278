//! Reading order
//!
//! Greedy nearest-successor walk over group centers approximating manga
//! reading order (right to left, top to bottom). The first group is the one
//! closest to the page's top-right corner; every following pick minimizes
//! `3 * |top_y - prev_top_y| + corner_distance`.

use super::geometry::{BoundingRect, Point};

/// Weight of vertical proximity to the previous pick relative to corner distance
pub const VERTICAL_WEIGHT: f64 = 3.0;

/// Euclidean distance from `center` to the top-right corner of a page
pub fn corner_distance(center: Point, page_width: f64) -> f64 {
    (page_width - center.x).hypot(center.y)
}

/// Cost of reading a group next, given how far its top edge is from the
/// previous group's top edge
pub fn priority(corner_distance: f64, y_diff: f64) -> f64 {
    y_diff * VERTICAL_WEIGHT + corner_distance
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    corner_distance: f64,
    top_y: f64,
}

/// Order groups for reading. Returns a permutation of `0..centers.len()`.
///
/// `centers` and `bounds` are index-aligned. Ties are broken in favor of the
/// group nearer the top-right corner, then the lower index.
pub fn order_groups(centers: &[Point], bounds: &[BoundingRect], page_width: f64) -> Vec<usize> {
    if centers.is_empty() {
        return Vec::new();
    }

    let mut ranking: Vec<Candidate> = centers
        .iter()
        .zip(bounds)
        .enumerate()
        .map(|(index, (&center, rect))| Candidate {
            index,
            corner_distance: corner_distance(center, page_width),
            top_y: rect.min_y,
        })
        .collect();
    // Stable, so equal distances keep index order
    ranking.sort_by(|a, b| a.corner_distance.total_cmp(&b.corner_distance));

    let first = ranking.remove(0);
    let mut order = Vec::with_capacity(centers.len());
    order.push(first.index);
    let mut prev_y = first.top_y;

    while !ranking.is_empty() {
        let mut best = 0;
        let mut best_score = f64::INFINITY;
        for (pos, candidate) in ranking.iter().enumerate() {
            let score = priority(candidate.corner_distance, (candidate.top_y - prev_y).abs());
            if score < best_score {
                best = pos;
                best_score = score;
            }
        }

        let next = ranking.remove(best);
        order.push(next.index);
        prev_y = next.top_y;
    }

    order
}
