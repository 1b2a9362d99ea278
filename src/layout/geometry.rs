//! Box geometry
//!
//! Polygons reported by OCR, their axis-aligned bounds, and the gap metric
//! used to decide whether two text lines belong to the same bubble.

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// A point in page pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle given by its min and max corners
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingRect {
    /// Smallest rectangle containing every point. `None` for an empty slice.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let init = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };

        Some(iter.fold(init, |r, p| Self {
            min_x: r.min_x.min(p.x),
            min_y: r.min_y.min(p.y),
            max_x: r.max_x.max(p.x),
            max_y: r.max_y.max(p.y),
        }))
    }

    /// Grow the rectangle outward by `margin` on all four sides
    pub fn expand(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// Midpoint of the min and max corners
    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Separation between two rectangles: zero on an axis where the
    /// intervals overlap or touch, otherwise the distance between the
    /// nearer edges. The result is the Euclidean norm of both axes.
    pub fn gap_to(&self, other: &BoundingRect) -> f64 {
        let dx = (self.min_x - other.max_x)
            .max(other.min_x - self.max_x)
            .max(0.0);
        let dy = (self.min_y - other.max_y)
            .max(other.min_y - self.max_y)
            .max(0.0);
        dx.hypot(dy)
    }
}

/// One OCR-detected text line as a polygon (usually a quadrilateral)
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    points: Vec<Point>,
    bounds: BoundingRect,
}

impl TextBox {
    /// Build a box from its polygon. Empty polygons are rejected so every
    /// constructed box has well-defined bounds.
    pub fn new(points: Vec<Point>) -> Result<Self, LayoutError> {
        let bounds = BoundingRect::from_points(&points).ok_or(LayoutError::EmptyPolygon)?;
        Ok(Self { points, bounds })
    }

    /// Axis-aligned rectangle from two corners
    #[cfg(test)]
    pub fn from_rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let points = vec![
            Point::new(min_x, min_y),
            Point::new(max_x, min_y),
            Point::new(max_x, max_y),
            Point::new(min_x, max_y),
        ];
        let bounds = BoundingRect {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        };
        Self { points, bounds }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Bounds of the polygon, computed once from its points
    pub fn bounds(&self) -> BoundingRect {
        self.bounds
    }
}

/// Bounds of a single box as `(min_x, min_y, max_x, max_y)`
pub fn bounds(text_box: &TextBox) -> BoundingRect {
    text_box.bounds()
}

/// Gap distance between two boxes. Zero when their bounds overlap on both
/// axes, growing with separation otherwise.
pub fn gap_distance(a: &TextBox, b: &TextBox) -> f64 {
    bounds(a).gap_to(&bounds(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(points: [(f64, f64); 4]) -> TextBox {
        TextBox::new(points.iter().map(|&p| Point::from(p)).collect()).unwrap()
    }

    #[test]
    fn test_bounds_of_skewed_quad() {
        let b = quad([(10.0, 5.0), (40.0, 7.0), (38.0, 20.0), (8.0, 18.0)]);
        let r = bounds(&b);
        assert_eq!(r.min_x, 8.0);
        assert_eq!(r.min_y, 5.0);
        assert_eq!(r.max_x, 40.0);
        assert_eq!(r.max_y, 20.0);
    }

    #[test]
    fn test_empty_polygon_rejected() {
        let result = TextBox::new(vec![]);
        assert!(matches!(result, Err(LayoutError::EmptyPolygon)));
    }

    #[test]
    fn test_single_point_box() {
        let b = TextBox::new(vec![Point::new(3.0, 4.0)]).unwrap();
        let r = b.bounds();
        assert_eq!((r.min_x, r.min_y, r.max_x, r.max_y), (3.0, 4.0, 3.0, 4.0));
    }

    #[test]
    fn test_gap_distance_overlapping_is_zero() {
        let a = TextBox::from_rect(0.0, 0.0, 50.0, 20.0);
        let b = TextBox::from_rect(30.0, 10.0, 90.0, 40.0);
        assert_eq!(gap_distance(&a, &b), 0.0);
    }

    #[test]
    fn test_gap_distance_offset_but_overlapping_is_zero() {
        // Centers are far apart but the rectangles still overlap
        let a = TextBox::from_rect(0.0, 0.0, 100.0, 10.0);
        let b = TextBox::from_rect(95.0, 5.0, 400.0, 300.0);
        assert_eq!(gap_distance(&a, &b), 0.0);
    }

    #[test]
    fn test_gap_distance_touching_is_zero() {
        let a = TextBox::from_rect(0.0, 0.0, 10.0, 10.0);
        let b = TextBox::from_rect(10.0, 0.0, 20.0, 10.0);
        assert_eq!(gap_distance(&a, &b), 0.0);
    }

    #[test]
    fn test_gap_distance_single_axis() {
        let a = TextBox::from_rect(0.0, 0.0, 10.0, 10.0);
        let b = TextBox::from_rect(0.0, 25.0, 10.0, 30.0);
        assert_eq!(gap_distance(&a, &b), 15.0);
    }

    #[test]
    fn test_gap_distance_diagonal() {
        let a = TextBox::from_rect(0.0, 0.0, 10.0, 10.0);
        let b = TextBox::from_rect(13.0, 14.0, 20.0, 20.0);
        assert!((gap_distance(&a, &b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_distance_symmetric() {
        let boxes = [
            TextBox::from_rect(0.0, 0.0, 10.0, 10.0),
            TextBox::from_rect(13.0, 14.0, 20.0, 20.0),
            TextBox::from_rect(-50.0, 5.0, -20.0, 8.0),
            quad([(100.0, 100.0), (140.0, 96.0), (142.0, 120.0), (99.0, 125.0)]),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(gap_distance(a, b), gap_distance(b, a));
            }
        }
    }

    #[test]
    fn test_rect_expand_and_center() {
        let r = BoundingRect {
            min_x: 10.0,
            min_y: 20.0,
            max_x: 30.0,
            max_y: 60.0,
        };
        let padded = r.expand(16.0);
        assert_eq!(padded.min_x, -6.0);
        assert_eq!(padded.max_y, 76.0);
        assert_eq!(padded.center(), Point::new(20.0, 40.0));
        assert_eq!(padded.width(), 52.0);
        assert_eq!(padded.height(), 72.0);
    }
}
