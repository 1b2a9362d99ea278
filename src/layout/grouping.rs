//! Text line grouping
//!
//! Clusters OCR lines into bubbles: two lines are linked when their gap
//! distance is within the threshold, and each connected component of that
//! graph becomes one group.

use super::geometry::{gap_distance, BoundingRect, Point, TextBox};

/// Indices into the page's box list belonging to one bubble
pub type Group = Vec<usize>;

/// Partition `boxes` into connected components under
/// `gap_distance <= max_distance`.
///
/// Groups come out in order of their lowest-index member, so the result is
/// stable with respect to input order. Members within a group are listed in
/// depth-first discovery order.
pub fn group_boxes(boxes: &[TextBox], max_distance: f64) -> Vec<Group> {
    let count = boxes.len();
    if count == 0 {
        return Vec::new();
    }

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); count];
    for i in 0..count {
        for j in (i + 1)..count {
            if gap_distance(&boxes[i], &boxes[j]) <= max_distance {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    let mut visited = vec![false; count];
    let mut groups = Vec::new();
    let mut stack = Vec::new();

    for start in 0..count {
        if visited[start] {
            continue;
        }

        let mut group = Vec::new();
        stack.push(start);
        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            group.push(node);
            // Reverse push keeps the same visit order as a recursive walk
            for &neighbor in adjacency[node].iter().rev() {
                if !visited[neighbor] {
                    stack.push(neighbor);
                }
            }
        }
        groups.push(group);
    }

    groups
}

/// Padded bounds and centers for each group, index-aligned with `groups`.
///
/// The rectangle covers every point of every member box, expanded by
/// `margin` on all sides; the center is the midpoint of the padded rect.
pub fn bounds_and_centers(
    boxes: &[TextBox],
    groups: &[Group],
    margin: f64,
) -> (Vec<BoundingRect>, Vec<Point>) {
    groups
        .iter()
        .map(|group| {
            let rect = BoundingRect::from_points(group.iter().flat_map(|&i| boxes[i].points()))
                .unwrap_or_default()
                .expand(margin);
            (rect, rect.center())
        })
        .unzip()
}
