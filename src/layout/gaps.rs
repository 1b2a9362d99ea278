//! Scroll gap allocation
//!
//! Turns the top edges of the ordered groups into one vertical span per
//! group. Spans below the minimum segment height are carried forward into
//! the next group, and the result always sums to the page height.

use super::geometry::BoundingRect;

/// Allocate the page height across ordered groups.
///
/// `gaps[i]` is the vertical span attributed to the `i`-th group in reading
/// order: the first gap is the space above the first group, interior gaps
/// are successive top-edge deltas, and the last gap also takes the space
/// below the last group. With no groups the whole page is one segment.
pub fn allocate_gaps(
    bounds: &[BoundingRect],
    order: &[usize],
    page_height: f64,
    min_segment: f64,
) -> Vec<f64> {
    if order.is_empty() {
        return vec![page_height];
    }

    let tops: Vec<f64> = order.iter().map(|&i| bounds[i].min_y).collect();

    let mut gaps = Vec::with_capacity(tops.len());
    gaps.push(tops[0]);
    for pair in tops.windows(2) {
        gaps.push(pair[1] - pair[0]);
    }
    if let (Some(last), Some(&last_top)) = (gaps.last_mut(), tops.last()) {
        *last += page_height - last_top;
    }

    let mut carry = 0.0;
    for gap in gaps.iter_mut() {
        *gap += carry;
        carry = 0.0;
        if *gap < min_segment {
            carry = *gap;
            *gap = 0.0;
        }
    }
    if carry > 0.0 {
        if let Some(last) = gaps.last_mut() {
            *last += carry;
        }
    }

    for gap in gaps.iter_mut() {
        *gap = gap.max(0.0);
    }

    // Out-of-order tops can leave more than the page after clamping; trim
    // the excess from the end so no gap turns negative
    let mut excess = gaps.iter().sum::<f64>() - page_height;
    for gap in gaps.iter_mut().rev() {
        if excess <= 0.0 {
            break;
        }
        let taken = gap.min(excess);
        *gap -= taken;
        excess -= taken;
    }

    let total: f64 = gaps.iter().sum();
    if total != page_height {
        if let Some(last) = gaps.last_mut() {
            *last += page_height - total;
        }
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tops(values: &[f64]) -> Vec<BoundingRect> {
        values
            .iter()
            .map(|&y| BoundingRect {
                min_x: 0.0,
                min_y: y,
                max_x: 100.0,
                max_y: y + 40.0,
            })
            .collect()
    }

    fn identity(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn test_gaps_empty_is_full_page() {
        assert_eq!(allocate_gaps(&[], &[], 1000.0, 96.0), vec![1000.0]);
    }

    #[test]
    fn test_gaps_single_group() {
        let bounds = tops(&[420.0]);
        assert_eq!(allocate_gaps(&bounds, &[0], 1000.0, 96.0), vec![1000.0]);
    }

    #[test]
    fn test_gaps_stacked_groups() {
        // Tops 100, 100, 500: raw gaps 100, 0 and 400 + 500 trailing
        let bounds = tops(&[100.0, 100.0, 500.0]);
        let gaps = allocate_gaps(&bounds, &identity(3), 1000.0, 50.0);
        assert_eq!(gaps, vec![100.0, 0.0, 900.0]);
        assert_eq!(gaps.iter().sum::<f64>(), 1000.0);
    }

    #[test]
    fn test_gaps_small_first_gap_carries_forward() {
        let bounds = tops(&[30.0, 100.0, 900.0]);
        let gaps = allocate_gaps(&bounds, &identity(3), 1000.0, 96.0);
        assert_eq!(gaps, vec![0.0, 100.0, 900.0]);
    }

    #[test]
    fn test_gaps_carry_accumulates_until_threshold() {
        let bounds = tops(&[40.0, 80.0, 120.0, 400.0]);
        let gaps = allocate_gaps(&bounds, &identity(4), 1000.0, 96.0);
        // 40 -> carried, 40+40=80 -> carried, 80+40=120 kept
        assert_eq!(gaps, vec![0.0, 0.0, 120.0, 880.0]);
    }

    #[test]
    fn test_gaps_trailing_small_gap_absorbed_by_last() {
        let bounds = tops(&[500.0, 980.0, 990.0]);
        let gaps = allocate_gaps(&bounds, &identity(3), 1000.0, 96.0);
        assert_eq!(gaps, vec![500.0, 480.0, 20.0]);
        assert_eq!(gaps.iter().sum::<f64>(), 1000.0);
    }

    #[test]
    fn test_gaps_follow_reading_order() {
        // Reading order goes back up the page
        let bounds = tops(&[800.0, 100.0, 50.0]);
        let gaps = allocate_gaps(&bounds, &[0, 1, 2], 1000.0, 96.0);
        assert_eq!(gaps, vec![800.0, 0.0, 200.0]);
        assert!(gaps.iter().all(|&g| g >= 0.0));
    }

    #[test]
    fn test_gaps_negative_top_from_margin() {
        let bounds = tops(&[-11.0, 300.0]);
        let gaps = allocate_gaps(&bounds, &[0, 1], 1000.0, 96.0);
        assert!(gaps.iter().all(|&g| g >= 0.0));
        assert_eq!(gaps.iter().sum::<f64>(), 1000.0);
    }

    #[test]
    fn test_gaps_sum_invariant() {
        let page_height = 1280.0;
        for seed in 0..50usize {
            let count = seed % 9 + 1;
            let values: Vec<f64> = (0..count)
                .map(|i| (((seed + 3) * (i + 7) * 97) % 1400) as f64 - 60.0)
                .collect();
            let bounds = tops(&values);
            let order: Vec<usize> = (0..count).rev().collect();
            for min_segment in [0.0, 48.0, 96.0, 2000.0] {
                let gaps = allocate_gaps(&bounds, &order, page_height, min_segment);
                assert_eq!(gaps.len(), count);
                assert_eq!(gaps.iter().sum::<f64>(), page_height);
                assert!(gaps.iter().all(|&g| g >= 0.0), "{:?}", gaps);
            }
        }
    }

    #[test]
    fn test_gaps_out_of_order_tops_stay_non_negative() {
        // Right column read first, then a left bubble higher up the page
        let bounds = tops(&[852.0, 76.0, 700.0, 1324.0, 548.0, 1172.0]);
        let gaps = allocate_gaps(&bounds, &identity(6), 1280.0, 0.0);
        assert_eq!(gaps, vec![852.0, 0.0, 0.0, 428.0, 0.0, 0.0]);
    }

    #[test]
    fn test_gaps_all_below_threshold() {
        let bounds = tops(&[10.0, 20.0, 30.0]);
        let gaps = allocate_gaps(&bounds, &identity(3), 1000.0, 5000.0);
        assert_eq!(gaps, vec![0.0, 0.0, 1000.0]);
    }
}
