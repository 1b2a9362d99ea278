//! Scroll timeline
//!
//! Pairs every segment's scroll distance with its narration duration and
//! expands the result into one focus position per video frame.

use crate::config::{NamingConfig, RenderConfig};
use crate::storage::artifacts::{sort_segments, SegmentMap};

/// One step of the timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub key: String,
    /// Vertical distance the focus point travels (px)
    pub gap: f64,
    /// Time spent on the segment (s); zero moves the focus instantly
    pub duration: f64,
}

/// Easing curve for a scroll step: quadratic start, linear middle,
/// quadratic settle. Input and output are in `[0, 1]`.
pub fn ease(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    let eased = if t < 0.4 {
        2.5 * t * t
    } else if t < 0.8 {
        0.4 + (t - 0.4) * 1.2
    } else {
        let n = ((t - 0.8) / 0.2).max(0.0);
        0.88 + (1.0 - (1.0 - n).powi(2)) * 0.12
    };
    eased.clamp(0.0, 1.0)
}

/// Merge gaps and durations into playback order. Keys with only a
/// duration hold (gap 0); keys with only a gap jump (duration 0).
pub fn build_timeline(gaps: &SegmentMap, durations: &SegmentMap, naming: &NamingConfig) -> Vec<Segment> {
    let mut keys: Vec<String> = gaps.keys().chain(durations.keys()).cloned().collect();
    keys.sort_unstable();
    keys.dedup();
    sort_segments(&mut keys, naming);

    keys.into_iter()
        .map(|key| Segment {
            gap: gaps.get(&key).copied().unwrap_or(0.0),
            duration: durations.get(&key).copied().unwrap_or(0.0),
            key,
        })
        .collect()
}

pub fn frame_count(duration: f64, fps: u32) -> usize {
    if duration <= 0.0 {
        return 0;
    }
    (duration * fps as f64).round() as usize
}

/// Focus positions for the frames of one segment starting at `start`.
/// Returns the positions and the focus after the segment.
pub fn segment_frames(start: f64, segment: &Segment, fps: u32) -> (Vec<f64>, f64) {
    let end = start + segment.gap;
    let frames = frame_count(segment.duration, fps);
    if frames == 0 {
        return (Vec::new(), end);
    }
    if segment.gap.abs() < 1e-6 {
        return (vec![start; frames], start);
    }

    let positions = (0..frames)
        .map(|k| start + ease(k as f64 / frames as f64) * segment.gap)
        .collect();
    (positions, end)
}

/// Focus position of every frame of the video: the intro hold followed by
/// each segment in order
pub fn plan_focus(timeline: &[Segment], render: &RenderConfig) -> Vec<f64> {
    let mut focus = 0.0;
    let mut positions = vec![focus; frame_count(render.hold_duration, render.fps)];

    for segment in timeline {
        let (frames, end) = segment_frames(focus, segment, render.fps);
        positions.extend(frames);
        focus = end;
    }
    positions
}

/// Top row of the viewport for a focus point, kept inside the strip
pub fn viewport_top(focus: f64, render: &RenderConfig, total_height: u32) -> u32 {
    if total_height <= render.height {
        return 0;
    }
    let max_top = (total_height - render.height) as f64;
    let top = focus - render.height as f64 * render.delay_percent;
    top.round().clamp(0.0, max_top) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(key: &str, gap: f64, duration: f64) -> Segment {
        Segment {
            key: key.to_string(),
            gap,
            duration,
        }
    }

    #[test]
    fn test_ease_breakpoints() {
        assert_eq!(ease(0.0), 0.0);
        assert!((ease(0.2) - 0.1).abs() < 1e-12);
        assert!((ease(0.4) - 0.4).abs() < 1e-12);
        assert!((ease(0.6) - 0.64).abs() < 1e-12);
        assert!((ease(0.8) - 0.88).abs() < 1e-12);
        assert!((ease(0.9) - 0.97).abs() < 1e-12);
        assert!((ease(1.0) - 1.0).abs() < 1e-12);
        assert_eq!(ease(1.5), ease(1.0));
        assert_eq!(ease(-0.5), 0.0);
    }

    #[test]
    fn test_ease_is_monotonic() {
        let mut previous = ease(0.0);
        for i in 1..=1000 {
            let value = ease(i as f64 / 1000.0);
            assert!(value >= previous - 1e-12);
            previous = value;
        }
    }

    #[test]
    fn test_build_timeline_order_and_defaults() {
        let naming = NamingConfig::default();
        let gaps = SegmentMap::from([
            ("0001_a001".to_string(), 0.0),
            ("0001_a002".to_string(), 1280.0),
            ("0001_b001".to_string(), 1280.0),
        ]);
        let durations = SegmentMap::from([
            ("0001000".to_string(), 1.0),
            ("0001_a001".to_string(), 2.0),
            ("0001_a002".to_string(), 3.0),
        ]);

        let timeline = build_timeline(&gaps, &durations, &naming);
        assert_eq!(
            timeline,
            vec![
                segment("0001000", 0.0, 1.0),
                segment("0001_a001", 0.0, 2.0),
                segment("0001_a002", 1280.0, 3.0),
                segment("0001_b001", 1280.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_segment_frames_scroll() {
        let (frames, end) = segment_frames(100.0, &segment("k", 200.0, 1.0), 10);
        assert_eq!(frames.len(), 10);
        assert_eq!(frames[0], 100.0);
        assert!((frames[5] - (100.0 + 0.52 * 200.0)).abs() < 1e-9);
        assert!(frames.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(end, 300.0);
    }

    #[test]
    fn test_segment_frames_hold_and_jump() {
        let (frames, end) = segment_frames(50.0, &segment("hold", 0.0, 0.5), 60);
        assert_eq!(frames, vec![50.0; 30]);
        assert_eq!(end, 50.0);

        let (frames, end) = segment_frames(50.0, &segment("jump", 400.0, 0.0), 60);
        assert!(frames.is_empty());
        assert_eq!(end, 450.0);
    }

    #[test]
    fn test_plan_focus_total_frames() {
        let render = RenderConfig {
            fps: 10,
            hold_duration: 2.0,
            ..RenderConfig::default()
        };
        let timeline = vec![
            segment("a", 0.0, 1.0),
            segment("b", 500.0, 0.0),
            segment("c", 300.0, 1.5),
        ];
        let plan = plan_focus(&timeline, &render);
        assert_eq!(plan.len(), 20 + 10 + 15);
        assert!(plan[..30].iter().all(|&f| f == 0.0));
        // Jump applied before the last segment starts
        assert_eq!(plan[30], 500.0);
        assert!(plan[44] < 800.0 && plan[44] > 500.0);
    }

    #[test]
    fn test_viewport_top_clamps() {
        let render = RenderConfig::default();
        // 1280 * 0.42 = 537.6 above the focus
        assert_eq!(viewport_top(0.0, &render, 10_000), 0);
        assert_eq!(viewport_top(1000.0, &render, 10_000), 462);
        assert_eq!(viewport_top(9_999.0, &render, 10_000), 10_000 - 1280);
        assert_eq!(viewport_top(5000.0, &render, 1000), 0);
    }
}
