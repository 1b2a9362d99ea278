//! Scroll Video
//!
//! Renders the pages as one continuous vertical scroll synchronized with the
//! narration: every segment scrolls the focus point by its gap over the
//! length of its audio.

pub mod encoder;
pub mod strip;
pub mod timeline;

pub use encoder::VideoEncoder;
pub use strip::{FrameComposer, PageStrip};
pub use timeline::{build_timeline, plan_focus, viewport_top};

use anyhow::Result;
use image::RgbImage;
use tracing::debug;

use crate::config::RenderConfig;

/// Destination for composed frames
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;
}

/// Compose and emit one frame per focus position. Consecutive frames with
/// the same viewport are composed once. Returns the number of frames.
pub fn render_frames<S: FrameSink>(
    composer: &mut FrameComposer,
    focus: &[f64],
    render: &RenderConfig,
    sink: &mut S,
) -> Result<u64> {
    let total_height = composer.strip().total_height();
    let mut current: Option<(u32, RgbImage)> = None;
    let mut written = 0;

    for &point in focus {
        let top = viewport_top(point, render, total_height);
        let frame = match current.take() {
            Some((last_top, frame)) if last_top == top => frame,
            _ => composer.compose(top)?,
        };
        sink.write_frame(&frame)?;
        written += 1;
        current = Some((top, frame));
    }

    debug!("Rendered {} frames over {}px", written, total_height);
    Ok(written)
}
