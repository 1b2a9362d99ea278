//! Pipeline Coordinator
//!
//! Runs the stages that turn a folder of pages into a narrated scroll video:
//! resize, detect, merge, texts, speech, durations, audio and scroll.
//!
//! CPU-bound stages fan pages out to a fixed pool of worker threads fed by a
//! channel; each worker owns its own state (such as an OCR detector) and
//! writes only files named after its own page. HTTP stages run on a tokio
//! runtime with a bounded number of requests in flight. A failed item is
//! recorded in the stage summary and never stops the batch.

pub mod detect;
pub mod soundtrack;

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::scroll::{self, FrameComposer, PageStrip, VideoEncoder};
use crate::services::{self, http_client, run_concurrent};
use crate::storage::artifacts::{self, read_segment_map, SegmentMap};
use crate::storage::{file_stem, list_files, WorkDirs};
use crate::vision::preprocess::resize_page;

/// Page image extensions accepted as input
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff"];

/// Result of one item that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    /// Nothing to do (output already valid, or no input content)
    Skipped,
}

/// Per-stage counts reported at the end of a stage
#[derive(Debug, Clone, Default)]
pub struct StageSummary {
    pub stage: &'static str,
    pub processed: usize,
    pub skipped: usize,
    /// Item name and error message of every failure
    pub failed: Vec<(String, String)>,
}

impl StageSummary {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            ..Default::default()
        }
    }

    pub fn record(&mut self, item: &str, result: Result<Outcome>) {
        match result {
            Ok(Outcome::Processed) => self.processed += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(e) => {
                error!("[{}] {} failed: {:#}", self.stage, item, e);
                self.failed.push((item.to_string(), format!("{:#}", e)));
            }
        }
    }

    #[cfg(test)]
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed.len()
    }

    pub fn log(&self) {
        if self.failed.is_empty() {
            info!(
                "[{}] done: {} processed, {} skipped",
                self.stage, self.processed, self.skipped
            );
        } else {
            warn!(
                "[{}] done: {} processed, {} skipped, {} failed",
                self.stage,
                self.processed,
                self.skipped,
                self.failed.len()
            );
        }
    }
}

/// Process `items` on `workers` threads. `make_worker` builds the
/// per-thread state once; `process` handles one item with it.
pub fn run_workers<W, M, P>(
    stage: &'static str,
    items: Vec<PathBuf>,
    workers: usize,
    make_worker: M,
    process: P,
) -> StageSummary
where
    M: Fn() -> W + Sync,
    P: Fn(&mut W, &Path) -> Result<Outcome> + Sync,
{
    if items.is_empty() {
        info!("[{}] nothing to do", stage);
        return StageSummary::new(stage);
    }

    let summary = Arc::new(Mutex::new(StageSummary::new(stage)));

    let workers = workers.clamp(1, items.len());
    info!("[{}] {} items on {} workers", stage, items.len(), workers);

    let (job_tx, job_rx) = unbounded::<PathBuf>();
    for item in items {
        // Receivers outlive this loop
        let _ = job_tx.send(item);
    }
    drop(job_tx);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let summary = summary.clone();
            let make_worker = &make_worker;
            let process = &process;
            scope.spawn(move || {
                let mut worker = make_worker();
                for path in job_rx.iter() {
                    let result = process(&mut worker, &path);
                    summary.lock().record(&file_stem(&path), result);
                }
            });
        }
    });

    let summary = summary.lock().clone();
    summary.log();
    summary
}

/// Summary over async results collected from `run_concurrent`
fn collect_summary(stage: &'static str, results: Vec<(String, Result<bool>)>) -> StageSummary {
    let mut summary = StageSummary::new(stage);
    for (item, result) in results {
        let outcome = result.map(|written| {
            if written {
                Outcome::Processed
            } else {
                Outcome::Skipped
            }
        });
        summary.record(&item, outcome);
    }
    summary.log();
    summary
}

/// Pages that own at least one `{basename}{ordinal}` key in the gap map.
/// A page without gap entries would shift every later segment.
pub fn pages_in_gap_map(pages: Vec<PathBuf>, gaps: &SegmentMap, suffix_length: usize) -> Vec<PathBuf> {
    pages
        .into_iter()
        .filter(|page| {
            let basename = file_stem(page);
            let owned = gaps.keys().any(|key| {
                key.len() == basename.len() + suffix_length
                    && key.starts_with(&basename)
                    && key[basename.len()..].bytes().all(|b| b.is_ascii_digit())
            });
            if !owned {
                warn!("[scroll] {} has no gap entries; left out of the video", basename);
            }
            owned
        })
        .collect()
}

/// Warn when the gap total and the stacked pages disagree. Returns whether
/// they match.
pub fn check_strip_height(total_gaps: f64, strip_height: u32) -> bool {
    let matches = (total_gaps - strip_height as f64).abs() < 0.5;
    if !matches {
        warn!(
            "[scroll] gaps cover {}px but the pages stack to {}px; scrolling will drift",
            total_gaps, strip_height
        );
    }
    matches
}

/// Pipeline over one working directory
pub struct Pipeline {
    config: Arc<AppConfig>,
    dirs: WorkDirs,
}

impl Pipeline {
    /// Create the pipeline and its working sub-directories
    pub fn new(config: AppConfig, workdir: &Path) -> Result<Self> {
        let dirs = WorkDirs::new(workdir, &config.dirs);
        dirs.create_all()?;
        Ok(Self {
            config: Arc::new(config),
            dirs,
        })
    }

    pub fn dirs(&self) -> &WorkDirs {
        &self.dirs
    }

    fn workers(&self) -> usize {
        self.config.performance.effective_workers()
    }

    /// Scale every source page to the render width
    pub fn resize(&self) -> Result<StageSummary> {
        let pages = list_files(&self.dirs.image, IMAGE_EXTENSIONS)?;
        let output_dir = self.dirs.image_resized.clone();
        let extension = self.config.naming.image_extension.clone();
        let width = self.config.render.width;

        Ok(run_workers("resize", pages, self.workers(), || (), |_, path| {
            let output = output_dir.join(format!("{}{}", file_stem(path), extension));
            resize_page(path, &output, width)?;
            Ok(Outcome::Processed)
        }))
    }

    /// Detect, group, order, crop and allocate gaps for every resized page,
    /// then merge the gap maps
    pub fn detect(&self) -> Result<StageSummary> {
        let pages = list_files(&self.dirs.image_resized, IMAGE_EXTENSIONS)?;
        let config = self.config.clone();
        let dirs = &self.dirs;

        let summary = run_workers(
            "detect",
            pages,
            self.workers(),
            || crate::vision::create_detector(&config.detector),
            |detector, path| detect::detect_page(&mut **detector, path, dirs, &config),
        );

        self.merge()?;
        Ok(summary)
    }

    /// Merge per-page gap maps into `gaps.json`
    pub fn merge(&self) -> Result<f64> {
        artifacts::merge_gap_maps(&self.dirs.image_gaps, &self.dirs.merge, &self.config.naming)
    }

    /// Read the text of every crop
    pub fn texts(&self) -> Result<StageSummary> {
        let crops = list_files(&self.dirs.image_crops, &[self.config.naming.image_extension.as_str()])?;
        let client = http_client()?;
        let config = &self.config;
        let output_dir = &self.dirs.image_text;

        let results = run_concurrent(crops, config.performance.concurrent_requests, |crop| {
            let client = &client;
            async move {
                let key = file_stem(&crop);
                let output = output_dir.join(format!("{}.json", key));
                let result =
                    services::text::extract_text(client, &config.text, &config.retry, &crop, &output).await;
                (key, result)
            }
        })?;

        Ok(collect_summary("texts", results))
    }

    /// Synthesize narration for every text result
    pub fn speech(&self) -> Result<StageSummary> {
        let texts = list_files(&self.dirs.image_text, &["json"])?;
        let client = http_client()?;
        let config = &self.config;
        let output_dir = &self.dirs.image_audio;

        let results = run_concurrent(texts, config.performance.concurrent_requests, |text| {
            let client = &client;
            async move {
                let key = file_stem(&text);
                let output = output_dir.join(format!("{}{}", key, config.naming.audio_extension));
                let result =
                    services::speech::synthesize(client, &config.speech, &config.retry, &text, &output).await;
                (key, result)
            }
        })?;

        Ok(collect_summary("speech", results))
    }

    /// Fit narration clips, add silences and merge durations
    pub fn durations(&self) -> Result<StageSummary> {
        soundtrack::fit_durations(&self.dirs, &self.config, self.workers())
    }

    /// Concatenate fitted clips into the soundtrack
    pub fn audio(&self) -> Result<PathBuf> {
        soundtrack::render_soundtrack(&self.dirs, &self.config)
    }

    /// Render the scroll video and mux it with the soundtrack
    pub fn scroll(&self) -> Result<PathBuf> {
        let naming = &self.config.naming;
        let render = &self.config.render;

        let gaps = read_segment_map(&self.dirs.merge.join(&naming.merged_gaps))
            .context("Gap map missing; run detect first")?;
        let durations = read_segment_map(&self.dirs.merge.join(&naming.merged_durations))
            .context("Durations missing; run durations first")?;

        let timeline = scroll::build_timeline(&gaps, &durations, naming);
        let focus = scroll::plan_focus(&timeline, render);
        info!(
            "[scroll] {} segments, {} frames ({:.1}s)",
            timeline.len(),
            focus.len(),
            focus.len() as f64 / render.fps.max(1) as f64
        );

        let pages = list_files(&self.dirs.image_resized, &[naming.image_extension.as_str()])?;
        let pages = pages_in_gap_map(pages, &gaps, naming.crop_suffix_length);
        let strip = PageStrip::from_paths(&pages)?;
        check_strip_height(gaps.values().sum(), strip.total_height());
        let mut composer = FrameComposer::new(strip, render.width, render.height);

        let video = self.dirs.render.join(&naming.scroll_video);
        let mut encoder = VideoEncoder::spawn(render, &video)?;
        scroll::render_frames(&mut composer, &focus, render, &mut encoder)?;
        encoder.finish()?;

        let audio = self.dirs.render.join(&naming.audio);
        if !audio.exists() {
            warn!("[scroll] no soundtrack at {:?}; video left without audio", audio);
            return Ok(video);
        }

        let media = self.dirs.render.join(&naming.media);
        crate::media::mux(&video, &audio, &media)?;
        info!("[scroll] wrote {:?}", media);
        Ok(media)
    }

    /// Every stage in order
    pub fn run_all(&self) -> Result<()> {
        self.resize()?;
        self.detect()?;
        self.texts()?;
        self.speech()?;
        self.durations()?;
        self.audio()?;
        self.scroll()?;
        Ok(())
    }
}
