//! Stage artifacts
//!
//! Every stage hands data to the next through small JSON maps keyed by
//! segment key (`{page basename}{ordinal:03}`). Maps are written with sorted
//! keys and tab indentation so reruns produce identical bytes.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{list_files, NaturalKey};
use crate::config::{AudioConfig, NamingConfig};
use crate::layout::segment_key;

/// Segment key to value (gap in pixels or duration in seconds)
pub type SegmentMap = BTreeMap<String, f64>;

/// Serialize `value` as tab-indented JSON
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    std::fs::write(path, buf).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

pub fn read_segment_map(path: &Path) -> Result<SegmentMap> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let map = serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))?;
    Ok(map)
}

/// Write the gap map of one page: one entry per group in reading order,
/// keyed by 1-based ordinal
pub fn write_gap_json(
    output_dir: &Path,
    basename: &str,
    gaps: &[f64],
    suffix_length: usize,
) -> Result<PathBuf> {
    let map: SegmentMap = gaps
        .iter()
        .enumerate()
        .map(|(i, &gap)| (segment_key(basename, i + 1, suffix_length), gap))
        .collect();

    let path = output_dir.join(format!("{}.json", basename));
    write_json(&path, &map)?;
    Ok(path)
}

/// Write a single `{key: duration}` map
pub fn write_duration_json(output_dir: &Path, key: &str, duration: f64) -> Result<PathBuf> {
    let map = SegmentMap::from([(key.to_string(), duration)]);
    let path = output_dir.join(format!("{}.json", key));
    write_json(&path, &map)?;
    Ok(path)
}

/// Union of every JSON map in `input_dir`. Unreadable files are skipped.
pub fn merge_segment_maps(input_dir: &Path) -> Result<SegmentMap> {
    let mut merged = SegmentMap::new();
    for path in list_files(input_dir, &["json"])? {
        match read_segment_map(&path) {
            Ok(map) => merged.extend(map),
            Err(e) => warn!("Skipping {:?}: {:#}", path, e),
        }
    }
    Ok(merged)
}

fn write_total(path: &Path, total: f64) -> Result<()> {
    std::fs::write(path, total.to_string()).with_context(|| format!("Failed to write {:?}", path))
}

/// Merge per-page gap maps into `gaps.json` and write their sum.
/// Returns the total height covered.
pub fn merge_gap_maps(gaps_dir: &Path, merge_dir: &Path, naming: &NamingConfig) -> Result<f64> {
    let merged = merge_segment_maps(gaps_dir)?;
    let total: f64 = merged.values().sum();

    write_json(&merge_dir.join(&naming.merged_gaps), &merged)?;
    write_total(&merge_dir.join(&naming.total_gaps), total)?;

    info!("Merged {} gap entries, total height {}", merged.len(), total);
    Ok(total)
}

/// Merge per-segment duration maps into `durations.json`, write the total
/// and the per-page sums
pub fn merge_durations(
    durations_dir: &Path,
    merge_dir: &Path,
    naming: &NamingConfig,
) -> Result<SegmentMap> {
    let merged = merge_segment_maps(durations_dir)?;
    let total: f64 = merged.values().sum();

    write_json(&merge_dir.join(&naming.merged_durations), &merged)?;
    write_total(&merge_dir.join(&naming.total_duration), total)?;
    write_json(
        &merge_dir.join(&naming.page_durations),
        &page_durations(&merged, naming),
    )?;

    info!("Merged {} durations, total {:.2}s", merged.len(), total);
    Ok(merged)
}

/// Kind of a segment key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SegmentKind {
    /// Leading silence of the first chapter
    Delay,
    /// One narrated bubble
    Narration,
    /// Silence after a chapter
    Transition,
}

/// Chapter prefix of a segment key
pub fn key_prefix(key: &str, prefix_length: usize) -> String {
    key.chars().take(prefix_length).collect()
}

pub fn classify(key: &str, naming: &NamingConfig) -> SegmentKind {
    let suffix: String = key.chars().skip(naming.prefix_length).collect();
    if suffix == naming.delay_suffix {
        SegmentKind::Delay
    } else if suffix == naming.transition_suffix {
        SegmentKind::Transition
    } else {
        SegmentKind::Narration
    }
}

/// Order segment keys for playback: by chapter prefix, then delay, then
/// narration in natural order, then transition
pub fn sort_segments(keys: &mut [String], naming: &NamingConfig) {
    keys.sort_by_cached_key(|key| {
        (
            NaturalKey::new(&key_prefix(key, naming.prefix_length)),
            classify(key, naming),
            NaturalKey::new(key),
        )
    });
}

/// Narration durations summed per chapter under `{prefix}{sum_suffix}`;
/// delay and transition entries pass through
pub fn page_durations(durations: &SegmentMap, naming: &NamingConfig) -> SegmentMap {
    let mut pages = SegmentMap::new();
    for (key, &value) in durations {
        match classify(key, naming) {
            SegmentKind::Delay | SegmentKind::Transition => {
                pages.insert(key.clone(), value);
            }
            SegmentKind::Narration => {
                let sum_key = format!("{}{}", key_prefix(key, naming.prefix_length), naming.sum_suffix);
                *pages.entry(sum_key).or_insert(0.0) += value;
            }
        }
    }
    pages
}

/// Silence segments to add around sorted narration keys: one delay before
/// the first chapter and one transition after every chapter that is
/// followed by another
pub fn silence_segments(
    narration_keys: &[String],
    naming: &NamingConfig,
    audio: &AudioConfig,
) -> Vec<(String, f64)> {
    let mut silences = Vec::new();

    if audio.delay_duration > 0.0 {
        if let Some(first) = narration_keys.first() {
            let key = format!("{}{}", key_prefix(first, naming.prefix_length), naming.delay_suffix);
            silences.push((key, audio.delay_duration));
        }
    }

    if audio.transition_duration > 0.0 {
        for pair in narration_keys.windows(2) {
            let previous = key_prefix(&pair[0], naming.prefix_length);
            if key_prefix(&pair[1], naming.prefix_length) != previous {
                let key = format!("{}{}", previous, naming.transition_suffix);
                debug!("Transition after chapter {}", previous);
                silences.push((key, audio.transition_duration));
            }
        }
    }

    silences
}
