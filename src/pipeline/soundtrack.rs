//! Narration timing and soundtrack assembly

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{run_workers, Outcome, StageSummary};
use crate::config::{AppConfig, NamingConfig};
use crate::media::{create_silence, fit_audio, render_audio, write_concat_list};
use crate::storage::artifacts::{
    merge_durations, read_segment_map, silence_segments, sort_segments, write_duration_json,
};
use crate::storage::{file_stem, list_files, WorkDirs};

/// Fit every narration clip to the minimum segment duration, add the
/// delay and transition silences, then merge all durations
pub fn fit_durations(dirs: &WorkDirs, config: &AppConfig, workers: usize) -> Result<StageSummary> {
    let naming = &config.naming;
    let audio = &config.audio;
    let clips = list_files(&dirs.image_audio, &[naming.audio_extension.as_str()])?;

    let mut narration_keys: Vec<String> = clips.iter().map(|clip| file_stem(clip)).collect();
    sort_segments(&mut narration_keys, naming);

    let mut summary = run_workers("durations", clips, workers, || (), |_, clip| {
        let key = file_stem(clip);
        let output = dirs
            .image_audio_resized
            .join(format!("{}{}", key, naming.audio_extension));
        let duration = fit_audio(clip, &output, audio.sample_rate, audio.target_segment_duration)?;
        write_duration_json(&dirs.image_durations, &key, duration)?;
        Ok(Outcome::Processed)
    });

    for (key, duration) in silence_segments(&narration_keys, naming, audio) {
        let output = dirs
            .image_audio_resized
            .join(format!("{}{}", key, naming.audio_extension));
        let result = create_silence(duration, &output, audio.sample_rate)
            .and_then(|_| write_duration_json(&dirs.image_durations, &key, duration))
            .map(|_| Outcome::Processed);
        summary.record(&key, result);
    }

    merge_durations(&dirs.image_durations, &dirs.merge, naming)?;
    Ok(summary)
}

/// Fitted clips for every merged duration key in playback order. Keys
/// without a clip on disk are returned separately.
pub fn soundtrack_clips(
    keys: impl IntoIterator<Item = String>,
    clips_dir: &Path,
    naming: &NamingConfig,
) -> (Vec<PathBuf>, Vec<String>) {
    let mut keys: Vec<String> = keys.into_iter().collect();
    sort_segments(&mut keys, naming);

    let mut clips = Vec::with_capacity(keys.len());
    let mut missing = Vec::new();
    for key in keys {
        let path = clips_dir.join(format!("{}{}", key, naming.audio_extension));
        if path.is_file() {
            clips.push(path);
        } else {
            missing.push(key);
        }
    }
    (clips, missing)
}

/// Concatenate the fitted clips into the final soundtrack
pub fn render_soundtrack(dirs: &WorkDirs, config: &AppConfig) -> Result<PathBuf> {
    let naming = &config.naming;
    let durations = read_segment_map(&dirs.merge.join(&naming.merged_durations))?;

    let (clips, missing) = soundtrack_clips(durations.into_keys(), &dirs.image_audio_resized, naming);
    for key in &missing {
        warn!("[audio] no clip for {}; left out of the soundtrack", key);
    }
    if clips.is_empty() {
        bail!("No fitted clips in {:?}; run durations first", dirs.image_audio_resized);
    }

    let list = dirs.merge.join(&naming.audio_list);
    write_concat_list(&clips, &list)?;

    let output = dirs.render.join(&naming.audio);
    render_audio(&list, &output, config.audio.sample_rate)?;
    info!("[audio] {} clips -> {:?}", clips.len(), output);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirsConfig;
    use crate::storage::artifacts::SegmentMap;

    fn workdirs() -> (tempfile::TempDir, WorkDirs) {
        let root = tempfile::tempdir().unwrap();
        let dirs = WorkDirs::new(root.path(), &DirsConfig::default());
        dirs.create_all().unwrap();
        (root, dirs)
    }

    #[test]
    fn test_soundtrack_clips_order() {
        let (_root, dirs) = workdirs();
        let naming = NamingConfig::default();
        for key in ["0001000", "0001_p01001", "0001_p02001", "0001999", "0002_p01001"] {
            std::fs::write(dirs.image_audio_resized.join(format!("{}.wav", key)), b"RIFF").unwrap();
        }

        let keys = ["0002_p01001", "0001999", "0001_p02001", "0001000", "0001_p01001", "0002_p01002"]
            .map(String::from);
        let (clips, missing) = soundtrack_clips(keys, &dirs.image_audio_resized, &naming);

        let names: Vec<String> = clips.iter().map(|p| file_stem(p)).collect();
        assert_eq!(
            names,
            vec!["0001000", "0001_p01001", "0001_p02001", "0001999", "0002_p01001"]
        );
        assert_eq!(missing, vec!["0002_p01002".to_string()]);
    }

    #[test]
    fn test_fit_durations_without_clips() {
        let (_root, dirs) = workdirs();
        let config = AppConfig::default();

        let summary = fit_durations(&dirs, &config, 2).unwrap();
        assert_eq!(summary.total(), 0);

        let merged = read_segment_map(&dirs.merge.join(&config.naming.merged_durations)).unwrap();
        assert_eq!(merged, SegmentMap::new());
    }

    #[test]
    fn test_render_soundtrack_requires_clips() {
        let (_root, dirs) = workdirs();
        let config = AppConfig::default();
        crate::storage::artifacts::write_json(
            &dirs.merge.join(&config.naming.merged_durations),
            &SegmentMap::from([("0001_p01001".to_string(), 1.0)]),
        )
        .unwrap();

        let err = render_soundtrack(&dirs, &config).unwrap_err();
        assert!(err.to_string().contains("No fitted clips"));
    }
}
