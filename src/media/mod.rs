//! Media tooling
//!
//! Thin wrappers around `ffprobe` and `ffmpeg` for fitting narration to a
//! minimum length, generating silences, concatenating the soundtrack and
//! muxing the final video. Command lines are built by separate functions
//! so they can be inspected without running anything.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;

use crate::error::CommandError;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// Run a command to completion, mapping spawn failures and non-zero exits
/// to `CommandError`
pub fn run(cmd: &mut Command) -> Result<Output, CommandError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!("Running {:?}", cmd);

    let output = cmd.output().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(CommandError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// `ffmpeg` with overwrite and quiet logging
pub fn ffmpeg() -> Command {
    let mut cmd = Command::new(FFMPEG);
    cmd.arg("-y").arg("-hide_banner").arg("-loglevel").arg("error");
    cmd
}

pub fn probe_command(path: &Path) -> Command {
    let mut cmd = Command::new(FFPROBE);
    cmd.arg("-hide_banner")
        .arg("-v").arg("quiet")
        .arg("-i").arg(path)
        .arg("-show_entries").arg("format=duration")
        .arg("-of").arg("csv=p=0");
    cmd
}

/// Parse ffprobe's `csv=p=0` duration output
pub fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Duration of a media file in seconds; unreadable files report 0
pub fn probe_duration(path: &Path) -> f64 {
    match run(&mut probe_command(path)) {
        Ok(output) => parse_duration(&String::from_utf8_lossy(&output.stdout)).unwrap_or(0.0),
        Err(e) => {
            debug!("Could not probe {:?}: {}", path, e);
            0.0
        }
    }
}

/// How a narration clip is brought to the minimum segment length
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitAction {
    /// Append this much silence
    Pad(f64),
    /// Long enough already; resample only
    Copy,
    /// Unreadable or empty; replace with silence
    Silence,
}

pub fn fit_action(duration: f64, target: f64) -> FitAction {
    if duration > 0.0 && duration < target {
        FitAction::Pad(target - duration)
    } else if duration >= target && duration > 0.0 {
        FitAction::Copy
    } else {
        FitAction::Silence
    }
}

pub fn silence_command(duration: f64, output: &Path, sample_rate: u32) -> Command {
    let mut cmd = ffmpeg();
    cmd.arg("-f").arg("lavfi")
        .arg("-i").arg(format!("anullsrc=r={}:cl=mono", sample_rate))
        .arg("-t").arg(duration.to_string())
        .arg("-c:a").arg("pcm_s16le")
        .arg(output);
    cmd
}

pub fn pad_command(extra: f64, input: &Path, output: &Path, sample_rate: u32) -> Command {
    let mut cmd = ffmpeg();
    cmd.arg("-i").arg(input)
        .arg("-ar").arg(sample_rate.to_string())
        .arg("-ac").arg("1")
        .arg("-af").arg(format!("apad=pad_dur={}", extra))
        .arg("-c:a").arg("pcm_s16le")
        .arg(output);
    cmd
}

pub fn copy_command(input: &Path, output: &Path, sample_rate: u32) -> Command {
    let mut cmd = ffmpeg();
    cmd.arg("-i").arg(input)
        .arg("-ar").arg(sample_rate.to_string())
        .arg("-ac").arg("1")
        .arg("-c:a").arg("pcm_s16le")
        .arg(output);
    cmd
}

/// Write `duration` seconds of mono silence
pub fn create_silence(duration: f64, output: &Path, sample_rate: u32) -> Result<()> {
    run(&mut silence_command(duration, output, sample_rate))?;
    Ok(())
}

/// Bring a narration clip to at least `target` seconds.
/// Returns the duration of the written clip.
pub fn fit_audio(input: &Path, output: &Path, sample_rate: u32, target: f64) -> Result<f64> {
    let duration = probe_duration(input);
    let action = fit_action(duration, target);
    debug!("{:?}: {:.3}s -> {:?}", input, duration, action);

    match action {
        FitAction::Pad(extra) => {
            run(&mut pad_command(extra, input, output, sample_rate))?;
            Ok(target)
        }
        FitAction::Copy => {
            run(&mut copy_command(input, output, sample_rate))?;
            Ok(duration)
        }
        FitAction::Silence => {
            create_silence(target, output, sample_rate)?;
            Ok(target)
        }
    }
}

/// ffmpeg concat demuxer list for `paths`, in order
pub fn concat_list<P: AsRef<Path>>(paths: &[P]) -> String {
    paths
        .iter()
        .map(|p| {
            let path = p.as_ref().to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", path)
        })
        .collect()
}

pub fn write_concat_list<P: AsRef<Path>>(paths: &[P], list_path: &Path) -> Result<()> {
    let absolute: Vec<_> = paths
        .iter()
        .map(|p| std::path::absolute(p.as_ref()))
        .collect::<std::io::Result<_>>()?;
    std::fs::write(list_path, concat_list(&absolute))
        .with_context(|| format!("Failed to write {:?}", list_path))
}

pub fn render_audio_command(list_path: &Path, output: &Path, sample_rate: u32) -> Command {
    let mut cmd = ffmpeg();
    cmd.arg("-f").arg("concat")
        .arg("-safe").arg("0")
        .arg("-i").arg(list_path)
        .arg("-ar").arg(sample_rate.to_string())
        .arg("-c:a").arg("libopus")
        .arg("-vbr").arg("on")
        .arg("-compression_level").arg("10")
        .arg("-frame_duration").arg("60")
        .arg(output);
    cmd
}

/// Concatenate the list into one Opus soundtrack
pub fn render_audio(list_path: &Path, output: &Path, sample_rate: u32) -> Result<()> {
    run(&mut render_audio_command(list_path, output, sample_rate))?;
    Ok(())
}

pub fn mux_command(video: &Path, audio: &Path, output: &Path) -> Command {
    let mut cmd = ffmpeg();
    cmd.arg("-i").arg(video)
        .arg("-i").arg(audio)
        .arg("-c").arg("copy")
        .arg(output);
    cmd
}

/// Combine the scroll video and the soundtrack without re-encoding
pub fn mux(video: &Path, audio: &Path, output: &Path) -> Result<()> {
    run(&mut mux_command(video, audio, output))?;
    Ok(())
}

/// Arguments of a command as strings
#[cfg(test)]
pub fn args_of(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}
