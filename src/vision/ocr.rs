//! OCR collaborators
//!
//! Text-line detection is delegated to PaddleOCR-compatible tools. The
//! sidecar backend reads detections produced ahead of time, the command
//! backend runs a detector per page.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{parse_detections, TextDetector};
use crate::error::CommandError;
use crate::layout::TextBox;
use crate::media::run;
use crate::storage::file_stem;

/// Reads `{basename}.json` from a sidecar directory, or from the image's
/// own directory when none is configured
pub struct SidecarDetector {
    dir: Option<PathBuf>,
}

impl SidecarDetector {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Location of the detections for an image
    pub fn sidecar_path(&self, image_path: &Path) -> PathBuf {
        let dir = match &self.dir {
            Some(dir) => dir.as_path(),
            None => image_path.parent().unwrap_or_else(|| Path::new(".")),
        };
        dir.join(format!("{}.json", file_stem(image_path)))
    }
}

impl TextDetector for SidecarDetector {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    fn detect(&mut self, image_path: &Path) -> Result<Vec<TextBox>> {
        let path = self.sidecar_path(image_path);
        if !path.exists() {
            debug!("No detections at {:?}", path);
            return Ok(Vec::new());
        }

        let content =
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        parse_detections(&content).with_context(|| format!("Invalid detections in {:?}", path))
    }
}

/// Runs `program [args..] <image>` and parses detections from stdout
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }

    pub fn command(&self, image_path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(image_path);
        cmd
    }
}

impl TextDetector for CommandDetector {
    fn name(&self) -> &'static str {
        "command"
    }

    fn detect(&mut self, image_path: &Path) -> Result<Vec<TextBox>> {
        let output = run(&mut self.command(image_path))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }

        let boxes = parse_detections(&stdout).map_err(|e| CommandError::Output {
            program: self.program.clone(),
            detail: e.to_string(),
        })?;
        Ok(boxes)
    }
}
