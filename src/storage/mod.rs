//! Storage Layer
//!
//! Working directory layout, file listing and the JSON artifacts exchanged
//! between pipeline stages.

pub mod artifacts;

use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::config::DirsConfig;

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "manrad", "ManRad")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Resolved working sub-directories
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub root: PathBuf,
    pub image: PathBuf,
    pub image_resized: PathBuf,
    pub image_boxed: PathBuf,
    pub image_grouped: PathBuf,
    pub image_crops: PathBuf,
    pub image_gaps: PathBuf,
    pub image_text: PathBuf,
    pub image_audio: PathBuf,
    pub image_audio_resized: PathBuf,
    pub image_durations: PathBuf,
    pub merge: PathBuf,
    pub render: PathBuf,
}

impl WorkDirs {
    pub fn new(root: &Path, dirs: &DirsConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            image: root.join(&dirs.image),
            image_resized: root.join(&dirs.image_resized),
            image_boxed: root.join(&dirs.image_boxed),
            image_grouped: root.join(&dirs.image_grouped),
            image_crops: root.join(&dirs.image_crops),
            image_gaps: root.join(&dirs.image_gaps),
            image_text: root.join(&dirs.image_text),
            image_audio: root.join(&dirs.image_audio),
            image_audio_resized: root.join(&dirs.image_audio_resized),
            image_durations: root.join(&dirs.image_durations),
            merge: root.join(&dirs.merge),
            render: root.join(&dirs.render),
        }
    }

    fn all(&self) -> [&PathBuf; 12] {
        [
            &self.image,
            &self.image_resized,
            &self.image_boxed,
            &self.image_grouped,
            &self.image_crops,
            &self.image_gaps,
            &self.image_text,
            &self.image_audio,
            &self.image_audio_resized,
            &self.image_durations,
            &self.merge,
            &self.render,
        ]
    }

    /// Create every sub-directory
    pub fn create_all(&self) -> Result<()> {
        for dir in self.all() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        Ok(())
    }
}

/// One chunk of a natural sort key
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyPart {
    Number(u128),
    Text(String),
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Number(a), KeyPart::Number(b)) => a.cmp(b),
            (KeyPart::Text(a), KeyPart::Text(b)) => a.cmp(b),
            (KeyPart::Number(_), KeyPart::Text(_)) => Ordering::Less,
            (KeyPart::Text(_), KeyPart::Number(_)) => Ordering::Greater,
        }
    }
}

/// Case-insensitive key where digit runs compare numerically
/// (`page2` sorts before `page10`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<KeyPart>);

impl NaturalKey {
    pub fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for c in lower.chars() {
            let digit = c.is_ascii_digit();
            if !current.is_empty() && digit != in_digits {
                parts.push(Self::part(std::mem::take(&mut current), in_digits));
            }
            in_digits = digit;
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(Self::part(current, in_digits));
        }

        Self(parts)
    }

    fn part(chunk: String, digits: bool) -> KeyPart {
        match chunk.parse::<u128>() {
            Ok(n) if digits => KeyPart::Number(n),
            _ => KeyPart::Text(chunk),
        }
    }
}

/// File stem as an owned string
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// List files in `dir` whose extension matches one of `extensions`
/// (lowercase, with or without the leading dot), in natural order of
/// their file names. A missing directory lists as empty.
pub fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {:?}", dir))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if wanted.iter().any(|w| *w == ext) {
            files.push(path);
        }
    }

    files.sort_by_cached_key(|p| {
        NaturalKey::new(&p.file_name().map(|n| n.to_string_lossy()).unwrap_or_default())
    });
    Ok(files)
}
