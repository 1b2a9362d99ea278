//! Application Configuration
//!
//! Pipeline settings stored in TOML format. Every section falls back to its
//! defaults, so a config file only needs the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::layout::LayoutConfig;
use crate::vision::OcrBackend;

/// Default config file name looked up in the working directory
pub const CONFIG_FILENAME: &str = "manrad.toml";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Grouping, padding and gap thresholds
    pub layout: LayoutConfig,
    /// Working sub-directory names
    pub dirs: DirsConfig,
    /// File naming conventions shared by all stages
    pub naming: NamingConfig,
    /// Worker and request limits
    pub performance: PerformanceConfig,
    /// OCR collaborator
    pub detector: DetectorConfig,
    /// Retry policy for HTTP collaborators
    pub retry: RetryConfig,
    /// Vision model text extraction
    pub text: TextServiceConfig,
    /// Text to speech
    pub speech: SpeechServiceConfig,
    /// Audio fitting and silences
    pub audio: AudioConfig,
    /// Scroll video rendering
    pub render: RenderConfig,
}

/// Working sub-directory names, relative to the work dir
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirsConfig {
    pub image: String,
    pub image_resized: String,
    pub image_boxed: String,
    pub image_grouped: String,
    pub image_crops: String,
    pub image_gaps: String,
    pub image_text: String,
    pub image_audio: String,
    pub image_audio_resized: String,
    pub image_durations: String,
    pub merge: String,
    pub render: String,
}

impl Default for DirsConfig {
    fn default() -> Self {
        Self {
            image: "image".to_string(),
            image_resized: "image_resized".to_string(),
            image_boxed: "image_boxed".to_string(),
            image_grouped: "image_grouped".to_string(),
            image_crops: "image_crops".to_string(),
            image_gaps: "image_gaps".to_string(),
            image_text: "image_text".to_string(),
            image_audio: "image_audio".to_string(),
            image_audio_resized: "image_audio_resized".to_string(),
            image_durations: "image_durations".to_string(),
            merge: "merge".to_string(),
            render: "render".to_string(),
        }
    }
}

/// Naming conventions for segment keys and artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Digits of the 1-based crop ordinal appended to a page basename
    pub crop_suffix_length: usize,
    /// Leading characters of a page basename identifying its chapter
    pub prefix_length: usize,
    /// Suffix of the leading silence segment
    pub delay_suffix: String,
    /// Suffix of the silence inserted between chapters
    pub transition_suffix: String,
    /// Suffix of the per-chapter sum in page durations
    pub sum_suffix: String,
    pub image_extension: String,
    pub audio_extension: String,
    pub merged_gaps: String,
    pub total_gaps: String,
    pub merged_durations: String,
    pub total_duration: String,
    pub page_durations: String,
    pub audio_list: String,
    pub audio: String,
    pub scroll_video: String,
    pub media: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            crop_suffix_length: 3,
            prefix_length: 4,
            delay_suffix: "000".to_string(),
            transition_suffix: "999".to_string(),
            sum_suffix: "001".to_string(),
            image_extension: ".jpg".to_string(),
            audio_extension: ".wav".to_string(),
            merged_gaps: "gaps.json".to_string(),
            total_gaps: "total_gaps.txt".to_string(),
            merged_durations: "durations.json".to_string(),
            total_duration: "total_duration.txt".to_string(),
            page_durations: "page_durations.json".to_string(),
            audio_list: "audio_list.txt".to_string(),
            audio: "audio.opus".to_string(),
            scroll_video: "scroll_video.mkv".to_string(),
            media: "ManRad.mkv".to_string(),
        }
    }
}

/// Performance-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Page workers for CPU-bound stages (capped by available cores)
    pub workers: usize,
    /// In-flight HTTP requests for service stages
    pub concurrent_requests: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            concurrent_requests: 60,
        }
    }
}

impl PerformanceConfig {
    /// Worker count actually used: at least one, at most the core count
    pub fn effective_workers(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.workers.clamp(1, cores.max(1))
    }
}

/// OCR collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub backend: OcrBackend,
    /// Directory holding `{basename}.json` box files (defaults to the image dir)
    pub sidecar_dir: Option<String>,
    /// External detector program; the image path is appended to `args`
    pub command: String,
    pub args: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Sidecar,
            sidecar_dir: None,
            command: "paddleocr-detect".to_string(),
            args: Vec::new(),
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per item
    pub retries: u32,
    /// Base pause in seconds; attempt `n` waits `pause * 2^n`
    pub pause_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            pause_secs: 10.0,
        }
    }
}

/// Vision model used to read text from crops
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextServiceConfig {
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Added to the temperature after each failed attempt
    pub temperature_step: f64,
    /// Minimum serialized size for a text result to count as valid
    pub min_size: u64,
}

impl Default for TextServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepinfra.com/v1/openai/chat/completions".to_string(),
            api_key_env: "DEEPINFRA_API_KEY".to_string(),
            model: "meta-llama/Llama-4-Scout-17B-16E-Instruct".to_string(),
            prompt: "Proofread this text in English but only fix grammar without any \
                     introductory phrases or additional commentary. If no readable text is \
                     found, the text content is empty. Return JSON: [{\"text\": \"text content\"}, ...]"
                .to_string(),
            max_tokens: 2000,
            temperature: 0.0,
            temperature_step: 0.2,
            min_size: 13,
        }
    }
}

/// Speech synthesis endpoint (OpenAI compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechServiceConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub model: String,
    pub voice: String,
    pub response_format: String,
    pub instructions: String,
    /// Text is truncated to twice this many characters
    pub max_tokens: usize,
    /// Minimum audio file size in bytes for a result to count as valid
    pub min_size: u64,
}

impl Default for SpeechServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/speech".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "tts-1".to_string(),
            voice: "sage".to_string(),
            response_format: "wav".to_string(),
            instructions: String::new(),
            max_tokens: 2000,
            min_size: 78,
        }
    }
}

/// Audio fitting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Narration shorter than this (seconds) is padded with silence
    pub target_segment_duration: f64,
    /// Leading silence before the first chapter (0 disables)
    pub delay_duration: f64,
    /// Silence between chapters (0 disables)
    pub transition_duration: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            target_segment_duration: 1.0,
            delay_duration: 1.0,
            transition_duration: 0.5,
        }
    }
}

/// Scroll video settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub fps: u32,
    /// Frame width; also the width pages are resized to
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Fraction of the frame height kept above the focus point
    pub delay_percent: f64,
    /// Intro hold on the first frame (seconds)
    pub hold_duration: f64,
    pub encoder: String,
    pub encoder_args: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            width: 900,
            height: 1280,
            delay_percent: 0.42,
            hold_duration: 2.0,
            encoder: "libx264".to_string(),
            encoder_args: vec![
                "-preset".to_string(),
                "medium".to_string(),
                "-crf".to_string(),
                "18".to_string(),
                "-pix_fmt".to_string(),
                "yuv420p".to_string(),
            ],
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolve which config file to use: an explicit path, then `manrad.toml`
/// in the work dir, then the user config dir. `None` means defaults.
pub fn find_config(explicit: Option<&Path>, workdir: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = workdir.join(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }

    crate::storage::get_config_dir()
        .ok()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|path| path.exists())
}

/// Load the resolved config, or defaults when no file exists
pub fn load_or_default(explicit: Option<&Path>, workdir: &Path) -> Result<AppConfig> {
    match find_config(explicit, workdir) {
        Some(path) => {
            let config = load_config(&path)
                .with_context(|| format!("Failed to load config {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None => {
            tracing::info!("Using default configuration");
            Ok(AppConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Layout defaults
        assert_eq!(config.layout.distance_threshold, 32.0);
        assert_eq!(config.layout.margin, 16.0);
        assert_eq!(config.layout.min_segment_height, 96.0);

        // Naming defaults
        assert_eq!(config.naming.crop_suffix_length, 3);
        assert_eq!(config.naming.prefix_length, 4);
        assert_eq!(config.naming.merged_gaps, "gaps.json");

        // Performance defaults
        assert_eq!(config.performance.workers, 6);
        assert_eq!(config.performance.concurrent_requests, 60);

        // Render defaults
        assert_eq!(config.render.fps, 60);
        assert!((config.render.delay_percent - 0.42).abs() < 1e-9);
        assert_eq!(config.detector.backend, OcrBackend::Sidecar);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.layout, parsed.layout);
        assert_eq!(config.dirs.image_crops, parsed.dirs.image_crops);
        assert_eq!(config.retry.retries, parsed.retry.retries);
        assert_eq!(config.render.encoder_args, parsed.render.encoder_args);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [layout]
            margin = 8.0

            [detector]
            backend = "command"
            command = "detect-boxes"
        "#;
        let parsed: AppConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(parsed.layout.margin, 8.0);
        assert_eq!(parsed.layout.distance_threshold, 32.0);
        assert_eq!(parsed.detector.backend, OcrBackend::Command);
        assert_eq!(parsed.detector.command, "detect-boxes");
        assert_eq!(parsed.audio.sample_rate, 48000);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.performance.workers = 2;
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.performance.workers, 2);
        assert_eq!(loaded.naming.audio_extension, ".wav");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/manrad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_prefers_workdir_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        save_config(&AppConfig::default(), &path).unwrap();

        assert_eq!(find_config(None, dir.path()), Some(path.clone()));

        let explicit = dir.path().join("other.toml");
        assert_eq!(find_config(Some(&explicit), dir.path()), Some(explicit));
    }

    #[test]
    fn test_effective_workers_bounds() {
        let zero = PerformanceConfig {
            workers: 0,
            concurrent_requests: 1,
        };
        assert_eq!(zero.effective_workers(), 1);

        let many = PerformanceConfig {
            workers: 10_000,
            concurrent_requests: 1,
        };
        assert!(many.effective_workers() >= 1);
        assert!(many.effective_workers() <= 10_000);
    }
}
