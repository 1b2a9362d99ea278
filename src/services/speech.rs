//! Speech synthesis
//!
//! Turns the extracted lines of a bubble into one narration clip through an
//! OpenAI-compatible `/v1/audio/speech` endpoint.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

use super::{api_key, with_retry};
use crate::config::{RetryConfig, SpeechServiceConfig};
use crate::error::ServiceError;

/// Join extracted lines into one utterance: drop line-break hyphenation,
/// collapse whitespace, capitalize, and cap the length at `2 * max_tokens`
/// characters
pub fn narration_text(lines: &[&str], max_tokens: usize) -> String {
    let joined = lines.join(" ").replace("- ", "");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut chars = collapsed.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };

    capitalized.chars().take(max_tokens * 2).collect()
}

/// Narration text stored in a text result file (`[{"text": ...}]` or
/// `{"text": ...}`)
pub fn read_narration(path: &Path, max_tokens: usize) -> Result<String> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let value: Value =
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))?;

    let lines: Vec<&str> = match &value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect(),
        Value::Object(map) => map.get("text").and_then(Value::as_str).into_iter().collect(),
        _ => Vec::new(),
    };
    Ok(narration_text(&lines, max_tokens))
}

pub fn speech_request(config: &SpeechServiceConfig, text: &str) -> Value {
    let mut body = json!({
        "model": config.model,
        "voice": config.voice,
        "input": text,
        "response_format": config.response_format,
    });
    if !config.instructions.is_empty() {
        body["instructions"] = json!(config.instructions);
    }
    body
}

pub fn is_valid_audio(path: &Path, min_size: u64) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() >= min_size)
        .unwrap_or(false)
}

async fn request_speech(
    client: &reqwest::Client,
    config: &SpeechServiceConfig,
    text: &str,
    output: &Path,
) -> Result<()> {
    let mut request = client.post(&config.endpoint).json(&speech_request(config, text));
    if let Some(key) = api_key(&config.api_key_env) {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(ServiceError::from)?;
    if !response.status().is_success() {
        return Err(ServiceError::Status {
            endpoint: config.endpoint.clone(),
            status: response.status().as_u16(),
        }
        .into());
    }

    let bytes = response.bytes().await.map_err(ServiceError::from)?;
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", output))?;

    if !is_valid_audio(output, config.min_size) {
        return Err(ServiceError::TooSmall {
            path: output.to_path_buf(),
            min_size: config.min_size,
        }
        .into());
    }
    Ok(())
}

/// Synthesize the narration for one text file into `output`. Returns
/// `false` when nothing was done: a valid clip already existed or the
/// text is empty.
pub async fn synthesize(
    client: &reqwest::Client,
    config: &SpeechServiceConfig,
    retry: &RetryConfig,
    text_file: &Path,
    output: &Path,
) -> Result<bool> {
    if is_valid_audio(output, config.min_size) {
        debug!("Audio for {:?} already present", text_file);
        return Ok(false);
    }

    let text = read_narration(text_file, config.max_tokens)?;
    if text.is_empty() {
        debug!("No text in {:?}", text_file);
        return Ok(false);
    }

    let label = format!("Speech for {:?}", text_file);
    with_retry(retry, &label, |_| request_speech(client, config, &text, output)).await?;
    Ok(true)
}
