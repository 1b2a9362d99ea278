//! Bubble text extraction
//!
//! Sends each crop to a vision model as a base64 data URL and stores the
//! recognized lines as `[{"text": ...}, ...]`.

use anyhow::{Context, Result};
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use super::{api_key, with_retry};
use crate::config::{RetryConfig, TextServiceConfig};
use crate::error::ServiceError;
use crate::storage::artifacts::write_json;

/// Seed sent with every request for repeatable answers
pub const SEED: u64 = 42;

/// One recognized line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    #[serde(default)]
    pub text: String,
}

/// Chat completion payload carrying the prompt and the crop
pub fn chat_request(
    config: &TextServiceConfig,
    image_base64: &str,
    temperature: f64,
) -> Value {
    json!({
        "max_tokens": config.max_tokens,
        "model": config.model,
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": config.prompt},
                {
                    "type": "image_url",
                    "image_url": {"url": format!("data:image/jpeg;base64,{}", image_base64)}
                }
            ]
        }],
        "seed": SEED,
        "temperature": temperature,
    })
}

/// `choices[0].message.content` of a chat completion
pub fn response_content(body: &Value) -> Option<&str> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

/// Text between the first `[` and the last `]`, inclusive
pub fn bracketed(content: &str) -> Option<&str> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    (end > start).then(|| &content[start..=end])
}

// Compiled once, shared by every concurrent request
static CONTROL_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1F\x7F]").ok());
static UNEXPECTED_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z\p{Cyrillic}\p{N}\p{P}\p{Z}]").ok());
static TEXT_FIELD_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""text"\s*:\s*"([^"]*)""#).ok());

fn compiled(regex: &'static LazyLock<Option<Regex>>, name: &str) -> Result<&'static Regex> {
    LazyLock::force(regex)
        .as_ref()
        .with_context(|| format!("{} pattern failed to compile", name))
}

/// Strip control characters and anything outside letters, digits,
/// punctuation and spaces
pub fn clean_response(raw: &str) -> Result<String> {
    let control = compiled(&CONTROL_REGEX, "control character")?;
    let unexpected = compiled(&UNEXPECTED_REGEX, "unexpected character")?;
    let cleaned = control.replace_all(raw, "");
    Ok(unexpected.replace_all(&cleaned, "").into_owned())
}

/// Parse model output into text items, falling back to pulling `"text"`
/// values out of malformed JSON
pub fn parse_text_list(raw: &str) -> Result<Vec<TextItem>> {
    let cleaned = clean_response(raw)?;
    if let Ok(items) = serde_json::from_str::<Vec<TextItem>>(&cleaned) {
        return Ok(items);
    }

    let text_field = compiled(&TEXT_FIELD_REGEX, "text field")?;
    let items: Vec<TextItem> = text_field
        .captures_iter(&cleaned)
        .map(|caps| TextItem {
            text: unescape(&caps[1]),
        })
        .collect();

    if items.is_empty() && cleaned.contains("\"text\"") {
        return Ok(vec![TextItem {
            text: String::new(),
        }]);
    }
    Ok(items)
}

fn unescape(value: &str) -> String {
    if !value.contains("\\u") {
        return value.to_string();
    }
    serde_json::from_str::<String>(&format!("\"{}\"", value)).unwrap_or_else(|_| value.to_string())
}

/// Result usable as stage output: non-empty and long enough once serialized
pub fn is_usable(items: &[TextItem], min_size: u64) -> bool {
    !items.is_empty()
        && serde_json::to_string(items)
            .map(|s| s.len() as u64 >= min_size)
            .unwrap_or(false)
}

/// Whether `path` already holds a valid text result
pub fn is_valid_text_file(path: &Path, min_size: u64) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if metadata.len() < min_size {
        return false;
    }
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str::<Vec<TextItem>>(&s).ok())
        .is_some_and(|items| !items.is_empty())
}

async fn request_text(
    client: &reqwest::Client,
    config: &TextServiceConfig,
    image_base64: &str,
    temperature: f64,
) -> Result<Vec<TextItem>> {
    let mut request = client
        .post(&config.endpoint)
        .json(&chat_request(config, image_base64, temperature));
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

    let body: Value = response.json().await.map_err(ServiceError::from)?;
    let unusable = |detail: &str| ServiceError::Response {
        endpoint: config.endpoint.clone(),
        detail: detail.to_string(),
    };
    let content = response_content(&body).ok_or_else(|| unusable("no message content"))?;
    let list = bracketed(content).ok_or_else(|| unusable("no JSON list in content"))?;
    let items = parse_text_list(list)?;
    if !is_usable(&items, config.min_size) {
        return Err(unusable("text result too small").into());
    }
    Ok(items)
}

/// Read the text of one crop into `output`. Returns `false` when a valid
/// result already existed.
pub async fn extract_text(
    client: &reqwest::Client,
    config: &TextServiceConfig,
    retry: &RetryConfig,
    crop: &Path,
    output: &Path,
) -> Result<bool> {
    if is_valid_text_file(output, config.min_size) {
        debug!("Text for {:?} already present", crop);
        return Ok(false);
    }

    let bytes = tokio::fs::read(crop)
        .await
        .with_context(|| format!("Failed to read {:?}", crop))?;
    let image_base64 = base64::engine::general_purpose::STANDARD.encode(bytes);

    let label = format!("Text extraction for {:?}", crop);
    let items = with_retry(retry, &label, |attempt| {
        let temperature = config.temperature + config.temperature_step * attempt as f64;
        request_text(client, config, &image_base64, temperature)
    })
    .await?;

    write_json(output, &items)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(texts: &[&str]) -> Vec<TextItem> {
        texts
            .iter()
            .map(|t| TextItem {
                text: t.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_chat_request_shape() {
        let config = TextServiceConfig::default();
        let body = chat_request(&config, "QUJD", 0.2);
        assert_eq!(body["seed"], 42);
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 2000);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["text"], config.prompt.as_str());
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
    }

    #[test]
    fn test_response_content() {
        let body = json!({"choices": [{"message": {"content": "[{\"text\": \"Hi\"}]"}}]});
        assert_eq!(response_content(&body), Some("[{\"text\": \"Hi\"}]"));
        assert_eq!(response_content(&json!({"choices": []})), None);
    }

    #[test]
    fn test_bracketed() {
        assert_eq!(bracketed("Sure! [{\"text\": \"a\"}] done"), Some("[{\"text\": \"a\"}]"));
        assert_eq!(bracketed("no list here"), None);
        assert_eq!(bracketed("] backwards ["), None);
    }

    #[test]
    fn test_parse_valid_list() {
        let parsed = parse_text_list("[{\"text\": \"Where are you going?\"}, {\"text\": \"Home.\"}]").unwrap();
        assert_eq!(parsed, items(&["Where are you going?", "Home."]));
    }

    #[test]
    fn test_parse_strips_control_characters() {
        let parsed = parse_text_list("[{\"text\": \"Line\none\"}]").unwrap();
        assert_eq!(parsed, items(&["Lineone"]));
    }

    #[test]
    fn test_parse_falls_back_to_regex() {
        // Trailing comma makes this invalid JSON
        let parsed = parse_text_list("[{\"text\": \"First\"}, {\"text\": \"Second\"},]").unwrap();
        assert_eq!(parsed, items(&["First", "Second"]));
    }

    #[test]
    fn test_parse_unusable_output() {
        assert_eq!(parse_text_list("[{\"text\": }]").unwrap(), items(&[""]));
        assert!(parse_text_list("[nothing useful").unwrap().is_empty());
    }

    #[test]
    fn test_parse_keeps_cyrillic() {
        let parsed = parse_text_list("[{\"text\": \"Привет!\"}]").unwrap();
        assert_eq!(parsed, items(&["Привет!"]));
    }

    #[test]
    fn test_patterns_compile_once_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    parse_text_list(&format!("{{\"text\": \"line {}\"}} junk", i)).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap()[0].text, format!("line {}", i));
        }

        let first = compiled(&TEXT_FIELD_REGEX, "text field").unwrap();
        let second = compiled(&TEXT_FIELD_REGEX, "text field").unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(compiled(&CONTROL_REGEX, "control character").is_ok());
        assert!(compiled(&UNEXPECTED_REGEX, "unexpected character").is_ok());
    }

    #[test]
    fn test_is_usable() {
        assert!(!is_usable(&[], 0));
        // `[{"text":""}]` is 13 bytes, `[{"text":"Hi"}]` is 15
        assert!(is_usable(&items(&["Hi"]), 14));
        assert!(!is_usable(&items(&[""]), 14));
    }

    #[test]
    fn test_is_valid_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0001_p01001.json");
        assert!(!is_valid_text_file(&path, 13));

        write_json(&path, &items(&["Hello there"])).unwrap();
        assert!(is_valid_text_file(&path, 13));

        std::fs::write(&path, "[]").unwrap();
        assert!(!is_valid_text_file(&path, 0));
    }
}
