//! HTTP Services
//!
//! Clients for the remote collaborators of the narration stages:
//! - Vision model reading bubble text from crops (OpenAI-compatible chat)
//! - Text to speech (OpenAI-compatible audio endpoint)
//!
//! Requests run on a tokio runtime with a bounded number in flight. Every
//! request is retried with exponential backoff.

pub mod speech;
pub mod text;

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Delay before retrying after failed attempt `attempt` (0-based):
/// `pause * 2^attempt`
pub fn backoff_delay(pause_secs: f64, attempt: u32) -> Duration {
    let factor = 2f64.powi(attempt.min(30) as i32);
    Duration::from_secs_f64((pause_secs * factor).max(0.0))
}

/// API key from the environment; missing or blank means no auth header
pub fn api_key(env_var: &str) -> Option<String> {
    std::env::var(env_var)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")
}

/// Run `op` until it succeeds or the attempts run out. `op` receives the
/// 0-based attempt number.
pub async fn with_retry<T, F, Fut>(retry: &RetryConfig, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = retry.retries.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < attempts => {
                let delay = backoff_delay(retry.pause_secs, attempt);
                warn!(
                    "{} attempt {}/{} failed: {:#}; retrying in {:?}",
                    label,
                    attempt + 1,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!("{} failed after {} attempts", label, attempts)));
            }
        }
    }
}

/// Drive `task` over `items` with at most `limit` futures in flight,
/// blocking until all complete. Results come back in completion order.
pub fn run_concurrent<I, T, F, Fut>(items: Vec<I>, limit: usize, task: F) -> Result<Vec<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T>,
{
    let rt = Runtime::new().context("Failed to create tokio runtime")?;
    debug!("Running {} requests, {} in flight", items.len(), limit.max(1));

    let results = rt.block_on(async {
        stream::iter(items)
            .map(task)
            .buffer_unordered(limit.max(1))
            .collect::<Vec<T>>()
            .await
    });
    Ok(results)
}
