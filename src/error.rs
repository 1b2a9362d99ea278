//! Error types for the pipeline seams
//!
//! Stage code wraps these in `anyhow` with context; the typed variants exist
//! so callers can tell a skipped page from a broken toolchain.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid geometry handed to the layout engine
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("text box polygon has no points")]
    EmptyPolygon,
}

/// Failure running an external tool (ffmpeg, ffprobe, OCR command)
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("could not parse output of `{program}`: {detail}")]
    Output { program: String, detail: String },
    #[error("pipe to `{program}` closed unexpectedly: {source}")]
    BrokenPipe {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure talking to an HTTP collaborator
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request to {endpoint} failed with status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("unusable response from {endpoint}: {detail}")]
    Response { endpoint: String, detail: String },
    #[error("output {path:?} is smaller than {min_size} bytes")]
    TooSmall { path: PathBuf, min_size: u64 },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
