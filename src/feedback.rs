//! Append-only feedback log.
//!
//! One JSON object per line:
//! `{"timestamp": "<RFC 3339 UTC>", "issue": "...", "tool_name": "..."}`,
//! with `tool_name` omitted when not given.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("failed to write feedback log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode feedback entry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub timestamp: String,
    pub issue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl FeedbackEntry {
    /// Entry stamped with the current time. An empty `tool_name` counts as
    /// absent.
    pub fn new(issue: impl Into<String>, tool_name: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            issue: issue.into(),
            tool_name: tool_name.filter(|t| !t.is_empty()).map(String::from),
        }
    }
}

/// Append one entry to the log at `path`, creating the file if needed.
pub fn record(path: &Path, entry: &FeedbackEntry) -> Result<(), FeedbackError> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let io_err = |source| FeedbackError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(line.as_bytes()).map_err(io_err)?;

    tracing::info!(
        path = %path.display(),
        tool_name = entry.tool_name.as_deref().unwrap_or("-"),
        "feedback recorded"
    );
    Ok(())
}
