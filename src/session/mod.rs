//! The download session: one in-flight download, its progress and its teardown.

mod channel;
pub mod controller;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::downloader::{DownloadRequest, MediaFormat, ProgressSnapshot};

pub use controller::SessionController;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Cancelling,
}

/// How a session ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "lowercase")]
pub enum Outcome {
    Success(String),
    Failure(String),
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Text for a toast or status line.
    pub fn message(&self) -> String {
        match self {
            Outcome::Success(message) => message.clone(),
            Outcome::Failure(detail) => format!("Error: {}", detail),
            Outcome::Cancelled => "Download canceled".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub title: String,
    pub format: MediaFormat,
    pub url: String,
    pub downloaded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Titles come from the reported filename; the URL stands in when there was none.
    pub fn new(filename: Option<&str>, request: &DownloadRequest) -> Self {
        let title = filename
            .and_then(|name| Path::new(name).file_stem())
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| request.url.trim().to_string());

        Self {
            title,
            format: request.format,
            url: request.url.trim().to_string(),
            downloaded_at: Utc::now(),
        }
    }
}

/// Presentation side of a session.
///
/// `on_progress` is called while the session lock is held and must not call back
/// into the controller.
pub trait Notifier: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
    fn on_outcome(&self, outcome: &Outcome);
    fn on_history_append(&self, entry: &HistoryEntry);
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
    fn on_outcome(&self, _outcome: &Outcome) {}
    fn on_history_append(&self, _entry: &HistoryEntry) {}
}
