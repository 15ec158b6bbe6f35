pub mod cache;
pub mod progress;
pub mod ytdlp;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::broadcast;

use crate::errors::{AppError, Result};
use progress::ProgressLine;

pub use ytdlp::YtDlpBackend;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// Video with audio, muxed into mp4.
    #[default]
    Mp4,
    /// Audio only, extracted to mp3.
    Mp3,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Best,
    Normal,
    Custom,
}

impl MediaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mp3 => "mp3",
        }
    }
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::Normal => "normal",
            Quality::Custom => "custom",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mp4" | "video" => Ok(MediaFormat::Mp4),
            "mp3" | "audio" => Ok(MediaFormat::Mp3),
            other => Err(AppError::Validation(format!("Unknown format: {}", other))),
        }
    }
}

impl FromStr for Quality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Quality::Best),
            "normal" => Ok(Quality::Normal),
            "custom" => Ok(Quality::Custom),
            other => Err(AppError::Validation(format!("Unknown quality: {}", other))),
        }
    }
}

/// A single download as submitted by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub format: MediaFormat,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Progress of the active download as last reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProgressSnapshot {
    pub percentage: f32,
    pub speed: String,
    pub eta: Option<String>,
    pub filename: Option<String>,
}

impl ProgressSnapshot {
    /// Percentage clamped for rendering. The stored value is left untouched.
    pub fn display_percentage(&self) -> f32 {
        if self.percentage.is_nan() {
            return 0.0;
        }
        self.percentage.clamp(0.0, 100.0)
    }

    /// Merges one parsed line of backend output, keeping fields the line doesn't carry.
    pub fn apply_line(&mut self, line: ProgressLine) {
        match line {
            ProgressLine::Progress { percentage, speed, eta } => {
                self.percentage = percentage;
                if let Some(speed) = speed {
                    self.speed = speed;
                }
                if eta.is_some() {
                    self.eta = eta;
                }
            }
            ProgressLine::Filename(filename) => {
                self.filename = Some(filename);
            }
        }
    }
}

/// Scoped handle on the backend's progress event stream.
///
/// Dropping the handle unsubscribes.
pub struct ProgressSubscription {
    receiver: broadcast::Receiver<ProgressSnapshot>,
}

impl ProgressSubscription {
    pub fn new(receiver: broadcast::Receiver<ProgressSnapshot>) -> Self {
        Self { receiver }
    }

    /// Waits for the next event. Returns `None` once the backend closes the stream.
    pub async fn recv(&mut self) -> Option<ProgressSnapshot> {
        loop {
            match self.receiver.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Only the latest state matters.
                    log::debug!("Progress subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The command surface of whatever performs the actual download.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Performs the whole download, resolving with a user-facing message.
    async fn start_download(&self, request: &DownloadRequest) -> Result<String>;
    async fn cancel_download(&self) -> Result<()>;
    /// Last-known progress. Zeroed when nothing has run yet.
    async fn query_progress(&self) -> Result<ProgressSnapshot>;
    async fn subscribe_progress(&self) -> Result<ProgressSubscription>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_percentage_is_clamped() {
        let mut snapshot = ProgressSnapshot::default();
        snapshot.percentage = 104.2;
        assert_eq!(snapshot.display_percentage(), 100.0);
        snapshot.percentage = -3.0;
        assert_eq!(snapshot.display_percentage(), 0.0);
        snapshot.percentage = f32::NAN;
        assert_eq!(snapshot.display_percentage(), 0.0);
        snapshot.percentage = 42.5;
        assert_eq!(snapshot.display_percentage(), 42.5);
    }

    #[test]
    fn apply_line_keeps_fields_the_line_lacks() {
        let mut snapshot = ProgressSnapshot::default();
        snapshot.apply_line(ProgressLine::Progress {
            percentage: 12.0,
            speed: Some("1.00MiB/s".to_string()),
            eta: Some("00:10".to_string()),
        });
        snapshot.apply_line(ProgressLine::Progress {
            percentage: 20.0,
            speed: None,
            eta: None,
        });
        snapshot.apply_line(ProgressLine::Filename("clip.mp4".to_string()));

        assert_eq!(snapshot.percentage, 20.0);
        assert_eq!(snapshot.speed, "1.00MiB/s");
        assert_eq!(snapshot.eta.as_deref(), Some("00:10"));
        assert_eq!(snapshot.filename.as_deref(), Some("clip.mp4"));
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: DownloadRequest = serde_json::from_str(
            r#"{"url": "https://youtu.be/abc", "format": "mp3"}"#,
        )
        .unwrap();
        assert_eq!(request.format, MediaFormat::Mp3);
        assert_eq!(request.quality, Quality::Best);
        assert!(request.output_dir.is_none());
    }

    #[test]
    fn format_and_quality_parse_from_ui_values() {
        assert_eq!("mp3".parse::<MediaFormat>().unwrap(), MediaFormat::Mp3);
        assert_eq!("Video".parse::<MediaFormat>().unwrap(), MediaFormat::Mp4);
        assert_eq!("normal".parse::<Quality>().unwrap(), Quality::Normal);
        assert!("flac".parse::<MediaFormat>().is_err());
        assert!("ultra".parse::<Quality>().is_err());
    }

    #[tokio::test]
    async fn subscription_ends_when_sender_is_dropped() {
        let (tx, rx) = broadcast::channel(4);
        let mut subscription = ProgressSubscription::new(rx);
        tx.send(ProgressSnapshot { percentage: 5.0, ..Default::default() }).unwrap();
        drop(tx);

        assert_eq!(subscription.recv().await.map(|s| s.percentage), Some(5.0));
        assert!(subscription.recv().await.is_none());
    }
}
