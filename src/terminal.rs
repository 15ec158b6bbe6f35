use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use crate::downloader::ProgressSnapshot;
use crate::session::{HistoryEntry, Notifier, Outcome};

const BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// Renders a session on the terminal with a single progress bar.
pub struct TerminalNotifier {
    bar: ProgressBar,
}

impl TerminalNotifier {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        match ProgressStyle::with_template(BAR_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=> ")),
            Err(e) => warn!("Invalid progress bar template: {}", e),
        }
        Self { bar }
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for TerminalNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Speed, ETA and filename joined for the bar message.
pub fn status_line(snapshot: &ProgressSnapshot) -> String {
    let mut parts = Vec::new();
    if !snapshot.speed.is_empty() {
        parts.push(snapshot.speed.clone());
    }
    if let Some(eta) = &snapshot.eta {
        parts.push(format!("ETA {}", eta));
    }
    if let Some(filename) = &snapshot.filename {
        parts.push(filename.clone());
    }
    parts.join(" | ")
}

impl Notifier for TerminalNotifier {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.display_percentage().round() as u64);
        self.bar.set_message(status_line(snapshot));
    }

    fn on_outcome(&self, outcome: &Outcome) {
        self.bar.finish_and_clear();
        match outcome {
            Outcome::Success(_) => println!("{}", outcome.message()),
            _ => eprintln!("{}", outcome.message()),
        }
    }

    fn on_history_append(&self, entry: &HistoryEntry) {
        println!(
            "Saved {} [{}] at {}",
            entry.title,
            entry.format,
            entry.downloaded_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}
