//! Parsing of yt-dlp's `--newline --progress` output.

use once_cell::sync::Lazy;
use regex::Regex;

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("percent pattern is valid"));
static SPEED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bat\s+(\S+/s)").expect("speed pattern is valid"));
static ETA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bETA\s+([^\s\]]+)").expect("eta pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    Progress {
        percentage: f32,
        speed: Option<String>,
        eta: Option<String>,
    },
    Filename(String),
}

/// Recognizes the two kinds of lines that carry progress information.
///
/// Destination lines are tagged `[download]` too, so they are checked first.
pub fn parse_line(line: &str) -> Option<ProgressLine> {
    if let Some(index) = line.find("Destination:") {
        let filename = line[index + "Destination:".len()..].trim();
        if filename.is_empty() {
            return None;
        }
        return Some(ProgressLine::Filename(filename.to_string()));
    }

    if !line.contains("[download]") {
        return None;
    }

    let percentage = PERCENT
        .captures(line)
        .and_then(|caps| caps[1].parse::<f32>().ok())?;
    let speed = SPEED.captures(line).map(|caps| caps[1].to_string());
    let eta = ETA.captures(line).map(|caps| caps[1].to_string());

    Some(ProgressLine::Progress { percentage, speed, eta })
}
