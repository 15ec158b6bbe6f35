use crate::downloader::DownloadRequest;
use crate::errors::{AppError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

// Scheme optional, host must be YouTube, path must be non-empty.
static VIDEO_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:(?:www|m|music)\.)?(?:youtube\.com|youtu\.be)/\S+$")
        .expect("video URL pattern is valid")
});

pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_url(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("URL cannot be empty".to_string()));
        }

        if !VIDEO_URL_PATTERN.is_match(url) {
            return Err(AppError::Validation(format!(
                "Please enter a valid YouTube URL (got '{}')",
                url
            )));
        }

        Ok(())
    }

    pub fn validate_output_dir(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(AppError::Validation("Output directory cannot be empty".to_string()));
        }

        // Check for null bytes
        if path.to_string_lossy().contains('\0') {
            return Err(AppError::Validation("Null bytes not allowed in output directory".to_string()));
        }

        if path.exists() && !path.is_dir() {
            return Err(AppError::Validation(format!(
                "Output path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Checks everything a request needs before a session may start.
    pub fn validate_request(&self, request: &DownloadRequest) -> Result<()> {
        self.validate_url(&request.url)?;
        if let Some(dir) = &request.output_dir {
            self.validate_output_dir(dir)?;
        }
        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::{MediaFormat, Quality};

    #[test]
    fn accepts_recognized_hosts() {
        let validator = InputValidator::new();
        for url in [
            "https://youtube.com/watch?v=abc",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://m.youtube.com/watch?v=abc",
            "https://music.youtube.com/watch?v=abc",
            "youtube.com/shorts/abc",
            "https://youtu.be/abc",
            "youtu.be/abc",
            "  https://youtu.be/abc  ",
        ] {
            assert!(validator.validate_url(url).is_ok(), "{} should be accepted", url);
        }
    }

    #[test]
    fn rejects_malformed_or_foreign_urls() {
        let validator = InputValidator::new();
        for url in [
            "",
            "   ",
            "not-a-url",
            "https://vimeo.com/12345",
            "https://youtube.com/",
            "https://youtube.com",
            "youtube/watch?v=abc",
            "ftp://youtube.com/watch?v=abc",
            "https://notyoutube.com/watch?v=abc",
            "https://youtube.com.evil.example/watch",
        ] {
            let err = validator.validate_url(url).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{} should be rejected", url);
        }
    }

    #[test]
    fn output_dir_must_be_a_directory() {
        let validator = InputValidator::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(validator.validate_output_dir(dir.path()).is_ok());
        assert!(validator.validate_output_dir(&dir.path().join("not-yet-created")).is_ok());

        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(validator.validate_output_dir(&file).is_err());
        assert!(validator.validate_output_dir(Path::new("")).is_err());
    }

    #[test]
    fn validate_request_checks_url_first() {
        let validator = InputValidator::new();
        let request = DownloadRequest {
            url: "not-a-url".to_string(),
            format: MediaFormat::Mp3,
            quality: Quality::Best,
            output_dir: None,
        };
        assert!(validator.validate_request(&request).is_err());
    }
}
