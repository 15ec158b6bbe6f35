use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use dirs;
use crate::downloader::{MediaFormat, Quality};
use crate::errors::{AppError, Result};

const ENV_PREFIX: &str = "VIDGRAB";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub download_path: PathBuf,
    /// Explicit yt-dlp executable. Looked up on PATH, then installed locally, when unset.
    pub ytdlp_path: Option<PathBuf>,
    pub preferred_format: MediaFormat,
    pub preferred_quality: Quality,
    pub poll_interval_ms: u64,
    pub formats_cache_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_path: dirs::download_dir()
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            ytdlp_path: None,
            preferred_format: MediaFormat::Mp4,
            preferred_quality: Quality::Best,
            poll_interval_ms: 500,
            formats_cache_ttl_secs: 3600,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Defaults, then the JSON file at `path`, then `VIDGRAB_*` environment variables.
    ///
    /// Writes the defaults out when the file doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        let file_exists = path.exists();

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;

        if !file_exists {
            config.save_to(path)?;
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent() {
            if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
                std::fs::create_dir_all(config_dir)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::Config(config::ConfigError::Message("Could not find config directory".to_string())))?;

        Ok(config_dir.join("vidgrab").join("config.json"))
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
