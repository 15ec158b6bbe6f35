use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "desktop")]
    #[error("Tauri error: {0}")]
    Tauri(#[from] tauri::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A download is already in progress")]
    SessionActive,

    #[error("Download error: {0}")]
    Download(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),
}

#[cfg(feature = "desktop")]
impl From<AppError> for tauri::ipc::InvokeError {
    fn from(error: AppError) -> Self {
        tauri::ipc::InvokeError::from(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
