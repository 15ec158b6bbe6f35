pub mod config;
pub mod downloader;
pub mod errors;
pub mod security;
pub mod session;
pub mod terminal;
pub mod utils;

#[cfg(feature = "desktop")]
pub mod desktop;

pub use errors::{AppError, Result};
