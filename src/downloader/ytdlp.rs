use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::downloader::cache::FormatsCache;
use crate::downloader::progress::parse_line;
use crate::downloader::{Backend, DownloadRequest, MediaFormat, ProgressSnapshot, ProgressSubscription, Quality};
use crate::errors::{AppError, Result};
use crate::security::InputValidator;
use crate::utils::{ensure_dir_exists, find_in_path, lock, tail_lines};

const EVENT_CAPACITY: usize = 64;
const STDERR_TAIL_LINES: usize = 5;
const OUTPUT_TEMPLATE: &str = "%(title)s-%(upload_date)s.%(ext)s";
pub const SUCCESS_MESSAGE: &str = "Download completed successfully!";

#[cfg(target_os = "windows")]
const EXECUTABLE_NAME: &str = "yt-dlp.exe";
#[cfg(not(target_os = "windows"))]
const EXECUTABLE_NAME: &str = "yt-dlp";

/// Drives the `yt-dlp` executable and reports its progress.
pub struct YtDlpBackend {
    ytdlp_path: Option<PathBuf>,
    default_output_dir: PathBuf,
    progress: Arc<Mutex<ProgressSnapshot>>,
    events: broadcast::Sender<ProgressSnapshot>,
    active: Mutex<Option<ActiveRun>>,
    formats: FormatsCache,
}

impl YtDlpBackend {
    pub fn new(config: &AppConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ytdlp_path: config.ytdlp_path.clone(),
            default_output_dir: config.download_path.clone(),
            progress: Arc::new(Mutex::new(ProgressSnapshot::default())),
            events,
            active: Mutex::new(None),
            formats: FormatsCache::new(config.formats_cache_ttl_secs),
        }
    }

    /// Configured path, then PATH, then a local copy (installed on first use).
    pub async fn resolve_executable(&self) -> Result<PathBuf> {
        if let Some(path) = &self.ytdlp_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(AppError::NotFound(format!("Configured yt-dlp not found at {:?}", path)));
        }

        if let Some(path) = find_in_path(EXECUTABLE_NAME) {
            log::info!("Found existing yt-dlp at: {:?}", path);
            return Ok(path);
        }
        log::info!("yt-dlp not found in system PATH, will use local copy");

        let local_dir = dirs::data_local_dir()
            .ok_or_else(|| AppError::NotFound("Could not find local data directory".to_string()))?
            .join("vidgrab")
            .join("ytdlp");
        ensure_dir_exists(&local_dir).await?;

        let local_path = local_dir.join(EXECUTABLE_NAME);
        if !local_path.exists() {
            log::info!("yt-dlp not found at {:?}, downloading it now", local_path);
            install_ytdlp(&local_path).await?;
        }
        Ok(local_path)
    }

    /// `yt-dlp --list-formats`, cached per URL.
    pub async fn list_formats(&self, url: &str) -> Result<String> {
        InputValidator::new().validate_url(url)?;
        let url = url.trim();

        self.formats
            .get_or_fetch(url, || async {
                let ytdlp = self.resolve_executable().await?;
                log::info!("Listing formats for {} using {:?}", url, ytdlp);

                let output = Command::new(&ytdlp)
                    .args(["--list-formats", url])
                    .output()
                    .await?;

                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(AppError::Download(format!(
                        "yt-dlp exited with status {}: {}",
                        output.status,
                        tail_lines(&stderr, STDERR_TAIL_LINES)
                    )))
                }
            })
            .await
    }

    fn record(&self, snapshot: ProgressSnapshot) {
        *lock(&self.progress) = snapshot.clone();
        // No receivers is fine: the poller still sees the stored value.
        let _ = self.events.send(snapshot);
    }

    async fn run(&self, request: &DownloadRequest, cancel: CancellationToken) -> Result<String> {
        let ytdlp = self.resolve_executable().await?;
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let output_dir = request
            .output_dir
            .clone()
            .unwrap_or_else(|| self.default_output_dir.clone());
        ensure_dir_exists(&output_dir).await?;

        let args = build_args(request, &output_dir);
        log::info!("Executing: {:?} {}", ytdlp, args.join(" "));

        let mut child = Command::new(&ytdlp)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Download(format!("Failed to start yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Download("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Download("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer).await;
            buffer
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Cancelling yt-dlp process");
                    if let Err(e) = child.kill().await {
                        log::warn!("Failed to kill yt-dlp: {}", e);
                    }
                    stderr_task.abort();
                    return Err(AppError::Cancelled);
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        log::debug!("yt-dlp output: {}", line);
                        if let Some(parsed) = parse_line(&line) {
                            let mut snapshot = lock(&self.progress).clone();
                            snapshot.apply_line(parsed);
                            self.record(snapshot);
                        }
                    }
                    None => break,
                },
            }
        }

        // stdout is closed, the process is exiting.
        let status = child
            .wait()
            .await
            .map_err(|e| AppError::Download(format!("Failed to wait for yt-dlp process: {}", e)))?;
        let stderr = stderr_task.await.unwrap_or_default();

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        if status.success() {
            Ok(SUCCESS_MESSAGE.to_string())
        } else {
            Err(AppError::Download(format!(
                "yt-dlp exited with status {}: {}",
                status,
                tail_lines(&stderr, STDERR_TAIL_LINES)
            )))
        }
    }
}

/// The running download: `cancel` stops it, `released` fires once its slot is free.
struct ActiveRun {
    cancel: CancellationToken,
    released: CancellationToken,
}

/// Frees the slot when a download ends or its future is dropped.
struct ActiveDownload<'a>(&'a Mutex<Option<ActiveRun>>);

impl Drop for ActiveDownload<'_> {
    fn drop(&mut self) {
        let run = lock(self.0).take();
        if let Some(run) = run {
            run.cancel.cancel();
            run.released.cancel();
        }
    }
}

#[async_trait]
impl Backend for YtDlpBackend {
    async fn start_download(&self, request: &DownloadRequest) -> Result<String> {
        let cancel = CancellationToken::new();
        {
            let mut active = lock(&self.active);
            if active.is_some() {
                return Err(AppError::SessionActive);
            }
            *active = Some(ActiveRun {
                cancel: cancel.clone(),
                released: CancellationToken::new(),
            });
        }
        let _active = ActiveDownload(&self.active);
        self.record(ProgressSnapshot::default());

        let start_time = std::time::Instant::now();
        let result = self.run(request, cancel).await;

        match &result {
            Ok(_) => log::info!("Downloaded {} (took {:.2} seconds)", request.url, start_time.elapsed().as_secs_f64()),
            Err(e) => log::error!("Failed to download {}: {}", request.url, e),
        }
        result
    }

    /// Stops the running download and waits until a new one may start.
    async fn cancel_download(&self) -> Result<()> {
        let released = match lock(&self.active).as_ref() {
            Some(run) => {
                run.cancel.cancel();
                run.released.clone()
            }
            None => return Err(AppError::Download("No download in progress".to_string())),
        };
        released.cancelled().await;
        Ok(())
    }

    async fn query_progress(&self) -> Result<ProgressSnapshot> {
        Ok(lock(&self.progress).clone())
    }

    async fn subscribe_progress(&self) -> Result<ProgressSubscription> {
        Ok(ProgressSubscription::new(self.events.subscribe()))
    }
}

/// Command line for one request, without the executable.
pub fn build_args(request: &DownloadRequest, output_dir: &Path) -> Vec<String> {
    let mut args = vec![request.url.trim().to_string()];

    match request.format {
        MediaFormat::Mp3 => {
            let audio_quality = match request.quality {
                Quality::Best => "0",
                Quality::Normal => "5",
                Quality::Custom => "3",
            };
            args.extend(
                ["--extract-audio", "--audio-format", "mp3", "--audio-quality", audio_quality]
                    .map(String::from),
            );
        }
        MediaFormat::Mp4 => {
            let selector = match request.quality {
                Quality::Best => "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]",
                Quality::Normal => "bv*[height<=720][ext=mp4]+ba[ext=m4a]/b[height<=720][ext=mp4]",
                Quality::Custom => "bv*[height<=480][ext=mp4]+ba[ext=m4a]/b[height<=480][ext=mp4]",
            };
            args.push("-f".to_string());
            args.push(selector.to_string());
        }
    }

    args.push("--output".to_string());
    args.push(output_dir.join(OUTPUT_TEMPLATE).to_string_lossy().to_string());
    args.extend(["--newline", "--progress", "--force-overwrites"].map(String::from));
    args
}

fn release_url() -> &'static str {
    match std::env::consts::OS {
        "windows" => "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe",
        "macos" => "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos",
        _ => "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp",
    }
}

async fn install_ytdlp(path: &Path) -> Result<()> {
    let url = release_url();
    log::info!("Downloading yt-dlp from: {}", url);

    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        return Err(AppError::Download(format!(
            "Failed to download yt-dlp: HTTP status {}",
            response.status()
        )));
    }

    let content = response.bytes().await?;
    log::info!("Downloaded {} bytes, saving to {:?}", content.len(), path);
    tokio::fs::write(path, &content).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }

    log::info!("yt-dlp successfully installed to {:?}", path);
    Ok(())
}
