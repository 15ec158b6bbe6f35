//! Tauri command surface for a desktop host.
//!
//! The host application owns the window and its `tauri.conf.json`; it only needs
//! `builder(config).run(tauri::generate_context!())`.

use std::sync::Arc;
use log::{error, info};
use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager, State};
use tokio::sync::oneshot;

use crate::config::AppConfig;
use crate::downloader::{DownloadRequest, ProgressSnapshot, YtDlpBackend};
use crate::errors::AppError;
use crate::session::{HistoryEntry, Notifier, Outcome, SessionController};

pub const PROGRESS_EVENT: &str = "download-progress";
pub const OUTCOME_EVENT: &str = "download-outcome";
pub const HISTORY_EVENT: &str = "history-append";

/// Forwards session callbacks to the webview as events.
pub struct TauriNotifier {
    app: AppHandle,
}

impl TauriNotifier {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    fn emit<S: Serialize + Clone>(&self, event: &str, payload: S) {
        if let Err(e) = self.app.emit(event, payload) {
            error!("Failed to emit {}: {}", event, e);
        }
    }
}

impl Notifier for TauriNotifier {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.emit(PROGRESS_EVENT, snapshot.clone());
    }

    fn on_outcome(&self, outcome: &Outcome) {
        self.emit(OUTCOME_EVENT, outcome.clone());
    }

    fn on_history_append(&self, entry: &HistoryEntry) {
        self.emit(HISTORY_EVENT, entry.clone());
    }
}

pub struct DesktopState {
    pub controller: SessionController,
    pub backend: Arc<YtDlpBackend>,
}

#[tauri::command]
pub async fn download_video(
    state: State<'_, DesktopState>,
    request: DownloadRequest,
) -> std::result::Result<Outcome, AppError> {
    state.controller.submit(request).await
}

#[tauri::command]
pub async fn cancel_download(
    state: State<'_, DesktopState>,
) -> std::result::Result<Option<Outcome>, AppError> {
    Ok(state.controller.cancel().await)
}

#[tauri::command]
pub async fn get_download_progress(
    state: State<'_, DesktopState>,
) -> std::result::Result<ProgressSnapshot, AppError> {
    Ok(state.controller.snapshot())
}

#[tauri::command]
pub async fn list_formats(
    state: State<'_, DesktopState>,
    url: String,
) -> std::result::Result<String, AppError> {
    state.backend.list_formats(&url).await
}

#[tauri::command]
pub async fn browse_folder(app: AppHandle) -> std::result::Result<Option<String>, AppError> {
    use tauri_plugin_dialog::DialogExt;

    let (tx, rx) = oneshot::channel();
    app.dialog()
        .file()
        .set_title("Select Download Folder")
        .pick_folder(move |path| {
            let _ = tx.send(path);
        });

    match rx.await {
        Ok(Some(path)) => Ok(Some(path.to_string())),
        _ => Ok(None),
    }
}

/// Builder with the dialog plugin, the session state and every command registered.
pub fn builder(config: AppConfig) -> tauri::Builder<tauri::Wry> {
    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .setup(move |app| {
            let backend = Arc::new(YtDlpBackend::new(&config));
            let notifier = Arc::new(TauriNotifier::new(app.handle().clone()));
            let controller = SessionController::new(backend.clone(), notifier)
                .with_poll_interval(config.poll_interval());
            app.manage(DesktopState {
                controller,
                backend,
            });
            info!("Desktop session initialized");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            download_video,
            cancel_download,
            get_download_progress,
            list_formats,
            browse_folder,
        ])
}
