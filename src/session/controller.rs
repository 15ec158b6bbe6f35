use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::FutureExt;
use log::{debug, info, trace, warn};

use super::channel::ProgressChannel;
use super::{HistoryEntry, Notifier, Outcome, SessionState};
use crate::downloader::{Backend, DownloadRequest, ProgressSnapshot};
use crate::errors::{AppError, Result};
use crate::security::InputValidator;
use crate::utils::lock;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub(super) type SharedSession = Arc<Mutex<SessionInner>>;

pub(super) struct SessionInner {
    pub(super) state: SessionState,
    pub(super) generation: u64,
    pub(super) snapshot: ProgressSnapshot,
    channel: Option<ProgressChannel>,
}

impl SessionInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state == SessionState::Running
    }

    /// Stops the channel, resets the snapshot and returns to `Idle`. Idempotent.
    fn teardown(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.stop();
        }
        self.snapshot = ProgressSnapshot::default();
        self.state = SessionState::Idle;
    }
}

/// Single entry point for both progress sources.
///
/// Returns false when `generation` is no longer the running session; the update is
/// dropped and the caller should stop.
pub(super) fn apply_snapshot(
    session: &Mutex<SessionInner>,
    notifier: &dyn Notifier,
    generation: u64,
    snapshot: ProgressSnapshot,
) -> bool {
    let mut session = lock(session);
    if !session.is_current(generation) {
        trace!("Discarding progress for stale session {}", generation);
        return false;
    }
    session.snapshot = snapshot;
    notifier.on_progress(&session.snapshot);
    true
}

pub(super) fn is_current(session: &Mutex<SessionInner>, generation: u64) -> bool {
    lock(session).is_current(generation)
}

/// Tears the session down if `submit` or `cancel` is abandoned while awaiting the
/// backend. Only fires while the session is still in the state the caller left it in.
struct TeardownGuard<'a> {
    session: &'a Mutex<SessionInner>,
    generation: u64,
    state: SessionState,
    armed: bool,
}

impl<'a> TeardownGuard<'a> {
    fn arm(session: &'a Mutex<SessionInner>, generation: u64, state: SessionState) -> Self {
        Self {
            session,
            generation,
            state,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut session = lock(self.session);
        if session.generation == self.generation && session.state == self.state {
            warn!(
                "Download session {} abandoned while {:?}, tearing down",
                self.generation, self.state
            );
            session.teardown();
        }
    }
}

/// Owns the one active download and reconciles its progress sources.
pub struct SessionController {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn Notifier>,
    validator: InputValidator,
    poll_interval: Duration,
    pub(super) session: SharedSession,
}

impl SessionController {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            validator: InputValidator::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            session: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Idle,
                generation: 0,
                snapshot: ProgressSnapshot::default(),
                channel: None,
            })),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> SessionState {
        lock(&self.session).state
    }

    pub fn is_active(&self) -> bool {
        self.state() != SessionState::Idle
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        lock(&self.session).snapshot.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.session).generation
    }

    /// Runs one download to its end.
    ///
    /// Invalid input and a busy controller are errors, returned before anything
    /// starts. Every backend result becomes an `Outcome`. A completion that arrives
    /// after the session was cancelled is dropped and reported as `Cancelled`.
    pub async fn submit(&self, request: DownloadRequest) -> Result<Outcome> {
        self.validator.validate_request(&request)?;

        let generation = {
            let mut session = lock(&self.session);
            if session.state != SessionState::Idle {
                return Err(AppError::SessionActive);
            }
            session.generation += 1;
            session.state = SessionState::Running;
            session.snapshot = ProgressSnapshot::default();
            session.channel = Some(ProgressChannel::start(
                self.backend.clone(),
                self.session.clone(),
                self.notifier.clone(),
                session.generation,
                self.poll_interval,
            ));
            session.generation
        };
        info!(
            "Starting download session {}: {} ({}, {})",
            generation, request.url, request.format, request.quality
        );

        let guard = TeardownGuard::arm(&self.session, generation, SessionState::Running);
        let result = AssertUnwindSafe(self.backend.start_download(&request))
            .catch_unwind()
            .await;
        guard.disarm();

        let outcome = match result {
            Ok(Ok(message)) => Outcome::Success(message),
            Ok(Err(AppError::Cancelled)) => Outcome::Cancelled,
            Ok(Err(e)) => Outcome::Failure(e.to_string()),
            Err(_) => Outcome::Failure("Download backend panicked".to_string()),
        };

        let filename = {
            let mut session = lock(&self.session);
            if !session.is_current(generation) {
                debug!("Discarding completion of stale session {}", generation);
                return Ok(Outcome::Cancelled);
            }
            let filename = session.snapshot.filename.take();
            session.teardown();
            filename
        };
        info!("Download session {} finished: {:?}", generation, outcome);

        self.notifier.on_outcome(&outcome);
        if outcome.is_success() {
            let entry = HistoryEntry::new(filename.as_deref(), &request);
            self.notifier.on_history_append(&entry);
        }
        Ok(outcome)
    }

    /// Cancels the running session. `None` when there is nothing to cancel.
    ///
    /// Local state is reset whether or not the backend acknowledges, and also when
    /// this future is dropped before the backend answers.
    pub async fn cancel(&self) -> Option<Outcome> {
        let generation = {
            let mut session = lock(&self.session);
            if session.state != SessionState::Running {
                debug!("Cancel ignored, no running session");
                return None;
            }
            session.state = SessionState::Cancelling;
            session.generation
        };
        info!("Cancelling download session {}", generation);

        let guard = TeardownGuard::arm(&self.session, generation, SessionState::Cancelling);
        let result = self.backend.cancel_download().await;
        guard.disarm();

        {
            let mut session = lock(&self.session);
            if session.generation == generation {
                session.teardown();
            }
        }

        let outcome = match result {
            Ok(()) => Outcome::Cancelled,
            Err(e) => {
                warn!("Backend failed to cancel session {}: {}", generation, e);
                Outcome::Failure(format!("Error cancelling download: {}", e))
            }
        };
        self.notifier.on_outcome(&outcome);
        Some(outcome)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // The channel tasks hold the session; stop them so it can be freed.
        lock(&self.session).channel.take();
    }
}
