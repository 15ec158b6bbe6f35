use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::controller::{apply_snapshot, is_current, SharedSession};
use super::Notifier;
use crate::downloader::Backend;

/// The two progress sources of one session generation.
///
/// Dropping the channel stops both; the push subscription is owned by its task and
/// released with it.
pub(super) struct ProgressChannel {
    poller: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl ProgressChannel {
    pub(super) fn start(
        backend: Arc<dyn Backend>,
        session: SharedSession,
        notifier: Arc<dyn Notifier>,
        generation: u64,
        period: Duration,
    ) -> Self {
        let poller = tokio::spawn(poll_progress(
            backend.clone(),
            session.clone(),
            notifier.clone(),
            generation,
            period,
        ));
        let listener = tokio::spawn(listen_progress(backend, session, notifier, generation));

        Self { poller, listener }
    }

    pub(super) fn stop(&self) {
        self.poller.abort();
        self.listener.abort();
    }
}

impl Drop for ProgressChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_progress(
    backend: Arc<dyn Backend>,
    session: SharedSession,
    notifier: Arc<dyn Notifier>,
    generation: u64,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match backend.query_progress().await {
            Ok(snapshot) => {
                if !apply_snapshot(&session, notifier.as_ref(), generation, snapshot) {
                    break;
                }
            }
            Err(e) => {
                log::debug!("Progress poll failed: {}", e);
                if !is_current(&session, generation) {
                    break;
                }
            }
        }
    }
}

async fn listen_progress(
    backend: Arc<dyn Backend>,
    session: SharedSession,
    notifier: Arc<dyn Notifier>,
    generation: u64,
) {
    let mut subscription = match backend.subscribe_progress().await {
        Ok(subscription) => subscription,
        Err(e) => {
            log::warn!("Failed to set up progress events, continuing with polling only: {}", e);
            return;
        }
    };

    while let Some(snapshot) = subscription.recv().await {
        if !apply_snapshot(&session, notifier.as_ref(), generation, snapshot) {
            break;
        }
    }
}
