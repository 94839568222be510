use crate::api::{ApiClient, ApiError, NotificationFeed};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Background poller for a session's notification feed.
///
/// Fetches are serialized: the repeating task awaits each fetch before its
/// next tick, and an atomic in-flight guard covers the remaining overlap
/// (a mark-read reconciliation racing a timer tick). Whoever loses the swap
/// skips its fetch; nothing is ever queued, so the local view can only be
/// replaced by responses in request order.
///
/// Poll failures are background noise: logged at warn and retried naturally
/// on the next tick, never surfaced to the asker. Mark-read writes do
/// surface their errors, since silently losing them would drift the view.
pub struct NotificationPoller {
    api: Arc<ApiClient>,
    session_id: String,
    feed_tx: watch::Sender<NotificationFeed>,
    in_flight: AtomicBool,
}

impl NotificationPoller {
    pub fn new(api: Arc<ApiClient>, session_id: impl Into<String>) -> Arc<Self> {
        let (feed_tx, _) = watch::channel(NotificationFeed::default());
        Arc::new(Self {
            api,
            session_id: session_id.into(),
            feed_tx,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Watch the feed; receivers always see the latest fetched state.
    pub fn subscribe(&self) -> watch::Receiver<NotificationFeed> {
        self.feed_tx.subscribe()
    }

    pub fn feed(&self) -> NotificationFeed {
        self.feed_tx.borrow().clone()
    }

    /// One serialized fetch, replacing the local feed with the response.
    /// Returns false when another fetch was already in flight and this one
    /// was skipped.
    pub async fn poll_once(&self) -> bool {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("Notification fetch already in flight, skipping");
            return false;
        }

        match self.api.notifications(&self.session_id).await {
            Ok(feed) => {
                let _ = self.feed_tx.send(feed);
            }
            Err(e) => warn!("Notification poll failed, retrying next tick: {}", e),
        }

        self.in_flight.store(false, Ordering::SeqCst);
        true
    }

    /// Mark one notification read, then refetch so the local view matches
    /// the backend's authoritative read state. No optimistic local mutation.
    pub async fn mark_read(&self, notification_id: i64) -> Result<(), ApiError> {
        self.api.mark_read(notification_id).await?;
        self.poll_once().await;
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.api.mark_all_read(&self.session_id).await?;
        self.poll_once().await;
        Ok(())
    }

    /// Start the repeating fetch task; the first fetch happens immediately.
    /// The returned handle cancels the task on `stop()` or drop.
    pub fn spawn(self: &Arc<Self>, every: Duration) -> PollerHandle {
        let poller = self.clone();
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = ticker.tick() => {
                        poller.poll_once().await;
                    }
                }
            }
            debug!("Notification poller stopped");
        });

        PollerHandle { stop_tx, task }
    }
}

/// Cancellation handle for the polling task. Dropping it stops the poller as
/// well (the task observes the closed channel), so navigating away cannot
/// leak periodic work.
pub struct PollerHandle {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.try_send(());
        let _ = self.task.await;
    }
}
