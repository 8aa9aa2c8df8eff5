//! Periodic recording change detection
//!
//! NextPVR has no push notifications. [`ChangePoller`] polls the backend's
//! last-change timestamp on a fixed interval and, when it moves forward,
//! invalidates the [`RecordingCache`] and broadcasts [`ContentChanged`].
//!
//! # Example
//!
//! ```no_run
//! use pmonextpvr::{ChangePoller, NextPvrClient, RecordingCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> pmonextpvr::Result<()> {
//! let client = Arc::new(NextPvrClient::from_config()?);
//! let cache = Arc::new(RecordingCache::new(client.clone()));
//! let poller = ChangePoller::spawn(client, cache, Duration::from_secs(20));
//! let mut events = poller.subscribe();
//! events.recv().await.ok();
//! poller.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::cache::RecordingCache;
use crate::client::NextPvrClient;
use crate::error::Result;
use crate::models::ChangeMarker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

/// Backend side of a poll
#[async_trait]
pub trait ChangeSource: Debug + Send + Sync {
    /// Whether a session is currently established
    async fn is_active(&self) -> bool;

    async fn get_last_update(&self, cancel: &CancellationToken) -> Result<ChangeMarker>;
}

#[async_trait]
impl ChangeSource for NextPvrClient {
    async fn is_active(&self) -> bool {
        NextPvrClient::is_active(self).await
    }

    async fn get_last_update(&self, cancel: &CancellationToken) -> Result<ChangeMarker> {
        NextPvrClient::get_last_update(self, cancel).await
    }
}

/// Emitted once per observed advance of the backend marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChanged {
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No session, nothing checked
    Inactive,
    Changed(DateTime<Utc>),
    Unchanged,
    /// Backend unreachable, the session was marked stale
    Offline,
    /// Check failed, logged
    Failed,
}

/// One poll step: compares the backend marker with the high-water mark
#[derive(Debug)]
pub struct ChangeTracker {
    source: Arc<dyn ChangeSource>,
    cache: Arc<RecordingCache>,
    high_water: Mutex<Option<DateTime<Utc>>>,
    events: broadcast::Sender<ContentChanged>,
}

impl ChangeTracker {
    pub fn new(source: Arc<dyn ChangeSource>, cache: Arc<RecordingCache>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            cache,
            high_water: Mutex::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContentChanged> {
        self.events.subscribe()
    }

    /// Last marker seen, `None` before the first successful check
    pub async fn high_water(&self) -> Option<DateTime<Utc>> {
        *self.high_water.lock().await
    }

    pub async fn tick(&self, cancel: &CancellationToken) -> PollOutcome {
        if !self.source.is_active().await {
            debug!("No NextPVR session, skipping change check");
            return PollOutcome::Inactive;
        }

        let changed_at = match self.source.get_last_update(cancel).await {
            Ok(ChangeMarker::At(ts)) => ts,
            Ok(ChangeMarker::Offline) => {
                debug!("NextPVR offline");
                return PollOutcome::Offline;
            }
            Err(e) if e.is_cancelled() => {
                debug!("Change check cancelled");
                return PollOutcome::Failed;
            }
            Err(e) => {
                warn!("Change check failed: {}", e);
                return PollOutcome::Failed;
            }
        };

        let mut high_water = self.high_water.lock().await;
        if high_water.is_some_and(|mark| changed_at <= mark) {
            return PollOutcome::Unchanged;
        }
        *high_water = Some(changed_at);
        drop(high_water);

        info!(%changed_at, "NextPVR recordings changed");
        self.cache.invalidate();
        // No receiver is not an error
        let _ = self.events.send(ContentChanged { changed_at });
        PollOutcome::Changed(changed_at)
    }
}

/// Handle on the spawned polling task
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct ChangePoller {
    tracker: Arc<ChangeTracker>,
    stop_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ChangePoller {
    pub fn spawn(
        source: Arc<dyn ChangeSource>,
        cache: Arc<RecordingCache>,
        interval: Duration,
    ) -> Self {
        Self::spawn_tracker(
            Arc::new(ChangeTracker::new(source, cache)),
            interval,
            &CancellationToken::new(),
        )
    }

    /// Spawns the task under `parent`: cancelling it stops the poller
    pub fn spawn_tracker(
        tracker: Arc<ChangeTracker>,
        interval: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let stop_token = parent.child_token();
        let handle = tokio::spawn(poll_loop(tracker.clone(), interval, stop_token.clone()));
        Self {
            tracker,
            stop_token,
            handle: Some(handle),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContentChanged> {
        self.tracker.subscribe()
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    /// Stops the timer and any in-flight check, then waits for the task
    pub async fn shutdown(mut self) {
        self.stop_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Change poller task failed: {}", e);
                }
            }
        }
        debug!("Change poller stopped");
    }
}

impl Drop for ChangePoller {
    fn drop(&mut self) {
        self.stop_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn poll_loop(tracker: Arc<ChangeTracker>, interval: Duration, stop_token: CancellationToken) {
    let interval = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "Change poller started");

    loop {
        tokio::select! {
            _ = stop_token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = stop_token.cancelled() => break,
            outcome = tracker.tick(&stop_token) => {
                debug!(?outcome, "Change poll");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::recording;
    use crate::error::NextPvrError;
    use crate::models::{Channel, Recording};
    use crate::source::RecordingSource;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Default)]
    struct ScriptedSource {
        active: bool,
        answers: StdMutex<VecDeque<Result<ChangeMarker>>>,
        checks: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(answers: Vec<Result<ChangeMarker>>) -> Arc<Self> {
            Arc::new(Self {
                active: true,
                answers: StdMutex::new(answers.into()),
                checks: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChangeSource for ScriptedSource {
        async fn is_active(&self) -> bool {
            self.active
        }

        async fn get_last_update(&self, _cancel: &CancellationToken) -> Result<ChangeMarker> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ChangeMarker::Offline))
        }
    }

    #[derive(Debug, Default)]
    struct CountingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl RecordingSource for CountingSource {
        async fn list_recordings(&self, _cancel: &CancellationToken) -> Result<Vec<Recording>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![recording("1", "A")])
        }

        async fn list_channels(&self, _cancel: &CancellationToken) -> Result<Vec<Channel>> {
            Ok(vec![])
        }

        async fn delete_recording(&self, _id: &str, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }

        fn last_recording_change(&self) -> Option<DateTime<Utc>> {
            None
        }
    }

    fn at(secs: i64) -> ChangeMarker {
        ChangeMarker::At(DateTime::from_timestamp(secs, 0).unwrap())
    }

    #[tokio::test]
    async fn test_tick_outcomes() {
        let recordings = Arc::new(CountingSource::default());
        let cache = Arc::new(RecordingCache::new(recordings.clone()));
        let changes = ScriptedSource::new(vec![
            Ok(at(1_000)),
            Ok(at(1_000)),
            Ok(ChangeMarker::Offline),
            Err(NextPvrError::HttpStatus {
                code: 404,
                message: "gone".into(),
            }),
            Ok(at(900)),
            Ok(at(2_000)),
        ]);
        let tracker = ChangeTracker::new(changes, cache.clone());
        let mut events = tracker.subscribe();
        let cancel = CancellationToken::new();

        cache.get_items(|_| true, &cancel).await.unwrap();
        assert!(cache.is_valid().await);

        assert!(matches!(tracker.tick(&cancel).await, PollOutcome::Changed(_)));
        assert!(!cache.is_valid().await);
        assert_eq!(events.recv().await.unwrap().changed_at.timestamp(), 1_000);

        cache.get_items(|_| true, &cancel).await.unwrap();
        assert_eq!(tracker.tick(&cancel).await, PollOutcome::Unchanged);
        assert_eq!(tracker.tick(&cancel).await, PollOutcome::Offline);
        assert_eq!(tracker.tick(&cancel).await, PollOutcome::Failed);
        assert_eq!(tracker.tick(&cancel).await, PollOutcome::Unchanged);
        assert!(cache.is_valid().await);
        assert!(events.try_recv().is_err());

        assert!(matches!(tracker.tick(&cancel).await, PollOutcome::Changed(_)));
        assert_eq!(events.recv().await.unwrap().changed_at.timestamp(), 2_000);
        assert_eq!(tracker.high_water().await.map(|t| t.timestamp()), Some(2_000));
        assert_eq!(recordings.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_inactive_session_is_not_checked() {
        let source = Arc::new(ScriptedSource {
            active: false,
            ..Default::default()
        });
        let cache = Arc::new(RecordingCache::new(Arc::new(CountingSource::default())));
        let tracker = ChangeTracker::new(source.clone(), cache);

        assert_eq!(
            tracker.tick(&CancellationToken::new()).await,
            PollOutcome::Inactive
        );
        assert_eq!(source.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_poller_ticks_and_shuts_down() {
        let source = ScriptedSource::new(vec![Ok(at(10)), Ok(at(20))]);
        let cache = Arc::new(RecordingCache::new(Arc::new(CountingSource::default())));
        let poller = ChangePoller::spawn(source.clone(), cache, Duration::from_secs(20));
        let mut events = poller.subscribe();

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(source.checks.load(Ordering::SeqCst), 0);

        assert_eq!(events.recv().await.unwrap().changed_at.timestamp(), 10);
        assert_eq!(events.recv().await.unwrap().changed_at.timestamp(), 20);

        poller.shutdown().await;
        let checks = source.checks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.checks.load(Ordering::SeqCst), checks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_token_stops_poller() {
        let source = ScriptedSource::new(vec![]);
        let cache = Arc::new(RecordingCache::new(Arc::new(CountingSource::default())));
        let parent = CancellationToken::new();
        let poller = ChangePoller::spawn_tracker(
            Arc::new(ChangeTracker::new(source.clone(), cache)),
            Duration::from_secs(20),
            &parent,
        );

        parent.cancel();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(source.checks.load(Ordering::SeqCst), 0);
        poller.shutdown().await;
    }
}
