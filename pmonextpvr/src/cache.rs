//! Recording catalog cache
//!
//! Holds the last fetched recordings and channels and serves the catalog
//! views from them. The snapshot is refetched lazily, on the first read after
//! it became invalid:
//! - [`RecordingCache::invalidate`] was called (usually by the change poller)
//! - the source made a successful mutation after the snapshot was fetched
//!
//! Invalidation bumps a generation counter, so a refresh racing with an
//! invalidation never produces a snapshot considered valid.

use crate::catalog::{self, Bucket, RecordingFolder, RecordingItem};
use crate::error::{NextPvrError, Result};
use crate::models::{ChannelType, Recording};
use crate::source::RecordingSource;
use crate::stream::{self, StreamDescriptor};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// .NET ticks (100 ns) between 0001-01-01 and the unix epoch
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

#[derive(Debug, Clone)]
struct Snapshot {
    recordings: Arc<Vec<Recording>>,
    channels: Arc<HashMap<String, ChannelType>>,
    /// Taken before the fetch started
    fetched_at: DateTime<Utc>,
    generation: u64,
}

#[derive(Debug)]
pub struct RecordingCache {
    source: Arc<dyn RecordingSource>,
    state: RwLock<Option<Snapshot>>,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
}

impl RecordingCache {
    pub fn new(source: Arc<dyn RecordingSource>) -> Self {
        Self {
            source,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Forces a refetch on the next read
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Recording cache invalidated");
    }

    /// Whether the next read is served without a backend call
    pub async fn is_valid(&self) -> bool {
        self.state
            .read()
            .await
            .as_ref()
            .is_some_and(|s| self.is_current(s))
    }

    fn is_current(&self, snapshot: &Snapshot) -> bool {
        snapshot.generation == self.generation.load(Ordering::SeqCst)
            && self
                .source
                .last_recording_change()
                .map_or(true, |changed| changed <= snapshot.fetched_at)
    }

    async fn cached(&self) -> Option<Snapshot> {
        self.state
            .read()
            .await
            .as_ref()
            .filter(|s| self.is_current(s))
            .cloned()
    }

    async fn snapshot(&self, cancel: &CancellationToken) -> Result<Snapshot> {
        if let Some(snapshot) = self.cached().await {
            debug!("Using cached recordings");
            return Ok(snapshot);
        }

        let _refresh = tokio::select! {
            _ = cancel.cancelled() => return Err(NextPvrError::Cancelled),
            guard = self.refresh_lock.lock() => guard,
        };

        // Refreshed while we were waiting
        if let Some(snapshot) = self.cached().await {
            return Ok(snapshot);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let fetched_at = Utc::now();
        let recordings = self.source.list_recordings(cancel).await?;
        let channels = self.source.list_channels(cancel).await?;
        info!(
            recordings = recordings.len(),
            channels = channels.len(),
            "Recording cache refreshed"
        );

        let snapshot = Snapshot {
            recordings: Arc::new(recordings),
            channels: Arc::new(catalog::channel_types(&channels)),
            fetched_at,
            generation,
        };
        *self.state.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Items of the recordings accepted by `filter`
    pub async fn get_items<F>(&self, filter: F, cancel: &CancellationToken) -> Result<Vec<RecordingItem>>
    where
        F: Fn(&Recording) -> bool,
    {
        let snapshot = self.snapshot(cancel).await?;
        Ok(snapshot
            .recordings
            .iter()
            .filter(|r| filter(r))
            .map(|r| catalog::to_item(r, &snapshot.channels))
            .collect())
    }

    /// Series folders then category folders
    pub async fn get_groups(&self, cancel: &CancellationToken) -> Result<Vec<RecordingFolder>> {
        let snapshot = self.snapshot(cancel).await?;
        Ok(catalog::group(&snapshot.recordings))
    }

    /// Items of one folder of [`Self::get_groups`]
    ///
    /// Unknown and empty ids yield no items (the root is [`Self::get_groups`]).
    pub async fn get_folder_items(
        &self,
        folder_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecordingItem>> {
        let Some(bucket) = Bucket::from_folder_id(folder_id.trim()) else {
            debug!(folder_id, "Unknown recordings folder");
            return Ok(Vec::new());
        };
        self.get_items(|r| Bucket::of(r) == bucket, cancel).await
    }

    /// Every item, most recent first
    pub async fn latest_items(&self, cancel: &CancellationToken) -> Result<Vec<RecordingItem>> {
        let mut items = self.get_items(|_| true, cancel).await?;
        items.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        Ok(items)
    }

    /// Deletes a recording on the backend
    ///
    /// A successful delete moves the source's change marker, which makes the
    /// current snapshot stale.
    pub async fn delete_item(&self, recording_id: &str, cancel: &CancellationToken) -> Result<()> {
        self.source.delete_recording(recording_id, cancel).await
    }

    /// Stream of a cached recording
    pub async fn resolve_stream(
        &self,
        recording_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StreamDescriptor> {
        let snapshot = self.snapshot(cancel).await?;
        let recording = snapshot
            .recordings
            .iter()
            .find(|r| r.id.eq_ignore_ascii_case(recording_id))
            .ok_or_else(|| NextPvrError::NotFound(format!("recording {recording_id}")))?;
        stream::resolve_recording(recording).await
    }

    /// Key changing every 5 minutes and on every recording change
    pub fn cache_key(&self) -> String {
        cache_key_at(Utc::now(), self.source.last_recording_change())
    }
}

/// `<day of year>-<hour>-<minute / 5>-<last change in .NET ticks>`
pub fn cache_key_at(now: DateTime<Utc>, last_change: Option<DateTime<Utc>>) -> String {
    let ticks = last_change
        .map(|c| c.timestamp_micros() * 10 + TICKS_AT_UNIX_EPOCH)
        .unwrap_or(0);
    format!(
        "{}-{}-{}-{}",
        now.ordinal(),
        now.hour(),
        now.minute() / 5,
        ticks
    )
}
