//! Recording source consumed by the catalog cache
//!
//! [`crate::NextPvrClient`] is the production implementation. Tests plug in
//! fakes to count refetches.

use crate::error::Result;
use crate::models::{Channel, Recording};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait RecordingSource: Debug + Send + Sync {
    /// All ready recordings
    async fn list_recordings(&self, cancel: &CancellationToken) -> Result<Vec<Recording>>;

    /// All channels, used to derive the media type of recordings
    async fn list_channels(&self, cancel: &CancellationToken) -> Result<Vec<Channel>>;

    /// Deletes a recording on the backend
    async fn delete_recording(&self, recording_id: &str, cancel: &CancellationToken) -> Result<()>;

    /// Instant of the last successful mutation made through this source
    ///
    /// A snapshot fetched before this instant is stale.
    fn last_recording_change(&self) -> Option<DateTime<Utc>>;
}
