//! High-level NextPVR client
//!
//! Wraps [`NextPvrApi`] with the host facing surface: stream resolution,
//! timer defaults, the keep-alive check and the shared "last recording change"
//! marker updated by every successful mutation.

use crate::api::{from_unix_secs, NextPvrApi, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::config_ext::{NextPvrConfigExt, NextPvrSettings};
use crate::error::{NextPvrError, Result};
use crate::models::{
    BackendDefaults, Channel, ChangeMarker, Program, Recording, SeriesTimer, ServerStatus, Timer,
};
use crate::source::RecordingSource;
use crate::stream::{self, StreamDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pmoconfig::Config;
use reqwest::Client;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Client for one NextPVR backend
pub struct NextPvrClient {
    api: Arc<NextPvrApi>,
    /// Microseconds since the epoch, 0 when nothing changed yet
    last_recording_change: AtomicI64,
    live_streams: AtomicU64,
}

impl fmt::Debug for NextPvrClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextPvrClient")
            .field("base_url", &self.api.base_url())
            .field("last_recording_change", &self.last_recording_change())
            .finish()
    }
}

impl NextPvrClient {
    pub fn new(settings: NextPvrSettings) -> Result<Self> {
        Ok(Self::with_api(NextPvrApi::new(settings)?))
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Creates a client from the global pmoconfig configuration
    pub fn from_config() -> Result<Self> {
        let config = pmoconfig::get_config();
        Self::from_config_obj(config.as_ref())
    }

    /// Creates a client from a specific Config object
    pub fn from_config_obj(config: &Config) -> Result<Self> {
        let settings = config.get_nextpvr_settings()?;
        info!(url = %settings.web_service_url, "Creating NextPVR client");
        Self::new(settings)
    }

    fn with_api(api: NextPvrApi) -> Self {
        Self {
            api: Arc::new(api),
            last_recording_change: AtomicI64::new(0),
            live_streams: AtomicU64::new(0),
        }
    }

    /// Low-level API access
    pub fn api(&self) -> &NextPvrApi {
        &self.api
    }

    pub fn settings(&self) -> &NextPvrSettings {
        self.api.settings()
    }

    pub async fn ensure_connection(&self, cancel: &CancellationToken) -> Result<()> {
        self.api.ensure_connection(cancel).await.map(|_| ())
    }

    pub async fn is_active(&self) -> bool {
        self.api.is_active().await
    }

    pub async fn backend_defaults(&self) -> Option<BackendDefaults> {
        self.api.backend_defaults().await
    }

    /// Instant of the last successful mutation
    pub fn last_recording_change(&self) -> Option<DateTime<Utc>> {
        match self.last_recording_change.load(Ordering::SeqCst) {
            0 => None,
            micros => DateTime::from_timestamp_micros(micros),
        }
    }

    fn touch(&self) {
        let now = Utc::now().timestamp_micros();
        self.last_recording_change.fetch_max(now, Ordering::SeqCst);
    }

    /// Records the change marker when `result` is a success
    fn mutated(&self, result: Result<()>) -> Result<()> {
        if result.is_ok() {
            self.touch();
        }
        result
    }

    // ============= Listings =============

    pub async fn list_channels(&self, cancel: &CancellationToken) -> Result<Vec<Channel>> {
        self.api.list_channels(cancel).await
    }

    pub async fn list_programs(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Program>> {
        self.api.list_programs(channel_id, start, end, cancel).await
    }

    pub async fn list_recordings(&self, cancel: &CancellationToken) -> Result<Vec<Recording>> {
        self.api.list_recordings(cancel).await
    }

    /// Recordings accepted by `filter`
    pub async fn list_recordings_matching<F>(
        &self,
        filter: F,
        cancel: &CancellationToken,
    ) -> Result<Vec<Recording>>
    where
        F: Fn(&Recording) -> bool + Send,
    {
        let recordings = self.api.list_recordings(cancel).await?;
        Ok(recordings.into_iter().filter(|r| filter(r)).collect())
    }

    pub async fn list_timers(&self, cancel: &CancellationToken) -> Result<Vec<Timer>> {
        self.api.list_timers(cancel).await
    }

    pub async fn list_series_timers(&self, cancel: &CancellationToken) -> Result<Vec<SeriesTimer>> {
        self.api.list_series_timers(cancel).await
    }

    // ============= Mutations =============

    pub async fn create_timer(&self, timer: &Timer, cancel: &CancellationToken) -> Result<()> {
        self.mutated(self.api.create_timer(timer, cancel).await)
    }

    pub async fn update_timer(&self, timer: &Timer, cancel: &CancellationToken) -> Result<()> {
        self.mutated(self.api.update_timer(timer, cancel).await)
    }

    pub async fn cancel_timer(&self, timer_id: &str, cancel: &CancellationToken) -> Result<()> {
        self.mutated(self.api.cancel_timer(timer_id, cancel).await)
    }

    pub async fn delete_recording(
        &self,
        recording_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.mutated(self.api.delete_recording(recording_id, cancel).await)
    }

    pub async fn create_series_timer(
        &self,
        timer: &SeriesTimer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.mutated(self.api.create_series_timer(timer, cancel).await)
    }

    pub async fn update_series_timer(
        &self,
        timer: &SeriesTimer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.mutated(self.api.update_series_timer(timer, cancel).await)
    }

    pub async fn cancel_series_timer(
        &self,
        recurring_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.mutated(self.api.cancel_series_timer(recurring_id, cancel).await)
    }

    // ============= Settings & status =============

    pub async fn get_defaults(&self, cancel: &CancellationToken) -> Result<BackendDefaults> {
        self.api.get_defaults(cancel).await
    }

    pub async fn get_setting(&self, key: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        self.api.get_setting(key, cancel).await
    }

    pub async fn status(&self, cancel: &CancellationToken) -> Result<ServerStatus> {
        self.api.get_status(cancel).await
    }

    /// Template for a new series timer
    ///
    /// Uses the backend defaults fetched at login when available, the
    /// configured padding otherwise.
    pub async fn new_timer_defaults(&self) -> SeriesTimer {
        let settings = self.settings();
        let mut timer = SeriesTimer {
            id: String::new(),
            channel_id: String::new(),
            program_id: String::new(),
            name: String::new(),
            record_any_channel: false,
            record_any_time: false,
            record_new_only: settings.new_episodes,
            days: Vec::new(),
            pre_padding_seconds: settings.pre_padding_seconds,
            post_padding_seconds: settings.post_padding_seconds,
            keep_up_to: 0,
            start_time: None,
            end_time: None,
        };

        if let Some(defaults) = self.api.backend_defaults().await {
            timer.pre_padding_seconds = defaults.pre_padding_minutes.saturating_mul(60);
            timer.post_padding_seconds = defaults.post_padding_minutes.saturating_mul(60);
            timer.record_any_channel = defaults.all_channels;
            timer.record_any_time = defaults.any_timeslot;
            timer.record_new_only = defaults.only_new || settings.new_episodes;
        }
        timer
    }

    // ============= Change check =============

    /// Reads `recording.lastupdated`
    ///
    /// The zero epoch and transport failures mark the session stale and
    /// return [`ChangeMarker::Offline`]. A valid marker extends the session.
    pub async fn get_last_update(&self, cancel: &CancellationToken) -> Result<ChangeMarker> {
        if let Err(err) = self.api.ensure_connection(cancel).await {
            return self.offline_or(err).await;
        }

        match self.api.last_updated(cancel).await {
            Ok(secs) if secs <= 0 => {
                warn!("NextPVR reports no last update, session marked stale");
                self.api.mark_stale().await;
                Ok(ChangeMarker::Offline)
            }
            Ok(secs) => {
                self.api.renew().await;
                let marker = ChangeMarker::At(from_unix_secs(secs));
                debug!(last_update = secs, "NextPVR last update");
                Ok(marker)
            }
            Err(err) => self.offline_or(err).await,
        }
    }

    async fn offline_or(&self, err: NextPvrError) -> Result<ChangeMarker> {
        if err.is_transient() {
            warn!("NextPVR unreachable: {}", err);
            self.api.mark_stale().await;
            Ok(ChangeMarker::Offline)
        } else {
            Err(err)
        }
    }

    // ============= Streams =============

    /// Live stream of a channel, each call gets a new client slot
    pub async fn resolve_live_stream(
        &self,
        channel_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StreamDescriptor> {
        let sid = self.api.ensure_connection(cancel).await?;
        let n = self.live_streams.fetch_add(1, Ordering::SeqCst) + 1;
        let client = format!("{}.{}", self.settings().device_name, n);
        let url = self.api.backend_url(
            "live",
            &[
                ("channeloid", channel_id),
                ("client", client.as_str()),
                ("sid", sid.as_str()),
            ],
        );
        info!(channel_id, client = %client, "Streaming NextPVR channel");
        Ok(StreamDescriptor::live(n.to_string(), url))
    }

    /// Stream of a recording: its URL, or its local file when it still exists
    pub async fn resolve_recording_stream(
        &self,
        recording_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StreamDescriptor> {
        let recordings = self.api.list_recordings(cancel).await?;
        let recording = recordings
            .iter()
            .find(|r| r.id.eq_ignore_ascii_case(recording_id))
            .ok_or_else(|| NextPvrError::NotFound(format!("recording {recording_id}")))?;
        stream::resolve_recording(recording).await
    }

    /// Nothing to release on the backend side
    pub async fn close_live_stream(&self, stream_id: &str) {
        info!(stream_id, "Closing NextPVR live stream");
    }
}

#[async_trait]
impl RecordingSource for NextPvrClient {
    async fn list_recordings(&self, cancel: &CancellationToken) -> Result<Vec<Recording>> {
        NextPvrClient::list_recordings(self, cancel).await
    }

    async fn list_channels(&self, cancel: &CancellationToken) -> Result<Vec<Channel>> {
        NextPvrClient::list_channels(self, cancel).await
    }

    async fn delete_recording(&self, recording_id: &str, cancel: &CancellationToken) -> Result<()> {
        NextPvrClient::delete_recording(self, recording_id, cancel).await
    }

    fn last_recording_change(&self) -> Option<DateTime<Utc>> {
        NextPvrClient::last_recording_change(self)
    }
}

/// Builder for configuring a NextPvrClient
///
/// # Example
///
/// ```
/// use pmonextpvr::NextPvrClient;
///
/// # tokio_test::block_on(async {
/// let client = NextPvrClient::builder()
///     .base_url("http://pvr:8866/")
///     .pin("1234")
///     .build()?;
/// assert_eq!(client.settings().base_url(), "http://pvr:8866");
/// // No session until the first call
/// assert!(!client.is_active().await);
/// # Ok::<(), pmonextpvr::NextPvrError>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    client: Option<Client>,
    settings: NextPvrSettings,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing settings snapshot
    pub fn settings(mut self, settings: NextPvrSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.web_service_url = url.into();
        self
    }

    pub fn pin(mut self, pin: impl Into<String>) -> Self {
        self.settings.pin = pin.into();
        self
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.settings.device_name = name.into();
        self
    }

    /// Recurrence code for new series timers (`99` for title keyword rules)
    pub fn recording_default(mut self, code: impl Into<String>) -> Self {
        self.settings.recording_default = code.into();
        self
    }

    pub fn new_episodes(mut self, enabled: bool) -> Self {
        self.settings.new_episodes = enabled;
        self
    }

    pub fn padding(mut self, pre_seconds: u32, post_seconds: u32) -> Self {
        self.settings.pre_padding_seconds = pre_seconds;
        self.settings.post_padding_seconds = post_seconds;
        self
    }

    pub fn debug_logging(mut self, enabled: bool) -> Self {
        self.settings.enable_debug_logging = enabled;
        self
    }

    /// Age after which the session token is renegotiated
    pub fn session_freshness(mut self, freshness: Duration) -> Self {
        self.settings.session_freshness = freshness;
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<NextPvrClient> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(
                    self.timeout
                        .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
                )
                .build()?,
        };
        Ok(NextPvrClient::with_api(NextPvrApi::with_client(
            client,
            self.settings,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_applies_settings() {
        let client = NextPvrClient::builder()
            .base_url("http://pvr:8866/")
            .pin("1234")
            .device_name("den")
            .padding(60, 120)
            .build()
            .unwrap();
        let settings = client.settings();
        assert_eq!(settings.base_url(), "http://pvr:8866");
        assert_eq!(settings.pin, "1234");
        assert_eq!(settings.device_name, "den");
        assert_eq!(settings.pre_padding_seconds, 60);
        assert!(client.last_recording_change().is_none());
    }

    #[test]
    fn test_change_marker_only_moves_on_success() {
        let client = NextPvrClient::builder().build().unwrap();
        let failed = client.mutated(Err(NextPvrError::backend("recording.delete", "1", "nope")));
        assert!(failed.is_err());
        assert!(client.last_recording_change().is_none());

        client.mutated(Ok(())).unwrap();
        let first = client.last_recording_change().unwrap();
        client.mutated(Ok(())).unwrap();
        assert!(client.last_recording_change().unwrap() >= first);
    }

    #[tokio::test]
    async fn test_timer_defaults_without_backend_defaults() {
        let client = NextPvrClient::builder()
            .padding(90, 600)
            .new_episodes(true)
            .build()
            .unwrap();
        let timer = client.new_timer_defaults().await;
        assert_eq!(timer.pre_padding_seconds, 90);
        assert_eq!(timer.post_padding_seconds, 600);
        assert!(timer.record_new_only);
    }

    #[test]
    fn test_from_config_obj() {
        let config = Config::from_yaml("sources:\n  nextpvr:\n    pin: \"4321\"\n").unwrap();
        let client = NextPvrClient::from_config_obj(&config).unwrap();
        assert_eq!(client.settings().pin, "4321");
        assert_eq!(client.settings().base_url(), "http://localhost:8866");
    }
}
