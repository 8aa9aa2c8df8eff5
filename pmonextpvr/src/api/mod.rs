//! Low-level access to the NextPVR web service
//!
//! Every call is an HTTP GET on `{base}/service?method=<name>&...`. The
//! backend answers JSON; a failure is either a transport error, a non-2xx
//! status or an otherwise valid body carrying `"stat": "fail"`.

pub mod channels;
pub mod recordings;
pub mod recurring;
pub mod session;
pub mod settings;
pub mod signing;

use crate::config_ext::NextPvrSettings;
use crate::error::{NextPvrError, Result};
use crate::models::BackendDefaults;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use session::Session;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Outcome of a call that reached the backend
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome {
    Ok(Value),
    /// The body carried `stat: fail`, with the backend's message
    BackendError(String),
}

/// Low-level NextPVR client
///
/// Owns the HTTP client and the session of one configured backend.
pub struct NextPvrApi {
    client: Client,
    settings: NextPvrSettings,
    session: RwLock<Session>,
    /// Serializes handshakes, held across the login round trips only
    handshake_gate: Mutex<()>,
    defaults: RwLock<Option<BackendDefaults>>,
}

impl NextPvrApi {
    pub fn new(settings: NextPvrSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    /// Uses a preconfigured HTTP client
    pub fn with_client(client: Client, settings: NextPvrSettings) -> Self {
        Self {
            client,
            settings,
            session: RwLock::new(Session::default()),
            handshake_gate: Mutex::new(()),
            defaults: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &NextPvrSettings {
        &self.settings
    }

    pub fn base_url(&self) -> &str {
        self.settings.base_url()
    }

    /// Builds `{base}/{path}?k=v...` with encoded query pairs
    pub(crate) fn backend_url(&self, path: &str, pairs: &[(&str, &str)]) -> String {
        let raw = format!("{}/{}", self.base_url(), path);
        match Url::parse(&raw) {
            Ok(mut url) => {
                url.query_pairs_mut().extend_pairs(pairs);
                url.into()
            }
            Err(err) => {
                warn!(url = %raw, "Invalid NextPVR URL: {}", err);
                raw
            }
        }
    }

    /// Sends one request without any session handling
    ///
    /// Aborts the request and returns [`NextPvrError::Cancelled`] when `cancel`
    /// fires first.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<ApiOutcome> {
        let url = format!("{}/service", self.base_url());
        debug!(method, params = params.len(), "NextPVR request");

        let request = self
            .client
            .get(&url)
            .query(&[("method", method)])
            .query(params);

        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(NextPvrError::Cancelled),
            response = async {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    warn!(method, code = status.as_u16(), "NextPVR HTTP error: {}", message);
                    return Err(NextPvrError::HttpStatus { code: status.as_u16(), message });
                }
                Ok::<String, NextPvrError>(response.text().await?)
            } => response?,
        };

        if self.settings.enable_debug_logging {
            debug!(method, body = %text, "NextPVR response");
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| {
            warn!(method, "Failed to parse NextPVR response: {}", e);
            NextPvrError::JsonParse(e)
        })?;

        if json.get("stat").and_then(Value::as_str) == Some("fail") {
            let message = error_message(&json);
            warn!(method, "NextPVR reported a failure: {}", message);
            return Ok(ApiOutcome::BackendError(message));
        }

        Ok(ApiOutcome::Ok(json))
    }

    /// Sends a request carrying a fresh `sid`
    ///
    /// A transient failure marks the session stale so the next call
    /// renegotiates it.
    pub(crate) async fn authenticated(
        &self,
        method: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<ApiOutcome> {
        let sid = self.ensure_connection(cancel).await?;

        let mut all = Vec::with_capacity(params.len() + 1);
        all.extend_from_slice(params);
        all.push(("sid", sid));

        match self.call(method, &all, cancel).await {
            Err(err) if err.is_transient() => {
                self.mark_stale().await;
                Err(err)
            }
            other => other,
        }
    }

    /// Authenticated read returning the deserialized body
    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: &[(&str, String)],
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<T> {
        match self.authenticated(method, params, cancel).await? {
            ApiOutcome::Ok(json) => Ok(serde_json::from_value(json)?),
            ApiOutcome::BackendError(reason) => Err(NextPvrError::backend(method, id, reason)),
        }
    }

    /// Authenticated mutation, succeeds only on an explicit `stat: ok`
    pub(crate) async fn mutate(
        &self,
        method: &'static str,
        params: &[(&str, String)],
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.authenticated(method, params, cancel).await? {
            ApiOutcome::Ok(json) if is_ok(&json) => Ok(()),
            ApiOutcome::Ok(_) => Err(NextPvrError::backend(
                method,
                id,
                "backend returned no success verdict",
            )),
            ApiOutcome::BackendError(reason) => Err(NextPvrError::backend(method, id, reason)),
        }
    }
}

pub(crate) fn is_ok(json: &Value) -> bool {
    json.get("stat").and_then(Value::as_str) == Some("ok")
}

fn error_message(json: &Value) -> String {
    json.get("message")
        .and_then(Value::as_str)
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
        })
        .unwrap_or("Unknown error")
        .to_string()
}

/// Accepts identifiers sent either as JSON numbers or strings
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!("unexpected id: {other}"))),
    }
}

pub(crate) fn from_unix_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

pub(crate) fn from_unix_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Parses `YYYY-MM-DD` air dates as midnight UTC
pub(crate) fn parse_air_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    let date = NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Category flags derived from a genre list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GenreFlags {
    pub movie: bool,
    pub news: bool,
    pub sports: bool,
    pub kids: bool,
}

impl GenreFlags {
    pub fn from_genres(genres: &[String]) -> Self {
        let mut flags = GenreFlags::default();
        for genre in genres {
            let genre = genre.to_lowercase();
            flags.movie |= genre.contains("movie") || genre.contains("film");
            flags.news |= genre.contains("news");
            flags.sports |= genre.contains("sport");
            flags.kids |= genre.contains("kids") || genre.contains("children");
        }
        flags
    }
}
