//! Recordings and single timers (`recording.list`, `recording.save`, `recording.delete`)
//!
//! Ready recordings and pending timers share the same wire record, selected
//! with the `filter` parameter.

use super::{
    deserialize_id, from_unix_secs, non_empty, parse_air_date, ApiOutcome, GenreFlags, NextPvrApi,
};
use crate::error::{NextPvrError, Result};
use crate::models::{Recording, RecordingStatus, Timer};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct RecordingsResponse {
    #[serde(default)]
    recordings: Vec<RecordingResponse>,
}

#[derive(Debug, Deserialize)]
struct RecordingResponse {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default, alias = "description")]
    desc: Option<String>,
    /// Unix seconds
    #[serde(default, rename = "startTime")]
    start_time: i64,
    /// Seconds
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    status: String,
    #[serde(default)]
    file: Option<String>,
    #[serde(default, rename = "channelId", deserialize_with = "deserialize_id")]
    channel_id: String,
    #[serde(default)]
    season: Option<u32>,
    #[serde(default)]
    episode: Option<u32>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default, rename = "epgEventId", deserialize_with = "deserialize_id")]
    epg_event_id: String,
    /// Minutes
    #[serde(default, rename = "prePadding")]
    pre_padding: i64,
    #[serde(default, rename = "postPadding")]
    post_padding: i64,
    #[serde(default, rename = "recurringParent", deserialize_with = "deserialize_id")]
    recurring_parent: String,
    #[serde(default)]
    original: Option<String>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default, rename = "starRating")]
    star_rating: Option<f32>,
    #[serde(default)]
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct LastUpdatedResponse {
    #[serde(alias = "lastUpdated")]
    last_updated: i64,
}

/// Padding is whole minutes on the wire
pub(crate) fn padding_minutes(seconds: u32) -> String {
    (seconds / 60).to_string()
}

fn padding_seconds(minutes: i64) -> u32 {
    u32::try_from(minutes.max(0).saturating_mul(60)).unwrap_or(u32::MAX)
}

/// `recording.save` needs the numeric EPG event id
fn event_id(program_id: &str) -> Result<String> {
    program_id
        .trim()
        .parse::<i64>()
        .map(|id| id.to_string())
        .map_err(|_| NextPvrError::InvalidRequest(format!("program id {program_id:?} is not numeric")))
}

impl NextPvrApi {
    async fn convert_recording(&self, r: RecordingResponse) -> Recording {
        let flags = GenreFlags::from_genres(&r.genres);
        let episode_title = non_empty(r.subtitle);
        let start_time = from_unix_secs(r.start_time);

        let mut path = None;
        if let Some(file) = r.file.as_deref().filter(|f| !f.is_empty()) {
            if tokio::fs::try_exists(file).await.unwrap_or(false) {
                path = Some(file.to_string());
            }
        }
        let url = path
            .is_none()
            .then(|| self.backend_url("live", &[("recording", r.id.as_str())]));

        let image_url = Some(self.backend_url(
            "service",
            &[
                ("method", "recording.artwork"),
                ("recording_id", r.id.as_str()),
                ("prefer", "poster"),
            ],
        ));

        Recording {
            channel_id: r.channel_id,
            is_series: !flags.movie && (episode_title.is_some() || r.season.is_some()),
            is_movie: flags.movie,
            is_news: flags.news,
            is_sports: flags.sports,
            is_kids: flags.kids,
            name: r.name,
            episode_title,
            overview: non_empty(r.desc),
            path,
            url,
            start_time,
            end_time: start_time + Duration::seconds(r.duration.max(0)),
            status: RecordingStatus::from_backend(&r.status),
            image_url,
            genres: r.genres,
            program_id: r.epg_event_id,
            season_number: r.season,
            episode_number: r.episode,
            rating: non_empty(r.rating),
            community_rating: r.star_rating,
            original_air_date: parse_air_date(r.original.as_deref()),
            production_year: r.year,
            last_updated: Utc::now(),
            id: r.id,
        }
    }

    fn convert_timer(r: RecordingResponse) -> Timer {
        let start_time = from_unix_secs(r.start_time);
        Timer {
            channel_id: r.channel_id,
            program_id: r.epg_event_id,
            name: r.name,
            overview: non_empty(r.desc),
            start_time,
            end_time: start_time + Duration::seconds(r.duration.max(0)),
            pre_padding_seconds: padding_seconds(r.pre_padding),
            post_padding_seconds: padding_seconds(r.post_padding),
            status: RecordingStatus::from_backend(&r.status),
            series_timer_id: Some(r.recurring_parent).filter(|p| !p.is_empty() && p != "0"),
            id: r.id,
        }
    }

    async fn fetch_recordings(
        &self,
        filter: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecordingResponse>> {
        let response: RecordingsResponse = self
            .fetch(
                "recording.list",
                &[("filter", filter.to_string())],
                filter,
                cancel,
            )
            .await?;
        Ok(response.recordings)
    }

    /// Completed and in progress recordings (`filter=ready`)
    pub async fn list_recordings(&self, cancel: &CancellationToken) -> Result<Vec<Recording>> {
        info!("Retrieving NextPVR recordings");
        let raw = self.fetch_recordings("ready", cancel).await?;
        let mut recordings = Vec::with_capacity(raw.len());
        for r in raw {
            recordings.push(self.convert_recording(r).await);
        }
        debug!(count = recordings.len(), "NextPVR recordings retrieved");
        Ok(recordings)
    }

    /// Pending single recordings (`filter=pending`)
    pub async fn list_timers(&self, cancel: &CancellationToken) -> Result<Vec<Timer>> {
        info!("Retrieving NextPVR timers");
        let raw = self.fetch_recordings("pending", cancel).await?;
        Ok(raw.into_iter().map(Self::convert_timer).collect())
    }

    /// Schedules a single recording of `timer.program_id`
    pub async fn create_timer(&self, timer: &Timer, cancel: &CancellationToken) -> Result<()> {
        let event_id = event_id(&timer.program_id)?;
        info!(event_id = %event_id, "Creating NextPVR timer");
        self.mutate(
            "recording.save",
            &[
                ("event_id", event_id.clone()),
                ("pre_padding", padding_minutes(timer.pre_padding_seconds)),
                ("post_padding", padding_minutes(timer.post_padding_seconds)),
            ],
            &event_id,
            cancel,
        )
        .await
    }

    /// Changes the padding of an existing timer
    pub async fn update_timer(&self, timer: &Timer, cancel: &CancellationToken) -> Result<()> {
        info!(timer_id = %timer.id, "Updating NextPVR timer");
        self.mutate(
            "recording.save",
            &[
                ("pre_padding", padding_minutes(timer.pre_padding_seconds)),
                ("post_padding", padding_minutes(timer.post_padding_seconds)),
                ("recording_id", timer.id.clone()),
                ("event_id", timer.program_id.clone()),
            ],
            &timer.id,
            cancel,
        )
        .await
    }

    pub async fn cancel_timer(&self, timer_id: &str, cancel: &CancellationToken) -> Result<()> {
        info!(timer_id, "Cancelling NextPVR timer");
        self.mutate(
            "recording.delete",
            &[("recording_id", timer_id.to_string())],
            timer_id,
            cancel,
        )
        .await
    }

    pub async fn delete_recording(&self, recording_id: &str, cancel: &CancellationToken) -> Result<()> {
        info!(recording_id, "Deleting NextPVR recording");
        self.mutate(
            "recording.delete",
            &[("recording_id", recording_id.to_string())],
            recording_id,
            cancel,
        )
        .await
    }

    /// Raw `recording.lastupdated` read, unix seconds (0 when offline)
    pub(crate) async fn last_updated(&self, cancel: &CancellationToken) -> Result<i64> {
        match self
            .authenticated(
                "recording.lastupdated",
                &[("ignore_resume", "true".to_string())],
                cancel,
            )
            .await?
        {
            ApiOutcome::Ok(json) => {
                let response: LastUpdatedResponse = serde_json::from_value(json)?;
                Ok(response.last_updated)
            }
            ApiOutcome::BackendError(reason) => Err(NextPvrError::backend(
                "recording.lastupdated",
                "last update",
                reason,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NextPvrSettings;
    use serde_json::json;

    fn api() -> NextPvrApi {
        NextPvrApi::new(NextPvrSettings {
            web_service_url: "http://pvr:8866".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn raw(value: serde_json::Value) -> RecordingResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_padding_is_truncated_to_minutes() {
        assert_eq!(padding_minutes(0), "0");
        assert_eq!(padding_minutes(119), "1");
        assert_eq!(padding_minutes(600), "10");
        assert_eq!(padding_seconds(-3), 0);
        assert_eq!(padding_seconds(2), 120);
    }

    #[test]
    fn test_event_id_must_be_numeric() {
        assert_eq!(event_id(" 42 ").unwrap(), "42");
        assert!(matches!(event_id("abc"), Err(NextPvrError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_url() {
        let recording = api()
            .convert_recording(raw(json!({
                "id": 12,
                "name": "Planet Earth",
                "subtitle": "Jungles",
                "startTime": 1_700_000_000,
                "duration": 3600,
                "status": "Ready",
                "file": "/definitely/not/here.ts",
                "channelId": 3,
                "genres": ["Documentary"]
            })))
            .await;

        assert!(recording.path.is_none());
        assert_eq!(recording.url.as_deref(), Some("http://pvr:8866/live?recording=12"));
        assert_eq!(recording.status, RecordingStatus::Completed);
        assert!(recording.is_series);
        assert_eq!(recording.end_time - recording.start_time, Duration::hours(1));
        assert_eq!(
            recording.image_url.as_deref(),
            Some("http://pvr:8866/service?method=recording.artwork&recording_id=12&prefer=poster")
        );
    }

    #[tokio::test]
    async fn test_existing_file_is_used_as_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let location = file.path().to_string_lossy().to_string();
        let recording = api()
            .convert_recording(raw(json!({
                "id": "13",
                "name": "Heat",
                "startTime": 1_700_000_000,
                "duration": 60,
                "status": "recording",
                "file": location.clone(),
                "genres": ["Movie", "Crime"]
            })))
            .await;

        assert_eq!(recording.path.as_deref(), Some(location.as_str()));
        assert!(recording.url.is_none());
        assert!(recording.is_movie);
        assert!(!recording.is_series);
        assert_eq!(recording.status, RecordingStatus::InProgress);
    }

    #[test]
    fn test_timer_conversion() {
        let timer = NextPvrApi::convert_timer(raw(json!({
            "id": 99,
            "name": "News at Ten",
            "startTime": 1_700_000_000,
            "duration": 1800,
            "status": "Pending",
            "channelId": 1,
            "epgEventId": 5555,
            "prePadding": 2,
            "postPadding": 5,
            "recurringParent": 0
        })));

        assert_eq!(timer.id, "99");
        assert_eq!(timer.program_id, "5555");
        assert_eq!(timer.pre_padding_seconds, 120);
        assert_eq!(timer.post_padding_seconds, 300);
        assert!(timer.series_timer_id.is_none());
        assert_eq!(timer.status, RecordingStatus::Pending);
    }
}
