//! Data model for the NextPVR client
//!
//! These are the values handed to the host layer. Wire formats are private to
//! the `api` submodules and converted into these structs.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Kind of channel, drives the media type of recorded items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChannelType {
    #[default]
    Tv,
    Radio,
}

/// A tunable channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub number: String,
    pub name: String,
    pub channel_type: ChannelType,
    pub icon_url: Option<String>,
}

/// Lifecycle state of a recording or a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl RecordingStatus {
    /// Maps the backend status string (`ready`, `recording`, `pending`...)
    pub fn from_backend(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "pending" | "conflict" => RecordingStatus::Pending,
            "recording" => RecordingStatus::InProgress,
            "ready" => RecordingStatus::Completed,
            _ => RecordingStatus::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Pending => "Pending",
            RecordingStatus::InProgress => "InProgress",
            RecordingStatus::Completed => "Completed",
            RecordingStatus::Error => "Error",
        }
    }
}

/// A completed (or in progress) recording
///
/// Exactly one of `path` and `url` is set: `path` when the recorded file is
/// reachable on the local filesystem, `url` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub channel_id: String,
    pub name: String,
    pub episode_title: Option<String>,
    pub overview: Option<String>,
    pub path: Option<String>,
    pub url: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: RecordingStatus,
    pub is_series: bool,
    pub is_movie: bool,
    pub is_news: bool,
    pub is_sports: bool,
    pub is_kids: bool,
    pub image_url: Option<String>,
    pub genres: Vec<String>,
    pub program_id: String,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub rating: Option<String>,
    pub community_rating: Option<f32>,
    pub original_air_date: Option<DateTime<Utc>>,
    pub production_year: Option<i32>,
    pub last_updated: DateTime<Utc>,
}

/// A pending single recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub id: String,
    pub channel_id: String,
    pub program_id: String,
    pub name: String,
    pub overview: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub pre_padding_seconds: u32,
    pub post_padding_seconds: u32,
    pub status: RecordingStatus,
    pub series_timer_id: Option<String>,
}

/// A recurring recording rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTimer {
    pub id: String,
    pub channel_id: String,
    pub program_id: String,
    pub name: String,
    pub record_any_channel: bool,
    pub record_any_time: bool,
    pub record_new_only: bool,
    pub days: Vec<Weekday>,
    pub pre_padding_seconds: u32,
    pub post_padding_seconds: u32,
    /// Number of episodes to keep, 0 keeps everything
    pub keep_up_to: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SeriesTimer {
    /// Number of distinct weekdays selected
    pub fn distinct_days(&self) -> usize {
        let mut days = self.days.clone();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        days.len()
    }
}

/// A guide entry from `channel.listings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub channel_id: String,
    pub name: String,
    pub episode_title: Option<String>,
    pub overview: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub genres: Vec<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub original_air_date: Option<DateTime<Utc>>,
    pub rating: Option<String>,
    pub community_rating: Option<f32>,
    pub image_url: Option<String>,
    pub is_movie: bool,
    pub is_series: bool,
    pub is_news: bool,
    pub is_sports: bool,
    pub is_kids: bool,
    pub is_repeat: bool,
}

/// Value returned by the last-change check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMarker {
    /// Backend unreachable or answering the zero epoch
    Offline,
    At(DateTime<Utc>),
}

impl ChangeMarker {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ChangeMarker::Offline => None,
            ChangeMarker::At(ts) => Some(*ts),
        }
    }
}

/// Schedule defaults fetched from the backend after a successful login
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendDefaults {
    pub pre_padding_minutes: u32,
    pub post_padding_minutes: u32,
    pub all_channels: bool,
    pub only_new: bool,
    pub any_timeslot: bool,
    pub show_new_in_guide: bool,
    /// `/Settings/General/ArtworkFromSchedulesDirect`
    pub artwork_from_backend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerInfo {
    pub name: String,
    pub status: String,
    pub detail: Option<String>,
}

/// Backend version and tuner state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub version: String,
    pub update_available: bool,
    pub tuners: Vec<TunerInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RecordingStatus::from_backend("Ready"), RecordingStatus::Completed);
        assert_eq!(RecordingStatus::from_backend("recording"), RecordingStatus::InProgress);
        assert_eq!(RecordingStatus::from_backend("Conflict"), RecordingStatus::Pending);
        assert_eq!(RecordingStatus::from_backend("failed"), RecordingStatus::Error);
    }

    #[test]
    fn test_distinct_days_ignores_duplicates() {
        let timer = SeriesTimer {
            id: String::new(),
            channel_id: "1".into(),
            program_id: "2".into(),
            name: "News".into(),
            record_any_channel: false,
            record_any_time: false,
            record_new_only: false,
            days: vec![Weekday::Mon, Weekday::Mon, Weekday::Fri],
            pre_padding_seconds: 0,
            post_padding_seconds: 0,
            keep_up_to: 0,
            start_time: None,
            end_time: None,
        };
        assert_eq!(timer.distinct_days(), 2);
    }
}
