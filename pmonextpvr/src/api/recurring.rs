//! Recurring recording rules (`recording.recurring.*`)
//!
//! NextPVR knows a handful of recurrence codes and title keyword rules. The
//! richer [`SeriesTimer`] shape is mapped onto them when saving a rule.

use super::recordings::padding_minutes;
use super::{deserialize_id, from_unix_secs, NextPvrApi};
use crate::error::{NextPvrError, Result};
use crate::models::SeriesTimer;
use chrono::Weekday;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Record new episodes only, any time
pub const RECURRING_NEW_EPISODES: u32 = 1;
/// Record every episode, any time
pub const RECURRING_ALL_EPISODES: u32 = 2;
/// Same timeslot on selected days
pub const RECURRING_SPECIFIC_DAYS: u32 = 3;
/// Same timeslot every day
pub const RECURRING_EVERY_DAY: u32 = 4;
/// Configuration code selecting a title keyword rule
pub const RECURRING_TITLE_KEYWORD: u32 = 99;

/// How new series timers are created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurringMode {
    /// Every program whose title matches, on any channel
    TitleKeyword,
    /// A recurrence code keyed on the program's event id
    Recurrence(u32),
}

impl RecurringMode {
    /// Parses the `recording_default` configuration value
    pub fn from_code(code: &str) -> Result<Self> {
        match code.trim().parse::<u32>() {
            Ok(RECURRING_TITLE_KEYWORD) => Ok(RecurringMode::TitleKeyword),
            Ok(code) => Ok(RecurringMode::Recurrence(code)),
            Err(_) => Err(NextPvrError::InvalidRequest(format!(
                "recording_default {code:?} is not a recurrence code"
            ))),
        }
    }
}

/// Doubles single quotes for the backend's query syntax
fn escape_title(title: &str) -> String {
    title.replace('\'', "''")
}

fn keyword_rule(params: &mut Vec<(&'static str, String)>, title: &str) {
    let escaped = escape_title(title);
    params.push(("keyword", format!("title like '{escaped}'")));
    params.push(("name", escaped));
}

fn common_params(timer: &SeriesTimer) -> Vec<(&'static str, String)> {
    vec![
        ("pre_padding", padding_minutes(timer.pre_padding_seconds)),
        ("post_padding", padding_minutes(timer.post_padding_seconds)),
        ("keep", timer.keep_up_to.to_string()),
    ]
}

/// Parameters of `recording.recurring.save` for a new rule
///
/// `new_episodes` is the configured "new episodes only" default.
pub fn create_rule(
    timer: &SeriesTimer,
    mode: RecurringMode,
    new_episodes: bool,
) -> Vec<(&'static str, String)> {
    let mut params = common_params(timer);

    match mode {
        RecurringMode::TitleKeyword => keyword_rule(&mut params, &timer.name),
        RecurringMode::Recurrence(code) => {
            params.push(("event_id", timer.program_id.clone()));
            params.push(("recurring_type", code.to_string()));
        }
    }

    if timer.record_new_only || new_episodes {
        params.push(("only_new", "true".to_string()));
    }

    if matches!(
        mode,
        RecurringMode::Recurrence(RECURRING_SPECIFIC_DAYS | RECURRING_EVERY_DAY)
    ) {
        params.push(("timeslot", "true".to_string()));
    }

    params
}

/// Recurrence code matching the shape of an existing rule, `None` for a
/// keyword rule
pub fn derive_recurring_type(timer: &SeriesTimer) -> Option<u32> {
    if timer.record_any_channel {
        return None;
    }
    let code = if timer.record_any_time {
        if timer.record_new_only {
            RECURRING_NEW_EPISODES
        } else {
            RECURRING_ALL_EPISODES
        }
    } else if timer.distinct_days() == 7 {
        RECURRING_EVERY_DAY
    } else {
        RECURRING_SPECIFIC_DAYS
    };
    Some(code)
}

/// Parameters of `recording.recurring.save` when updating `timer.id`
pub fn derive_update_rule(timer: &SeriesTimer) -> Vec<(&'static str, String)> {
    let mut params = common_params(timer);
    params.push(("recurring_id", timer.id.clone()));

    match derive_recurring_type(timer) {
        None => keyword_rule(&mut params, &timer.name),
        Some(code) => params.push(("recurring_type", code.to_string())),
    }

    if timer.record_new_only {
        params.push(("only_new", "true".to_string()));
    }

    params
}

#[derive(Debug, Deserialize)]
struct RecurringsResponse {
    #[serde(default)]
    recurrings: Vec<RecurringResponse>,
}

#[derive(Debug, Deserialize)]
struct RecurringResponse {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(default, rename = "type")]
    recurring_type: u32,
    #[serde(default)]
    name: String,
    #[serde(default, alias = "channelID", rename = "channelId", deserialize_with = "deserialize_id")]
    channel_id: String,
    #[serde(default, rename = "epgEventId", deserialize_with = "deserialize_id")]
    event_id: String,
    #[serde(default)]
    keep: u32,
    /// Minutes
    #[serde(default, rename = "prePadding")]
    pre_padding: u32,
    #[serde(default, rename = "postPadding")]
    post_padding: u32,
    #[serde(default, rename = "onlyNewEpisodes")]
    only_new: bool,
    /// Comma separated weekday names
    #[serde(default)]
    days: String,
    #[serde(default, rename = "startTime")]
    start_time: Option<i64>,
    #[serde(default, rename = "endTime")]
    end_time: Option<i64>,
}

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn parse_days(days: &str) -> Vec<Weekday> {
    days.split(|c: char| c == ',' || c == ' ')
        .filter_map(|d| d.trim().parse::<Weekday>().ok())
        .collect()
}

impl RecurringResponse {
    fn into_series_timer(self) -> SeriesTimer {
        let record_any_channel =
            self.recurring_type == RECURRING_TITLE_KEYWORD || self.channel_id.is_empty() || self.channel_id == "0";
        let days = if self.recurring_type == RECURRING_EVERY_DAY {
            ALL_DAYS.to_vec()
        } else {
            parse_days(&self.days)
        };
        SeriesTimer {
            id: self.id,
            record_any_channel,
            record_any_time: !matches!(
                self.recurring_type,
                RECURRING_SPECIFIC_DAYS | RECURRING_EVERY_DAY
            ),
            record_new_only: self.only_new || self.recurring_type == RECURRING_NEW_EPISODES,
            channel_id: self.channel_id,
            program_id: self.event_id,
            name: self.name,
            days,
            pre_padding_seconds: self.pre_padding.saturating_mul(60),
            post_padding_seconds: self.post_padding.saturating_mul(60),
            keep_up_to: self.keep,
            start_time: self.start_time.map(from_unix_secs),
            end_time: self.end_time.map(from_unix_secs),
        }
    }
}

impl NextPvrApi {
    /// Lists the recurring rules (`recording.recurring.list`)
    pub async fn list_series_timers(&self, cancel: &CancellationToken) -> Result<Vec<SeriesTimer>> {
        info!("Retrieving NextPVR series timers");
        let response: RecurringsResponse = self
            .fetch("recording.recurring.list", &[], "recurrings", cancel)
            .await?;
        Ok(response
            .recurrings
            .into_iter()
            .map(RecurringResponse::into_series_timer)
            .collect())
    }

    /// Creates a rule with the configured recurrence mode
    pub async fn create_series_timer(
        &self,
        timer: &SeriesTimer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mode = RecurringMode::from_code(&self.settings().recording_default)?;
        if matches!(mode, RecurringMode::Recurrence(_)) && timer.program_id.trim().is_empty() {
            return Err(NextPvrError::InvalidRequest(
                "a recurrence rule needs a program id".into(),
            ));
        }
        let params = create_rule(timer, mode, self.settings().new_episodes);
        info!(channel_id = %timer.channel_id, name = %timer.name, ?mode, "Creating NextPVR series timer");
        debug!(?params, "recording.recurring.save");
        self.mutate("recording.recurring.save", &params, &timer.program_id, cancel)
            .await
    }

    /// Saves `timer` over the rule `timer.id`
    pub async fn update_series_timer(
        &self,
        timer: &SeriesTimer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let params = derive_update_rule(timer);
        info!(recurring_id = %timer.id, name = %timer.name, "Updating NextPVR series timer");
        debug!(?params, "recording.recurring.save");
        self.mutate("recording.recurring.save", &params, &timer.id, cancel)
            .await
    }

    pub async fn cancel_series_timer(
        &self,
        recurring_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(recurring_id, "Cancelling NextPVR series timer");
        self.mutate(
            "recording.recurring.delete",
            &[("recurring_id", recurring_id.to_string())],
            recurring_id,
            cancel,
        )
        .await
    }
}
