//! Backend settings, version and tuner status

use super::{ApiOutcome, NextPvrApi};
use crate::error::{NextPvrError, Result};
use crate::models::{BackendDefaults, ServerStatus, TunerInfo};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const ARTWORK_SETTING: &str = "/Settings/General/ArtworkFromSchedulesDirect";

/// Response of `setting.list`
#[derive(Debug, Deserialize)]
struct ScheduleSettings {
    #[serde(default, alias = "prePadding")]
    pre_padding_min: i64,
    #[serde(default, alias = "postPadding")]
    post_padding_min: i64,
    #[serde(default, rename = "allChannels")]
    all_channels: bool,
    #[serde(default, rename = "onlyNew")]
    only_new: bool,
    #[serde(default, rename = "recordAnyTimeslot")]
    record_any_timeslot: bool,
    #[serde(default, rename = "showNewInGuide")]
    show_new_in_guide: bool,
}

impl ScheduleSettings {
    fn into_defaults(self, artwork_from_backend: bool) -> BackendDefaults {
        BackendDefaults {
            pre_padding_minutes: clamp_minutes(self.pre_padding_min),
            post_padding_minutes: clamp_minutes(self.post_padding_min),
            all_channels: self.all_channels,
            only_new: self.only_new,
            any_timeslot: self.record_any_timeslot,
            show_new_in_guide: self.show_new_in_guide,
            artwork_from_backend,
        }
    }
}

fn clamp_minutes(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Response of `setting.version`
#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(default)]
    version: Option<Value>,
    #[serde(default, rename = "readableVersion")]
    readable_version: Option<String>,
    #[serde(default, rename = "updateAvailable")]
    update_available: bool,
}

/// Response of `system.status`
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    tuners: Vec<TunerResponse>,
}

#[derive(Debug, Deserialize)]
struct TunerResponse {
    #[serde(default, alias = "tunerName")]
    name: String,
    #[serde(default, alias = "tunerStatus")]
    status: String,
    #[serde(default, alias = "recordings")]
    detail: Option<String>,
}

/// `setting.get` answers `{"value": ...}`, as a string or a JSON scalar
fn setting_value(json: &Value) -> Option<String> {
    match json.get("value")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

impl NextPvrApi {
    /// Fetches the schedule defaults and the artwork flag with an already
    /// negotiated `sid`
    pub(crate) async fn load_backend_defaults(
        &self,
        sid: &str,
        cancel: &CancellationToken,
    ) -> Result<BackendDefaults> {
        let list = self
            .call("setting.list", &[("sid", sid.to_string())], cancel)
            .await?;
        let settings: ScheduleSettings = match list {
            ApiOutcome::Ok(json) => serde_json::from_value(json)?,
            ApiOutcome::BackendError(reason) => {
                return Err(NextPvrError::backend("setting.list", "defaults", reason))
            }
        };

        // The schedule defaults stand even when the artwork flag is unreadable
        let artwork_from_backend = match self
            .call(
                "setting.get",
                &[("key", ARTWORK_SETTING.to_string()), ("sid", sid.to_string())],
                cancel,
            )
            .await
        {
            Ok(ApiOutcome::Ok(json)) => {
                setting_value(&json).is_some_and(|v| v.eq_ignore_ascii_case("true"))
            }
            Ok(ApiOutcome::BackendError(reason)) => {
                warn!("NextPVR artwork setting unavailable: {}", reason);
                false
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!("Could not read NextPVR artwork setting: {}", err);
                false
            }
        };

        Ok(settings.into_defaults(artwork_from_backend))
    }

    /// Schedule defaults (`setting.list`)
    pub async fn get_defaults(&self, cancel: &CancellationToken) -> Result<BackendDefaults> {
        let settings: ScheduleSettings = self.fetch("setting.list", &[], "defaults", cancel).await?;
        Ok(settings.into_defaults(self.artwork_from_backend().await))
    }

    /// A named backend setting (`setting.get`), `None` when unset
    pub async fn get_setting(&self, key: &str, cancel: &CancellationToken) -> Result<Option<String>> {
        info!(key, "Fetching NextPVR setting");
        match self
            .authenticated("setting.get", &[("key", key.to_string())], cancel)
            .await?
        {
            ApiOutcome::Ok(json) => Ok(setting_value(&json)),
            ApiOutcome::BackendError(reason) => Err(NextPvrError::backend("setting.get", key, reason)),
        }
    }

    /// Backend version (`setting.version`) and tuner state (`system.status`)
    pub async fn get_status(&self, cancel: &CancellationToken) -> Result<ServerStatus> {
        let version: VersionResponse = self.fetch("setting.version", &[], "version", cancel).await?;
        let status: StatusResponse = self.fetch("system.status", &[], "status", cancel).await?;

        let version_label = version
            .readable_version
            .filter(|v| !v.is_empty())
            .or_else(|| {
                version.version.map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
            })
            .unwrap_or_default();

        Ok(ServerStatus {
            version: version_label,
            update_available: version.update_available,
            tuners: status
                .tuners
                .into_iter()
                .map(|t| TunerInfo {
                    name: t.name,
                    status: t.status,
                    detail: t.detail.filter(|d| !d.is_empty()),
                })
                .collect(),
        })
    }
}
