//! NextPVR settings stored in pmoconfig
//!
//! The `NextPvrConfigExt` trait adds typed accessors for the
//! `sources.nextpvr.*` section of `pmoconfig::Config`.

use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::{Number, Value};
use std::time::Duration;

const SECTION: [&str; 2] = ["sources", "nextpvr"];

pub const DEFAULT_WEB_SERVICE_URL: &str = "http://localhost:8866";
pub const DEFAULT_PIN: &str = "0000";
pub const DEFAULT_DEVICE_NAME: &str = "pmomusic";
pub const DEFAULT_RECORDING_DEFAULT: &str = "2";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 20;
/// Age after which a session token is renegotiated
pub const DEFAULT_SESSION_FRESHNESS: Duration = Duration::from_secs(5 * 60);

/// Snapshot of the NextPVR settings consumed by the client
#[derive(Debug, Clone, PartialEq)]
pub struct NextPvrSettings {
    pub web_service_url: String,
    pub pin: String,
    pub device_name: String,
    pub enable_debug_logging: bool,
    pub new_episodes: bool,
    pub show_repeat: bool,
    pub get_episode_image: bool,
    /// Recurrence mode for new series timers, `99` selects a title keyword rule
    pub recording_default: String,
    pub pre_padding_seconds: u32,
    pub post_padding_seconds: u32,
    pub poll_interval: Duration,
    pub session_freshness: Duration,
}

impl Default for NextPvrSettings {
    fn default() -> Self {
        Self {
            web_service_url: DEFAULT_WEB_SERVICE_URL.to_string(),
            pin: DEFAULT_PIN.to_string(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            enable_debug_logging: false,
            new_episodes: false,
            show_repeat: false,
            get_episode_image: false,
            recording_default: DEFAULT_RECORDING_DEFAULT.to_string(),
            pre_padding_seconds: 0,
            post_padding_seconds: 0,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            session_freshness: DEFAULT_SESSION_FRESHNESS,
        }
    }
}

impl NextPvrSettings {
    /// Base URL without its trailing slashes
    pub fn base_url(&self) -> &str {
        self.web_service_url.trim_end_matches('/')
    }
}

/// Extension trait for NextPVR settings in pmoconfig
///
/// # Example
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmonextpvr::NextPvrConfigExt;
///
/// let config = get_config();
/// config.set_nextpvr_pin("1234")?;
/// let settings = config.get_nextpvr_settings()?;
/// println!("NextPVR at {}", settings.web_service_url);
/// ```
pub trait NextPvrConfigExt {
    fn get_nextpvr_url(&self) -> Result<String>;
    fn set_nextpvr_url(&self, url: &str) -> Result<()>;

    fn get_nextpvr_pin(&self) -> Result<String>;
    fn set_nextpvr_pin(&self, pin: &str) -> Result<()>;

    /// Device name sent with `session.initiate` and live stream URLs
    fn get_nextpvr_device_name(&self) -> Result<String>;

    /// Dumps request and response payloads at debug level
    fn get_nextpvr_debug_logging(&self) -> Result<bool>;
    fn set_nextpvr_debug_logging(&self, enabled: bool) -> Result<()>;

    /// New series timers only record new episodes
    fn get_nextpvr_new_episodes(&self) -> Result<bool>;
    fn set_nextpvr_new_episodes(&self, enabled: bool) -> Result<()>;

    /// Tags guide entries aired before as repeats
    fn get_nextpvr_show_repeat(&self) -> Result<bool>;
    /// Episode artwork in the guide, also enabled by the backend's artwork setting
    fn get_nextpvr_episode_image(&self) -> Result<bool>;

    /// Recurrence code used when creating series timers
    fn get_nextpvr_recording_default(&self) -> Result<String>;
    fn set_nextpvr_recording_default(&self, code: &str) -> Result<()>;

    fn get_nextpvr_pre_padding(&self) -> Result<u32>;
    fn get_nextpvr_post_padding(&self) -> Result<u32>;
    fn set_nextpvr_padding(&self, pre_seconds: u32, post_seconds: u32) -> Result<()>;

    fn get_nextpvr_poll_interval(&self) -> Result<Duration>;

    /// Collects every NextPVR setting
    fn get_nextpvr_settings(&self) -> Result<NextPvrSettings>;
}

fn key(name: &str) -> [&str; 3] {
    [SECTION[0], SECTION[1], name]
}

fn read_string(config: &Config, name: &str, default: &str) -> String {
    match config.get_value(&key(name)) {
        Ok(Value::String(s)) => s,
        Ok(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

fn read_bool(config: &Config, name: &str, default: bool) -> bool {
    match config.get_value(&key(name)) {
        Ok(Value::Bool(b)) => b,
        Ok(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => default,
    }
}

fn read_u64(config: &Config, name: &str, default: u64) -> u64 {
    match config.get_value(&key(name)) {
        Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Ok(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn read_u32(config: &Config, name: &str, default: u32) -> u32 {
    u32::try_from(read_u64(config, name, u64::from(default))).unwrap_or(default)
}

impl NextPvrConfigExt for Config {
    fn get_nextpvr_url(&self) -> Result<String> {
        Ok(read_string(self, "web_service_url", DEFAULT_WEB_SERVICE_URL))
    }

    fn set_nextpvr_url(&self, url: &str) -> Result<()> {
        self.set_value(&key("web_service_url"), Value::String(url.to_string()))
    }

    fn get_nextpvr_pin(&self) -> Result<String> {
        Ok(read_string(self, "pin", DEFAULT_PIN))
    }

    fn set_nextpvr_pin(&self, pin: &str) -> Result<()> {
        self.set_value(&key("pin"), Value::String(pin.to_string()))
    }

    fn get_nextpvr_device_name(&self) -> Result<String> {
        Ok(read_string(self, "device_name", DEFAULT_DEVICE_NAME))
    }

    fn get_nextpvr_debug_logging(&self) -> Result<bool> {
        Ok(read_bool(self, "enable_debug_logging", false))
    }

    fn set_nextpvr_debug_logging(&self, enabled: bool) -> Result<()> {
        self.set_value(&key("enable_debug_logging"), Value::Bool(enabled))
    }

    fn get_nextpvr_new_episodes(&self) -> Result<bool> {
        Ok(read_bool(self, "new_episodes", false))
    }

    fn set_nextpvr_new_episodes(&self, enabled: bool) -> Result<()> {
        self.set_value(&key("new_episodes"), Value::Bool(enabled))
    }

    fn get_nextpvr_show_repeat(&self) -> Result<bool> {
        Ok(read_bool(self, "show_repeat", false))
    }

    fn get_nextpvr_episode_image(&self) -> Result<bool> {
        Ok(read_bool(self, "get_episode_image", false))
    }

    fn get_nextpvr_recording_default(&self) -> Result<String> {
        Ok(read_string(self, "recording_default", DEFAULT_RECORDING_DEFAULT))
    }

    fn set_nextpvr_recording_default(&self, code: &str) -> Result<()> {
        self.set_value(&key("recording_default"), Value::String(code.to_string()))
    }

    fn get_nextpvr_pre_padding(&self) -> Result<u32> {
        Ok(read_u32(self, "pre_padding_seconds", 0))
    }

    fn get_nextpvr_post_padding(&self) -> Result<u32> {
        Ok(read_u32(self, "post_padding_seconds", 0))
    }

    fn set_nextpvr_padding(&self, pre_seconds: u32, post_seconds: u32) -> Result<()> {
        self.set_value(
            &key("pre_padding_seconds"),
            Value::Number(Number::from(pre_seconds)),
        )?;
        self.set_value(
            &key("post_padding_seconds"),
            Value::Number(Number::from(post_seconds)),
        )
    }

    fn get_nextpvr_poll_interval(&self) -> Result<Duration> {
        let secs = read_u64(self, "poll_interval_secs", DEFAULT_POLL_INTERVAL_SECS);
        Ok(Duration::from_secs(secs.max(1)))
    }

    fn get_nextpvr_settings(&self) -> Result<NextPvrSettings> {
        Ok(NextPvrSettings {
            web_service_url: self.get_nextpvr_url()?,
            pin: self.get_nextpvr_pin()?,
            device_name: self.get_nextpvr_device_name()?,
            enable_debug_logging: self.get_nextpvr_debug_logging()?,
            new_episodes: self.get_nextpvr_new_episodes()?,
            show_repeat: self.get_nextpvr_show_repeat()?,
            get_episode_image: self.get_nextpvr_episode_image()?,
            recording_default: self.get_nextpvr_recording_default()?,
            pre_padding_seconds: self.get_nextpvr_pre_padding()?,
            post_padding_seconds: self.get_nextpvr_post_padding()?,
            poll_interval: self.get_nextpvr_poll_interval()?,
            session_freshness: DEFAULT_SESSION_FRESHNESS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_embedded_config() {
        let config = Config::in_memory().unwrap();
        let settings = config.get_nextpvr_settings().unwrap();
        assert_eq!(settings, NextPvrSettings::default());
    }

    #[test]
    fn test_yaml_values_and_numeric_codes() {
        let config = Config::from_yaml(
            "sources:\n  nextpvr:\n    web_service_url: http://pvr:8866/\n    pin: 4321\n    recording_default: 99\n    pre_padding_seconds: 120\n    new_episodes: true\n",
        )
        .unwrap();
        let settings = config.get_nextpvr_settings().unwrap();
        assert_eq!(settings.base_url(), "http://pvr:8866");
        assert_eq!(settings.pin, "4321");
        assert_eq!(settings.recording_default, "99");
        assert_eq!(settings.pre_padding_seconds, 120);
        assert_eq!(settings.post_padding_seconds, 0);
        assert!(settings.new_episodes);
    }

    #[test]
    fn test_setters_round_trip() {
        let config = Config::in_memory().unwrap();
        config.set_nextpvr_pin("9999").unwrap();
        config.set_nextpvr_padding(60, 600).unwrap();
        config.set_nextpvr_recording_default("4").unwrap();
        assert_eq!(config.get_nextpvr_pin().unwrap(), "9999");
        assert_eq!(config.get_nextpvr_pre_padding().unwrap(), 60);
        assert_eq!(config.get_nextpvr_post_padding().unwrap(), 600);
        assert_eq!(config.get_nextpvr_recording_default().unwrap(), "4");
    }
}
