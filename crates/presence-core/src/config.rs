//! Configuration types for the presence watcher
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main watcher configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Who to watch, and where
    pub target: TargetConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Optional notification rendering settings
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl WatchConfig {
    /// Create a configuration for one user in one guild, with defaults elsewhere
    pub fn new(guild_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            target: TargetConfig {
                guild_id: guild_id.into(),
                user_id: user_id.into(),
            },
            engine: EngineConfig::default(),
            notification: NotificationConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.target.validate()?;
        self.engine.validate()?;
        self.notification.validate()?;
        Ok(())
    }
}

/// The tracked identity and its community
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Guild (community) id
    pub guild_id: String,
    /// Tracked user id
    pub user_id: String,
}

impl TargetConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_snowflake("guild id", &self.guild_id)?;
        validate_snowflake("user id", &self.user_id)?;
        Ok(())
    }
}

fn validate_snowflake(what: &str, value: &str) -> Result<(), crate::Error> {
    if value.is_empty() {
        return Err(crate::Error::config(format!("{what} cannot be empty")));
    }
    if !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(crate::Error::config(format!(
            "{what} must be numeric, got '{value}'"
        )));
    }
    Ok(())
}

/// What a poll tick does when the observed status is unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollPolicy {
    /// Re-render and edit the notification on every poll tick
    #[default]
    AlwaysUpsert,
    /// Only notify when the status differs from the last delivered one
    OnChange,
}

impl std::str::FromStr for PollPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" | "always-upsert" => Ok(Self::AlwaysUpsert),
            "on-change" | "on_change" | "onchange" => Ok(Self::OnChange),
            other => Err(crate::Error::config(format!(
                "unknown poll policy '{other}' (expected 'always' or 'on-change')"
            ))),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between poll ticks (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for every outbound adapter call (in milliseconds)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Behaviour of poll ticks when nothing changed
    #[serde(default)]
    pub poll_policy: PollPolicy,

    /// Capacity of the monitoring event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_ms == 0 {
            return Err(crate::Error::config("poll interval must be > 0"));
        }
        if self.call_timeout_ms == 0 {
            return Err(crate::Error::config("call timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            poll_policy: PollPolicy::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Notification rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Title of the notification
    #[serde(default = "default_title")]
    pub title: String,

    /// IANA timezone used for the human-readable timestamp
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Colour used when the member is online (24-bit RGB)
    #[serde(default = "default_online_color")]
    pub online_color: u32,

    /// Colour used when the member is offline (24-bit RGB)
    #[serde(default = "default_offline_color")]
    pub offline_color: u32,
}

impl NotificationConfig {
    /// Parse the configured timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz, crate::Error> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| crate::Error::config(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.title.trim().is_empty() {
            return Err(crate::Error::config("notification title cannot be empty"));
        }
        self.tz()?;
        for color in [self.online_color, self.offline_color] {
            if color > 0xFF_FF_FF {
                return Err(crate::Error::config(format!(
                    "colour {color:#x} is not a 24-bit RGB value"
                )));
            }
        }
        Ok(())
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            timezone: default_timezone(),
            online_color: default_online_color(),
            offline_color: default_offline_color(),
        }
    }
}

fn default_title() -> String {
    "Presence update".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_online_color() -> u32 {
    0x2E_CC_71
}

fn default_offline_color() -> u32 {
    0xE7_4C_3C
}
