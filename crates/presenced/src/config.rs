//! Daemon configuration from environment variables

use anyhow::{Context, Result};
use presence_core::config::{PollPolicy, WatchConfig};
use presence_source_discord::DiscordConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
pub struct Config {
    pub bot_token: String,
    pub user_id: String,
    pub guild_id: String,
    pub webhook_url: Option<String>,
    pub http_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub call_timeout_secs: u64,
    pub poll_policy: PollPolicy,
    pub timezone: String,
    pub notify_title: String,
    pub log_level: String,
}

// Keeps the bot token and webhook URL out of logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<REDACTED>")
            .field("user_id", &self.user_id)
            .field("guild_id", &self.guild_id)
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "<REDACTED>"),
            )
            .field("http_addr", &self.http_addr)
            .field("static_dir", &self.static_dir)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("poll_policy", &self.poll_policy)
            .field("timezone", &self.timezone)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from the process environment (after `.env`)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{key} is required. Set it via: export {key}=..."))
        };
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let parse_secs = |key: &str, default: u64| -> Result<u64> {
            match optional(key) {
                Some(raw) => raw
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a whole number of seconds. Got: {raw}")),
                None => Ok(default),
            }
        };

        let http_addr = optional("PRESENCE_HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let http_addr = http_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("PRESENCE_HTTP_ADDR must be host:port. Got: {http_addr}"))?;

        let poll_policy = match optional("PRESENCE_POLL_POLICY") {
            Some(raw) => raw.parse::<PollPolicy>().context("PRESENCE_POLL_POLICY is not valid")?,
            None => PollPolicy::default(),
        };

        Ok(Self {
            bot_token: required("PRESENCE_BOT_TOKEN")?,
            user_id: required("PRESENCE_USER_ID")?,
            guild_id: required("PRESENCE_GUILD_ID")?,
            webhook_url: optional("PRESENCE_WEBHOOK_URL"),
            http_addr,
            static_dir: optional("PRESENCE_STATIC_DIR")
                .unwrap_or_else(|| "public".to_string())
                .into(),
            poll_interval_secs: parse_secs("PRESENCE_POLL_INTERVAL_SECS", 10)?,
            call_timeout_secs: parse_secs("PRESENCE_CALL_TIMEOUT_SECS", 10)?,
            poll_policy,
            timezone: optional("PRESENCE_TIMEZONE").unwrap_or_else(|| "UTC".to_string()),
            notify_title: optional("PRESENCE_NOTIFY_TITLE")
                .unwrap_or_else(|| "Presence update".to_string()),
            log_level: optional("PRESENCE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Ranges and formats are checked here; identifier and timezone rules are
    /// shared with the core via [`WatchConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.split_whitespace().count() != 1 {
            anyhow::bail!("PRESENCE_BOT_TOKEN must not contain whitespace");
        }

        let token_lower = self.bot_token.to_lowercase();
        if token_lower.contains("your_token") || token_lower.contains("replace_me") {
            anyhow::bail!(
                "PRESENCE_BOT_TOKEN appears to be a placeholder. \
                Use the token from the Discord developer portal."
            );
        }

        if !(1..=3600).contains(&self.poll_interval_secs) {
            anyhow::bail!(
                "PRESENCE_POLL_INTERVAL_SECS must be between 1 and 3600 seconds. Got: {}",
                self.poll_interval_secs
            );
        }

        if !(1..=120).contains(&self.call_timeout_secs) {
            anyhow::bail!(
                "PRESENCE_CALL_TIMEOUT_SECS must be between 1 and 120 seconds. Got: {}",
                self.call_timeout_secs
            );
        }

        if let Some(ref url) = self.webhook_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!("PRESENCE_WEBHOOK_URL must use HTTP or HTTPS scheme");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PRESENCE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.watch_config()
            .validate()
            .context("Watcher configuration is not valid")?;

        Ok(())
    }

    /// Core engine configuration
    pub fn watch_config(&self) -> WatchConfig {
        let mut config = WatchConfig::new(&self.guild_id, &self.user_id);
        config.engine.poll_interval_ms = self.poll_interval_secs * 1000;
        config.engine.call_timeout_ms = self.call_timeout_secs * 1000;
        config.engine.poll_policy = self.poll_policy;
        config.notification.timezone = self.timezone.clone();
        config.notification.title = self.notify_title.clone();
        config
    }

    /// Gateway + REST client configuration
    pub fn discord_config(&self) -> DiscordConfig {
        let mut config = DiscordConfig::new(&self.bot_token, &self.guild_id);
        config.request_timeout = Duration::from_secs(self.call_timeout_secs);
        config
    }
}
