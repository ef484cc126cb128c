//! Notification rendering
//!
//! Turns an observed status into the rich payload handed to the
//! notification channel.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::NotificationConfig;
use crate::status::{TrackedIdentity, TrackedStatus};
use crate::traits::{NotificationPayload, PayloadField};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Renders status notifications with a fixed title, timezone and palette
#[derive(Debug, Clone)]
pub struct NotificationRenderer {
    title: String,
    tz: Tz,
    online_color: u32,
    offline_color: u32,
}

impl NotificationRenderer {
    pub fn new(config: &NotificationConfig) -> Result<Self, crate::Error> {
        config.validate()?;
        Ok(Self {
            title: config.title.clone(),
            tz: config.tz()?,
            online_color: config.online_color,
            offline_color: config.offline_color,
        })
    }

    /// Human-readable local time for `at`
    pub fn format_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn render(
        &self,
        status: TrackedStatus,
        identity: &TrackedIdentity,
        at: DateTime<Utc>,
    ) -> NotificationPayload {
        let (color, label) = match status {
            TrackedStatus::Online => (self.online_color, "🟢 Online"),
            TrackedStatus::Offline => (self.offline_color, "🔴 Offline"),
        };
        let local_time = self.format_time(at);

        NotificationPayload {
            title: self.title.clone(),
            description: format!("**{}** is now {}.", identity.display_name, status),
            color,
            fields: vec![
                field("Status", label, true),
                field("User", &identity.display_name, true),
                field("User ID", &identity.user_id, true),
                field("Last updated", &local_time, false),
            ],
            footer: Some(format!("Times shown in {}", self.tz.name())),
            timestamp: at,
        }
    }
}

fn field(name: &str, value: &str, inline: bool) -> PayloadField {
    PayloadField {
        name: name.to_string(),
        value: value.to_string(),
        inline,
    }
}
