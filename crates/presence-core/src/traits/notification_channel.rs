// # Notification Channel Trait
//
// Defines the interface for the outbound notification channel: a place where
// a single rich message can be created once and edited afterwards.
//
// ## Implementations
//
// - Discord webhook: `presence-notify-webhook` crate

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a sent notification message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationHandle(String);

impl NotificationHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One labelled field of a rich notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rendered, channel-agnostic notification content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub description: String,
    /// 24-bit RGB colour
    pub color: u32,
    pub fields: Vec<PayloadField>,
    /// Footer text, typically the human-readable local timestamp
    pub footer: Option<String>,
    /// Machine-readable instant of the observation
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl NotificationPayload {
    /// Look up a field value by name
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Trait for notification channel implementations
///
/// # Responsibilities
///
/// Channels are single-shot: one API call per method invocation. They do not
/// decide whether to create or edit (owned by `Reconciler`), do not remember
/// handles (owned by `StatusStore`) and do not retry.
///
/// # Error contract
///
/// - `Error::NotFound`: the message behind the handle no longer exists; the
///   reconciler falls back to creating a new one
/// - `Error::Delivery`: any other failure; retried on the next cycle
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Send a new message and return its handle
    async fn create_message(
        &self,
        payload: &NotificationPayload,
    ) -> Result<NotificationHandle, crate::Error>;

    /// Replace the content of a previously sent message
    async fn edit_message(
        &self,
        handle: &NotificationHandle,
        payload: &NotificationPayload,
    ) -> Result<(), crate::Error>;

    /// Channel name (for logging)
    fn channel_name(&self) -> &'static str;
}
