//! Core traits for the presence watcher
//!
//! - [`PresenceSource`]: Look up and monitor member presence
//! - [`NotificationChannel`]: Create and edit the status notification

pub mod notification_channel;
pub mod presence_source;

pub use notification_channel::{
    NotificationChannel, NotificationHandle, NotificationPayload, PayloadField,
};
pub use presence_source::{GuildInfo, MemberPresence, PresenceChange, PresenceSource, Subscription};
