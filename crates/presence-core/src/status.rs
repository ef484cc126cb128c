//! Presence data model
//!
//! [`TrackedStatus`] is the collapsed, binary view of a member's presence
//! that the rest of the system works with. [`TrackedIdentity`] carries the
//! display data used when rendering notifications.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Last-known presence of the tracked identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedStatus {
    /// The member is connected and reports "online"
    Online,
    /// Anything else, including idle, do-not-disturb and invisible
    #[default]
    Offline,
}

impl TrackedStatus {
    /// Collapse a raw presence string reported by the directory service.
    ///
    /// Only an explicit `"online"` counts as online; `idle`, `dnd`,
    /// `invisible`, `offline` and unknown values all collapse to offline.
    pub fn from_presence(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("online") {
            Self::Online
        } else {
            Self::Offline
        }
    }

    /// Collapse an optional presence; a member without presence data is offline.
    pub fn from_optional_presence(raw: Option<&str>) -> Self {
        raw.map(Self::from_presence).unwrap_or_default()
    }

    /// Lowercase wire name (`"online"` / `"offline"`)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for TrackedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity being watched, as displayed in notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedIdentity {
    /// Directory user id (snowflake)
    pub user_id: String,
    /// Human-readable name; falls back to the user id until resolved
    pub display_name: String,
}

impl TrackedIdentity {
    /// Create an identity whose display name is not known yet
    pub fn new(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            display_name: user_id.clone(),
            user_id,
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}
