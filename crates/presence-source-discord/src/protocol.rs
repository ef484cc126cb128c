//! Gateway wire format
//!
//! Only the subset of the Discord gateway needed to watch presences:
//! the login handshake, heartbeats, member requests and the dispatches
//! that carry presence data.

use presence_core::{Error, MemberPresence, PresenceChange, Result, TrackedStatus};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Value, json};

/// Default gateway endpoint
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Gateway intent bits
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MEMBERS: u64 = 1 << 1;
    pub const GUILD_PRESENCES: u64 = 1 << 8;

    /// Everything needed to resolve members and receive their presences
    pub const PRESENCE_WATCH: u64 = GUILDS | GUILD_MEMBERS | GUILD_PRESENCES;
}

/// Gateway operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// An event was dispatched (receive)
    Dispatch = 0,
    /// Keep the connection alive (send/receive)
    Heartbeat = 1,
    /// Start a new session (send)
    Identify = 2,
    /// Server asks the client to reconnect (receive)
    Reconnect = 7,
    /// Ask for guild member information (send)
    RequestGuildMembers = 8,
    /// The session has been invalidated (receive)
    InvalidSession = 9,
    /// Sent right after connecting (receive)
    Hello = 10,
    /// Heartbeat acknowledged (receive)
    HeartbeatAck = 11,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            7 => Some(Self::Reconnect),
            8 => Some(Self::RequestGuildMembers),
            9 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unsupported op code: {value}")))
    }
}

/// One gateway frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: OpCode,

    #[serde(default)]
    pub d: Option<Value>,

    /// Sequence number (dispatches only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (dispatches only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    /// Heartbeat carrying the last sequence number seen
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            d: Some(sequence.map_or(Value::Null, Value::from)),
            s: None,
            t: None,
        }
    }

    /// Identify with a bot token
    pub fn identify(token: &str, intents: u64) -> Self {
        Self {
            op: OpCode::Identify,
            d: Some(json!({
                "token": token,
                "intents": intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": env!("CARGO_PKG_NAME"),
                    "device": env!("CARGO_PKG_NAME"),
                },
            })),
            s: None,
            t: None,
        }
    }

    /// Request one member with presence, correlated by `nonce`
    pub fn request_member(guild_id: &str, user_id: &str, nonce: &str) -> Self {
        Self {
            op: OpCode::RequestGuildMembers,
            d: Some(json!({
                "guild_id": guild_id,
                "user_ids": [user_id],
                "presences": true,
                "nonce": nonce,
            })),
            s: None,
            t: None,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode `d` into a typed payload
    pub fn data<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let data = self
            .d
            .clone()
            .ok_or_else(|| Error::gateway(format!("op {} carried no data", self.op.as_u8())))?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn is_dispatch(&self, event: &str) -> bool {
        self.op == OpCode::Dispatch && self.t.as_deref() == Some(event)
    }
}

/// Hello (op 10)
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    /// Milliseconds between heartbeats
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
}

/// READY dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub session_id: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuildMember {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
}

/// PRESENCE_UPDATE dispatch, also embedded in chunks and GUILD_CREATE
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceUpdate {
    pub user: User,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl PresenceUpdate {
    pub fn tracked_status(&self) -> TrackedStatus {
        TrackedStatus::from_optional_presence(self.status.as_deref())
    }

    /// Convert into a core change event
    pub fn into_change(self, previous: Option<TrackedStatus>) -> PresenceChange {
        let current = self.tracked_status();
        let name = self.user.global_name.or(self.user.username);
        let change = PresenceChange::new(self.user.id, previous, current);
        match name {
            Some(name) => change.with_display_name(name),
            None => change,
        }
    }
}

/// GUILD_MEMBERS_CHUNK dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct GuildMembersChunk {
    pub guild_id: String,
    #[serde(default)]
    pub members: Vec<GuildMember>,
    #[serde(default)]
    pub presences: Vec<PresenceUpdate>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl GuildMembersChunk {
    /// Extract one member's presence; members without a presence are offline
    pub fn member_presence(&self, user_id: &str) -> Result<MemberPresence> {
        let member = self
            .members
            .iter()
            .find(|m| m.user.as_ref().is_some_and(|u| u.id == user_id))
            .ok_or_else(|| {
                Error::lookup(format!("member {user_id} not found in guild {}", self.guild_id))
            })?;

        let status = self
            .presences
            .iter()
            .find(|p| p.user.id == user_id)
            .map(PresenceUpdate::tracked_status)
            .unwrap_or_default();

        Ok(MemberPresence {
            user_id: user_id.to_string(),
            display_name: display_name(member),
            status,
        })
    }
}

/// GUILD_CREATE dispatch, reduced to what seeds the presence cache
#[derive(Debug, Clone, Deserialize)]
pub struct GuildCreate {
    pub id: String,
    #[serde(default)]
    pub presences: Vec<PresenceUpdate>,
}

/// Guild nickname, then global name, then username
pub fn display_name(member: &GuildMember) -> String {
    let user = member.user.clone().unwrap_or_default();
    member
        .nick
        .clone()
        .or(user.global_name)
        .or(user.username)
        .unwrap_or(user.id)
}

/// Close codes after which reconnecting cannot succeed
pub fn close_error(code: u16, reason: &str) -> Option<Error> {
    match code {
        4004 => Some(Error::auth(format!("gateway rejected the token ({reason})"))),
        4010..=4012 => Some(Error::config(format!(
            "gateway refused the connection with {code} ({reason})"
        ))),
        4013 | 4014 => Some(Error::config(format!(
            "invalid or disallowed gateway intents ({reason}); enable the \
             server members and presence intents for the bot"
        ))),
        _ => None,
    }
}
