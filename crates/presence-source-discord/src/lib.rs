// # Discord Presence Source
//
// Implements `PresenceSource` on top of the Discord bot gateway and REST API.
//
// ## Architecture
//
// - The gateway connection (websocket) is owned by a background task. It
//   identifies with the GUILDS, GUILD_MEMBERS and GUILD_PRESENCES intents,
//   heartbeats, and reconnects with a fresh identify when the socket drops.
// - On-demand lookups use gateway op 8 (Request Guild Members) with
//   `presences: true`, because REST does not expose presence.
// - Guild resolution goes through REST `GET /guilds/{id}`.
//
// ## Requirements
//
// The bot needs the privileged "Server Members" and "Presence" intents
// enabled in the developer portal; otherwise login fails with close code
// 4014, which is reported as a fatal error.

pub mod gateway;
pub mod protocol;
pub mod rest;

use presence_core::{GuildInfo, MemberPresence, PresenceSource, Result, Subscription};
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

pub use gateway::{GatewayHandle, GatewaySettings};
pub use protocol::{DEFAULT_GATEWAY_URL, intents};
pub use rest::{DEFAULT_API_BASE, RestClient};

/// Connection settings for [`DiscordPresenceSource`]
#[derive(Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub guild_id: String,
    pub gateway_url: String,
    pub api_base: String,
    pub intents: u64,
    pub handshake_timeout: Duration,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
}

impl DiscordConfig {
    pub fn new(token: impl Into<String>, guild_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            guild_id: guild_id.into(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            intents: intents::PRESENCE_WATCH,
            handshake_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Point the client at other endpoints
    pub fn with_endpoints(mut self, gateway_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.gateway_url = gateway_url.into();
        self.api_base = api_base.into();
        self
    }

    fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            url: self.gateway_url.clone(),
            token: self.token.clone(),
            intents: self.intents,
            guild_id: self.guild_id.clone(),
            handshake_timeout: self.handshake_timeout,
            reconnect_delay: self.reconnect_delay,
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("gateway_url", &self.gateway_url)
            .field("api_base", &self.api_base)
            .field("intents", &self.intents)
            .finish_non_exhaustive()
    }
}

/// Presence source backed by a logged-in Discord bot
pub struct DiscordPresenceSource {
    guild_id: String,
    rest: RestClient,
    gateway: GatewayHandle,
}

impl DiscordPresenceSource {
    /// Log in and start the gateway task
    ///
    /// Fails with `Error::Authentication` (or `Error::Config` for refused
    /// intents) when the gateway rejects the login; callers treat both as fatal.
    pub async fn connect(config: DiscordConfig) -> Result<Self> {
        let rest = RestClient::new(&config.api_base, &config.token, config.request_timeout)?;
        let gateway = GatewayHandle::connect(config.gateway_settings()).await?;

        Ok(Self {
            guild_id: config.guild_id,
            rest,
            gateway,
        })
    }
}

#[async_trait::async_trait]
impl PresenceSource for DiscordPresenceSource {
    async fn resolve_guild(&self) -> Result<GuildInfo> {
        self.rest.guild(&self.guild_id).await
    }

    async fn fetch_member(&self, user_id: &str) -> Result<MemberPresence> {
        self.gateway.fetch_member(user_id).await
    }

    fn subscribe(&self) -> Subscription {
        // Lagged receivers skip ahead; the next poll catches up
        let stream = BroadcastStream::new(self.gateway.updates()).filter_map(|change| change.ok());
        Subscription::new(stream)
    }

    fn source_name(&self) -> &'static str {
        "discord"
    }
}
