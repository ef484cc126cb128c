//! REST lookups

use presence_core::{Error, GuildInfo, Result};
use serde::Deserialize;
use std::time::Duration;

/// Default REST base URL
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
struct GuildResponse {
    id: String,
    name: String,
}

/// Minimal bot-authenticated REST client
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl RestClient {
    pub fn new(base: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// GET /guilds/{id}
    pub async fn guild(&self, guild_id: &str) -> Result<GuildInfo> {
        let url = format!("{}/guilds/{}", self.base, guild_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| Error::lookup(format!("guild request failed: {}", e)))?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {}
            401 => return Err(Error::auth("REST API rejected the bot token")),
            403 | 404 => {
                return Err(Error::lookup(format!(
                    "guild {} is unknown or not visible to the bot ({})",
                    guild_id, status
                )));
            }
            _ => {
                return Err(Error::lookup(format!(
                    "guild request returned {}",
                    status
                )));
            }
        }

        let guild: GuildResponse = response
            .json()
            .await
            .map_err(|e| Error::lookup(format!("unreadable guild response: {}", e)))?;

        Ok(GuildInfo {
            id: guild.id,
            name: guild.name,
        })
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base", &self.base)
            .field("token", &"<redacted>")
            .finish()
    }
}
