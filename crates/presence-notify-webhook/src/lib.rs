// # Discord Webhook Notification Channel
//
// Implements `NotificationChannel` with a Discord webhook: the status message
// is sent once and edited in place afterwards.
//
// ## Behaviour
//
// - One HTTP request per call; retries and the create/edit decision belong
//   to the reconciler
// - The webhook token (last path segment of the URL) never appears in logs
//   or `Debug` output
//
// ## API Reference
//
// - Execute webhook: POST `/webhooks/:id/:token?wait=true` (returns the message)
// - Edit webhook message: PATCH `/webhooks/:id/:token/messages/:message_id`

use async_trait::async_trait;
use presence_core::{Error, NotificationChannel, NotificationHandle, NotificationPayload, Result};
use reqwest::{Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTP timeout for webhook requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct EmbedField<'a> {
    name: &'a str,
    value: &'a str,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
    fields: Vec<EmbedField<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter<'a>>,
    timestamp: String,
}

/// Request body for both execute and edit
#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    embeds: [Embed<'a>; 1],
}

impl<'a> WebhookBody<'a> {
    fn from_payload(payload: &'a NotificationPayload) -> Self {
        let embed = Embed {
            title: &payload.title,
            description: &payload.description,
            color: payload.color,
            fields: payload
                .fields
                .iter()
                .map(|f| EmbedField {
                    name: &f.name,
                    value: &f.value,
                    inline: f.inline,
                })
                .collect(),
            footer: payload.footer.as_deref().map(|text| EmbedFooter { text }),
            timestamp: payload.timestamp.to_rfc3339(),
        };
        Self { embeds: [embed] }
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
}

/// Discord webhook channel
pub struct WebhookChannel {
    /// Webhook URL without query string
    /// ⚠️ Contains the webhook token, NEVER log this value
    url: Url,

    client: reqwest::Client,
}

// Hides the token segment of the URL
impl std::fmt::Debug for WebhookChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookChannel")
            .field("url", &redact(&self.url))
            .finish()
    }
}

impl WebhookChannel {
    /// Create a webhook channel for `url`
    ///
    /// The URL must be an absolute http(s) URL of the form
    /// `.../webhooks/<id>/<token>`.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let mut url = Url::parse(url.trim())
            .map_err(|e| Error::config(format!("Invalid webhook URL: {}", e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config("Webhook URL must use http or https"));
        }
        let segments = url.path_segments().map(|s| s.filter(|p| !p.is_empty()).count());
        if segments.unwrap_or(0) < 2 {
            return Err(Error::config("Webhook URL must end in /<id>/<token>"));
        }

        url.set_query(None);
        url.set_fragment(None);
        if url.path().ends_with('/') {
            let trimmed = url.path().trim_end_matches('/').to_string();
            url.set_path(&trimmed);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }

    fn execute_url(&self) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("wait", "true");
        url
    }

    fn message_url(&self, handle: &NotificationHandle) -> Url {
        let mut url = self.url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("messages").push(handle.as_str());
        }
        url
    }
}

/// Map a non-success response to a delivery error
async fn delivery_error(action: &str, response: Response) -> Error {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::delivery(format!(
            "{} rate limited by Discord: {}",
            action, error_text
        )),
        s if s.is_server_error() => Error::delivery(format!(
            "{} failed with Discord server error (transient): {} - {}",
            action, status, error_text
        )),
        _ => Error::delivery(format!("{} failed: {} - {}", action, status, error_text)),
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn create_message(&self, payload: &NotificationPayload) -> Result<NotificationHandle> {
        tracing::debug!("Creating webhook message: {}", payload.title);

        let response = self
            .client
            .post(self.execute_url())
            .json(&WebhookBody::from_payload(payload))
            .send()
            .await
            .map_err(|e| Error::delivery(format!("HTTP request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(delivery_error("Create", response).await);
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| Error::delivery(format!("Failed to parse response: {}", e.without_url())))?;

        tracing::info!("Webhook message created: {}", message.id);
        Ok(NotificationHandle::new(message.id))
    }

    async fn edit_message(
        &self,
        handle: &NotificationHandle,
        payload: &NotificationPayload,
    ) -> Result<()> {
        tracing::debug!("Editing webhook message {}", handle);

        let response = self
            .client
            .patch(self.message_url(handle))
            .json(&WebhookBody::from_payload(payload))
            .send()
            .await
            .map_err(|e| Error::delivery(format!("HTTP request failed: {}", e.without_url())))?;

        match response.status() {
            s if s.is_success() => {
                tracing::info!("Webhook message edited: {}", handle);
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(Error::not_found(format!(
                "Webhook message {} no longer exists",
                handle
            ))),
            _ => Err(delivery_error("Edit", response).await),
        }
    }

    fn channel_name(&self) -> &'static str {
        "discord-webhook"
    }
}

/// URL with the token segment masked
fn redact(url: &Url) -> String {
    let mut masked = url.clone();
    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.map(str::to_string).collect())
        .unwrap_or_default();

    if let Some((_, head)) = segments.split_last()
        && let Ok(mut path) = masked.path_segments_mut()
    {
        path.clear().extend(head).push("redacted");
    }
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use presence_core::PayloadField;

    const URL: &str = "https://discord.com/api/webhooks/123/secret-token";

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "Presence update".into(),
            description: "**Welcomer** is now online.".into(),
            color: 0x2ECC71,
            fields: vec![PayloadField {
                name: "Status".into(),
                value: "🟢 Online".into(),
                inline: true,
            }],
            footer: Some("Times shown in UTC".into()),
            timestamp: chrono::Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn debug_hides_webhook_token() {
        let channel = WebhookChannel::new(URL).unwrap();
        let rendered = format!("{:?}", channel);

        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("/api/webhooks/123/"));
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(WebhookChannel::new("not a url"), Err(Error::Config(_))));
        assert!(matches!(
            WebhookChannel::new("ftp://example.com/webhooks/1/t"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            WebhookChannel::new("https://example.com/"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn urls_for_execute_and_edit() {
        let channel = WebhookChannel::new(&format!("{URL}/?thread_id=9")).unwrap();

        assert_eq!(channel.execute_url().as_str(), format!("{URL}?wait=true"));
        assert_eq!(
            channel.message_url(&NotificationHandle::new("555")).as_str(),
            format!("{URL}/messages/555")
        );
    }

    #[test]
    fn payload_maps_to_a_single_embed() {
        let payload = payload();
        let body = serde_json::to_value(WebhookBody::from_payload(&payload)).unwrap();
        let embed = &body["embeds"][0];

        assert_eq!(body["embeds"].as_array().unwrap().len(), 1);
        assert_eq!(embed["title"], "Presence update");
        assert_eq!(embed["color"], 0x2ECC71);
        assert_eq!(embed["fields"][0]["name"], "Status");
        assert_eq!(embed["fields"][0]["inline"], true);
        assert_eq!(embed["footer"]["text"], "Times shown in UTC");
        assert_eq!(embed["timestamp"], "2024-01-15T12:30:00+00:00");
    }
}
