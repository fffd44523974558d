//! REST-backed destination client.
//!
//! Talks to a Discord-style REST API. Rate limit handling follows the
//! platform's recommendation: no hardcoded limits, parse Retry-After on 429
//! responses and retry a bounded number of times.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{DestinationClient, DestinationError, RoleInfo, ScheduledEventSpec};
use crate::domain::RenderedNotification;

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// External scheduled event status code for "completed".
const EVENT_STATUS_COMPLETED: u8 = 3;

/// Configuration for the REST destination client.
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// API base URL.
    pub api_base: String,
    /// Bot token sent in the Authorization header.
    pub bot_token: String,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            api_base: "https://discord.com/api/v10".to_string(),
            bot_token: String::new(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl RestClientConfig {
    /// Build from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("DISCORD_API_BASE").unwrap_or(defaults.api_base),
            bot_token: std::env::var("DISCORD_BOT_TOKEN").unwrap_or_default(),
            request_timeout: defaults.request_timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    #[allow(dead_code)]
    id: String,
    guild_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuildResponse {
    owner_id: String,
}

#[derive(Debug, Deserialize)]
struct RoleResponse {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

/// REST destination client.
pub struct RestDestinationClient {
    config: RestClientConfig,
    client: Client,
}

impl RestDestinationClient {
    /// Create a new REST client.
    pub fn new(config: RestClientConfig) -> Self {
        if config.bot_token.is_empty() {
            warn!("destination client created without a bot token; requests will be rejected");
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    /// Issue a request, retrying on 429 with the reported Retry-After.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, DestinationError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let mut builder = self
                .client
                .request(method.clone(), self.url(path))
                .header("Authorization", format!("Bot {}", self.config.bot_token));
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| DestinationError::Transient(format!("request failed: {e}")))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let retry_after = parse_retry_after(&response);
            if attempts > MAX_RATE_LIMIT_RETRIES {
                return Err(DestinationError::RateLimited { retry_after });
            }
            let wait = retry_after.unwrap_or(Duration::from_secs(1));
            debug!(
                path,
                attempt = attempts,
                "destination rate limited (429), waiting {:?} before retry",
                wait
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Map a non-success status onto the failure taxonomy.
    fn classify(status: StatusCode, body: &str) -> DestinationError {
        match status.as_u16() {
            403 => DestinationError::PermissionDenied,
            404 => DestinationError::ChannelGone,
            429 => DestinationError::RateLimited { retry_after: None },
            _ => DestinationError::Transient(format!("{status}: {body}")),
        }
    }

    async fn expect_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DestinationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::classify(status, &body))
    }

    async fn get_channel(&self, channel_id: &str) -> Result<ChannelResponse, DestinationError> {
        let response = self
            .request(Method::GET, &format!("/channels/{channel_id}"), None)
            .await?;
        let response = Self::expect_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| DestinationError::Transient(format!("malformed channel response: {e}")))
    }

    fn event_payload(spec: &ScheduledEventSpec) -> serde_json::Value {
        json!({
            "name": spec.title,
            "scheduled_start_time": spec.start_time.to_rfc3339(),
            "scheduled_end_time": spec.end_time.to_rfc3339(),
            "privacy_level": 2,
            "entity_type": 3,
            "entity_metadata": { "location": spec.location_url.clone().unwrap_or_else(|| "stream".to_string()) },
        })
    }
}

#[async_trait]
impl DestinationClient for RestDestinationClient {
    async fn channel_exists(&self, channel_id: &str) -> Result<bool, DestinationError> {
        let response = self
            .request(Method::GET, &format!("/channels/{channel_id}"), None)
            .await?;
        match response.status().as_u16() {
            404 => Ok(false),
            // Forbidden still proves the channel exists.
            403 => Ok(true),
            _ => {
                Self::expect_success(response).await?;
                Ok(true)
            }
        }
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &RenderedNotification,
    ) -> Result<(), DestinationError> {
        let payload = json!({ "content": message.content });
        let response = self
            .request(
                Method::POST,
                &format!("/channels/{channel_id}/messages"),
                Some(&payload),
            )
            .await?;
        Self::expect_success(response).await?;
        debug!(channel_id, "notification sent");
        Ok(())
    }

    async fn notify_owner(&self, channel_id: &str, text: &str) -> Result<(), DestinationError> {
        // DM the guild owner; for guildless (DM) channels post in place.
        let channel = self.get_channel(channel_id).await?;
        let recipient_channel = match channel.guild_id {
            Some(guild_id) => {
                let response = self
                    .request(Method::GET, &format!("/guilds/{guild_id}"), None)
                    .await?;
                let guild: GuildResponse = Self::expect_success(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| {
                        DestinationError::Transient(format!("malformed guild response: {e}"))
                    })?;

                let payload = json!({ "recipient_id": guild.owner_id });
                let response = self
                    .request(Method::POST, "/users/@me/channels", Some(&payload))
                    .await?;
                let dm: CreatedResponse = Self::expect_success(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| {
                        DestinationError::Transient(format!("malformed DM channel response: {e}"))
                    })?;
                dm.id
            }
            None => channel_id.to_string(),
        };

        let payload = json!({ "content": text });
        let response = self
            .request(
                Method::POST,
                &format!("/channels/{recipient_channel}/messages"),
                Some(&payload),
            )
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn resolve_role(
        &self,
        guild_id: &str,
        role_id: &str,
    ) -> Result<Option<RoleInfo>, DestinationError> {
        let response = self
            .request(Method::GET, &format!("/guilds/{guild_id}/roles"), None)
            .await?;
        let roles: Vec<RoleResponse> = Self::expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| DestinationError::Transient(format!("malformed roles response: {e}")))?;

        Ok(roles
            .into_iter()
            .find(|r| r.id == role_id)
            .map(|r| RoleInfo {
                id: r.id,
                name: r.name,
            }))
    }

    async fn create_scheduled_event(
        &self,
        guild_id: &str,
        spec: &ScheduledEventSpec,
    ) -> Result<String, DestinationError> {
        let payload = Self::event_payload(spec);
        let response = self
            .request(
                Method::POST,
                &format!("/guilds/{guild_id}/scheduled-events"),
                Some(&payload),
            )
            .await?;
        let created: CreatedResponse = Self::expect_success(response)
            .await?
            .json()
            .await
            .map_err(|e| DestinationError::Transient(format!("malformed event response: {e}")))?;
        Ok(created.id)
    }

    async fn update_scheduled_event(
        &self,
        guild_id: &str,
        event_id: &str,
        spec: &ScheduledEventSpec,
    ) -> Result<(), DestinationError> {
        let payload = Self::event_payload(spec);
        let response = self
            .request(
                Method::PATCH,
                &format!("/guilds/{guild_id}/scheduled-events/{event_id}"),
                Some(&payload),
            )
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn complete_scheduled_event(
        &self,
        guild_id: &str,
        event_id: &str,
    ) -> Result<(), DestinationError> {
        let payload = json!({ "status": EVENT_STATUS_COMPLETED });
        let response = self
            .request(
                Method::PATCH,
                &format!("/guilds/{guild_id}/scheduled-events/{event_id}"),
                Some(&payload),
            )
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn cancel_scheduled_event(
        &self,
        guild_id: &str,
        event_id: &str,
    ) -> Result<(), DestinationError> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/guilds/{guild_id}/scheduled-events/{event_id}"),
                None,
            )
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

/// Parse the Retry-After duration from a 429 response.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    let header = response.headers().get("Retry-After")?;
    let secs: f64 = header.to_str().ok()?.parse().ok()?;
    Some(Duration::from_secs_f64(secs))
}
