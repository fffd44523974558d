//! Destination client seam.
//!
//! The chat platform the engine delivers into, reduced to the operations the
//! core needs: channel/role resolution, message sends, owner notices, and
//! scheduled-event CRUD. Failures are typed so the delivery pipeline can
//! classify them without string matching.

pub mod discord;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::RenderedNotification;

pub use discord::{RestClientConfig, RestDestinationClient};

/// Typed failures from the destination platform.
#[derive(Debug, Clone, Error)]
pub enum DestinationError {
    /// The destination channel no longer exists. Terminal for the target.
    #[error("destination channel no longer exists")]
    ChannelGone,
    /// The channel exists but the sender lacks permission.
    #[error("missing permission in destination channel")]
    PermissionDenied,
    #[error("destination rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("transient destination failure: {0}")]
    Transient(String),
}

/// A resolved guild role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: String,
    pub name: String,
}

/// Payload for creating or editing an external scheduled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEventSpec {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location_url: Option<String>,
}

/// Client for the destination chat platform.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Whether the channel still resolves. `Ok(false)` means confirmed gone.
    async fn channel_exists(&self, channel_id: &str)
    -> std::result::Result<bool, DestinationError>;

    /// Deliver one rendered notification to a channel.
    async fn send_message(
        &self,
        channel_id: &str,
        message: &RenderedNotification,
    ) -> std::result::Result<(), DestinationError>;

    /// Send a plain-text administrative notice to whoever owns the channel.
    async fn notify_owner(
        &self,
        channel_id: &str,
        text: &str,
    ) -> std::result::Result<(), DestinationError>;

    /// Resolve a guild role. `Ok(None)` means confirmed deleted.
    async fn resolve_role(
        &self,
        guild_id: &str,
        role_id: &str,
    ) -> std::result::Result<Option<RoleInfo>, DestinationError>;

    /// Create an external scheduled event, returning its id.
    async fn create_scheduled_event(
        &self,
        guild_id: &str,
        spec: &ScheduledEventSpec,
    ) -> std::result::Result<String, DestinationError>;

    /// Edit an existing external scheduled event.
    async fn update_scheduled_event(
        &self,
        guild_id: &str,
        event_id: &str,
        spec: &ScheduledEventSpec,
    ) -> std::result::Result<(), DestinationError>;

    /// Mark an external scheduled event as completed.
    async fn complete_scheduled_event(
        &self,
        guild_id: &str,
        event_id: &str,
    ) -> std::result::Result<(), DestinationError>;

    /// Cancel and remove an external scheduled event.
    async fn cancel_scheduled_event(
        &self,
        guild_id: &str,
        event_id: &str,
    ) -> std::result::Result<(), DestinationError>;
}
