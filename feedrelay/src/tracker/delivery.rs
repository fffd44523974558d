//! Delivery pipeline.
//!
//! Sends one notification to one destination and classifies the outcome.
//! Failures are isolated per target: a dead channel deletes its target, a
//! permission loss disables the owning feature flag with a one-time owner
//! notice, and everything transient is retried on the next natural cycle.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::Result;
use crate::database::repositories::{FeatureRepository, TargetRepository};
use crate::destination::{DestinationClient, DestinationError};
use crate::domain::{FeatureKind, ItemKind, RenderedNotification, Target};

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// Destination confirmed gone; the target was deleted.
    TargetDeleted,
    /// Permission lost; the owning feature flag was disabled.
    FeatureDisabled,
    /// Transient failure; retried next cycle.
    Skipped,
}

/// Formats and sends notifications, one destination at a time.
pub struct DeliveryPipeline<TR, CF> {
    target_repo: Arc<TR>,
    feature_repo: Arc<CF>,
    client: Arc<dyn DestinationClient>,
}

impl<TR, CF> DeliveryPipeline<TR, CF>
where
    TR: TargetRepository,
    CF: FeatureRepository,
{
    pub fn new(
        target_repo: Arc<TR>,
        feature_repo: Arc<CF>,
        client: Arc<dyn DestinationClient>,
    ) -> Self {
        Self {
            target_repo,
            feature_repo,
            client,
        }
    }

    /// Deliver one rendered notification to one target.
    pub async fn deliver(
        &self,
        target: &Target,
        kind: ItemKind,
        rendered: &RenderedNotification,
    ) -> Result<DeliveryResult> {
        match self
            .client
            .send_message(&target.channel_id, rendered)
            .await
        {
            Ok(()) => {
                debug!(channel_id = %target.channel_id, "notification delivered");
                Ok(DeliveryResult::Delivered)
            }
            Err(DestinationError::ChannelGone) => {
                info!(
                    target_id = %target.id,
                    channel_id = %target.channel_id,
                    "destination gone during delivery, removing target"
                );
                self.target_repo.delete_target(&target.id).await?;
                Ok(DeliveryResult::TargetDeleted)
            }
            Err(DestinationError::PermissionDenied) => {
                self.disable_with_notice(&target.channel_id, kind.feature())
                    .await?;
                Ok(DeliveryResult::FeatureDisabled)
            }
            Err(e) => {
                warn!(
                    target_id = %target.id,
                    channel_id = %target.channel_id,
                    error = %e,
                    "delivery failed, will retry next cycle"
                );
                Ok(DeliveryResult::Skipped)
            }
        }
    }

    /// Disable a feature for a channel and, only when the flag actually
    /// flipped, send the one-time explanatory notice.
    pub async fn disable_with_notice(&self, channel_id: &str, feature: FeatureKind) -> Result<()> {
        let flipped = self.feature_repo.disable_feature(channel_id, feature).await?;
        if !flipped {
            return Ok(());
        }

        warn!(
            channel_id,
            feature = feature.display_name(),
            "missing permission, feature disabled"
        );
        let text = format!(
            "I lost permission to post in <#{channel_id}>, so **{name}** notifications \
             there have been disabled. Once my permissions are restored, re-enable them \
             with `/feature {name} enable` in that channel.",
            name = feature.display_name(),
        );
        if let Err(e) = self.client.notify_owner(channel_id, &text).await {
            // The notice is best-effort; the flag flip already took effect.
            debug!(channel_id, error = %e, "owner notice failed");
        }
        Ok(())
    }
}
