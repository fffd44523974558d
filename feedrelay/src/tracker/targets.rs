//! Target resolution with lazy deletion.
//!
//! Destinations are verified at delivery time rather than by a separate
//! reconciliation sweep: a target whose channel is confirmed gone is deleted
//! on the spot, and a feed whose last target disappears is untracked.

use std::sync::Arc;

use tracing::{debug, info};

use crate::Result;
use crate::database::repositories::{FeedRepository, TargetRepository};
use crate::destination::{DestinationClient, DestinationError};
use crate::domain::Target;

/// Result of resolving a feed's targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTargets {
    /// Targets usable this cycle. May be empty when all remaining targets
    /// failed transiently.
    Active(Vec<Target>),
    /// The feed lost its last target and has been deleted.
    Untracked,
}

/// Resolves the currently-valid delivery destinations for a feed.
pub struct TargetResolver<FR, TR> {
    feed_repo: Arc<FR>,
    target_repo: Arc<TR>,
    client: Arc<dyn DestinationClient>,
}

impl<FR, TR> TargetResolver<FR, TR>
where
    FR: FeedRepository,
    TR: TargetRepository,
{
    pub fn new(feed_repo: Arc<FR>, target_repo: Arc<TR>, client: Arc<dyn DestinationClient>) -> Self {
        Self {
            feed_repo,
            target_repo,
            client,
        }
    }

    /// Resolve the active targets for a feed, deleting targets whose channel
    /// is confirmed gone and untracking the feed when none remain.
    pub async fn active_targets(&self, feed_id: &str) -> Result<ResolvedTargets> {
        let rows = self.target_repo.list_by_feed(feed_id).await?;

        let mut active = Vec::with_capacity(rows.len());
        let mut remaining = 0usize;

        for row in rows {
            match self.client.channel_exists(&row.channel_id).await {
                Ok(true) => {
                    remaining += 1;
                    active.push(Target::from_db_model(&row));
                }
                Ok(false) | Err(DestinationError::ChannelGone) => {
                    info!(
                        target_id = %row.id,
                        channel_id = %row.channel_id,
                        "destination channel gone, removing target"
                    );
                    self.target_repo.delete_target(&row.id).await?;
                }
                Err(e) => {
                    // Ambiguous: keep the target, skip it this cycle.
                    debug!(
                        target_id = %row.id,
                        error = %e,
                        "could not verify destination, excluding for this cycle"
                    );
                    remaining += 1;
                }
            }
        }

        if remaining == 0 {
            info!(feed_id, "last target removed, untracking feed");
            self.feed_repo.delete_feed(feed_id).await?;
            return Ok(ResolvedTargets::Untracked);
        }

        Ok(ResolvedTargets::Active(active))
    }
}
