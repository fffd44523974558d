//! Mention resolution with self-healing.
//!
//! A configured role is resolved live before each delivery; a role the guild
//! has deleted is cleared from the stored configuration instead of failing
//! the notification.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::Result;
use crate::database::repositories::TargetRepository;
use crate::destination::DestinationClient;
use crate::domain::{ItemKind, Mention, Target};

/// Resolves the per-target mention annotation for a notification.
pub struct MentionResolver<TR> {
    target_repo: Arc<TR>,
    client: Arc<dyn DestinationClient>,
}

impl<TR> MentionResolver<TR>
where
    TR: TargetRepository,
{
    pub fn new(target_repo: Arc<TR>, client: Arc<dyn DestinationClient>) -> Self {
        Self {
            target_repo,
            client,
        }
    }

    /// Resolve the mention for one delivery, or `None` when nothing is
    /// configured for this notification kind.
    pub async fn resolve(&self, target: &Target, kind: ItemKind) -> Result<Option<Mention>> {
        let Some(config) = &target.mention else {
            return Ok(None);
        };

        // Membership-limited and upcoming notifications ping the alternate
        // role when one is configured.
        let wants_alt = matches!(kind, ItemKind::MembersPost | ItemKind::StreamUpcoming);
        let configured_role = if wants_alt {
            config.alt_role_id.as_ref().or(config.role_id.as_ref())
        } else {
            config.role_id.as_ref()
        };

        let mut role_id = None;
        if let (Some(configured), Some(guild_id)) = (configured_role, target.guild_id.as_ref()) {
            match self.client.resolve_role(guild_id, configured).await {
                Ok(Some(_)) => role_id = Some(configured.clone()),
                Ok(None) => {
                    warn!(
                        target_id = %target.id,
                        role_id = %configured,
                        "configured mention role deleted, clearing"
                    );
                    self.target_repo
                        .clear_mention_role(&target.id, configured)
                        .await?;
                }
                Err(e) => {
                    // Transient: keep the configuration, still mention.
                    debug!(target_id = %target.id, error = %e, "role resolution failed, keeping configured role");
                    role_id = Some(configured.clone());
                }
            }
        }

        if role_id.is_none() && config.text.is_none() {
            return Ok(None);
        }

        Ok(Some(Mention {
            role_id,
            text: config.text.clone(),
        }))
    }
}
