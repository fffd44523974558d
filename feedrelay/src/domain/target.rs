//! Delivery target domain entity.

/// Mention configuration attached to a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionConfig {
    /// Role pinged for regular notifications.
    pub role_id: Option<String>,
    /// Role pinged for membership-limited and upcoming notifications.
    pub alt_role_id: Option<String>,
    /// Free-text annotation appended to the ping.
    pub text: Option<String>,
    /// Display color for the embed, consumed by the formatting front end.
    pub color: Option<String>,
}

impl MentionConfig {
    /// A color alone configures nothing to mention.
    pub fn is_empty(&self) -> bool {
        self.role_id.is_none() && self.alt_role_id.is_none() && self.text.is_none()
    }
}

/// One (feed, destination channel) subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub feed_id: String,
    pub client_id: String,
    pub channel_id: String,
    /// Absent for DM-style destinations.
    pub guild_id: Option<String>,
    pub subscriber_id: String,
    pub mention: Option<MentionConfig>,
}

impl Target {
    pub fn from_db_model(model: &crate::database::models::TargetDbModel) -> Self {
        let mention = MentionConfig {
            role_id: model.mention_role_id.clone(),
            alt_role_id: model.alt_mention_role_id.clone(),
            text: model.mention_text.clone(),
            color: model.mention_color.clone(),
        };
        Self {
            id: model.id.clone(),
            feed_id: model.feed_id.clone(),
            client_id: model.client_id.clone(),
            channel_id: model.channel_id.clone(),
            guild_id: model.guild_id.clone(),
            subscriber_id: model.subscriber_id.clone(),
            mention: if mention.is_empty() {
                None
            } else {
                Some(mention)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TargetDbModel;

    fn model() -> TargetDbModel {
        TargetDbModel {
            id: "target-1".to_string(),
            feed_id: "feed-1".to_string(),
            client_id: "client-1".to_string(),
            channel_id: "chan-1".to_string(),
            guild_id: Some("guild-1".to_string()),
            subscriber_id: "user-1".to_string(),
            mention_role_id: None,
            alt_mention_role_id: None,
            mention_text: None,
            mention_color: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_empty_mention_collapses_to_none() {
        let target = Target::from_db_model(&model());
        assert!(target.mention.is_none());
    }

    #[test]
    fn test_mention_preserved() {
        let mut m = model();
        m.mention_role_id = Some("role-1".to_string());
        m.mention_text = Some("new post!".to_string());
        let target = Target::from_db_model(&m);
        let mention = target.mention.unwrap();
        assert_eq!(mention.role_id.as_deref(), Some("role-1"));
        assert_eq!(mention.text.as_deref(), Some("new post!"));
    }
}
