//! Database row models.

use sqlx::FromRow;

/// Row model for the `tracked_feeds` table.
#[derive(Debug, Clone, FromRow)]
pub struct FeedDbModel {
    pub id: String,
    pub site: String,
    pub account_id: String,
    pub display_name: Option<String>,
    pub cursor: Option<String>,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Row model for the `targets` table.
#[derive(Debug, Clone, FromRow)]
pub struct TargetDbModel {
    pub id: String,
    pub feed_id: String,
    pub client_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub subscriber_id: String,
    pub mention_role_id: Option<String>,
    pub alt_mention_role_id: Option<String>,
    pub mention_text: Option<String>,
    pub mention_color: Option<String>,
    pub created_at: String,
}

/// Row model for the `channel_features` table.
///
/// Field defaults mirror the column defaults so a missing row behaves the
/// same as a freshly inserted one.
#[derive(Debug, Clone, FromRow)]
pub struct ChannelFeaturesDbModel {
    pub channel_id: String,
    pub notify_posts: bool,
    pub notify_members: bool,
    pub notify_uploads: bool,
    pub notify_streams: bool,
    pub live_events: bool,
    pub updated_at: String,
}

impl ChannelFeaturesDbModel {
    /// Defaults applied when a channel has no persisted row.
    pub fn defaults(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            notify_posts: true,
            notify_members: false,
            notify_uploads: true,
            notify_streams: true,
            live_events: false,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Whether the given feature is enabled.
    pub fn allows(&self, feature: crate::domain::FeatureKind) -> bool {
        use crate::domain::FeatureKind::*;
        match feature {
            Posts => self.notify_posts,
            MembersPosts => self.notify_members,
            Uploads => self.notify_uploads,
            Streams => self.notify_streams,
            LiveEvents => self.live_events,
        }
    }
}

/// Row model for the `scheduled_events` table.
#[derive(Debug, Clone, FromRow)]
pub struct ScheduledEventDbModel {
    pub id: String,
    pub guild_id: String,
    pub feed_id: String,
    pub sub_item_id: Option<String>,
    pub external_event_id: String,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FeatureKind;

    #[test]
    fn test_feature_defaults() {
        let features = ChannelFeaturesDbModel::defaults("chan-1");
        assert!(features.allows(FeatureKind::Posts));
        assert!(features.allows(FeatureKind::Streams));
        assert!(!features.allows(FeatureKind::MembersPosts));
        assert!(!features.allows(FeatureKind::LiveEvents));
    }
}
