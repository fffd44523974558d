//! Notification categories and rendered notification payloads.

use serde::{Deserialize, Serialize};

/// Kind of a feed item, used for notification-category filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    /// Regular social post.
    Post,
    /// Membership-limited post.
    MembersPost,
    /// Video/media upload.
    Upload,
    /// Stream went live.
    StreamLive,
    /// Stream scheduled for the future.
    StreamUpcoming,
    /// Stream ended. Drives the event lifecycle only, never a notification.
    StreamEnded,
}

impl ItemKind {
    /// The per-channel feature flag gating this kind.
    pub fn feature(&self) -> FeatureKind {
        match self {
            Self::Post => FeatureKind::Posts,
            Self::MembersPost => FeatureKind::MembersPosts,
            Self::Upload => FeatureKind::Uploads,
            Self::StreamLive | Self::StreamUpcoming | Self::StreamEnded => FeatureKind::Streams,
        }
    }

    /// Whether this kind produces a delivery at all.
    pub fn notifies(&self) -> bool {
        !matches!(self, Self::StreamEnded)
    }
}

/// Per-channel feature flags this engine reads and, on permission loss,
/// disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Posts,
    MembersPosts,
    Uploads,
    Streams,
    LiveEvents,
}

impl FeatureKind {
    /// Column name in the `channel_features` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Posts => "notify_posts",
            Self::MembersPosts => "notify_members",
            Self::Uploads => "notify_uploads",
            Self::Streams => "notify_streams",
            Self::LiveEvents => "live_events",
        }
    }

    /// User-facing feature name, used in the re-enable instructions.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::MembersPosts => "memberposts",
            Self::Uploads => "uploads",
            Self::Streams => "streams",
            Self::LiveEvents => "events",
        }
    }
}

/// Resolved mention annotation for one delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mention {
    pub role_id: Option<String>,
    pub text: Option<String>,
}

impl Mention {
    /// Render the mention prefix ("<@&role> text"), empty when nothing is
    /// configured.
    pub fn prefix(&self) -> String {
        match (&self.role_id, &self.text) {
            (Some(role), Some(text)) => format!("<@&{role}> {text}"),
            (Some(role), None) => format!("<@&{role}>"),
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        }
    }
}

/// A notification ready to send to one destination channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub content: String,
    pub title: String,
    pub url: Option<String>,
}

impl RenderedNotification {
    /// Render a minimal notification line for a feed item.
    ///
    /// Full embed formatting belongs to the chat front end; the engine only
    /// produces the headline and link.
    pub fn render(feed_name: &str, kind: ItemKind, title: &str, url: Option<&str>) -> Self {
        let headline = match kind {
            ItemKind::Post => format!("**{feed_name}** posted: {title}"),
            ItemKind::MembersPost => format!("**{feed_name}** posted for members: {title}"),
            ItemKind::Upload => format!("**{feed_name}** uploaded a new video: {title}"),
            ItemKind::StreamLive => format!("**{feed_name}** is now live: {title}"),
            ItemKind::StreamUpcoming => format!("**{feed_name}** scheduled a stream: {title}"),
            ItemKind::StreamEnded => format!("**{feed_name}** finished streaming"),
        };
        let content = match url {
            Some(url) => format!("{headline}\n{url}"),
            None => headline,
        };
        Self {
            content,
            title: title.to_string(),
            url: url.map(|u| u.to_string()),
        }
    }

    /// Prepend a resolved mention to the content.
    pub fn with_mention(&self, mention: Option<&Mention>) -> Self {
        let prefix = mention.map(Mention::prefix).unwrap_or_default();
        if prefix.is_empty() {
            return self.clone();
        }
        Self {
            content: format!("{prefix}\n{}", self.content),
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_feature_mapping() {
        assert_eq!(ItemKind::Post.feature(), FeatureKind::Posts);
        assert_eq!(ItemKind::StreamUpcoming.feature(), FeatureKind::Streams);
        assert!(!ItemKind::StreamEnded.notifies());
        assert!(ItemKind::Upload.notifies());
    }

    #[test]
    fn test_mention_prefix() {
        let mention = Mention {
            role_id: Some("42".to_string()),
            text: Some("ping!".to_string()),
        };
        assert_eq!(mention.prefix(), "<@&42> ping!");

        let text_only = Mention {
            role_id: None,
            text: Some("ping!".to_string()),
        };
        assert_eq!(text_only.prefix(), "ping!");
    }

    #[test]
    fn test_render_with_mention() {
        let rendered =
            RenderedNotification::render("someone", ItemKind::Post, "hello", Some("https://x/1"));
        assert!(rendered.content.contains("someone"));
        assert!(rendered.content.contains("https://x/1"));

        let mention = Mention {
            role_id: Some("42".to_string()),
            text: None,
        };
        let with = rendered.with_mention(Some(&mention));
        assert!(with.content.starts_with("<@&42>"));
    }
}
