//! Tracked feed domain entity.

use super::cursor::Cursor;
use super::site::Site;

/// One external account/list being watched on one service.
///
/// Identity is (`site`, `account_id`); the display name is a cache only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFeed {
    pub id: String,
    pub site: Site,
    pub account_id: String,
    pub display_name: Option<String>,
    pub cursor: Option<Cursor>,
    pub enabled: bool,
}

impl TrackedFeed {
    /// Build from a database model. Returns `None` for an unknown site.
    pub fn from_db_model(model: &crate::database::models::FeedDbModel) -> Option<Self> {
        let site = Site::parse(&model.site)?;
        Some(Self {
            id: model.id.clone(),
            site,
            account_id: model.account_id.clone(),
            display_name: model.display_name.clone(),
            cursor: model
                .cursor
                .as_deref()
                .and_then(|raw| Cursor::parse(raw, site.cursor_mode())),
            enabled: model.enabled,
        })
    }

    /// Name shown in notifications, falling back to the stable account id.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.account_id)
    }
}
