//! Service adapter seam.
//!
//! One adapter per site turns a raw upstream response into a typed
//! "new items since cursor" result. Adapters are external collaborators;
//! the engine only depends on the trait and the registry defined here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Cursor, CursorMode, ItemKind, Site, TrackedFeed};

/// Identity of the upstream account as resolved by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub account_id: String,
    pub display_name: String,
}

/// Phase of a stream-status item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamPhase {
    Upcoming,
    Live,
    Ended,
}

/// Stream state attached to stream-status items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    pub phase: StreamPhase,
    /// Start time reported by the platform for upcoming streams.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Distinguishes parallel streams/videos of the same feed.
    pub sub_item_id: Option<String>,
}

/// One item reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Service-assigned item identifier.
    pub id: String,
    /// Numeric position for ordinal-id services.
    pub ordinal: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub kind: ItemKind,
    pub title: String,
    pub url: Option<String>,
    /// Present for stream-status kinds.
    pub stream: Option<StreamState>,
}

impl FeedItem {
    /// The cursor marker this item contributes, if any.
    pub fn marker(&self, mode: CursorMode) -> Option<Cursor> {
        match mode {
            CursorMode::Ordinal => self
                .ordinal
                .or_else(|| self.id.parse().ok())
                .map(Cursor::Ordinal),
            // Snapshot cursors come from the fetch result, not from items.
            CursorMode::Snapshot => None,
        }
    }
}

/// Result of one adapter poll.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub identity: Option<ResolvedIdentity>,
    pub items: Vec<FeedItem>,
    /// New list snapshot for diff-based services.
    pub snapshot: Option<String>,
}

/// Failures an adapter can report for one feed poll.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("upstream rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("upstream account not found")]
    NotFound,
    #[error("upstream IO failure: {0}")]
    Io(String),
    #[error("upstream response unparseable: {0}")]
    Parse(String),
}

/// A per-site feed adapter.
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// The site this adapter serves.
    fn site(&self) -> Site;

    /// Fetch items newer than the cursor for one feed.
    async fn fetch_since(
        &self,
        feed: &TrackedFeed,
        cursor: Option<&Cursor>,
    ) -> std::result::Result<FetchResult, FetchError>;
}

/// Registry of adapters keyed by site.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Site, Arc<dyn FeedAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous adapter for the site.
    pub fn register(&mut self, adapter: Arc<dyn FeedAdapter>) {
        self.adapters.insert(adapter.site(), adapter);
    }

    pub fn get(&self, site: Site) -> Option<Arc<dyn FeedAdapter>> {
        self.adapters.get(&site).cloned()
    }

    /// Sites with a registered adapter.
    pub fn sites(&self) -> Vec<Site> {
        let mut sites: Vec<Site> = self.adapters.keys().copied().collect();
        sites.sort_by_key(|s| s.as_str());
        sites
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
