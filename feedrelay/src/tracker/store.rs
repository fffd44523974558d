//! Dedup/cursor store.
//!
//! Combines the persisted per-feed cursor with the process-local dedup cache
//! to decide, per inspected item, whether it is genuinely new. The in-memory
//! cursor cache guards monotonicity: a marker that does not advance over the
//! last known cursor is never written back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::dedup::{SeenCache, SeenCacheConfig};
use crate::Result;
use crate::database::repositories::FeedRepository;
use crate::domain::{Cursor, CursorMode};

/// Verdict for one inspected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDisposition {
    /// Genuinely new: deliver to targets.
    Deliver,
    /// At or behind the cursor, or already observed this window.
    Duplicate,
    /// New but older than the freshness window: advance the cursor, never
    /// deliver. Prevents notification storms on first track or after
    /// downtime.
    Backfill,
}

/// Per-feed monotonic cursor plus short-term dedup cache.
pub struct DedupCursorStore<FR> {
    repo: Arc<FR>,
    /// Last known persisted cursor per feed id.
    cursors: DashMap<String, Cursor>,
    seen: SeenCache,
    freshness_window: Duration,
}

impl<FR> DedupCursorStore<FR>
where
    FR: FeedRepository,
{
    pub fn new(repo: Arc<FR>, seen_config: SeenCacheConfig, freshness_window: Duration) -> Self {
        Self {
            repo,
            cursors: DashMap::new(),
            seen: SeenCache::new(seen_config),
            freshness_window,
        }
    }

    /// The current cursor for a feed.
    ///
    /// Prefers the in-memory cache (which may be ahead of an uncommitted
    /// write) and falls back to the persisted value carried on the row. The
    /// persisted value seeds the cache so a later `advance_cursor` can never
    /// rewind it.
    pub fn current_cursor(
        &self,
        feed_id: &str,
        persisted: Option<&str>,
        mode: CursorMode,
    ) -> Option<Cursor> {
        if let Some(cached) = self.cursors.get(feed_id) {
            return Some(cached.clone());
        }
        let parsed = persisted.and_then(|raw| Cursor::parse(raw, mode))?;
        self.cursors
            .entry(feed_id.to_string())
            .or_insert_with(|| parsed.clone());
        Some(parsed)
    }

    /// Classify one inspected item against cursor, dedup cache, and
    /// freshness window.
    ///
    /// Every item inspected is recorded in the dedup cache regardless of
    /// verdict, so repeat observations across mirrors are absorbed.
    pub fn classify(
        &self,
        feed_id: &str,
        mode: CursorMode,
        cursor: Option<&Cursor>,
        item_id: &str,
        marker: Option<&Cursor>,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ItemDisposition {
        // Record-first: the side effect applies to every inspected item.
        let unseen = self.seen.check_and_record(feed_id, item_id);

        let ahead_of_cursor = match mode {
            CursorMode::Ordinal => match (marker, cursor) {
                (Some(marker), Some(cursor)) => marker.advances_over(cursor),
                // No persisted cursor yet: everything is ahead.
                (_, None) => true,
                // Items without a marker can't be ordered; rely on dedup.
                (None, Some(_)) => true,
            },
            // Diff-based services already diffed against the snapshot.
            CursorMode::Snapshot => true,
        };

        if !ahead_of_cursor || !unseen {
            return ItemDisposition::Duplicate;
        }

        let age = now.signed_duration_since(timestamp);
        let fresh = match chrono::Duration::from_std(self.freshness_window) {
            Ok(window) => age <= window,
            Err(_) => true,
        };
        if !fresh {
            return ItemDisposition::Backfill;
        }

        ItemDisposition::Deliver
    }

    /// Advance the persisted cursor, no-op unless the marker moves forward.
    ///
    /// Per-feed write serialization comes from the checker's partition lock;
    /// this method only enforces monotonicity against the last known value.
    pub async fn advance_cursor(&self, feed_id: &str, marker: Cursor) -> Result<()> {
        let current = self.cursors.get(feed_id).map(|c| c.clone());
        if let Some(current) = &current
            && !marker.advances_over(current)
        {
            return Ok(());
        }

        self.repo.set_cursor(feed_id, &marker.encode()).await?;
        debug!(feed_id, cursor = %marker.encode(), "cursor advanced");
        self.cursors.insert(feed_id.to_string(), marker);
        Ok(())
    }

    /// Drop all in-memory state for a feed (used when a feed is untracked
    /// or its cursor is admin-reset).
    pub fn forget_feed(&self, feed_id: &str) {
        self.cursors.remove(feed_id);
        self.seen.forget_feed(feed_id);
    }
}
