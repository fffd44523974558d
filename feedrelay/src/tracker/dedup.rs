//! Short-term dedup cache.
//!
//! A process-local, bounded, age-expiring set of recently-seen item ids per
//! feed. Overlapping polls against redundant upstream mirrors must not
//! double-deliver an item even though the persisted cursor has not yet been
//! committed. Losing this cache on restart only risks a bounded number of
//! duplicate deliveries, never missed ones.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Configuration for the dedup cache.
#[derive(Debug, Clone, Copy)]
pub struct SeenCacheConfig {
    /// How long an entry is retained after being recorded.
    pub horizon: Duration,
    /// Maximum entries per feed; the oldest is evicted past this.
    pub max_entries_per_feed: usize,
}

impl Default for SeenCacheConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::from_secs(2 * 3600),
            max_entries_per_feed: 512,
        }
    }
}

#[derive(Debug, Default)]
struct FeedSeen {
    entries: HashMap<String, Instant>,
    /// Insertion order for bounded eviction.
    order: VecDeque<String>,
}

/// Bounded, time-expiring set of recently-seen item ids per feed.
pub struct SeenCache {
    feeds: DashMap<String, FeedSeen>,
    config: SeenCacheConfig,
}

impl SeenCache {
    pub fn new(config: SeenCacheConfig) -> Self {
        Self {
            feeds: DashMap::new(),
            config,
        }
    }

    /// Record an item id, returning `true` when it was not already present.
    ///
    /// Check and record happen under the feed's map entry lock, so two
    /// concurrent observations of the same item yield exactly one `true`.
    pub fn check_and_record(&self, feed_id: &str, item_id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.feeds.entry(feed_id.to_string()).or_default();
        Self::prune(&mut seen, now, &self.config);

        if seen.entries.contains_key(item_id) {
            // Refresh the expiry so repeat observations keep absorbing.
            seen.entries.insert(item_id.to_string(), now);
            return false;
        }

        seen.entries.insert(item_id.to_string(), now);
        seen.order.push_back(item_id.to_string());
        if seen.entries.len() > self.config.max_entries_per_feed {
            while seen.entries.len() > self.config.max_entries_per_feed {
                match seen.order.pop_front() {
                    Some(oldest) => {
                        seen.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        true
    }

    /// Whether an item id is currently present (does not record).
    pub fn contains(&self, feed_id: &str, item_id: &str) -> bool {
        let now = Instant::now();
        match self.feeds.get_mut(feed_id) {
            Some(mut seen) => {
                Self::prune(&mut seen, now, &self.config);
                seen.entries.contains_key(item_id)
            }
            None => false,
        }
    }

    /// Drop all entries for a feed (used when a feed is untracked).
    pub fn forget_feed(&self, feed_id: &str) {
        self.feeds.remove(feed_id);
    }

    fn prune(seen: &mut FeedSeen, now: Instant, config: &SeenCacheConfig) {
        if seen.entries.is_empty() {
            return;
        }
        seen.entries
            .retain(|_, recorded| now.duration_since(*recorded) < config.horizon);
        seen.order.retain(|id| seen.entries.contains_key(id));
    }
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::new(SeenCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_fresh() {
        let cache = SeenCache::default();
        assert!(cache.check_and_record("feed-1", "101"));
        assert!(!cache.check_and_record("feed-1", "101"));
    }

    #[test]
    fn test_feeds_are_independent() {
        let cache = SeenCache::default();
        assert!(cache.check_and_record("feed-1", "101"));
        assert!(cache.check_and_record("feed-2", "101"));
    }

    #[test]
    fn test_entries_expire() {
        let cache = SeenCache::new(SeenCacheConfig {
            horizon: Duration::from_millis(20),
            max_entries_per_feed: 512,
        });
        assert!(cache.check_and_record("feed-1", "101"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!cache.contains("feed-1", "101"));
        assert!(cache.check_and_record("feed-1", "101"));
    }

    #[test]
    fn test_bounded_eviction() {
        let cache = SeenCache::new(SeenCacheConfig {
            horizon: Duration::from_secs(3600),
            max_entries_per_feed: 3,
        });
        for id in ["1", "2", "3", "4"] {
            assert!(cache.check_and_record("feed-1", id));
        }
        // Oldest entry was evicted, the rest remain.
        assert!(!cache.contains("feed-1", "1"));
        assert!(cache.contains("feed-1", "4"));
    }

    #[test]
    fn test_forget_feed() {
        let cache = SeenCache::default();
        cache.check_and_record("feed-1", "101");
        cache.forget_feed("feed-1");
        assert!(!cache.contains("feed-1", "101"));
    }
}
