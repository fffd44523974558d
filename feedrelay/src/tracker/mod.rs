//! The tracked-feed polling core.
//!
//! One `FeedChecker` loop per service polls feeds through the site's
//! adapter, diffs results against the cursor and dedup cache, and hands new
//! items to the delivery pipeline.

pub mod alerts;
pub mod checker;
pub mod dedup;
pub mod delivery;
pub mod mention;
pub mod store;
pub mod targets;

pub use alerts::AlertThrottle;
pub use checker::{FeedChecker, TrackerServices};
pub use dedup::{SeenCache, SeenCacheConfig};
pub use delivery::{DeliveryPipeline, DeliveryResult};
pub use mention::MentionResolver;
pub use store::{DedupCursorStore, ItemDisposition};
pub use targets::{ResolvedTargets, TargetResolver};
