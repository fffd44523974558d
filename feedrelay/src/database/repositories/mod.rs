//! Repository traits and their SQLx implementations.

pub mod features;
pub mod feed;
pub mod scheduled_event;
pub mod target;

pub use features::{FeatureRepository, SqlxFeatureRepository};
pub use feed::{FeedRepository, SqlxFeedRepository};
pub use scheduled_event::{ScheduledEventRepository, SqlxScheduledEventRepository};
pub use target::{SqlxTargetRepository, TargetRepository};
