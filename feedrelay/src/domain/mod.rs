//! Domain types for the polling engine.

pub mod cursor;
pub mod event;
pub mod feed;
pub mod notification;
pub mod site;
pub mod target;

pub use cursor::{Cursor, CursorMode};
pub use event::EventStatus;
pub use feed::TrackedFeed;
pub use notification::{FeatureKind, ItemKind, Mention, RenderedNotification};
pub use site::Site;
pub use target::{MentionConfig, Target};
