//! Live-event lifecycle management.
//!
//! Mirrors live/upcoming stream state into time-bounded scheduled events on
//! the destination platform.

pub mod manager;

pub use manager::{EventLifecycleManager, EventPolicy};
