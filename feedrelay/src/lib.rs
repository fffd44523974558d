//! feedrelay library crate.
//!
//! A tracked-feed polling and notification delivery engine: one supervised
//! checking loop per external service polls feeds through site adapters,
//! diffs results against a per-feed cursor and short-term dedup cache, and
//! delivers notifications to subscribed destination channels.

pub mod adapters;
pub mod config;
pub mod database;
pub mod destination;
pub mod domain;
pub mod error;
pub mod live_events;
pub mod orchestrator;
pub mod tracker;

pub use error::{Error, Result};
