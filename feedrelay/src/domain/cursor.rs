//! Feed cursor markers.
//!
//! A cursor is the durable "last processed" marker for a feed. Ordinal
//! cursors (snowflake/numeric item ids) advance only when a strictly greater
//! id is observed; snapshot cursors (content hashes of diff-based list
//! services) replace whenever the snapshot changes.

use serde::{Deserialize, Serialize};

/// How a service's cursor markers are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorMode {
    /// Numeric item ids, strictly increasing.
    Ordinal,
    /// Opaque snapshot of the whole list; any change is an advance.
    Snapshot,
}

/// Opaque monotonic marker for a feed's last-seen position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cursor {
    Ordinal(u64),
    Snapshot(String),
}

impl Cursor {
    /// Parse a persisted cursor string for the given mode.
    pub fn parse(raw: &str, mode: CursorMode) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        match mode {
            CursorMode::Ordinal => raw.parse::<u64>().ok().map(Self::Ordinal),
            CursorMode::Snapshot => Some(Self::Snapshot(raw.to_string())),
        }
    }

    /// Database string representation.
    pub fn encode(&self) -> String {
        match self {
            Self::Ordinal(n) => n.to_string(),
            Self::Snapshot(s) => s.clone(),
        }
    }

    /// Whether replacing `current` with `self` is a forward advance.
    ///
    /// Ordinal cursors require a strictly greater id; snapshot cursors
    /// advance on any change. Mismatched variants (mode changed by an admin
    /// reset) always advance.
    pub fn advances_over(&self, current: &Cursor) -> bool {
        match (self, current) {
            (Self::Ordinal(new), Self::Ordinal(old)) => new > old,
            (Self::Snapshot(new), Self::Snapshot(old)) => new != old,
            _ => true,
        }
    }
}
