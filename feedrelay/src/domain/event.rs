//! Scheduled event lifecycle states.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle states of a mirrored scheduled event.
///
/// Only `Scheduled` and `Live` are ever persisted; terminal states delete
/// the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Scheduled,
    Live,
    Completed,
    Cancelled,
}

impl EventStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Live => "LIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SCHEDULED" => Some(Self::Scheduled),
            "LIVE" => Some(Self::Live),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the event record should be deleted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: EventStatus) -> bool {
        use EventStatus::*;

        match (self, target) {
            (from, to) if from == &to => true,
            (Scheduled, Live | Completed | Cancelled) => true,
            (Live, Completed | Cancelled) => true,
            // Terminal states never transition.
            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: EventStatus) -> Result<EventStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            EventStatus::Scheduled,
            EventStatus::Live,
            EventStatus::Completed,
            EventStatus::Cancelled,
        ] {
            assert_eq!(EventStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EventStatus::parse("invalid"), None);
    }

    #[test]
    fn test_valid_transitions() {
        assert!(EventStatus::Scheduled.can_transition_to(EventStatus::Live));
        assert!(EventStatus::Scheduled.can_transition_to(EventStatus::Cancelled));
        assert!(EventStatus::Live.can_transition_to(EventStatus::Completed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(!EventStatus::Completed.can_transition_to(EventStatus::Live));
        assert!(!EventStatus::Cancelled.can_transition_to(EventStatus::Scheduled));
        assert!(EventStatus::Completed.is_terminal());
        assert!(!EventStatus::Live.is_terminal());
    }

    #[test]
    fn test_transition_to_error() {
        let result = EventStatus::Completed.transition_to(EventStatus::Live);
        assert!(result.is_err());
    }
}
