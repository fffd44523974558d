//! Throttled admin alerting.
//!
//! Sustained upstream rate limiting should reach an operator, but at most
//! once per cooldown window per service to avoid alert storms.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::Site;

/// Per-service alert throttle.
pub struct AlertThrottle {
    window: Duration,
    last: Mutex<HashMap<Site, Instant>>,
}

impl AlertThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Whether an alert for this service may fire now. Recording happens on
    /// `true` so concurrent callers collapse into one alert per window.
    pub fn should_alert(&self, site: Site) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match last.get(&site) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                last.insert(site, now);
                true
            }
        }
    }
}
