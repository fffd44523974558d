//! Engine configuration.
//!
//! Tunables for the polling engine: per-service cooldowns, dedup and
//! freshness windows, alert throttling, and feed error backoff. Values come
//! from environment variables with conservative defaults.

use std::time::Duration;

use crate::domain::Site;

/// Cooldown parameters for one service's checking loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownSpec {
    /// Delay between consecutive upstream calls within one partition.
    pub call_delay: Duration,
    /// Floor on the full-cycle cadence, independent of `call_delay`.
    pub min_repeat_time: Duration,
}

impl CooldownSpec {
    pub fn new(call_delay: Duration, min_repeat_time: Duration) -> Self {
        Self {
            call_delay,
            min_repeat_time,
        }
    }
}

/// Configuration for the polling engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Items older than this are cursor-advanced but never delivered.
    pub freshness_window: Duration,
    /// How long dedup entries are retained after last being observed.
    pub dedup_horizon: Duration,
    /// Maximum dedup entries retained per feed (oldest evicted).
    pub dedup_max_entries: usize,
    /// Minimum interval between sustained-rate-limit admin alerts per service.
    pub alert_cooldown: Duration,
    /// Optional channel that receives admin alerts.
    pub admin_channel_id: Option<String>,
    /// Consecutive transient errors before a feed enters backoff.
    pub error_backoff_threshold: u32,
    /// Base backoff duration (doubles with each further error).
    pub error_backoff_base: Duration,
    /// Maximum backoff duration.
    pub error_backoff_max: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(12 * 3600),
            dedup_horizon: Duration::from_secs(2 * 3600),
            dedup_max_entries: 512,
            alert_cooldown: Duration::from_secs(6 * 3600),
            admin_channel_id: None,
            error_backoff_threshold: 3,
            error_backoff_base: Duration::from_secs(60),
            error_backoff_max: Duration::from_secs(3600),
        }
    }
}

impl EngineConfig {
    /// Build configuration from `FEEDRELAY_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            freshness_window: env_secs("FEEDRELAY_FRESHNESS_WINDOW_SECS")
                .unwrap_or(defaults.freshness_window),
            dedup_horizon: env_secs("FEEDRELAY_DEDUP_HORIZON_SECS")
                .unwrap_or(defaults.dedup_horizon),
            dedup_max_entries: env_parse("FEEDRELAY_DEDUP_MAX_ENTRIES")
                .unwrap_or(defaults.dedup_max_entries),
            alert_cooldown: env_secs("FEEDRELAY_ALERT_COOLDOWN_SECS")
                .unwrap_or(defaults.alert_cooldown),
            admin_channel_id: std::env::var("FEEDRELAY_ADMIN_CHANNEL_ID").ok(),
            error_backoff_threshold: env_parse("FEEDRELAY_ERROR_BACKOFF_THRESHOLD")
                .unwrap_or(defaults.error_backoff_threshold),
            error_backoff_base: env_secs("FEEDRELAY_ERROR_BACKOFF_BASE_SECS")
                .unwrap_or(defaults.error_backoff_base),
            error_backoff_max: env_secs("FEEDRELAY_ERROR_BACKOFF_MAX_SECS")
                .unwrap_or(defaults.error_backoff_max),
        }
    }

    /// Cooldown specification for a service.
    ///
    /// Environment overrides (`FEEDRELAY_<SITE>_CALL_DELAY_MS`,
    /// `FEEDRELAY_<SITE>_REPEAT_SECS`) take precedence over per-site defaults.
    pub fn cooldown_for(&self, site: Site) -> CooldownSpec {
        let default = default_cooldown(site);
        let prefix = site.as_str().to_uppercase();
        let call_delay = env_millis(&format!("FEEDRELAY_{prefix}_CALL_DELAY_MS"))
            .unwrap_or(default.call_delay);
        let min_repeat_time =
            env_secs(&format!("FEEDRELAY_{prefix}_REPEAT_SECS")).unwrap_or(default.min_repeat_time);
        CooldownSpec::new(call_delay, min_repeat_time)
    }

    /// Number of upstream partitions polled concurrently for a service.
    pub fn partitions_for(&self, site: Site) -> usize {
        env_parse(&format!(
            "FEEDRELAY_{}_PARTITIONS",
            site.as_str().to_uppercase()
        ))
        .unwrap_or_else(|| default_partitions(site))
        .max(1)
    }
}

fn default_cooldown(site: Site) -> CooldownSpec {
    match site {
        Site::YouTube => CooldownSpec::new(Duration::from_secs(1), Duration::from_secs(60)),
        Site::Twitch => CooldownSpec::new(Duration::from_secs(1), Duration::from_secs(45)),
        Site::Twitter => CooldownSpec::new(Duration::from_secs(2), Duration::from_secs(60)),
        Site::Bluesky => CooldownSpec::new(Duration::from_secs(1), Duration::from_secs(30)),
        Site::AniList => CooldownSpec::new(Duration::from_secs(3), Duration::from_secs(180)),
        Site::MyAnimeList => CooldownSpec::new(Duration::from_secs(4), Duration::from_secs(300)),
    }
}

fn default_partitions(site: Site) -> usize {
    match site {
        // Polled through redundant mirror instances.
        Site::Twitter => 3,
        _ => 1,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
