//! Per-service checking loop.
//!
//! Each cycle: fetch the service's enabled feeds, partition them across
//! upstream shards, poll partitions concurrently (sequential within a
//! partition, with an inter-call delay), diff results against the
//! cursor/dedup store, deliver new items, advance cursors, sleep out the
//! remainder of the cadence floor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::alerts::AlertThrottle;
use super::delivery::DeliveryPipeline;
use super::mention::MentionResolver;
use super::store::{DedupCursorStore, ItemDisposition};
use super::targets::{ResolvedTargets, TargetResolver};
use crate::Result;
use crate::adapters::{FeedAdapter, FetchError, FetchResult};
use crate::config::{CooldownSpec, EngineConfig};
use crate::database::models::FeedDbModel;
use crate::database::repositories::{
    FeatureRepository, FeedRepository, ScheduledEventRepository, TargetRepository,
};
use crate::destination::DestinationClient;
use crate::domain::{Cursor, RenderedNotification, Target, TrackedFeed};
use crate::live_events::EventLifecycleManager;

/// Extra per-feed time budgeted into the partition timeout beyond the
/// configured inter-call delay.
const FEED_POLL_BUDGET: Duration = Duration::from_secs(15);

/// Floor for the partition timeout regardless of feed count.
const MIN_PARTITION_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared collaborators for all checkers of one engine instance.
pub struct TrackerServices<FR, TR, CF, ER> {
    pub feed_repo: Arc<FR>,
    pub store: Arc<DedupCursorStore<FR>>,
    pub targets: Arc<TargetResolver<FR, TR>>,
    pub mentions: Arc<MentionResolver<TR>>,
    pub delivery: Arc<DeliveryPipeline<TR, CF>>,
    pub feature_repo: Arc<CF>,
    pub events: Arc<EventLifecycleManager<ER, CF>>,
    pub client: Arc<dyn DestinationClient>,
}

/// Transient error bookkeeping for one feed.
#[derive(Debug, Clone, Copy, Default)]
struct FeedErrorState {
    consecutive: u32,
    backoff_until: Option<Instant>,
}

/// The polling loop for one external service.
pub struct FeedChecker<FR, TR, CF, ER> {
    site: crate::domain::Site,
    adapter: Arc<dyn FeedAdapter>,
    cooldown: CooldownSpec,
    partition_locks: Vec<Arc<tokio::sync::Mutex<()>>>,
    services: Arc<TrackerServices<FR, TR, CF, ER>>,
    alerts: Arc<AlertThrottle>,
    errors: DashMap<String, FeedErrorState>,
    backoff_threshold: u32,
    backoff_base: Duration,
    backoff_max: Duration,
    admin_channel_id: Option<String>,
}

impl<FR, TR, CF, ER> FeedChecker<FR, TR, CF, ER>
where
    FR: FeedRepository + 'static,
    TR: TargetRepository + 'static,
    CF: FeatureRepository + 'static,
    ER: ScheduledEventRepository + 'static,
{
    pub fn new(
        site: crate::domain::Site,
        adapter: Arc<dyn FeedAdapter>,
        cooldown: CooldownSpec,
        partitions: usize,
        services: Arc<TrackerServices<FR, TR, CF, ER>>,
        alerts: Arc<AlertThrottle>,
        config: &EngineConfig,
    ) -> Self {
        let partitions = partitions.max(1);
        Self {
            site,
            adapter,
            cooldown,
            partition_locks: (0..partitions)
                .map(|_| Arc::new(tokio::sync::Mutex::new(())))
                .collect(),
            services,
            alerts,
            errors: DashMap::new(),
            backoff_threshold: config.error_backoff_threshold,
            backoff_base: config.error_backoff_base,
            backoff_max: config.error_backoff_max,
            admin_channel_id: config.admin_channel_id.clone(),
        }
    }

    pub fn site(&self) -> crate::domain::Site {
        self.site
    }

    /// Run the checking loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            site = %self.site,
            partitions = self.partition_locks.len(),
            repeat_secs = self.cooldown.min_repeat_time.as_secs(),
            "feed checker started"
        );

        loop {
            let started = Instant::now();

            if let Err(e) = Arc::clone(&self).run_cycle(cancel.clone()).await {
                // Nothing above the checker may die; log and continue.
                error!(site = %self.site, error = %e, "checking cycle failed");
            }

            let elapsed = started.elapsed();
            let remaining = self.cooldown.min_repeat_time.saturating_sub(elapsed);
            trace!(site = %self.site, ?elapsed, ?remaining, "cycle complete");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        info!(site = %self.site, "feed checker stopped");
    }

    /// One full cycle: fetch, partition, poll, deliver, advance.
    pub async fn run_cycle(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let feeds = self
            .services
            .feed_repo
            .list_enabled_by_site(self.site.as_str())
            .await?;
        if feeds.is_empty() {
            trace!(site = %self.site, "no enabled feeds");
            return Ok(());
        }

        let partitions = partition(feeds, self.partition_locks.len());

        let mut handles = Vec::new();
        for (idx, feeds) in partitions.into_iter().enumerate() {
            if feeds.is_empty() {
                continue;
            }

            // Skip-if-busy: a partition whose previous cycle still runs is
            // not polled again, bounding backlog growth.
            let Ok(guard) = self.partition_locks[idx].clone().try_lock_owned() else {
                warn!(
                    site = %self.site,
                    partition = idx,
                    "previous cycle still running, skipping partition"
                );
                continue;
            };

            let budget = self.partition_budget(feeds.len());
            let this = Arc::clone(&self);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _guard = guard;
                if tokio::time::timeout(budget, this.clone().poll_partition(idx, feeds, cancel))
                    .await
                    .is_err()
                {
                    warn!(
                        site = %this.site,
                        partition = idx,
                        ?budget,
                        "partition timed out, remaining feeds deferred to next cycle"
                    );
                }
            }));
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result
                && e.is_panic()
            {
                error!(site = %self.site, "partition task panicked: {e}");
            }
        }

        Ok(())
    }

    /// Timeout for one partition, proportional to its feed count.
    fn partition_budget(&self, feed_count: usize) -> Duration {
        let per_feed = self.cooldown.call_delay + FEED_POLL_BUDGET;
        per_feed
            .saturating_mul(feed_count as u32)
            .max(MIN_PARTITION_TIMEOUT)
    }

    /// Poll one partition's feeds sequentially with the inter-call delay.
    async fn poll_partition(
        self: Arc<Self>,
        idx: usize,
        feeds: Vec<FeedDbModel>,
        cancel: CancellationToken,
    ) {
        trace!(site = %self.site, partition = idx, feeds = feeds.len(), "polling partition");

        for feed in feeds {
            if cancel.is_cancelled() {
                return;
            }

            if self.in_backoff(&feed.id) {
                debug!(feed_id = %feed.id, "feed in error backoff, skipping");
                continue;
            }

            if let Err(e) = self.poll_feed(&feed).await {
                warn!(
                    site = %self.site,
                    feed_id = %feed.id,
                    account = %feed.account_id,
                    error = %e,
                    "feed poll failed"
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.cooldown.call_delay) => {}
            }
        }
    }

    /// Poll one feed and process the result.
    async fn poll_feed(&self, row: &FeedDbModel) -> Result<()> {
        let Some(feed) = TrackedFeed::from_db_model(row) else {
            warn!(feed_id = %row.id, site = %row.site, "feed has unknown site, skipping");
            return Ok(());
        };

        let mode = self.site.cursor_mode();
        let cursor = self
            .services
            .store
            .current_cursor(&feed.id, row.cursor.as_deref(), mode);

        let result = match self.adapter.fetch_since(&feed, cursor.as_ref()).await {
            Ok(result) => {
                self.clear_feed_error(&feed.id);
                result
            }
            Err(FetchError::RateLimited { retry_after }) => {
                debug!(site = %self.site, feed_id = %feed.id, ?retry_after, "upstream rate limited");
                self.raise_rate_limit_alert().await;
                return Ok(());
            }
            Err(FetchError::NotFound) => {
                warn!(
                    site = %self.site,
                    account = %feed.account_id,
                    "upstream account confirmed gone, untracking feed"
                );
                self.services.feed_repo.delete_feed(&feed.id).await?;
                self.services.store.forget_feed(&feed.id);
                return Ok(());
            }
            Err(e) => {
                self.record_feed_error(&feed.id);
                return Err(crate::Error::transient(e.to_string()));
            }
        };

        self.refresh_display_name(&feed, &result).await;

        let targets = match self.services.targets.active_targets(&feed.id).await? {
            ResolvedTargets::Untracked => {
                self.services.store.forget_feed(&feed.id);
                return Ok(());
            }
            ResolvedTargets::Active(targets) => targets,
        };

        // Oldest to newest, so the cursor only ever moves forward and a
        // crash mid-feed at worst duplicates (absorbed by the dedup cache).
        let mut items = result.items;
        items.sort_by(|a, b| {
            a.ordinal
                .cmp(&b.ordinal)
                .then(a.timestamp.cmp(&b.timestamp))
        });

        let now = chrono::Utc::now();
        let mut max_marker: Option<Cursor> = None;

        for item in &items {
            let marker = item.marker(mode);
            let disposition = self.services.store.classify(
                &feed.id,
                mode,
                cursor.as_ref(),
                &item.id,
                marker.as_ref(),
                item.timestamp,
                now,
            );

            match disposition {
                ItemDisposition::Deliver => {
                    if item.kind.notifies() {
                        self.deliver_item(&feed, item, &targets).await;
                    }
                }
                ItemDisposition::Duplicate | ItemDisposition::Backfill => {
                    trace!(feed_id = %feed.id, item_id = %item.id, ?disposition, "item filtered");
                }
            }

            // Stream state drives the event lifecycle even for items that
            // were filtered from delivery.
            if item.stream.is_some()
                && let Err(e) = self.services.events.sync(&feed, item, &targets).await
            {
                warn!(feed_id = %feed.id, item_id = %item.id, error = %e, "event lifecycle sync failed");
            }

            if let Some(marker) = marker {
                let advances = match &max_marker {
                    Some(current) => marker.advances_over(current),
                    None => true,
                };
                if advances {
                    max_marker = Some(marker);
                }
            }
        }

        // Snapshot-mode services advance to the list snapshot; ordinal-mode
        // services advance to the maximum observed id, delivered or not.
        let next = match mode {
            crate::domain::CursorMode::Snapshot => {
                result.snapshot.map(Cursor::Snapshot).or(max_marker)
            }
            crate::domain::CursorMode::Ordinal => max_marker,
        };
        if let Some(next) = next {
            self.services.store.advance_cursor(&feed.id, next).await?;
        }

        Ok(())
    }

    /// Deliver one new item to every eligible target.
    async fn deliver_item(
        &self,
        feed: &TrackedFeed,
        item: &crate::adapters::FeedItem,
        targets: &[Target],
    ) {
        let rendered =
            RenderedNotification::render(feed.name(), item.kind, &item.title, item.url.as_deref());

        for target in targets {
            // Per-target isolation: one bad destination never blocks the rest.
            let features = match self
                .services
                .feature_repo
                .get_features(&target.channel_id)
                .await
            {
                Ok(features) => features,
                Err(e) => {
                    warn!(channel_id = %target.channel_id, error = %e, "feature lookup failed");
                    continue;
                }
            };
            if !features.allows(item.kind.feature()) {
                continue;
            }

            let mention = match self.services.mentions.resolve(target, item.kind).await {
                Ok(mention) => mention,
                Err(e) => {
                    warn!(target_id = %target.id, error = %e, "mention resolution failed");
                    None
                }
            };

            let message = rendered.with_mention(mention.as_ref());
            if let Err(e) = self
                .services
                .delivery
                .deliver(target, item.kind, &message)
                .await
            {
                warn!(target_id = %target.id, error = %e, "delivery failed");
            }
        }
    }

    async fn refresh_display_name(&self, feed: &TrackedFeed, result: &FetchResult) {
        let Some(identity) = &result.identity else {
            return;
        };
        if feed.display_name.as_deref() == Some(identity.display_name.as_str()) {
            return;
        }
        debug!(
            feed_id = %feed.id,
            name = %identity.display_name,
            "refreshing cached display name"
        );
        if let Err(e) = self
            .services
            .feed_repo
            .update_display_name(&feed.id, &identity.display_name)
            .await
        {
            warn!(feed_id = %feed.id, error = %e, "display name refresh failed");
        }
    }

    async fn raise_rate_limit_alert(&self) {
        if !self.alerts.should_alert(self.site) {
            return;
        }
        error!(site = %self.site, "sustained upstream rate limiting");
        if let Some(admin_channel) = &self.admin_channel_id {
            let alert = RenderedNotification {
                content: format!(
                    ":warning: sustained rate limiting from **{}**; polls are being skipped",
                    self.site
                ),
                title: "rate limit alert".to_string(),
                url: None,
            };
            if let Err(e) = self.services.client.send_message(admin_channel, &alert).await {
                warn!(error = %e, "admin alert delivery failed");
            }
        }
    }

    fn in_backoff(&self, feed_id: &str) -> bool {
        self.errors
            .get(feed_id)
            .and_then(|state| state.backoff_until)
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    fn record_feed_error(&self, feed_id: &str) {
        let mut state = self.errors.entry(feed_id.to_string()).or_default();
        state.consecutive += 1;
        if state.consecutive >= self.backoff_threshold {
            let doublings = state.consecutive - self.backoff_threshold;
            let backoff = self
                .backoff_base
                .saturating_mul(2u32.saturating_pow(doublings))
                .min(self.backoff_max);
            let backoff = with_jitter(backoff);
            state.backoff_until = Some(Instant::now() + backoff);
            debug!(feed_id, consecutive = state.consecutive, ?backoff, "feed entering backoff");
        }
    }

    fn clear_feed_error(&self, feed_id: &str) {
        self.errors.remove(feed_id);
    }
}

/// Apply ±25% jitter so feeds failing together don't retry together.
fn with_jitter(backoff: Duration) -> Duration {
    let base = backoff.as_millis() as u64;
    let jitter_range = base / 4;
    let jitter: i64 = if jitter_range > 0 {
        let random_val = rand::random::<u64>() % (jitter_range.saturating_mul(2).max(1));
        random_val as i64 - jitter_range as i64
    } else {
        0
    };
    Duration::from_millis(base.saturating_add_signed(jitter))
}

/// Split feeds across `k` upstream shards by stable round-robin.
fn partition(feeds: Vec<FeedDbModel>, k: usize) -> Vec<Vec<FeedDbModel>> {
    let k = k.max(1);
    let mut partitions: Vec<Vec<FeedDbModel>> = (0..k).map(|_| Vec::new()).collect();
    for (i, feed) in feeds.into_iter().enumerate() {
        partitions[i % k].push(feed);
    }
    partitions
}
