//! Scheduled event lifecycle manager.
//!
//! One record per (guild, feed[, sub-item]) follows
//! `NONE → SCHEDULED → LIVE → {COMPLETED | CANCELLED}`. Transitions are
//! driven by the stream state observed on each poll; terminal transitions
//! delete the record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::adapters::{FeedItem, StreamPhase, StreamState};
use crate::database::models::ScheduledEventDbModel;
use crate::database::repositories::{FeatureRepository, ScheduledEventRepository};
use crate::destination::{DestinationClient, DestinationError, ScheduledEventSpec};
use crate::domain::{EventStatus, FeatureKind, Target, TrackedFeed};
use crate::{Error, Result};

/// Timing policy for mirrored scheduled events.
#[derive(Debug, Clone, Copy)]
pub struct EventPolicy {
    /// Streams scheduled further out than this are treated as placeholders
    /// ("free chat" slots) and never mirrored.
    pub max_lookahead: Duration,
    /// Lead time applied when a stream is already live or has no reported
    /// start.
    pub min_lead: Duration,
    /// Initial duration estimate for a mirrored event.
    pub default_duration: Duration,
    /// While live, extend the event when less than this remains.
    pub refresh_threshold: Duration,
    /// Fixed increment applied when extending a live event.
    pub extend_by: Duration,
    /// On stream end, events ending within this window are left to expire
    /// naturally instead of being completed through the API.
    pub end_grace: Duration,
}

impl Default for EventPolicy {
    fn default() -> Self {
        Self {
            max_lookahead: Duration::from_secs(24 * 3600),
            min_lead: Duration::from_secs(2 * 60),
            default_duration: Duration::from_secs(2 * 3600),
            refresh_threshold: Duration::from_secs(10 * 60),
            extend_by: Duration::from_secs(30 * 60),
            end_grace: Duration::from_secs(5 * 60),
        }
    }
}

/// Maps observed stream state onto scheduled-event operations.
pub struct EventLifecycleManager<ER, CF> {
    event_repo: Arc<ER>,
    feature_repo: Arc<CF>,
    client: Arc<dyn DestinationClient>,
    policy: EventPolicy,
}

impl<ER, CF> EventLifecycleManager<ER, CF>
where
    ER: ScheduledEventRepository,
    CF: FeatureRepository,
{
    pub fn new(
        event_repo: Arc<ER>,
        feature_repo: Arc<CF>,
        client: Arc<dyn DestinationClient>,
        policy: EventPolicy,
    ) -> Self {
        Self {
            event_repo,
            feature_repo,
            client,
            policy,
        }
    }

    /// Sync one stream-status item into every eligible guild.
    ///
    /// Failures are isolated per guild; a failed sync is retried on the
    /// feed's next natural poll.
    pub async fn sync(
        &self,
        feed: &TrackedFeed,
        item: &FeedItem,
        targets: &[Target],
    ) -> Result<()> {
        let Some(stream) = &item.stream else {
            return Ok(());
        };

        for target in targets {
            let Some(guild_id) = &target.guild_id else {
                continue;
            };
            let features = match self.feature_repo.get_features(&target.channel_id).await {
                Ok(features) => features,
                Err(e) => {
                    warn!(channel_id = %target.channel_id, error = %e, "feature lookup failed");
                    continue;
                }
            };
            if !features.live_events {
                continue;
            }

            if let Err(e) = self
                .sync_guild(guild_id, &target.channel_id, feed, item, stream)
                .await
            {
                warn!(
                    guild_id = %guild_id,
                    feed_id = %feed.id,
                    error = %e,
                    "scheduled event sync failed, retrying next poll"
                );
            }
        }

        Ok(())
    }

    /// Validate a status transition for a persisted record.
    fn transition(record: &ScheduledEventDbModel, to: EventStatus) -> Result<EventStatus> {
        EventStatus::parse(&record.status)
            .unwrap_or(EventStatus::Scheduled)
            .transition_to(to)
    }

    async fn sync_guild(
        &self,
        guild_id: &str,
        channel_id: &str,
        feed: &TrackedFeed,
        item: &FeedItem,
        stream: &StreamState,
    ) -> Result<()> {
        let record = self
            .event_repo
            .get_by_key(guild_id, &feed.id, stream.sub_item_id.as_deref())
            .await?;
        let now = Utc::now();

        match (record, stream.phase) {
            (None, StreamPhase::Upcoming | StreamPhase::Live) => {
                self.create(guild_id, channel_id, feed, item, stream, now)
                    .await
            }
            // Nothing to complete.
            (None, StreamPhase::Ended) => Ok(()),
            (Some(record), StreamPhase::Upcoming) => {
                self.update_upcoming(guild_id, &record, item, stream, now)
                    .await
            }
            (Some(record), StreamPhase::Live) => {
                self.extend_live(guild_id, &record, item, now).await
            }
            (Some(record), StreamPhase::Ended) => self.complete(guild_id, &record, now).await,
        }
    }

    /// NONE → SCHEDULED (or directly LIVE).
    async fn create(
        &self,
        guild_id: &str,
        channel_id: &str,
        feed: &TrackedFeed,
        item: &FeedItem,
        stream: &StreamState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let start = match stream.scheduled_start {
            Some(start) if start > now => start,
            _ => now + to_chrono(self.policy.min_lead),
        };
        if start > now + to_chrono(self.policy.max_lookahead) {
            debug!(
                feed_id = %feed.id,
                %start,
                "scheduled start beyond look-ahead, treating as placeholder"
            );
            return Ok(());
        }
        let end = start + to_chrono(self.policy.default_duration);

        let spec = ScheduledEventSpec {
            title: item.title.clone(),
            start_time: start,
            end_time: end,
            location_url: item.url.clone(),
        };

        match self.client.create_scheduled_event(guild_id, &spec).await {
            Ok(external_id) => {
                let status = match stream.phase {
                    StreamPhase::Live => EventStatus::Live,
                    _ => EventStatus::Scheduled,
                };
                let record = ScheduledEventDbModel {
                    id: uuid::Uuid::new_v4().to_string(),
                    guild_id: guild_id.to_string(),
                    feed_id: feed.id.clone(),
                    sub_item_id: stream.sub_item_id.clone(),
                    external_event_id: external_id,
                    title: item.title.clone(),
                    start_time: start.to_rfc3339(),
                    end_time: end.to_rfc3339(),
                    status: status.as_str().to_string(),
                    updated_at: now.to_rfc3339(),
                };
                self.event_repo.create_event(&record).await?;
                info!(
                    guild_id = %guild_id,
                    feed = %feed.name(),
                    status = %status,
                    "scheduled event created"
                );
                Ok(())
            }
            Err(DestinationError::PermissionDenied) => {
                let flipped = self
                    .feature_repo
                    .disable_feature(channel_id, FeatureKind::LiveEvents)
                    .await?;
                if flipped {
                    warn!(channel_id, "missing event permission, live events disabled");
                    let text = format!(
                        "I lack the Manage Events permission for this server, so live \
                         event mirroring for <#{channel_id}> has been disabled. Once the \
                         permission is restored, re-enable it with `/feature events enable`."
                    );
                    if let Err(e) = self.client.notify_owner(channel_id, &text).await {
                        debug!(channel_id, error = %e, "owner notice failed");
                    }
                }
                Ok(())
            }
            Err(e) => Err(Error::transient(e.to_string())),
        }
    }

    /// SCHEDULED → SCHEDULED: follow title/start changes; cancel records
    /// whose start drifted past the look-ahead bound.
    async fn update_upcoming(
        &self,
        guild_id: &str,
        record: &ScheduledEventDbModel,
        item: &FeedItem,
        stream: &StreamState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let recorded_start = parse_time(&record.start_time);
        let reported_start = stream.scheduled_start.unwrap_or(recorded_start);

        if reported_start > now + to_chrono(self.policy.max_lookahead) {
            info!(
                guild_id = %guild_id,
                feed_id = %record.feed_id,
                "start drifted past look-ahead, cancelling placeholder event"
            );
            let status = Self::transition(record, EventStatus::Cancelled)?;
            self.client
                .cancel_scheduled_event(guild_id, &record.external_event_id)
                .await
                .map_err(|e| Error::transient(e.to_string()))?;
            if status.is_terminal() {
                self.event_repo.delete_event(&record.id).await?;
            }
            return Ok(());
        }

        let title_changed = !item.title.is_empty() && item.title != record.title;
        let start_changed = reported_start != recorded_start;
        if !title_changed && !start_changed {
            return Ok(());
        }

        let title = if title_changed {
            item.title.clone()
        } else {
            record.title.clone()
        };
        let end = reported_start + to_chrono(self.policy.default_duration);
        let spec = ScheduledEventSpec {
            title: title.clone(),
            start_time: reported_start,
            end_time: end,
            location_url: item.url.clone(),
        };
        self.client
            .update_scheduled_event(guild_id, &record.external_event_id, &spec)
            .await
            .map_err(|e| Error::transient(e.to_string()))?;
        self.event_repo
            .update_event(
                &record.id,
                &title,
                &reported_start.to_rfc3339(),
                &end.to_rfc3339(),
                &record.status,
            )
            .await?;
        debug!(guild_id = %guild_id, feed_id = %record.feed_id, "upcoming event updated");
        Ok(())
    }

    /// SCHEDULED/LIVE → LIVE: mark live and keep the end time ahead of now.
    async fn extend_live(
        &self,
        guild_id: &str,
        record: &ScheduledEventDbModel,
        item: &FeedItem,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut changed = false;

        let current = EventStatus::parse(&record.status).unwrap_or(EventStatus::Scheduled);
        let status = current.transition_to(EventStatus::Live)?;
        if status != current {
            changed = true;
        }

        let title = if !item.title.is_empty() && item.title != record.title {
            changed = true;
            item.title.clone()
        } else {
            record.title.clone()
        };

        let mut end = parse_time(&record.end_time);
        if end.signed_duration_since(now) < to_chrono(self.policy.refresh_threshold) {
            end = end.max(now) + to_chrono(self.policy.extend_by);
            changed = true;
        }

        if !changed {
            return Ok(());
        }

        let spec = ScheduledEventSpec {
            title: title.clone(),
            start_time: parse_time(&record.start_time),
            end_time: end,
            location_url: item.url.clone(),
        };
        self.client
            .update_scheduled_event(guild_id, &record.external_event_id, &spec)
            .await
            .map_err(|e| Error::transient(e.to_string()))?;
        self.event_repo
            .update_event(
                &record.id,
                &title,
                &record.start_time,
                &end.to_rfc3339(),
                status.as_str(),
            )
            .await?;
        debug!(guild_id = %guild_id, feed_id = %record.feed_id, %end, "live event extended");
        Ok(())
    }

    /// LIVE → COMPLETED. Events already ending within the grace period are
    /// left to expire naturally, skipping a redundant API call.
    async fn complete(
        &self,
        guild_id: &str,
        record: &ScheduledEventDbModel,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let status = Self::transition(record, EventStatus::Completed)?;
        let end = parse_time(&record.end_time);
        if end > now + to_chrono(self.policy.end_grace) {
            self.client
                .complete_scheduled_event(guild_id, &record.external_event_id)
                .await
                .map_err(|e| Error::transient(e.to_string()))?;
        }
        if status.is_terminal() {
            self.event_repo.delete_event(&record.id).await?;
        }
        info!(guild_id = %guild_id, feed_id = %record.feed_id, "scheduled event completed");
        Ok(())
    }

    /// Any → CANCELLED: administrative cleanup for a tracked record.
    pub async fn cancel(&self, record: &ScheduledEventDbModel) -> Result<()> {
        let status = Self::transition(record, EventStatus::Cancelled)?;
        self.client
            .cancel_scheduled_event(&record.guild_id, &record.external_event_id)
            .await
            .map_err(|e| Error::transient(e.to_string()))?;
        if status.is_terminal() {
            self.event_repo.delete_event(&record.id).await?;
        }
        info!(
            guild_id = %record.guild_id,
            feed_id = %record.feed_id,
            "scheduled event cancelled"
        );
        Ok(())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::MAX)
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
