//! Integration tests for the polling engine.
//!
//! These run the real checker/delivery stack against an in-memory SQLite
//! database, with scripted adapters and a recording destination client.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use feedrelay::adapters::{
    AdapterRegistry, FeedAdapter, FeedItem, FetchError, FetchResult, ResolvedIdentity, StreamPhase,
    StreamState,
};
use feedrelay::config::{CooldownSpec, EngineConfig};
use feedrelay::database::models::{FeedDbModel, ScheduledEventDbModel, TargetDbModel};
use feedrelay::database::repositories::{
    FeatureRepository, FeedRepository, ScheduledEventRepository, SqlxFeatureRepository,
    SqlxFeedRepository, SqlxScheduledEventRepository, SqlxTargetRepository, TargetRepository,
};
use feedrelay::database::{DbPool, init_pool, run_migrations};
use feedrelay::destination::{
    DestinationClient, DestinationError, RoleInfo, ScheduledEventSpec,
};
use feedrelay::domain::{Cursor, FeatureKind, ItemKind, RenderedNotification, Site, TrackedFeed};
use feedrelay::live_events::EventPolicy;
use feedrelay::orchestrator::{SqlxOrchestrator, SqlxTrackerServices};
use feedrelay::tracker::{AlertThrottle, FeedChecker};

/// Helper to create a test database pool with migrations applied.
async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

// ========== Mock destination client ==========

#[derive(Default)]
struct RecordingClient {
    sent: Mutex<Vec<(String, String)>>,
    notices: Mutex<Vec<(String, String)>>,
    missing_channels: Mutex<HashSet<String>>,
    /// Channels that still resolve but reject sends as gone, emulating a
    /// deletion racing the delivery.
    send_gone_channels: Mutex<HashSet<String>>,
    denied_channels: Mutex<HashSet<String>>,
    deleted_roles: Mutex<HashSet<String>>,
    created_events: Mutex<Vec<(String, ScheduledEventSpec)>>,
    updated_events: Mutex<Vec<String>>,
    completed_events: Mutex<Vec<String>>,
    cancelled_events: Mutex<Vec<String>>,
    event_counter: AtomicU64,
}

impl RecordingClient {
    fn sent_containing(&self, needle: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|(_, content)| content.contains(needle))
            .count()
    }

    fn mark_channel_missing(&self, channel_id: &str) {
        self.missing_channels.lock().insert(channel_id.to_string());
    }

    fn mark_send_gone(&self, channel_id: &str) {
        self.send_gone_channels
            .lock()
            .insert(channel_id.to_string());
    }

    fn mark_channel_denied(&self, channel_id: &str) {
        self.denied_channels.lock().insert(channel_id.to_string());
    }

    fn mark_role_deleted(&self, role_id: &str) {
        self.deleted_roles.lock().insert(role_id.to_string());
    }
}

#[async_trait]
impl DestinationClient for RecordingClient {
    async fn channel_exists(&self, channel_id: &str) -> Result<bool, DestinationError> {
        Ok(!self.missing_channels.lock().contains(channel_id))
    }

    async fn send_message(
        &self,
        channel_id: &str,
        message: &RenderedNotification,
    ) -> Result<(), DestinationError> {
        if self.missing_channels.lock().contains(channel_id)
            || self.send_gone_channels.lock().contains(channel_id)
        {
            return Err(DestinationError::ChannelGone);
        }
        if self.denied_channels.lock().contains(channel_id) {
            return Err(DestinationError::PermissionDenied);
        }
        self.sent
            .lock()
            .push((channel_id.to_string(), message.content.clone()));
        Ok(())
    }

    async fn notify_owner(&self, channel_id: &str, text: &str) -> Result<(), DestinationError> {
        self.notices
            .lock()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn resolve_role(
        &self,
        _guild_id: &str,
        role_id: &str,
    ) -> Result<Option<RoleInfo>, DestinationError> {
        if self.deleted_roles.lock().contains(role_id) {
            return Ok(None);
        }
        Ok(Some(RoleInfo {
            id: role_id.to_string(),
            name: "role".to_string(),
        }))
    }

    async fn create_scheduled_event(
        &self,
        guild_id: &str,
        spec: &ScheduledEventSpec,
    ) -> Result<String, DestinationError> {
        if self.denied_channels.lock().contains(guild_id) {
            return Err(DestinationError::PermissionDenied);
        }
        let id = format!("ev-{}", self.event_counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.created_events
            .lock()
            .push((id.clone(), spec.clone()));
        Ok(id)
    }

    async fn update_scheduled_event(
        &self,
        _guild_id: &str,
        event_id: &str,
        _spec: &ScheduledEventSpec,
    ) -> Result<(), DestinationError> {
        self.updated_events.lock().push(event_id.to_string());
        Ok(())
    }

    async fn complete_scheduled_event(
        &self,
        _guild_id: &str,
        event_id: &str,
    ) -> Result<(), DestinationError> {
        self.completed_events.lock().push(event_id.to_string());
        Ok(())
    }

    async fn cancel_scheduled_event(
        &self,
        _guild_id: &str,
        event_id: &str,
    ) -> Result<(), DestinationError> {
        self.cancelled_events.lock().push(event_id.to_string());
        Ok(())
    }
}

// ========== Scripted adapter ==========

struct ScriptedAdapter {
    site: Site,
    responses: Mutex<VecDeque<Result<FetchResult, FetchError>>>,
}

impl ScriptedAdapter {
    fn new(site: Site) -> Self {
        Self {
            site,
            responses: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, response: Result<FetchResult, FetchError>) {
        self.responses.lock().push_back(response);
    }
}

#[async_trait]
impl FeedAdapter for ScriptedAdapter {
    fn site(&self) -> Site {
        self.site
    }

    async fn fetch_since(
        &self,
        _feed: &TrackedFeed,
        _cursor: Option<&Cursor>,
    ) -> Result<FetchResult, FetchError> {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(FetchResult::default()))
    }
}

// ========== Fixtures ==========

fn post_item(id: u64, timestamp: DateTime<Utc>) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        ordinal: Some(id),
        timestamp,
        kind: ItemKind::Post,
        title: format!("post {id}"),
        url: Some(format!("https://example.com/{id}")),
        stream: None,
    }
}

fn stream_item(id: u64, phase: StreamPhase, timestamp: DateTime<Utc>) -> FeedItem {
    let kind = match phase {
        StreamPhase::Upcoming => ItemKind::StreamUpcoming,
        StreamPhase::Live => ItemKind::StreamLive,
        StreamPhase::Ended => ItemKind::StreamEnded,
    };
    FeedItem {
        id: id.to_string(),
        ordinal: Some(id),
        timestamp,
        kind,
        title: format!("stream {id}"),
        url: Some(format!("https://example.com/live/{id}")),
        stream: Some(StreamState {
            phase,
            scheduled_start: None,
            sub_item_id: None,
        }),
    }
}

fn items_result(items: Vec<FeedItem>) -> FetchResult {
    FetchResult {
        identity: None,
        items,
        snapshot: None,
    }
}

async fn insert_feed(pool: &DbPool, id: &str, site: Site, cursor: Option<&str>) {
    let repo = SqlxFeedRepository::new(pool.clone());
    let now = Utc::now().to_rfc3339();
    repo.create_feed(&FeedDbModel {
        id: id.to_string(),
        site: site.as_str().to_string(),
        account_id: format!("acct-{id}"),
        display_name: Some(format!("name-{id}")),
        cursor: cursor.map(|c| c.to_string()),
        enabled: true,
        created_at: now.clone(),
        updated_at: now,
    })
    .await
    .expect("Failed to insert feed");
}

async fn insert_target(pool: &DbPool, id: &str, feed_id: &str, channel_id: &str) {
    insert_target_with_mention(pool, id, feed_id, channel_id, None, None).await;
}

async fn insert_target_with_mention(
    pool: &DbPool,
    id: &str,
    feed_id: &str,
    channel_id: &str,
    mention_role_id: Option<&str>,
    mention_text: Option<&str>,
) {
    let repo = SqlxTargetRepository::new(pool.clone());
    repo.create_target(&TargetDbModel {
        id: id.to_string(),
        feed_id: feed_id.to_string(),
        client_id: "client-1".to_string(),
        channel_id: channel_id.to_string(),
        guild_id: Some("guild-1".to_string()),
        subscriber_id: "user-1".to_string(),
        mention_role_id: mention_role_id.map(|s| s.to_string()),
        alt_mention_role_id: None,
        mention_text: mention_text.map(|s| s.to_string()),
        mention_color: None,
        created_at: Utc::now().to_rfc3339(),
    })
    .await
    .expect("Failed to insert target");
}

struct Harness {
    pool: DbPool,
    client: Arc<RecordingClient>,
    services: Arc<SqlxTrackerServices>,
    config: EngineConfig,
}

async fn setup_harness() -> Harness {
    let pool = setup_test_db().await;
    let client = Arc::new(RecordingClient::default());
    let config = EngineConfig::default();
    let services = Arc::new(SqlxTrackerServices::from_pool(
        pool.clone(),
        client.clone(),
        &config,
        EventPolicy::default(),
    ));
    Harness {
        pool,
        client,
        services,
        config,
    }
}

impl Harness {
    fn checker(&self, adapter: Arc<ScriptedAdapter>) -> Arc<SqlxChecker> {
        let site = adapter.site();
        Arc::new(FeedChecker::new(
            site,
            adapter,
            CooldownSpec::new(Duration::from_millis(0), Duration::from_secs(60)),
            1,
            self.services.clone(),
            Arc::new(AlertThrottle::new(self.config.alert_cooldown)),
            &self.config,
        ))
    }

    async fn run_cycle(&self, checker: &Arc<SqlxChecker>) {
        Arc::clone(checker)
            .run_cycle(CancellationToken::new())
            .await
            .expect("cycle failed");
    }

    async fn cursor_of(&self, feed_id: &str) -> Option<String> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT cursor FROM tracked_feeds WHERE id = ?")
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await
                .unwrap();
        row.and_then(|r| r.0)
    }

    async fn target_count(&self, feed_id: &str) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM targets WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await
            .unwrap();
        row.0
    }

    async fn feed_exists(&self, feed_id: &str) -> bool {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracked_feeds WHERE id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await
            .unwrap();
        row.0 > 0
    }
}

type SqlxChecker = FeedChecker<
    SqlxFeedRepository,
    SqlxTargetRepository,
    SqlxFeatureRepository,
    SqlxScheduledEventRepository,
>;

// ========== Checker scenarios ==========

mod checker_tests {
    use super::*;

    #[tokio::test]
    async fn test_new_items_delivered_and_cursor_advanced() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, Some("100")).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        let now = Utc::now();
        adapter.push(Ok(items_result(vec![
            post_item(101, now),
            post_item(102, now),
            post_item(103, now),
        ])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert_eq!(h.client.sent.lock().len(), 3);
        assert_eq!(h.cursor_of("feed-1").await.as_deref(), Some("103"));
    }

    #[tokio::test]
    async fn test_items_at_or_behind_cursor_never_delivered() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, Some("100")).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        let now = Utc::now();
        adapter.push(Ok(items_result(vec![
            post_item(99, now),
            post_item(100, now),
        ])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert!(h.client.sent.lock().is_empty());
        // Cursor is untouched: nothing newer was observed.
        assert_eq!(h.cursor_of("feed-1").await.as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn test_stale_items_cursor_advanced_but_not_delivered() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        // Well outside the default 12h freshness window.
        let stale = Utc::now() - chrono::Duration::days(3);
        adapter.push(Ok(items_result(vec![
            post_item(101, stale),
            post_item(102, stale),
        ])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert!(h.client.sent.lock().is_empty());
        assert_eq!(h.cursor_of("feed-1").await.as_deref(), Some("102"));
    }

    #[tokio::test]
    async fn test_overlapping_mirror_polls_deliver_once() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, Some("100")).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;

        let now = Utc::now();
        // Two mirror checkers sharing the same dedup/cursor store.
        let adapter_a = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter_a.push(Ok(items_result(vec![
            post_item(101, now),
            post_item(102, now),
        ])));
        let adapter_b = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter_b.push(Ok(items_result(vec![
            post_item(102, now),
            post_item(103, now),
        ])));

        let checker_a = h.checker(adapter_a);
        let checker_b = h.checker(adapter_b);
        let (a, b) = tokio::join!(
            Arc::clone(&checker_a).run_cycle(CancellationToken::new()),
            Arc::clone(&checker_b).run_cycle(CancellationToken::new()),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(h.client.sent_containing("post 101"), 1);
        assert_eq!(h.client.sent_containing("post 102"), 1);
        assert_eq!(h.client.sent_containing("post 103"), 1);
        assert_eq!(h.cursor_of("feed-1").await.as_deref(), Some("103"));
    }

    #[tokio::test]
    async fn test_cursor_monotonic_across_cycles() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Ok(items_result(vec![post_item(105, now)])));
        // A later poll reporting only older items must not rewind.
        adapter.push(Ok(items_result(vec![post_item(103, now)])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;
        assert_eq!(h.cursor_of("feed-1").await.as_deref(), Some("105"));
        h.run_cycle(&checker).await;
        assert_eq!(h.cursor_of("feed-1").await.as_deref(), Some("105"));
    }

    #[tokio::test]
    async fn test_upstream_not_found_untracks_feed() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Err(FetchError::NotFound));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert!(!h.feed_exists("feed-1").await);
    }

    #[tokio::test]
    async fn test_transient_error_keeps_feed_and_loop_alive() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_feed(&h.pool, "feed-2", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;
        insert_target(&h.pool, "target-2", "feed-2", "chan-2").await;

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        // feed-1 polls first (account ordering) and fails; feed-2 proceeds.
        adapter.push(Err(FetchError::Io("connection reset".to_string())));
        adapter.push(Ok(items_result(vec![post_item(7, now)])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert!(h.feed_exists("feed-1").await);
        assert_eq!(h.client.sent_containing("post 7"), 1);
    }

    #[tokio::test]
    async fn test_display_name_refreshed_from_identity() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Ok(FetchResult {
            identity: Some(ResolvedIdentity {
                account_id: "acct-feed-1".to_string(),
                display_name: "renamed".to_string(),
            }),
            items: vec![],
            snapshot: None,
        }));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        let row: (Option<String>,) =
            sqlx::query_as("SELECT display_name FROM tracked_feeds WHERE id = 'feed-1'")
                .fetch_one(&h.pool)
                .await
                .unwrap();
        assert_eq!(row.0.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn test_snapshot_site_advances_to_snapshot() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::AniList, Some("hash-a")).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::AniList));
        let mut item = post_item(1, now);
        item.ordinal = None;
        item.id = "entry-1".to_string();
        adapter.push(Ok(FetchResult {
            identity: None,
            items: vec![item],
            snapshot: Some("hash-b".to_string()),
        }));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert_eq!(h.client.sent.lock().len(), 1);
        assert_eq!(h.cursor_of("feed-1").await.as_deref(), Some("hash-b"));
    }
}

// ========== Delivery failure handling ==========

mod delivery_tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_gone_deletes_exactly_one_target() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-dead").await;
        insert_target(&h.pool, "target-2", "feed-1", "chan-ok").await;

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Ok(items_result(vec![post_item(1, now)])));

        let checker = h.checker(adapter.clone());
        // The channel dies between target resolution and delivery, so the
        // send itself reports it gone.
        h.client.mark_send_gone("chan-dead");
        h.run_cycle(&checker).await;

        assert_eq!(h.target_count("feed-1").await, 1);
        // The healthy sibling still got its delivery.
        assert_eq!(h.client.sent_containing("post 1"), 1);

        // Next cycle: no further attempts at the dead target.
        adapter.push(Ok(items_result(vec![post_item(2, now)])));
        h.run_cycle(&checker).await;
        assert_eq!(h.client.sent_containing("post 2"), 1);
        assert_eq!(h.target_count("feed-1").await, 1);
    }

    #[tokio::test]
    async fn test_permission_denied_disables_feature_once_and_keeps_target() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;
        h.client.mark_channel_denied("chan-1");

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Ok(items_result(vec![post_item(1, now)])));
        adapter.push(Ok(items_result(vec![post_item(2, now)])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;
        h.run_cycle(&checker).await;

        // Flag flipped once; one explanatory notice; target retained.
        let features = SqlxFeatureRepository::new(h.pool.clone())
            .get_features("chan-1")
            .await
            .unwrap();
        assert!(!features.notify_posts);
        assert_eq!(h.client.notices.lock().len(), 1);
        assert_eq!(h.target_count("feed-1").await, 1);
    }

    #[tokio::test]
    async fn test_externally_deleted_channel_removes_target_lazily() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-gone").await;
        insert_target(&h.pool, "target-2", "feed-1", "chan-ok").await;
        h.client.mark_channel_missing("chan-gone");

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Ok(items_result(vec![])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert_eq!(h.target_count("feed-1").await, 1);
        assert!(h.feed_exists("feed-1").await);
    }

    #[tokio::test]
    async fn test_last_target_gone_untracks_feed() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-gone").await;
        h.client.mark_channel_missing("chan-gone");

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Ok(items_result(vec![])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert!(!h.feed_exists("feed-1").await);
    }

    #[tokio::test]
    async fn test_deleted_mention_role_self_heals() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target_with_mention(
            &h.pool,
            "target-1",
            "feed-1",
            "chan-1",
            Some("role-dead"),
            Some("heads up"),
        )
        .await;
        h.client.mark_role_deleted("role-dead");

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Ok(items_result(vec![post_item(1, now)])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        // Delivered with the free-text annotation but without the role ping.
        let sent = h.client.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("heads up"));
        assert!(!sent[0].1.contains("role-dead"));
        drop(sent);

        // The dangling role reference was cleared in storage.
        let row: (Option<String>, Option<String>) = sqlx::query_as(
            "SELECT mention_role_id, mention_text FROM targets WHERE id = 'target-1'",
        )
        .fetch_one(&h.pool)
        .await
        .unwrap();
        assert_eq!(row.0, None);
        assert_eq!(row.1.as_deref(), Some("heads up"));
    }

    #[tokio::test]
    async fn test_disabled_category_not_delivered() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitter, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;
        SqlxFeatureRepository::new(h.pool.clone())
            .set_feature("chan-1", FeatureKind::Posts, false)
            .await
            .unwrap();

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitter));
        adapter.push(Ok(items_result(vec![post_item(1, now)])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert!(h.client.sent.lock().is_empty());
        // The cursor still advances past the filtered item.
        assert_eq!(h.cursor_of("feed-1").await.as_deref(), Some("1"));
    }
}

// ========== Event lifecycle ==========

mod event_tests {
    use super::*;

    async fn enable_live_events(pool: &DbPool, channel_id: &str) {
        SqlxFeatureRepository::new(pool.clone())
            .set_feature(channel_id, FeatureKind::LiveEvents, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_live_stream_creates_event() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitch, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;
        enable_live_events(&h.pool, "chan-1").await;

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitch));
        adapter.push(Ok(items_result(vec![stream_item(
            1,
            StreamPhase::Live,
            now,
        )])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert_eq!(h.client.created_events.lock().len(), 1);
        let record = SqlxScheduledEventRepository::new(h.pool.clone())
            .get_by_key("guild-1", "feed-1", None)
            .await
            .unwrap()
            .expect("event record missing");
        assert_eq!(record.status, "LIVE");
    }

    #[tokio::test]
    async fn test_far_future_stream_is_ignored_as_placeholder() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::YouTube, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;
        enable_live_events(&h.pool, "chan-1").await;

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::YouTube));
        let mut item = stream_item(1, StreamPhase::Upcoming, now);
        item.ordinal = None;
        // "Free chat" placeholder months out.
        item.stream.as_mut().unwrap().scheduled_start = Some(now + chrono::Duration::days(90));
        adapter.push(Ok(FetchResult {
            identity: None,
            items: vec![item],
            snapshot: Some("s1".to_string()),
        }));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert!(h.client.created_events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stream_end_completes_event_with_future_end_time() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitch, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;
        enable_live_events(&h.pool, "chan-1").await;

        let now = Utc::now();
        let event_repo = SqlxScheduledEventRepository::new(h.pool.clone());
        event_repo
            .create_event(&ScheduledEventDbModel {
                id: "rec-1".to_string(),
                guild_id: "guild-1".to_string(),
                feed_id: "feed-1".to_string(),
                sub_item_id: None,
                external_event_id: "ev-live".to_string(),
                title: "stream".to_string(),
                start_time: (now - chrono::Duration::hours(1)).to_rfc3339(),
                // Scheduled end 2 hours out: must be completed, not expired.
                end_time: (now + chrono::Duration::hours(2)).to_rfc3339(),
                status: "LIVE".to_string(),
                updated_at: now.to_rfc3339(),
            })
            .await
            .unwrap();

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitch));
        adapter.push(Ok(items_result(vec![stream_item(
            2,
            StreamPhase::Ended,
            now,
        )])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert_eq!(
            h.client.completed_events.lock().clone(),
            vec!["ev-live".to_string()]
        );
        let record = event_repo.get_by_key("guild-1", "feed-1", None).await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_live_event_end_time_extended_near_expiry() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitch, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;
        enable_live_events(&h.pool, "chan-1").await;

        let now = Utc::now();
        let event_repo = SqlxScheduledEventRepository::new(h.pool.clone());
        event_repo
            .create_event(&ScheduledEventDbModel {
                id: "rec-1".to_string(),
                guild_id: "guild-1".to_string(),
                feed_id: "feed-1".to_string(),
                sub_item_id: None,
                external_event_id: "ev-live".to_string(),
                title: "stream 3".to_string(),
                start_time: (now - chrono::Duration::hours(2)).to_rfc3339(),
                // About to expire: inside the refresh threshold.
                end_time: (now + chrono::Duration::minutes(3)).to_rfc3339(),
                status: "LIVE".to_string(),
                updated_at: now.to_rfc3339(),
            })
            .await
            .unwrap();

        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitch));
        adapter.push(Ok(items_result(vec![stream_item(
            3,
            StreamPhase::Live,
            now,
        )])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        assert_eq!(
            h.client.updated_events.lock().clone(),
            vec!["ev-live".to_string()]
        );
        let record = event_repo
            .get_by_key("guild-1", "feed-1", None)
            .await
            .unwrap()
            .expect("record should remain while live");
        let new_end = chrono::DateTime::parse_from_rfc3339(&record.end_time).unwrap();
        assert!(new_end.with_timezone(&Utc) > now + chrono::Duration::minutes(20));
    }

    #[tokio::test]
    async fn test_event_permission_loss_disables_live_events_feature() {
        let h = setup_harness().await;
        insert_feed(&h.pool, "feed-1", Site::Twitch, None).await;
        insert_target(&h.pool, "target-1", "feed-1", "chan-1").await;
        enable_live_events(&h.pool, "chan-1").await;
        // Event creation is denied at the guild level.
        h.client.mark_channel_denied("guild-1");

        let now = Utc::now();
        let adapter = Arc::new(ScriptedAdapter::new(Site::Twitch));
        adapter.push(Ok(items_result(vec![stream_item(
            1,
            StreamPhase::Live,
            now,
        )])));

        let checker = h.checker(adapter);
        h.run_cycle(&checker).await;

        let features = SqlxFeatureRepository::new(h.pool.clone())
            .get_features("chan-1")
            .await
            .unwrap();
        assert!(!features.live_events);
        assert_eq!(h.client.notices.lock().len(), 1);
    }
}

// ========== Orchestrator ==========

mod orchestrator_tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_is_idempotent_and_fails_loudly() {
        let pool = setup_test_db().await;
        let client: Arc<dyn DestinationClient> = Arc::new(RecordingClient::default());

        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(ScriptedAdapter::new(Site::Twitter)));

        let orchestrator =
            SqlxOrchestrator::with_pool(pool, registry, client, EngineConfig::default());
        assert!(!orchestrator.is_launched());
        orchestrator.launch().expect("first launch should succeed");
        assert!(orchestrator.is_launched());

        let second = orchestrator.launch();
        assert!(second.is_err());

        orchestrator.shutdown();
        orchestrator.join().await;
    }

    #[tokio::test]
    async fn test_launch_with_no_adapters_is_a_noop() {
        let pool = setup_test_db().await;
        let client: Arc<dyn DestinationClient> = Arc::new(RecordingClient::default());

        let orchestrator = SqlxOrchestrator::with_pool(
            pool,
            AdapterRegistry::new(),
            client,
            EngineConfig::default(),
        );
        orchestrator.launch().expect("empty launch should succeed");
        orchestrator.shutdown();
        orchestrator.join().await;
    }
}
