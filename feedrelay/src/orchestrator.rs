//! Engine orchestrator.
//!
//! Launches one supervised checking loop per service with a registered
//! adapter. Services are fully isolated: a crash or stall in one checker
//! never affects another.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Result;
use crate::adapters::AdapterRegistry;
use crate::config::EngineConfig;
use crate::database::repositories::{
    FeatureRepository, FeedRepository, ScheduledEventRepository, SqlxFeatureRepository,
    SqlxFeedRepository, SqlxScheduledEventRepository, SqlxTargetRepository, TargetRepository,
};
use crate::destination::DestinationClient;
use crate::live_events::{EventLifecycleManager, EventPolicy};
use crate::tracker::dedup::SeenCacheConfig;
use crate::tracker::{
    AlertThrottle, DedupCursorStore, DeliveryPipeline, FeedChecker, MentionResolver,
    TargetResolver, TrackerServices,
};

/// Delay before restarting a panicked checker.
const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Tracker services wired to the SQLx repositories.
pub type SqlxTrackerServices = TrackerServices<
    SqlxFeedRepository,
    SqlxTargetRepository,
    SqlxFeatureRepository,
    SqlxScheduledEventRepository,
>;

/// Orchestrator wired to the SQLx repositories.
pub type SqlxOrchestrator = Orchestrator<
    SqlxFeedRepository,
    SqlxTargetRepository,
    SqlxFeatureRepository,
    SqlxScheduledEventRepository,
>;

impl SqlxTrackerServices {
    /// Wire the full component stack onto a database pool.
    pub fn from_pool(
        pool: SqlitePool,
        client: Arc<dyn DestinationClient>,
        config: &EngineConfig,
        policy: EventPolicy,
    ) -> Self {
        let feed_repo = Arc::new(SqlxFeedRepository::new(pool.clone()));
        let target_repo = Arc::new(SqlxTargetRepository::new(pool.clone()));
        let feature_repo = Arc::new(SqlxFeatureRepository::new(pool.clone()));
        let event_repo = Arc::new(SqlxScheduledEventRepository::new(pool));

        let store = Arc::new(DedupCursorStore::new(
            feed_repo.clone(),
            SeenCacheConfig {
                horizon: config.dedup_horizon,
                max_entries_per_feed: config.dedup_max_entries,
            },
            config.freshness_window,
        ));
        let targets = Arc::new(TargetResolver::new(
            feed_repo.clone(),
            target_repo.clone(),
            client.clone(),
        ));
        let mentions = Arc::new(MentionResolver::new(target_repo.clone(), client.clone()));
        let delivery = Arc::new(DeliveryPipeline::new(
            target_repo,
            feature_repo.clone(),
            client.clone(),
        ));
        let events = Arc::new(EventLifecycleManager::new(
            event_repo,
            feature_repo.clone(),
            client.clone(),
            policy,
        ));

        Self {
            feed_repo,
            store,
            targets,
            mentions,
            delivery,
            feature_repo,
            events,
            client,
        }
    }
}

/// Launches and supervises the per-service checking loops.
pub struct Orchestrator<FR, TR, CF, ER> {
    registry: AdapterRegistry,
    services: Arc<TrackerServices<FR, TR, CF, ER>>,
    config: EngineConfig,
    alerts: Arc<AlertThrottle>,
    cancel: CancellationToken,
    launched: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<FR, TR, CF, ER> Orchestrator<FR, TR, CF, ER>
where
    FR: FeedRepository + 'static,
    TR: TargetRepository + 'static,
    CF: FeatureRepository + 'static,
    ER: ScheduledEventRepository + 'static,
{
    pub fn new(
        registry: AdapterRegistry,
        services: Arc<TrackerServices<FR, TR, CF, ER>>,
        config: EngineConfig,
    ) -> Self {
        let alerts = Arc::new(AlertThrottle::new(config.alert_cooldown));
        Self {
            registry,
            services,
            config,
            alerts,
            cancel: CancellationToken::new(),
            launched: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Launch one supervised checker per registered adapter.
    ///
    /// Idempotence is enforced loudly: a second call is an error.
    pub fn launch(&self) -> Result<()> {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Err(crate::Error::validation("orchestrator already launched"));
        }

        let sites = self.registry.sites();
        if sites.is_empty() {
            warn!("no service adapters registered, nothing to launch");
            return Ok(());
        }

        let mut tasks = self.tasks.lock();
        for site in sites {
            let Some(adapter) = self.registry.get(site) else {
                continue;
            };
            let checker = Arc::new(FeedChecker::new(
                site,
                adapter,
                self.config.cooldown_for(site),
                self.config.partitions_for(site),
                self.services.clone(),
                self.alerts.clone(),
                &self.config,
            ));
            let cancel = self.cancel.clone();
            tasks.push(tokio::spawn(Self::supervise(checker, cancel)));
        }

        info!("launched {} feed checkers", tasks.len());
        Ok(())
    }

    /// Keep one checker running, restarting it after a panic.
    async fn supervise(checker: Arc<FeedChecker<FR, TR, CF, ER>>, cancel: CancellationToken) {
        loop {
            let run = tokio::spawn(Arc::clone(&checker).run(cancel.clone()));
            match run.await {
                Ok(()) => break,
                Err(e) if e.is_panic() => {
                    error!(site = %checker.site(), "feed checker panicked, restarting");
                }
                Err(_) => break,
            }
            if cancel.is_cancelled() {
                break;
            }
            tokio::time::sleep(RESTART_DELAY).await;
        }
    }

    pub fn is_launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }

    /// Signal every checker to stop after its current cycle step.
    pub fn shutdown(&self) {
        info!("shutting down feed checkers");
        self.cancel.cancel();
    }

    /// Wait for all checker tasks to finish after `shutdown`.
    pub async fn join(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl SqlxOrchestrator {
    /// Build a fully wired orchestrator on a database pool.
    pub fn with_pool(
        pool: SqlitePool,
        registry: AdapterRegistry,
        client: Arc<dyn DestinationClient>,
        config: EngineConfig,
    ) -> Self {
        let services = Arc::new(SqlxTrackerServices::from_pool(
            pool,
            client,
            &config,
            EventPolicy::default(),
        ));
        Self::new(registry, services, config)
    }
}
