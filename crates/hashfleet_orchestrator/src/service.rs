//! Orchestrator wiring.
//!
//! Builds every component over one pool and owns the periodic activities:
//! the reconcile-and-dispatch loop, the offline sweep, agent-hashlist
//! cleanup, and progress pruning. Shutdown is a watch channel signaled once;
//! further signals are no-ops.

use anyhow::Result;
use hashfleet_db::{
    AgentHashlistRepo, AgentRepo, BenchmarkRepo, BinaryRepo, DbPool, FileResourceRepo,
    HashlistRepo, JobLayerRepo, JobRepo, OfflineBufferRepo, PresetJobRepo, SettingsRepo, TaskRepo,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::benchmark::BenchmarkStore;
use crate::binaries::BinaryResolver;
use crate::completion::HashlistCompletion;
use crate::config::OrchestratorConfig;
use crate::dispatcher::TaskDispatcher;
use crate::evaluation::JobEvaluator;
use crate::hashlist_sync::HashlistSync;
use crate::increment::IncrementLayerBuilder;
use crate::keyspace::KeyspaceCalculator;
use crate::lifecycle::TaskLifecycle;
use crate::notify::NotificationBus;
use crate::offline::AgentOfflineMonitor;
use crate::planner::ChunkPlanner;
use crate::presets::PresetJobService;
use crate::progress::{HashlistDeletionService, HashlistIngestService};
use crate::reconciler::JobReconciler;
use crate::rule_split::RuleSplitManager;
use crate::scheduler::AgentScheduler;
use crate::settings::SystemSettings;
use crate::transport::AgentTransport;

/// The assembled orchestrator core.
pub struct Orchestrator {
    config: OrchestratorConfig,
    scheduler: AgentScheduler,
    planner: ChunkPlanner,
    dispatcher: TaskDispatcher,
    lifecycle: TaskLifecycle,
    reconciler: JobReconciler,
    offline: AgentOfflineMonitor,
    hashlist_sync: HashlistSync,
    presets: PresetJobService,
    increment: IncrementLayerBuilder,
    deletion: HashlistDeletionService,
    ingest: HashlistIngestService,
    shutdown_tx: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        pool: DbPool,
        config: OrchestratorConfig,
        transport: Arc<dyn AgentTransport>,
        notifier: Arc<dyn NotificationBus>,
    ) -> Self {
        let jobs = JobRepo::new(pool.clone());
        let tasks = TaskRepo::new(pool.clone());
        let layers = JobLayerRepo::new(pool.clone());
        let agents = AgentRepo::new(pool.clone());
        let hashlists = HashlistRepo::new(pool.clone());
        let agent_hashlists = AgentHashlistRepo::new(pool.clone());
        let files = FileResourceRepo::new(pool.clone());
        let presets_repo = PresetJobRepo::new(pool.clone());
        let settings = SystemSettings::new(SettingsRepo::new(pool.clone()));
        let binaries = BinaryResolver::new(BinaryRepo::new(pool.clone()), &config.binary_dir);
        let benchmarks = BenchmarkStore::new(BenchmarkRepo::new(pool.clone()), settings.clone());
        let rule_split = RuleSplitManager::new(config.clone());

        let keyspace = KeyspaceCalculator::new(config.clone(), binaries.clone(), files.clone());
        let hashlist_sync = HashlistSync::new(
            config.clone(),
            hashlists.clone(),
            agent_hashlists.clone(),
            settings.clone(),
        );
        let evaluator = JobEvaluator::new(
            jobs.clone(),
            layers.clone(),
            tasks.clone(),
            hashlists.clone(),
            rule_split.clone(),
            notifier.clone(),
        );
        let completion = HashlistCompletion::new(jobs.clone(), tasks.clone(), transport.clone());
        let offline = AgentOfflineMonitor::new(
            OfflineBufferRepo::new(pool.clone()),
            agents.clone(),
            settings.clone(),
            notifier.clone(),
        );
        let lifecycle = TaskLifecycle::new(
            config.clone(),
            tasks.clone(),
            jobs.clone(),
            layers.clone(),
            agents.clone(),
            hashlists.clone(),
            benchmarks.clone(),
            settings.clone(),
            hashlist_sync.clone(),
            evaluator,
            completion,
            offline.clone(),
            rule_split.clone(),
            notifier,
        );

        let scheduler = AgentScheduler::new(
            agents.clone(),
            jobs.clone(),
            layers.clone(),
            tasks.clone(),
        );
        let planner = ChunkPlanner::new(
            config.clone(),
            jobs.clone(),
            layers.clone(),
            tasks.clone(),
            hashlists.clone(),
            files.clone(),
            benchmarks,
            settings.clone(),
        );
        let dispatcher = TaskDispatcher::new(
            config.clone(),
            transport,
            jobs.clone(),
            layers.clone(),
            tasks.clone(),
            rule_split.clone(),
            hashlist_sync.clone(),
        );
        let reconciler = JobReconciler::new(
            jobs.clone(),
            tasks.clone(),
            settings.clone(),
            lifecycle.clone(),
        );
        let presets = PresetJobService::new(
            presets_repo,
            jobs.clone(),
            layers.clone(),
            settings,
            keyspace.clone(),
            binaries.clone(),
        );
        let increment = IncrementLayerBuilder::new(keyspace, binaries, layers, jobs.clone());
        let deletion = HashlistDeletionService::new(
            config.clone(),
            hashlists.clone(),
            agent_hashlists,
            jobs,
            rule_split,
        );
        let ingest = HashlistIngestService::new(hashlists, hashlist_sync.clone());

        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            scheduler,
            planner,
            dispatcher,
            lifecycle,
            reconciler,
            offline,
            hashlist_sync,
            presets,
            increment,
            deletion,
            ingest,
            shutdown_tx,
        }
    }

    /// Startup reconciliation; call once before spawning the loops.
    pub async fn startup(&self) -> Result<()> {
        self.lifecycle.reconcile_at_startup().await
    }

    /// One scheduling pass: reserve agents, plan chunks, dispatch them.
    /// Returns how many tasks were handed out.
    pub async fn run_scheduling_cycle(&self) -> Result<usize> {
        let reservations = self.scheduler.reserve().await?;
        if reservations.is_empty() {
            return Ok(0);
        }
        let plans = self.planner.plan(&reservations).await?;
        Ok(self.dispatcher.dispatch(plans).await)
    }

    /// Spawn the periodic activities. They run until [`shutdown`] fires.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        // Reconcile-and-dispatch loop.
        {
            let reconciler = self.reconciler.clone();
            let scheduler = self.scheduler.clone();
            let planner = self.planner.clone();
            let dispatcher = self.dispatcher.clone();
            let interval = self.config.reconcile_interval;
            let mut shutdown = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            reconciler.run_once().await;
                            match scheduler.reserve().await {
                                Ok(reservations) if !reservations.is_empty() => {
                                    match planner.plan(&reservations).await {
                                        Ok(plans) => {
                                            dispatcher.dispatch(plans).await;
                                        }
                                        Err(err) => warn!("planning cycle failed: {:#}", err),
                                    }
                                }
                                Ok(_) => {}
                                Err(err) => warn!("reservation cycle failed: {:#}", err),
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                info!("reconcile loop stopped");
            }));
        }

        // Offline notification sweep.
        {
            let offline = self.offline.clone();
            let interval = self.config.offline_sweep_interval;
            let mut shutdown = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(err) = offline.run_once().await {
                                warn!("offline sweep failed: {:#}", err);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                info!("offline sweep stopped");
            }));
        }

        // Agent-hashlist retention cleanup.
        {
            let sync = self.hashlist_sync.clone();
            let interval = self.config.hashlist_cleanup_interval;
            let mut shutdown = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(err) = sync.cleanup_stale_rows().await {
                                warn!("hashlist cleanup failed: {:#}", err);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                info!("hashlist cleanup stopped");
            }));
        }

        // Progress tracker pruning.
        {
            let deletion_tracker = self.deletion.tracker.clone();
            let ingest_tracker = self.ingest.tracker.clone();
            let interval = self.config.progress_prune_interval;
            let mut shutdown = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            deletion_tracker.prune_terminal();
                            ingest_tracker.prune_terminal();
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                info!("progress pruning stopped");
            }));
        }

        handles
    }

    /// Signal every background loop to stop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn lifecycle(&self) -> &TaskLifecycle {
        &self.lifecycle
    }

    pub fn reconciler(&self) -> &JobReconciler {
        &self.reconciler
    }

    pub fn presets(&self) -> &PresetJobService {
        &self.presets
    }

    pub fn increment(&self) -> &IncrementLayerBuilder {
        &self.increment
    }

    pub fn deletion(&self) -> &HashlistDeletionService {
        &self.deletion
    }

    pub fn ingest(&self) -> &HashlistIngestService {
        &self.ingest
    }

    pub fn hashlist_sync(&self) -> &HashlistSync {
        &self.hashlist_sync
    }

    pub fn offline_monitor(&self) -> &AgentOfflineMonitor {
        &self.offline
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}
