//! Task lifecycle state machine.
//!
//! assigned -> running -> processing -> completed, with reconnect_pending as
//! the parking state for lost agents and a retry budget before anything is
//! failed permanently. Agent reports and crack batches enter here; the
//! reconciler calls back in for grace expiries and stale tasks.

use anyhow::Result;
use chrono::{Duration, Utc};
use hashfleet_db::models::JobTask;
use hashfleet_db::{AgentRepo, HashlistRepo, JobLayerRepo, JobRepo, TaskRepo};
use hashfleet_ids::{AgentId, JobId, TaskId};
use hashfleet_protocol::defaults::MAX_CONSECUTIVE_FAILURES;
use hashfleet_protocol::{
    AgentStatus, CrackBatch, FleetEvent, TaskProgressReport, TaskStatus, STATUS_CODE_ALL_CRACKED,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::benchmark::BenchmarkStore;
use crate::completion::HashlistCompletion;
use crate::config::OrchestratorConfig;
use crate::evaluation::JobEvaluator;
use crate::hashlist_sync::HashlistSync;
use crate::notify::NotificationBus;
use crate::offline::AgentOfflineMonitor;
use crate::planner::scale;
use crate::rule_split::RuleSplitManager;
use crate::settings::SystemSettings;

#[derive(Clone)]
pub struct TaskLifecycle {
    config: OrchestratorConfig,
    tasks: TaskRepo,
    jobs: JobRepo,
    layers: JobLayerRepo,
    agents: AgentRepo,
    hashlists: HashlistRepo,
    benchmarks: BenchmarkStore,
    settings: SystemSettings,
    hashlist_sync: HashlistSync,
    evaluator: JobEvaluator,
    completion: HashlistCompletion,
    offline: AgentOfflineMonitor,
    rule_split: RuleSplitManager,
    notifier: Arc<dyn NotificationBus>,
}

impl TaskLifecycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        tasks: TaskRepo,
        jobs: JobRepo,
        layers: JobLayerRepo,
        agents: AgentRepo,
        hashlists: HashlistRepo,
        benchmarks: BenchmarkStore,
        settings: SystemSettings,
        hashlist_sync: HashlistSync,
        evaluator: JobEvaluator,
        completion: HashlistCompletion,
        offline: AgentOfflineMonitor,
        rule_split: RuleSplitManager,
        notifier: Arc<dyn NotificationBus>,
    ) -> Self {
        Self {
            config,
            tasks,
            jobs,
            layers,
            agents,
            hashlists,
            benchmarks,
            settings,
            hashlist_sync,
            evaluator,
            completion,
            offline,
            rule_split,
            notifier,
        }
    }

    /// Apply a periodic agent progress report.
    pub async fn handle_progress_report(&self, report: &TaskProgressReport) -> Result<()> {
        let task_id = report.task_id.to_string();
        let task_id = task_id.as_str();
        let task = self.tasks.get(task_id).await?;
        if task.status().is_terminal() {
            debug!("dropping report for terminal task {}", task_id);
            return Ok(());
        }
        if task.status() == TaskStatus::ReconnectPending {
            // The agent is evidently back; un-park before applying progress.
            self.tasks
                .resume_from_reconnect(task_id, TaskStatus::Running)
                .await?;
        }
        if let Some(agent_id) = &task.agent_id {
            self.agents.touch_last_seen(agent_id).await?;
        }

        let job = self.jobs.get(&task.job_execution_id).await?;
        let hashlist = self.hashlists.get(&job.hashlist_id).await?;

        // keyspace_processed is an absolute base position within the chunk;
        // the effective column tracks the amount consumed.
        let processed = report
            .keyspace_processed
            .clamp(task.keyspace_start, task.keyspace_end);
        let effective_consumed = scale(
            processed - task.keyspace_start,
            task.effective_keyspace_end - task.effective_keyspace_start,
            (task.keyspace_end - task.keyspace_start).max(1),
        );
        self.tasks
            .record_progress(task_id, processed, effective_consumed, report.benchmark_speed)
            .await?;

        if let Some(speed) = report.benchmark_speed {
            let bucket = hashlist
                .is_salted
                .then(|| hashlist.uncracked_count());
            if let Some(agent_id) = &task.agent_id {
                self.benchmarks
                    .record(agent_id, job.attack_mode(), hashlist.hash_type_id, bucket, speed)
                    .await?;
            }
        }

        if report.status_code == STATUS_CODE_ALL_CRACKED {
            info!(
                "task {} reports hashlist {} fully cracked",
                task_id, job.hashlist_id
            );
            self.completion
                .handle_all_cracked(&job.hashlist_id, Some(task_id))
                .await?;
            self.tasks.set_status(task_id, TaskStatus::Completed).await?;
            return Ok(());
        }

        if processed >= task.keyspace_end {
            // Chunk exhausted; what remains is flushing crack batches.
            let expected = task.received_crack_count + report.pending_crack_batches;
            self.tasks.set_expected_cracks(task_id, expected).await?;
            if report.pending_crack_batches == 0 {
                self.complete_task(task_id).await?;
            } else {
                self.tasks.set_status(task_id, TaskStatus::Processing).await?;
            }
        }

        self.evaluator.refresh_progress(&job).await?;
        if let Some(layer_id) = &task.increment_layer_id {
            self.refresh_layer_progress(layer_id).await?;
        }
        Ok(())
    }

    /// Apply a crack batch from an agent.
    pub async fn handle_crack_batch(&self, batch: &CrackBatch) -> Result<()> {
        let task_id = batch.task_id.to_string();
        let task_id = task_id.as_str();
        let outcome = self.hashlist_sync.apply_crack_batch(&batch.lines).await?;
        self.tasks.add_received_cracks(task_id, 1).await?;
        debug!(
            "task {} delivered {} cracks affecting {} hashlists",
            task_id,
            outcome.applied,
            outcome.affected_hashlists.len()
        );

        for hashlist_id in &outcome.fully_cracked {
            self.completion
                .handle_all_cracked(hashlist_id, Some(task_id))
                .await?;
        }

        let task = self.tasks.get(task_id).await?;
        if task.status() == TaskStatus::Processing
            && task.received_crack_count >= task.expected_crack_count
        {
            self.complete_task(task_id).await?;
        }
        Ok(())
    }

    /// Handle an agent-reported task failure.
    pub async fn handle_task_failed(&self, task_id: &str, reason: &str) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        warn!("task {} failed on agent: {}", task_id, reason);
        self.fail_or_retry(&task, true).await
    }

    /// Park every open task of a disconnecting agent and arm the offline
    /// notification window.
    pub async fn handle_agent_disconnect(&self, agent_id: &str) -> Result<()> {
        let grace_minutes = self.settings.reconnect_grace_period_minutes().await?;
        let deadline = Utc::now() + Duration::minutes(grace_minutes);

        for task in self.tasks.open_tasks_for_agent(agent_id).await? {
            info!(
                "parking task {} for {}min while agent {} is gone",
                task.id, grace_minutes, agent_id
            );
            self.tasks.park_for_reconnect(&task.id, deadline).await?;
        }
        self.agents.set_status(agent_id, AgentStatus::Offline).await?;
        self.offline.record_disconnect(agent_id).await?;
        Ok(())
    }

    /// Restore parked tasks when their agent comes back inside the grace
    /// window.
    pub async fn handle_agent_reconnect(&self, agent_id: &str) -> Result<()> {
        self.offline.record_reconnect(agent_id).await?;
        self.agents.set_status(agent_id, AgentStatus::Idle).await?;
        self.agents.touch_last_seen(agent_id).await?;

        for task in self.tasks.parked_tasks_for_agent(agent_id).await? {
            info!("resuming task {} after agent {} reconnected", task.id, agent_id);
            self.tasks
                .resume_from_reconnect(&task.id, TaskStatus::Running)
                .await?;
        }
        Ok(())
    }

    /// Retry a task within its budget, or fail it permanently and escalate
    /// the failure counters. `blame_agent` distinguishes agent-reported
    /// failures from infrastructure timeouts.
    pub async fn fail_or_retry(&self, task: &JobTask, blame_agent: bool) -> Result<()> {
        if blame_agent {
            if let Some(agent_id) = &task.agent_id {
                let failures = self.agents.bump_consecutive_failures(agent_id).await?;
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    warn!(
                        "agent {} errored after {} consecutive task failures",
                        agent_id, failures
                    );
                    self.agents.set_status(agent_id, AgentStatus::Error).await?;
                }
            }
        }

        let max_retries = self.settings.max_chunk_retry_attempts().await?;
        if task.retry_count < max_retries {
            info!(
                "resetting task {} for retry {}/{}",
                task.id,
                task.retry_count + 1,
                max_retries
            );
            self.tasks.reset_for_retry(&task.id).await?;
            return Ok(());
        }

        warn!("task {} failed permanently after {} retries", task.id, task.retry_count);
        self.tasks.set_status(&task.id, TaskStatus::Failed).await?;
        if let Some(chunk_path) = &task.rule_chunk_path {
            self.rule_split
                .remove_chunk(&self.config.data_dir.join(chunk_path));
        }

        let failures = self
            .jobs
            .bump_consecutive_failures(&task.job_execution_id)
            .await?;
        if failures >= MAX_CONSECUTIVE_FAILURES {
            self.jobs
                .mark_failed(
                    &task.job_execution_id,
                    &format!("{} consecutive task failures", failures),
                )
                .await?;
            return Ok(());
        }
        self.evaluator.evaluate_job(&task.job_execution_id).await
    }

    /// Finish a task: terminal state, chunk cleanup, counters, event,
    /// completion evaluation.
    pub async fn complete_task(&self, task_id: &str) -> Result<()> {
        let task = self.tasks.get(task_id).await?;
        self.tasks.force_complete_keyspace(task_id).await?;
        self.tasks.set_status(task_id, TaskStatus::Completed).await?;

        if let Some(chunk_path) = &task.rule_chunk_path {
            self.rule_split
                .remove_chunk(&self.config.data_dir.join(chunk_path));
        }
        if let Some(agent_id) = &task.agent_id {
            self.agents.reset_consecutive_failures(agent_id).await?;
            self.agents.set_status(agent_id, AgentStatus::Idle).await?;
        }
        self.jobs
            .reset_consecutive_failures(&task.job_execution_id)
            .await?;

        self.emit_task_completed(&task);
        info!("task {} completed", task_id);

        if let Some(layer_id) = &task.increment_layer_id {
            self.refresh_layer_progress(layer_id).await?;
        }
        self.evaluator.evaluate_job(&task.job_execution_id).await
    }

    /// Recompute a layer's processed keyspace and percentage.
    async fn refresh_layer_progress(&self, layer_id: &str) -> Result<()> {
        let layer = self.layers.get(layer_id).await?;
        let processed = self.tasks.sum_base_processed_for_layer(layer_id).await?;
        let percent = if layer.base_keyspace > 0 {
            (processed as f64 / layer.base_keyspace as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        self.layers
            .set_progress(layer_id, processed.min(layer.base_keyspace), percent)
            .await?;
        Ok(())
    }

    fn emit_task_completed(&self, task: &JobTask) {
        let Ok(parsed_task) = TaskId::parse(&task.id) else {
            return;
        };
        let Ok(job_id) = JobId::parse(&task.job_execution_id) else {
            return;
        };
        let agent_id = task
            .agent_id
            .as_deref()
            .and_then(|id| AgentId::parse(id).ok());
        self.notifier.emit(FleetEvent::TaskCompleted {
            task_id: parsed_task,
            job_id,
            agent_id,
        });
    }

    /// Startup reconciliation: anything mid-flight when the process died is
    /// parked for its reconnect window; processing tasks are left alone so
    /// agents can retransmit their outfiles on reconnect.
    pub async fn reconcile_at_startup(&self) -> Result<()> {
        let grace_minutes = self.settings.reconnect_grace_period_minutes().await?;
        let deadline = Utc::now() + Duration::minutes(grace_minutes);

        let inflight = self.tasks.list_inflight().await?;
        for task in &inflight {
            self.tasks.park_for_reconnect(&task.id, deadline).await?;
        }
        if !inflight.is_empty() {
            info!(
                "startup: parked {} in-flight tasks for reconnect",
                inflight.len()
            );
        }

        for task in self.tasks.list_processing().await? {
            info!(
                "startup: task {} still processing; waiting for agent retransmit",
                task.id
            );
        }
        Ok(())
    }

    pub(crate) fn evaluator(&self) -> &JobEvaluator {
        &self.evaluator
    }
}
