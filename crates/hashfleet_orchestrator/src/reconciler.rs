//! Periodic reconciliation sweeps.
//!
//! Every pass is best-effort: failures are logged per item and never abort
//! the sweep, so one corrupt row cannot wedge the fleet.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use hashfleet_db::{JobRepo, TaskRepo};
use hashfleet_protocol::defaults::{MAX_RETRANSMIT_COUNT, PROCESSING_TIMEOUT_MINUTES};
use hashfleet_protocol::{JobStatus, TaskStatus};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::lifecycle::TaskLifecycle;
use crate::settings::SystemSettings;

/// Silence window before a running job with no active tasks is considered
/// orphaned, minutes.
const ORPHAN_JOB_SILENCE_MINUTES: i64 = 5;

/// What one reconciliation pass touched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub orphaned_jobs: usize,
    pub stale_processing: usize,
    pub stale_tasks: usize,
    pub expired_reconnects: usize,
    pub jobs_evaluated: usize,
}

#[derive(Clone)]
pub struct JobReconciler {
    jobs: JobRepo,
    tasks: TaskRepo,
    settings: SystemSettings,
    lifecycle: TaskLifecycle,
}

impl JobReconciler {
    pub fn new(
        jobs: JobRepo,
        tasks: TaskRepo,
        settings: SystemSettings,
        lifecycle: TaskLifecycle,
    ) -> Self {
        Self {
            jobs,
            tasks,
            settings,
            lifecycle,
        }
    }

    /// One full reconciliation pass.
    pub async fn run_once(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let mut touched_jobs = BTreeSet::new();

        if let Err(err) = self.sweep_orphaned_jobs(&mut summary, &mut touched_jobs).await {
            warn!("orphaned-job sweep failed: {:#}", err);
        }
        if let Err(err) = self.sweep_stale_processing(&mut summary, &mut touched_jobs).await {
            warn!("stale-processing sweep failed: {:#}", err);
        }
        if let Err(err) = self.sweep_stale_tasks(&mut summary, &mut touched_jobs).await {
            warn!("stale-task sweep failed: {:#}", err);
        }
        if let Err(err) = self.sweep_expired_reconnects(&mut summary, &mut touched_jobs).await {
            warn!("reconnect-expiry sweep failed: {:#}", err);
        }

        for job_id in touched_jobs {
            match self.lifecycle.evaluator().evaluate_job(&job_id).await {
                Ok(()) => summary.jobs_evaluated += 1,
                Err(err) => warn!("evaluation of job {} failed: {:#}", job_id, err),
            }
        }

        if summary != ReconcileSummary::default() {
            info!(
                "reconcile pass: {} orphaned jobs, {} stale processing, {} stale tasks, {} expired reconnects, {} jobs evaluated",
                summary.orphaned_jobs,
                summary.stale_processing,
                summary.stale_tasks,
                summary.expired_reconnects,
                summary.jobs_evaluated
            );
        }
        summary
    }

    /// Jobs stuck in `running` with no active tasks and no recent updates.
    async fn sweep_orphaned_jobs(
        &self,
        summary: &mut ReconcileSummary,
        touched: &mut BTreeSet<String>,
    ) -> Result<()> {
        let cutoff = Utc::now() - ChronoDuration::minutes(ORPHAN_JOB_SILENCE_MINUTES);
        for job in self.jobs.list_running_stale(cutoff).await? {
            let active = self.tasks.count_active_for_job(&job.id).await?;
            if active > 0 {
                continue;
            }
            summary.orphaned_jobs += 1;

            let total = self.tasks.count_for_job(&job.id).await?;
            if total == 0 {
                info!("orphaned job {} has no tasks, demoting to pending", job.id);
                self.jobs.set_status(&job.id, JobStatus::Pending).await?;
                continue;
            }

            let pending = self
                .tasks
                .count_by_status(&job.id, TaskStatus::Pending)
                .await?;
            if pending > 0 {
                // The scheduler will reassign the pending work next cycle.
                self.jobs.touch(&job.id).await?;
                continue;
            }
            touched.insert(job.id);
        }
        Ok(())
    }

    /// Processing tasks that stopped flushing crack batches.
    async fn sweep_stale_processing(
        &self,
        summary: &mut ReconcileSummary,
        touched: &mut BTreeSet<String>,
    ) -> Result<()> {
        let cutoff = Utc::now() - ChronoDuration::minutes(PROCESSING_TIMEOUT_MINUTES);
        for task in self.tasks.list_stale_processing(cutoff).await? {
            if task.retransmit_count >= MAX_RETRANSMIT_COUNT {
                warn!(
                    "task {} exhausted {} retransmits, marking processing_error",
                    task.id, task.retransmit_count
                );
                self.tasks
                    .set_status(&task.id, TaskStatus::ProcessingError)
                    .await?;
                summary.stale_processing += 1;
                touched.insert(task.job_execution_id);
            } else {
                self.tasks.bump_retransmit(&task.id).await?;
            }
        }
        Ok(())
    }

    /// Running/assigned tasks silent past the heartbeat timeout.
    async fn sweep_stale_tasks(
        &self,
        summary: &mut ReconcileSummary,
        touched: &mut BTreeSet<String>,
    ) -> Result<()> {
        let timeout_minutes = self.settings.task_heartbeat_timeout_minutes().await?;
        let cutoff = Utc::now() - ChronoDuration::minutes(timeout_minutes);
        for task in self.tasks.list_stale_running(cutoff).await? {
            warn!(
                "task {} silent for over {}min, applying retry budget",
                task.id, timeout_minutes
            );
            touched.insert(task.job_execution_id.clone());
            self.lifecycle.fail_or_retry(&task, false).await?;
            summary.stale_tasks += 1;
        }
        Ok(())
    }

    /// Parked tasks whose reconnect grace ran out.
    async fn sweep_expired_reconnects(
        &self,
        summary: &mut ReconcileSummary,
        touched: &mut BTreeSet<String>,
    ) -> Result<()> {
        for task in self.tasks.list_expired_reconnect(Utc::now()).await? {
            info!(
                "task {} reconnect grace expired, applying retry budget",
                task.id
            );
            touched.insert(task.job_execution_id.clone());
            self.lifecycle.fail_or_retry(&task, false).await?;
            summary.expired_reconnects += 1;
        }
        Ok(())
    }
}
