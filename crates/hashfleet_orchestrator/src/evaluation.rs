//! Job and layer completion evaluation.
//!
//! Runs after task transitions and on every reconciler pass. Decides when a
//! job's work is actually exhausted, keeps the progress figures current, and
//! drives the job to its terminal state.

use anyhow::Result;
use hashfleet_db::models::JobExecution;
use hashfleet_db::{HashlistRepo, JobLayerRepo, JobRepo, TaskRepo};
use hashfleet_ids::{HashlistId, JobId};
use hashfleet_protocol::{FleetEvent, JobStatus, LayerStatus, TaskStatus};
use std::sync::Arc;
use tracing::{info, warn};

use crate::notify::NotificationBus;
use crate::rule_split::RuleSplitManager;

#[derive(Clone)]
pub struct JobEvaluator {
    jobs: JobRepo,
    layers: JobLayerRepo,
    tasks: TaskRepo,
    hashlists: HashlistRepo,
    rule_split: RuleSplitManager,
    notifier: Arc<dyn NotificationBus>,
}

impl JobEvaluator {
    pub fn new(
        jobs: JobRepo,
        layers: JobLayerRepo,
        tasks: TaskRepo,
        hashlists: HashlistRepo,
        rule_split: RuleSplitManager,
        notifier: Arc<dyn NotificationBus>,
    ) -> Self {
        Self {
            jobs,
            layers,
            tasks,
            hashlists,
            rule_split,
            notifier,
        }
    }

    /// Refresh progress for a job and, when its work is exhausted, drive it
    /// to completed/failed. Demotes stranded jobs back to pending.
    pub async fn evaluate_job(&self, job_id: &str) -> Result<()> {
        let job = self.jobs.get(job_id).await?;
        if job.status().is_terminal() {
            return Ok(());
        }

        self.refresh_progress(&job).await?;
        self.complete_finished_layers(&job).await?;

        let all_tasks = self.tasks.list_for_job(job_id).await?;
        if all_tasks.is_empty() {
            return Ok(());
        }

        let mut active = 0;
        let mut pending = 0;
        let mut processing = 0;
        let mut completed = 0;
        let mut failed = 0;
        for task in &all_tasks {
            match task.status() {
                status if status.is_active() => active += 1,
                TaskStatus::Pending => pending += 1,
                TaskStatus::Processing => processing += 1,
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed => failed += 1,
                _ => {}
            }
        }
        if active > 0 || pending > 0 || processing > 0 {
            return Ok(());
        }

        let covered = if job.uses_rule_splitting {
            self.tasks.max_rule_end(job_id).await? >= job.multiplication_factor
        } else if job.increment_mode().is_enabled() {
            self.layers.first_open_layer(job_id).await?.is_none()
        } else {
            job.dispatched_keyspace >= job.effective_keyspace
        };

        if failed > 0 && completed == 0 {
            warn!("job {} failed: every task failed", job_id);
            self.jobs
                .mark_failed(job_id, "all tasks failed permanently")
                .await?;
            self.rule_split.remove_job_chunks(job_id);
            return Ok(());
        }

        if covered {
            // Align the stored effective keyspace with what the tasks
            // actually covered before declaring 100%.
            let actual = self.tasks.sum_completed_effective(job_id).await?;
            if actual > 0 && actual != job.effective_keyspace {
                if actual < job.dispatched_keyspace {
                    warn!(
                        "job {} dispatched {} beyond actual effective {}, demoting for investigation",
                        job_id, job.dispatched_keyspace, actual
                    );
                }
                self.jobs.sync_effective_keyspace(job_id, actual).await?;
            }
            self.jobs.mark_completed(job_id, 100.0).await?;
            self.rule_split.remove_job_chunks(job_id);
            self.emit_job_completed(&job).await;
            info!("job {} completed", job_id);
            return Ok(());
        }

        // Work remains but nothing is running or queued: hand the job back
        // to the scheduler.
        if job.status() == JobStatus::Running {
            info!("job {} has remaining work and no tasks, demoting to pending", job_id);
            self.jobs.set_status(job_id, JobStatus::Pending).await?;
        }
        Ok(())
    }

    /// Update `processed_keyspace` and the overall percentage from the tasks.
    pub async fn refresh_progress(&self, job: &JobExecution) -> Result<()> {
        let processed = self.tasks.sum_effective_processed(&job.id).await?;
        let percent = if job.effective_keyspace > 0 {
            (processed as f64 / job.effective_keyspace as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        self.jobs
            .set_processed_keyspace(&job.id, processed.min(job.effective_keyspace), percent)
            .await?;
        Ok(())
    }

    /// Mark increment layers completed once their base keyspace is fully
    /// dispatched and every task of the layer has finished.
    async fn complete_finished_layers(&self, job: &JobExecution) -> Result<()> {
        if !job.increment_mode().is_enabled() {
            return Ok(());
        }
        for layer in self.layers.list_for_job(&job.id).await? {
            if layer.status() == LayerStatus::Completed {
                continue;
            }
            if layer.dispatched_keyspace < layer.base_keyspace {
                continue;
            }
            let tasks = self.tasks.list_for_job(&job.id).await?;
            let layer_done = tasks
                .iter()
                .filter(|t| t.increment_layer_id.as_deref() == Some(layer.id.as_str()))
                .all(|t| t.status() == TaskStatus::Completed);
            if layer_done {
                self.layers.set_status(&layer.id, LayerStatus::Completed).await?;
                self.layers
                    .set_progress(&layer.id, layer.base_keyspace, 100.0)
                    .await?;
                info!("layer {} of job {} completed", layer.layer_index, job.id);
            }
        }
        Ok(())
    }

    async fn emit_job_completed(&self, job: &JobExecution) {
        let (cracked, total) = match self.hashlists.get(&job.hashlist_id).await {
            Ok(hashlist) => (hashlist.cracked_hashes, hashlist.total_hashes),
            Err(_) => (0, 0),
        };
        let (Ok(job_id), Ok(hashlist_id)) = (
            JobId::parse(&job.id),
            HashlistId::parse(&job.hashlist_id),
        ) else {
            return;
        };
        self.notifier.emit(FleetEvent::JobCompleted {
            job_id,
            hashlist_id,
            cracked_hashes: cracked,
            total_hashes: total,
        });
    }
}
