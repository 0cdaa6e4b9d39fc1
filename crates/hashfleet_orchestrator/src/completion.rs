//! Hashlist auto-completion.
//!
//! Fired when an agent reports status code 6 (every hash cracked) or when a
//! crack batch from another job drains the hashlist. Every job bound to the
//! hashlist is driven to completed; in-flight tasks are stopped but still
//! get a window to flush trailing crack batches.

use anyhow::Result;
use hashfleet_db::{JobRepo, TaskRepo};
use hashfleet_ids::{AgentId, TaskId};
use hashfleet_protocol::{JobStop, TaskStatus};
use std::sync::Arc;
use tracing::{info, warn};

use crate::transport::AgentTransport;

#[derive(Clone)]
pub struct HashlistCompletion {
    jobs: JobRepo,
    tasks: TaskRepo,
    transport: Arc<dyn AgentTransport>,
}

impl HashlistCompletion {
    pub fn new(jobs: JobRepo, tasks: TaskRepo, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            jobs,
            tasks,
            transport,
        }
    }

    /// Stop and finish every non-completed job bound to a fully cracked
    /// hashlist. `triggering_task` is the task that delivered the final
    /// crack; it is skipped when sending stop messages because its agent is
    /// already winding down.
    pub async fn handle_all_cracked(
        &self,
        hashlist_id: &str,
        triggering_task: Option<&str>,
    ) -> Result<()> {
        let jobs = self.jobs.list_open_for_hashlist(hashlist_id).await?;
        info!(
            "hashlist {} fully cracked, finishing {} open jobs",
            hashlist_id,
            jobs.len()
        );

        for job in jobs {
            let tasks = self.tasks.list_for_job(&job.id).await?;
            if tasks.is_empty() {
                // Never started; nothing worth keeping.
                self.jobs.delete(&job.id).await?;
                info!("deleted never-started job {} for cracked hashlist", job.id);
                continue;
            }

            for task in &tasks {
                if !matches!(task.status(), TaskStatus::Running | TaskStatus::Assigned) {
                    continue;
                }
                if Some(task.id.as_str()) == triggering_task {
                    continue;
                }

                // The agent may have finished the chunk already and just not
                // reported yet; honor the finished state instead of clobbering
                // it.
                if task.keyspace_processed >= task.keyspace_end {
                    self.tasks.set_status(&task.id, TaskStatus::Completed).await?;
                } else {
                    self.tasks.force_complete_keyspace(&task.id).await?;
                    self.tasks.set_status(&task.id, TaskStatus::Processing).await?;
                }

                if let Some(agent_id) = &task.agent_id {
                    if let Err(err) = self.send_stop(agent_id, &task.id).await {
                        warn!(
                            "failed to stop task {} on agent {}: {:#}",
                            task.id, agent_id, err
                        );
                    }
                }
            }

            self.jobs.mark_completed(&job.id, 100.0).await?;
        }
        Ok(())
    }

    async fn send_stop(&self, agent_id: &str, task_id: &str) -> Result<()> {
        let agent = AgentId::parse(agent_id)?;
        let stop = JobStop {
            task_id: TaskId::parse(task_id)?,
        };
        self.transport.send_job_stop(&agent, stop).await
    }
}
