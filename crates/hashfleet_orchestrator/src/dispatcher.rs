//! Plan execution.
//!
//! Runs every plan of a cycle in parallel. Each execution is idempotent up
//! to the point of emitting the agent assign message: a transport failure
//! re-queues the task as pending and the next cycle picks it up.

use anyhow::{Context, Result};
use hashfleet_db::{JobLayerRepo, JobRepo, NewJobTask, TaskRepo};
use hashfleet_ids::{AgentId, HashlistId, JobId, TaskId};
use hashfleet_protocol::{JobAssignment, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::hashlist_sync::HashlistSync;
use crate::planner::TaskPlan;
use crate::rule_split::RuleSplitManager;
use crate::transport::AgentTransport;

/// File-sync deadline; generous because agents hash wordlists that can run
/// to tens of gigabytes.
const FILE_SYNC_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct TaskDispatcher {
    config: OrchestratorConfig,
    transport: Arc<dyn AgentTransport>,
    jobs: JobRepo,
    layers: JobLayerRepo,
    tasks: TaskRepo,
    rule_split: RuleSplitManager,
    hashlist_sync: HashlistSync,
}

impl TaskDispatcher {
    pub fn new(
        config: OrchestratorConfig,
        transport: Arc<dyn AgentTransport>,
        jobs: JobRepo,
        layers: JobLayerRepo,
        tasks: TaskRepo,
        rule_split: RuleSplitManager,
        hashlist_sync: HashlistSync,
    ) -> Self {
        Self {
            config,
            transport,
            jobs,
            layers,
            tasks,
            rule_split,
            hashlist_sync,
        }
    }

    /// Execute all plans of a cycle in parallel. Returns how many were
    /// actually handed to agents.
    pub async fn dispatch(&self, plans: Vec<TaskPlan>) -> usize {
        let mut executions = JoinSet::new();
        for plan in plans {
            let dispatcher = self.clone();
            executions.spawn(async move {
                let task_id = plan.task_id.clone();
                let agent_id = plan.agent_id.clone();
                dispatcher
                    .execute_plan(plan)
                    .await
                    .map_err(|err| (task_id, agent_id, err))
            });
        }

        let mut dispatched = 0;
        while let Some(joined) = executions.join_next().await {
            match joined {
                Ok(Ok(())) => dispatched += 1,
                Ok(Err((task_id, agent_id, err))) => {
                    warn!(
                        "dispatch of task {} to agent {} failed: {:#}",
                        task_id, agent_id, err
                    );
                }
                Err(join_err) => warn!("dispatch execution panicked: {}", join_err),
            }
        }
        dispatched
    }

    async fn execute_plan(&self, plan: TaskPlan) -> Result<()> {
        let mut attack_cmd = plan.attack_cmd.clone();
        let mut rule_chunk_rel = None;

        // 1. Materialize the rule slice and point the command at it.
        if plan.is_rule_split_task {
            let source_rel = plan
                .rule_source_name
                .as_deref()
                .context("rule-split plan without a source rule path")?;
            let (rule_start, rule_end) = plan
                .rule_start_index
                .zip(plan.rule_end_index)
                .context("rule-split plan without rule indices")?;

            let source = self.config.data_dir.join(source_rel);
            let chunk_path = self.rule_split.carve_chunk(
                &source,
                &plan.job_id,
                plan.chunk_number,
                rule_start,
                rule_end,
            )?;
            let chunk_rel = self.config.rel_path(&chunk_path);
            attack_cmd = attack_cmd.replace(source_rel, &chunk_rel);
            rule_chunk_rel = Some(chunk_rel);
        }

        // 2+3. Verify the agent holds the current hashlist bytes.
        let mut extra_files = Vec::new();
        if let Some(chunk_rel) = &rule_chunk_rel {
            extra_files.push(chunk_rel.clone());
        }
        let sync_request = self
            .hashlist_sync
            .prepare_sync(&plan.agent_id, &plan.hashlist_id, extra_files)
            .await?;
        tokio::time::timeout(FILE_SYNC_DEADLINE, self.transport.send_file_sync(sync_request))
            .await
            .context("file sync timed out")?
            .context("file sync failed")?;

        // 4. Persist the task and hand it to the agent.
        if !plan.reuse_pending {
            self.tasks
                .create(
                    &NewJobTask {
                        id: plan.task_id.clone(),
                        job_execution_id: plan.job_id.clone(),
                        increment_layer_id: plan.layer_id.clone(),
                        agent_id: None,
                        chunk_number: plan.chunk_number,
                        chunk_duration: plan.chunk_duration,
                        benchmark_speed: Some(plan.benchmark_speed),
                        attack_cmd: attack_cmd.clone(),
                        keyspace_start: plan.keyspace_start,
                        keyspace_end: plan.keyspace_end,
                        keyspace_processed: plan.keyspace_start,
                        effective_keyspace_start: plan.effective_keyspace_start,
                        effective_keyspace_end: plan.effective_keyspace_end,
                        is_keyspace_split: plan.is_keyspace_split,
                        is_rule_split_task: plan.is_rule_split_task,
                        rule_start_index: plan.rule_start_index,
                        rule_end_index: plan.rule_end_index,
                        rule_chunk_path: rule_chunk_rel.clone(),
                    },
                    TaskStatus::Pending,
                )
                .await?;
        }
        self.tasks
            .assign(
                &plan.task_id,
                &plan.agent_id,
                Some(plan.benchmark_speed),
                plan.keyspace_start,
                plan.effective_keyspace_start,
                plan.is_keyspace_split,
                &attack_cmd,
            )
            .await?;

        // 5. Dispatch accounting for brand-new chunks.
        if !plan.reuse_pending {
            self.jobs
                .add_dispatched_keyspace(&plan.job_id, plan.effective_size())
                .await?;
            if let Some(layer_id) = &plan.layer_id {
                self.layers
                    .add_dispatched_keyspace(layer_id, plan.keyspace_size())
                    .await?;
                self.layers.start_if_pending(layer_id).await?;
            }
        }

        // 6. First dispatch moves the job out of pending.
        self.jobs.start_if_pending(&plan.job_id).await?;

        // 7. The assign message is the commit point; a transport failure
        // re-queues the task for the next cycle.
        let assignment = JobAssignment {
            task_id: TaskId::parse(&plan.task_id).context("task id")?,
            job_id: JobId::parse(&plan.job_id).context("job id")?,
            hashlist_id: HashlistId::parse(&plan.hashlist_id).context("hashlist id")?,
            attack_cmd: attack_cmd.clone(),
            chunk_number: plan.chunk_number,
            chunk_duration: plan.chunk_duration,
            keyspace_start: plan.keyspace_start,
            keyspace_end: plan.keyspace_end,
            is_keyspace_split: plan.is_keyspace_split,
            rule_chunk_path: rule_chunk_rel,
            report_status: true,
        };
        let agent_id = AgentId::parse(&plan.agent_id).context("agent id")?;
        if let Err(err) = self.transport.send_job_assign(&agent_id, assignment).await {
            self.tasks.requeue(&plan.task_id).await?;
            return Err(err.context("job assign failed, task re-queued"));
        }

        info!(
            "Dispatched chunk {} of job {} to agent {} [{}..{})",
            plan.chunk_number, plan.job_id, plan.agent_id, plan.keyspace_start, plan.keyspace_end
        );
        Ok(())
    }
}
