//! Agent reservation.
//!
//! Each cycle pairs free agents with the jobs that should run next, highest
//! priority first, FIFO within a priority. The planner consumes the
//! reservation map; an agent reserved for job A that cannot be used for A is
//! NOT handed job B's work, so calibration gaps never reorder the queue.

use anyhow::Result;
use hashfleet_db::models::JobExecution;
use hashfleet_db::{AgentRepo, JobLayerRepo, JobRepo, TaskRepo};
use tracing::debug;

/// One (agent, job-or-layer) pairing for the current planning cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub agent_id: String,
    pub job_id: String,
    /// Set for increment jobs: the first non-completed layer.
    pub layer_id: Option<String>,
}

#[derive(Clone)]
pub struct AgentScheduler {
    agents: AgentRepo,
    jobs: JobRepo,
    layers: JobLayerRepo,
    tasks: TaskRepo,
}

impl AgentScheduler {
    pub fn new(agents: AgentRepo, jobs: JobRepo, layers: JobLayerRepo, tasks: TaskRepo) -> Self {
        Self {
            agents,
            jobs,
            layers,
            tasks,
        }
    }

    /// Compute this cycle's reservations. Every free agent gets at most one
    /// reservation; a job's `max_agents` (0 = unlimited) caps how many agents
    /// may be working it concurrently, counting already-active tasks.
    pub async fn reserve(&self) -> Result<Vec<Reservation>> {
        let mut free_agents = Vec::new();
        for agent in self.agents.list_schedulable().await? {
            if self.tasks.active_for_agent(&agent.id).await?.is_none() {
                free_agents.push(agent.id);
            }
        }
        if free_agents.is_empty() {
            return Ok(Vec::new());
        }

        let jobs = self.jobs.list_schedulable().await?;
        let mut reservations = Vec::new();
        let mut next_agent = 0usize;

        for job in &jobs {
            if next_agent >= free_agents.len() {
                break;
            }

            let layer_id = match self.reservable_entry(job).await? {
                Some(layer_id) => layer_id,
                None => continue,
            };

            let mut slots = if job.max_agents > 0 {
                let active = self.tasks.count_active_for_job(&job.id).await?;
                (job.max_agents - active).max(0)
            } else {
                i64::MAX
            };

            while slots > 0 && next_agent < free_agents.len() {
                reservations.push(Reservation {
                    agent_id: free_agents[next_agent].clone(),
                    job_id: job.id.clone(),
                    layer_id: layer_id.clone(),
                });
                next_agent += 1;
                slots -= 1;
            }
        }

        debug!(
            "Reserved {} of {} free agents across {} schedulable jobs",
            reservations.len(),
            free_agents.len(),
            jobs.len()
        );
        Ok(reservations)
    }

    /// Whether the job still has plannable work, and on which layer.
    ///
    /// Returns `None` when nothing is left to hand out, `Some(None)` for a
    /// plain job with remaining work, `Some(Some(layer))` for an increment
    /// job's first open layer.
    async fn reservable_entry(&self, job: &JobExecution) -> Result<Option<Option<String>>> {
        // A pending task is always claimable work.
        if self.tasks.oldest_pending(&job.id, None).await?.is_some() {
            if job.increment_mode().is_enabled() {
                if let Some(layer) = self.layers.first_open_layer(&job.id).await? {
                    return Ok(Some(Some(layer.id)));
                }
            }
            return Ok(Some(None));
        }

        if job.increment_mode().is_enabled() {
            let layer = match self.layers.first_open_layer(&job.id).await? {
                Some(layer) => layer,
                None => return Ok(None),
            };
            let handed_out = self
                .tasks
                .max_keyspace_end(&job.id, Some(&layer.id))
                .await?;
            if handed_out < layer.base_keyspace {
                return Ok(Some(Some(layer.id)));
            }
            return Ok(None);
        }

        if job.uses_rule_splitting {
            let handed_out = self.tasks.max_rule_end(&job.id).await?;
            if handed_out < job.multiplication_factor {
                return Ok(Some(None));
            }
            return Ok(None);
        }

        let handed_out = self.tasks.max_keyspace_end(&job.id, None).await?;
        if handed_out < job.base_keyspace {
            return Ok(Some(None));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashfleet_db::{connect_memory, DbPool, HashlistRepo, NewJobExecution};
    use hashfleet_protocol::{AttackMode, IncrementMode};

    async fn setup() -> (AgentScheduler, DbPool) {
        let pool = connect_memory().await.unwrap();
        HashlistRepo::new(pool.clone())
            .create("hl", "hl", None, 0, false, "hashlists/hl.hash")
            .await
            .unwrap();
        let scheduler = AgentScheduler::new(
            AgentRepo::new(pool.clone()),
            JobRepo::new(pool.clone()),
            JobLayerRepo::new(pool.clone()),
            TaskRepo::new(pool.clone()),
        );
        (scheduler, pool)
    }

    fn job(priority: i64, max_agents: i64) -> NewJobExecution {
        NewJobExecution {
            preset_job_id: None,
            hashlist_id: "hl".into(),
            attack_mode: AttackMode::Straight,
            binary_version_id: None,
            priority,
            chunk_size_seconds: 600,
            wordlist_ids: vec!["w1".into()],
            rule_ids: vec![],
            mask: None,
            base_keyspace: 1_000_000,
            effective_keyspace: 1_000_000,
            is_accurate_keyspace: true,
            uses_rule_splitting: false,
            multiplication_factor: 1,
            increment_mode: IncrementMode::Off,
            increment_min: None,
            increment_max: None,
            max_agents,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn all_agents_go_to_highest_priority_job() {
        let (scheduler, pool) = setup().await;
        let agents = AgentRepo::new(pool.clone());
        agents.register("a1", "a1", None, None).await.unwrap();
        agents.register("a2", "a2", None, None).await.unwrap();

        let jobs = JobRepo::new(pool.clone());
        jobs.create("low", &job(1, 0)).await.unwrap();
        jobs.create("high", &job(9, 0)).await.unwrap();

        let reservations = scheduler.reserve().await.unwrap();
        assert_eq!(reservations.len(), 2);
        assert!(reservations.iter().all(|r| r.job_id == "high"));
    }

    #[tokio::test]
    async fn max_agents_caps_spill_to_next_job() {
        let (scheduler, pool) = setup().await;
        let agents = AgentRepo::new(pool.clone());
        for i in 0..3 {
            agents
                .register(&format!("a{}", i), &format!("a{}", i), None, None)
                .await
                .unwrap();
        }

        let jobs = JobRepo::new(pool.clone());
        jobs.create("capped", &job(9, 2)).await.unwrap();
        jobs.create("spill", &job(1, 0)).await.unwrap();

        let reservations = scheduler.reserve().await.unwrap();
        let capped = reservations.iter().filter(|r| r.job_id == "capped").count();
        let spill = reservations.iter().filter(|r| r.job_id == "spill").count();
        assert_eq!(capped, 2);
        assert_eq!(spill, 1);
    }

    #[tokio::test]
    async fn exhausted_job_reserves_nothing() {
        let (scheduler, pool) = setup().await;
        AgentRepo::new(pool.clone())
            .register("a1", "a1", None, None)
            .await
            .unwrap();

        let jobs = JobRepo::new(pool.clone());
        jobs.create("done", &job(5, 0)).await.unwrap();
        // The full base keyspace is already handed out.
        TaskRepo::new(pool.clone())
            .create(
                &hashfleet_db::NewJobTask {
                    id: "t1".into(),
                    job_execution_id: "done".into(),
                    increment_layer_id: None,
                    agent_id: None,
                    chunk_number: 1,
                    chunk_duration: 600,
                    benchmark_speed: None,
                    attack_cmd: "-a 0".into(),
                    keyspace_start: 0,
                    keyspace_end: 1_000_000,
                    keyspace_processed: 1_000_000,
                    effective_keyspace_start: 0,
                    effective_keyspace_end: 1_000_000,
                    is_keyspace_split: false,
                    is_rule_split_task: false,
                    rule_start_index: None,
                    rule_end_index: None,
                    rule_chunk_path: None,
                },
                hashfleet_protocol::TaskStatus::Completed,
            )
            .await
            .unwrap();

        assert!(scheduler.reserve().await.unwrap().is_empty());
    }
}
