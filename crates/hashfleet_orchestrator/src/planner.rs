//! Chunk planning.
//!
//! Turns (agent, job-or-layer) reservations into non-overlapping keyspace or
//! rule-index slices. Plans are computed sequentially per job: the per-entry
//! base-keyspace tracker is seeded from the database exactly once per cycle
//! and advanced in memory afterwards, so concurrent reservations can never
//! observe the same starting position.

use anyhow::{Context, Result};
use hashfleet_db::models::{Hashlist, JobExecution, JobIncrementLayer};
use hashfleet_db::{
    FileResourceRepo, HashlistRepo, JobLayerRepo, JobRepo, TaskRepo,
};
use hashfleet_ids::TaskId;
use hashfleet_protocol::{AttackMode, JobStatus};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::benchmark::BenchmarkStore;
use crate::config::OrchestratorConfig;
use crate::scheduler::Reservation;
use crate::settings::SystemSettings;

/// A fully computed chunk, ready for the dispatcher.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub task_id: String,
    pub agent_id: String,
    pub job_id: String,
    pub hashlist_id: String,
    pub layer_id: Option<String>,
    /// True when this plan reuses an existing pending task row.
    pub reuse_pending: bool,
    pub chunk_number: i64,
    pub chunk_duration: i64,
    pub benchmark_speed: i64,
    pub attack_cmd: String,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
    pub effective_keyspace_start: i64,
    pub effective_keyspace_end: i64,
    pub is_keyspace_split: bool,
    pub is_rule_split_task: bool,
    pub rule_start_index: Option<i64>,
    pub rule_end_index: Option<i64>,
    /// Server-relative path of the source rule file for rule-split tasks;
    /// the dispatcher substitutes the carved chunk path at execution time.
    pub rule_source_name: Option<String>,
}

impl TaskPlan {
    pub fn keyspace_size(&self) -> i64 {
        self.keyspace_end - self.keyspace_start
    }

    pub fn effective_size(&self) -> i64 {
        self.effective_keyspace_end - self.effective_keyspace_start
    }
}

/// Per-(job, layer) in-memory planning state for one cycle.
struct EntryState {
    next_base: i64,
    next_rule: i64,
    next_chunk: i64,
}

#[derive(Clone)]
pub struct ChunkPlanner {
    config: OrchestratorConfig,
    jobs: JobRepo,
    layers: JobLayerRepo,
    tasks: TaskRepo,
    hashlists: HashlistRepo,
    files: FileResourceRepo,
    benchmarks: BenchmarkStore,
    settings: SystemSettings,
}

impl ChunkPlanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        jobs: JobRepo,
        layers: JobLayerRepo,
        tasks: TaskRepo,
        hashlists: HashlistRepo,
        files: FileResourceRepo,
        benchmarks: BenchmarkStore,
        settings: SystemSettings,
    ) -> Self {
        Self {
            config,
            jobs,
            layers,
            tasks,
            hashlists,
            files,
            benchmarks,
            settings,
        }
    }

    /// Plan every reservation of the cycle, in order. Skipped reservations
    /// (missing benchmark, keyspace still calibrating, exhausted entry) are
    /// dropped without falling back to other jobs.
    pub async fn plan(&self, reservations: &[Reservation]) -> Result<Vec<TaskPlan>> {
        let fluctuation_pct = self.settings.chunk_fluctuation_percentage().await?;

        let mut states: HashMap<String, EntryState> = HashMap::new();
        let mut claimed_pending: HashSet<String> = HashSet::new();
        let mut plans = Vec::new();
        for reservation in reservations {
            match self
                .plan_reservation(reservation, fluctuation_pct, &mut states, &mut claimed_pending)
                .await
            {
                Ok(Some(plan)) => plans.push(plan),
                Ok(None) => {}
                Err(err) => warn!(
                    "planning failed for agent {} on job {}: {:#}",
                    reservation.agent_id, reservation.job_id, err
                ),
            }
        }
        Ok(plans)
    }

    async fn plan_reservation(
        &self,
        reservation: &Reservation,
        fluctuation_pct: i64,
        states: &mut HashMap<String, EntryState>,
        claimed_pending: &mut HashSet<String>,
    ) -> Result<Option<TaskPlan>> {
        let job = self.jobs.get(&reservation.job_id).await?;
        if !matches!(job.status(), JobStatus::Pending | JobStatus::Running) {
            return Ok(None);
        }
        let hashlist = self.hashlists.get(&job.hashlist_id).await?;
        let layer = match &reservation.layer_id {
            Some(layer_id) => Some(self.layers.get(layer_id).await?),
            None => None,
        };

        let salt_bucket = salt_bucket(&hashlist);

        // Benchmark gate: without a fresh exact benchmark the agent waits for
        // the next cycle, preserving FIFO across jobs.
        let speed = match self
            .benchmarks
            .fresh_exact(
                &reservation.agent_id,
                job.attack_mode(),
                hashlist.hash_type_id,
                salt_bucket,
            )
            .await?
        {
            Some(speed) => speed,
            None => {
                debug!(
                    "agent {} has no benchmark for job {} (hash type {}), skipping",
                    reservation.agent_id, job.id, hashlist.hash_type_id
                );
                return Ok(None);
            }
        };

        // Pending-task reassignment takes priority over fresh chunks. A
        // pending task claimed earlier in this cycle is not yet assigned in
        // the database, so the in-memory claim set keeps two reservations
        // from reusing the same row.
        if let Some(pending) = self
            .tasks
            .oldest_pending(&job.id, reservation.layer_id.as_deref())
            .await?
        {
            if claimed_pending.insert(pending.id.clone()) {
                let plan = self
                    .reuse_pending_task(&job, layer.as_ref(), reservation, pending, speed)
                    .await?;
                return Ok(Some(plan));
            }
        }

        // Keyspace calibration must have settled before fresh chunks go out.
        let accurate = layer
            .as_ref()
            .map(|l| l.is_accurate_keyspace)
            .unwrap_or(job.is_accurate_keyspace);
        if !accurate {
            debug!("job {} keyspace not yet accurate, skipping", job.id);
            return Ok(None);
        }

        let entry_key = match &reservation.layer_id {
            Some(layer_id) => format!("{}:{}", job.id, layer_id),
            None => job.id.clone(),
        };
        if !states.contains_key(&entry_key) {
            let seeded = EntryState {
                next_base: self
                    .tasks
                    .max_keyspace_end(&job.id, reservation.layer_id.as_deref())
                    .await?,
                next_rule: self.tasks.max_rule_end(&job.id).await?,
                next_chunk: self.tasks.max_chunk_number(&job.id).await? + 1,
            };
            states.insert(entry_key.clone(), seeded);
        }
        let state = states
            .get_mut(&entry_key)
            .context("planner state missing after seed")?;

        if job.uses_rule_splitting {
            self.plan_rule_chunk(&job, &hashlist, reservation, speed, fluctuation_pct, state)
                .await
        } else {
            self.plan_keyspace_chunk(
                &job,
                layer.as_ref(),
                &hashlist,
                reservation,
                speed,
                fluctuation_pct,
                state,
            )
            .await
        }
    }

    /// Reuse the oldest pending task, resuming from its checkpoint when the
    /// previous owner made progress.
    async fn reuse_pending_task(
        &self,
        job: &JobExecution,
        layer: Option<&JobIncrementLayer>,
        reservation: &Reservation,
        pending: hashfleet_db::models::JobTask,
        speed: i64,
    ) -> Result<TaskPlan> {
        let mut keyspace_start = pending.keyspace_start;
        let mut effective_start = pending.effective_keyspace_start;
        let mut is_split = pending.is_keyspace_split;

        if pending.keyspace_processed > pending.keyspace_start {
            // Resume at the checkpoint; scale the effective start by the
            // consumed fraction of the base range.
            let consumed = pending.keyspace_processed - pending.keyspace_start;
            let base_size = (pending.keyspace_end - pending.keyspace_start).max(1);
            let effective_size =
                pending.effective_keyspace_end - pending.effective_keyspace_start;
            effective_start = pending.effective_keyspace_start
                + scale(consumed, effective_size, base_size);
            keyspace_start = pending.keyspace_processed;
            is_split = true;
        }

        let attack_cmd = self
            .build_attack_cmd(
                job,
                layer,
                keyspace_start,
                pending.keyspace_end,
                is_split,
            )
            .await?;

        debug!(
            "reassigning pending task {} (chunk {}) to agent {}",
            pending.id, pending.chunk_number, reservation.agent_id
        );
        Ok(TaskPlan {
            task_id: pending.id.clone(),
            agent_id: reservation.agent_id.clone(),
            job_id: job.id.clone(),
            hashlist_id: job.hashlist_id.clone(),
            layer_id: pending.increment_layer_id.clone(),
            reuse_pending: true,
            chunk_number: pending.chunk_number,
            chunk_duration: pending.chunk_duration,
            benchmark_speed: speed,
            attack_cmd,
            keyspace_start,
            keyspace_end: pending.keyspace_end,
            effective_keyspace_start: effective_start,
            effective_keyspace_end: pending.effective_keyspace_end,
            is_keyspace_split: is_split,
            is_rule_split_task: pending.is_rule_split_task,
            rule_start_index: pending.rule_start_index,
            rule_end_index: pending.rule_end_index,
            rule_source_name: self.rule_source_name(job).await?,
        })
    }

    async fn plan_rule_chunk(
        &self,
        job: &JobExecution,
        hashlist: &Hashlist,
        reservation: &Reservation,
        speed: i64,
        fluctuation_pct: i64,
        state: &mut EntryState,
    ) -> Result<Option<TaskPlan>> {
        let total_rules = job.multiplication_factor.max(1);
        if state.next_rule >= total_rules {
            return Ok(None);
        }

        let effective_per_rule = (job.effective_keyspace / total_rules).max(1);
        let mut cost_per_rule = effective_per_rule;
        if hashlist.is_salted {
            cost_per_rule = cost_per_rule.saturating_mul(hashlist.uncracked_count().max(1));
        }

        let budget = (job.chunk_size_seconds as i128) * (speed as i128);
        let rules_per_chunk = ((budget / cost_per_rule as i128) as i64).max(1);

        let rule_start = state.next_rule;
        let mut rule_end = (rule_start + rules_per_chunk).min(total_rules);
        if remainder_within_fluctuation(total_rules - rule_end, rules_per_chunk, fluctuation_pct) {
            rule_end = total_rules;
        }

        let effective_start = rule_start * effective_per_rule;
        let effective_end = if rule_end == total_rules {
            job.effective_keyspace
        } else {
            rule_end * effective_per_rule
        };

        let attack_cmd = self
            .build_attack_cmd(job, None, 0, job.base_keyspace, false)
            .await?;

        let chunk_number = state.next_chunk;
        state.next_chunk += 1;
        state.next_rule = rule_end;

        Ok(Some(TaskPlan {
            task_id: TaskId::new().to_string(),
            agent_id: reservation.agent_id.clone(),
            job_id: job.id.clone(),
            hashlist_id: job.hashlist_id.clone(),
            layer_id: None,
            reuse_pending: false,
            chunk_number,
            chunk_duration: job.chunk_size_seconds,
            benchmark_speed: speed,
            attack_cmd,
            keyspace_start: 0,
            keyspace_end: job.base_keyspace,
            effective_keyspace_start: effective_start,
            effective_keyspace_end: effective_end,
            is_keyspace_split: false,
            is_rule_split_task: true,
            rule_start_index: Some(rule_start),
            rule_end_index: Some(rule_end),
            rule_source_name: self.rule_source_name(job).await?,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn plan_keyspace_chunk(
        &self,
        job: &JobExecution,
        layer: Option<&JobIncrementLayer>,
        hashlist: &Hashlist,
        reservation: &Reservation,
        speed: i64,
        fluctuation_pct: i64,
        state: &mut EntryState,
    ) -> Result<Option<TaskPlan>> {
        let (total_base, total_effective, effective_offset) = match layer {
            Some(layer) => (
                layer.base_keyspace,
                layer.effective_keyspace,
                self.layers
                    .effective_offset_before(&job.id, layer.layer_index)
                    .await?,
            ),
            None => (job.base_keyspace, job.effective_keyspace, 0),
        };
        if state.next_base >= total_base {
            return Ok(None);
        }

        // Salted speeds are candidates x salts per second; divide down to a
        // candidate rate, then convert effective-units to base-units.
        let mut candidate_rate = speed as f64;
        if hashlist.is_salted {
            candidate_rate /= hashlist.uncracked_count().max(1) as f64;
        }
        let base_rate = if total_effective > 0 {
            candidate_rate * (total_base as f64 / total_effective as f64)
        } else {
            candidate_rate
        };

        let chunk_size = ((job.chunk_size_seconds as f64 * base_rate).ceil() as i64).max(1);
        let keyspace_start = state.next_base;
        let mut keyspace_end = keyspace_start.saturating_add(chunk_size).min(total_base);
        if remainder_within_fluctuation(total_base - keyspace_end, chunk_size, fluctuation_pct) {
            keyspace_end = total_base;
        }

        let is_keyspace_split = keyspace_start > 0 || keyspace_end < total_base;
        let effective_start = effective_offset + scale(keyspace_start, total_effective, total_base);
        let effective_end = if keyspace_end == total_base {
            effective_offset + total_effective
        } else {
            effective_offset + scale(keyspace_end, total_effective, total_base)
        };

        let attack_cmd = self
            .build_attack_cmd(job, layer, keyspace_start, keyspace_end, is_keyspace_split)
            .await?;

        let chunk_number = state.next_chunk;
        state.next_chunk += 1;
        state.next_base = keyspace_end;

        Ok(Some(TaskPlan {
            task_id: TaskId::new().to_string(),
            agent_id: reservation.agent_id.clone(),
            job_id: job.id.clone(),
            hashlist_id: job.hashlist_id.clone(),
            layer_id: layer.map(|l| l.id.clone()),
            reuse_pending: false,
            chunk_number,
            chunk_duration: job.chunk_size_seconds,
            benchmark_speed: speed,
            attack_cmd,
            keyspace_start,
            keyspace_end,
            effective_keyspace_start: effective_start,
            effective_keyspace_end: effective_end,
            is_keyspace_split,
            is_rule_split_task: false,
            rule_start_index: None,
            rule_end_index: None,
            rule_source_name: None,
        }))
    }

    /// Agent-relative source rule path for rule-split jobs.
    async fn rule_source_name(&self, job: &JobExecution) -> Result<Option<String>> {
        if !job.uses_rule_splitting {
            return Ok(None);
        }
        let rules = self.files.get_many(&job.rule_id_vec()).await?;
        Ok(rules.first().map(|r| format!("rules/{}", r.name)))
    }

    /// Build the binary invocation for a chunk, with agent-relative paths.
    /// Rule-split tasks carry the *source* rule path here; the dispatcher
    /// substitutes the carved chunk path.
    async fn build_attack_cmd(
        &self,
        job: &JobExecution,
        layer: Option<&JobIncrementLayer>,
        keyspace_start: i64,
        keyspace_end: i64,
        is_keyspace_split: bool,
    ) -> Result<String> {
        let hashlist = self.hashlists.get(&job.hashlist_id).await?;
        let wordlists = self.files.get_many(&job.wordlist_id_vec()).await?;
        let rules = self.files.get_many(&job.rule_id_vec()).await?;
        let mode = job.attack_mode();
        let mask = layer
            .map(|l| l.mask.clone())
            .or_else(|| job.mask.clone())
            .unwrap_or_default();

        let mut parts = vec![
            format!("-m {}", hashlist.hash_type_id),
            format!("-a {}", mode.binary_code()),
            self.config.hashlist_rel_path(&job.hashlist_id),
        ];
        match mode {
            AttackMode::Straight => {
                parts.push(format!("wordlists/{}", wordlists[0].name));
                for rule in &rules {
                    parts.push(format!("-r rules/{}", rule.name));
                }
            }
            AttackMode::Combination => {
                parts.push(format!("wordlists/{}", wordlists[0].name));
                parts.push(format!("wordlists/{}", wordlists[1].name));
            }
            AttackMode::BruteForce => parts.push(mask),
            AttackMode::HybridWordlistMask => {
                parts.push(format!("wordlists/{}", wordlists[0].name));
                parts.push(mask);
            }
            AttackMode::HybridMaskWordlist => {
                parts.push(mask);
                parts.push(format!("wordlists/{}", wordlists[0].name));
            }
            AttackMode::Association => {
                anyhow::bail!("attack mode association is not supported")
            }
        }

        if is_keyspace_split {
            parts.push(format!("--skip {}", keyspace_start));
            parts.push(format!("--limit {}", keyspace_end - keyspace_start));
        }

        Ok(parts.join(" "))
    }
}

fn salt_bucket(hashlist: &Hashlist) -> Option<i64> {
    if hashlist.is_salted {
        Some(hashlist.uncracked_count())
    } else {
        None
    }
}

/// `value * numerator / denominator` without intermediate overflow.
pub(crate) fn scale(value: i64, numerator: i64, denominator: i64) -> i64 {
    if denominator <= 0 {
        return 0;
    }
    ((value as i128 * numerator as i128) / denominator as i128) as i64
}

/// The fluctuation merge rule: a trailing remainder at or below the threshold
/// percentage of the nominal chunk size is absorbed into this chunk.
fn remainder_within_fluctuation(remainder: i64, chunk_size: i64, fluctuation_pct: i64) -> bool {
    remainder > 0 && remainder as i128 * 100 <= chunk_size as i128 * fluctuation_pct as i128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_handles_large_products() {
        assert_eq!(scale(5_000_000_000, 4_000_000_000, 8_000_000_000), 2_500_000_000);
        assert_eq!(scale(10, 100, 0), 0);
    }

    #[test]
    fn fluctuation_threshold_is_inclusive() {
        // 20% of 1000 = 200: a 200-wide remainder merges, 201 does not.
        assert!(remainder_within_fluctuation(200, 1000, 20));
        assert!(!remainder_within_fluctuation(201, 1000, 20));
        assert!(!remainder_within_fluctuation(0, 1000, 20));
    }
}
