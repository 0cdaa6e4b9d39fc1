//! Benchmark lookup with estimation fallback.
//!
//! For salted hash types the stored speed is candidates x salt count per
//! second, as the binary reports it; the planner divides by the current
//! uncracked-hash count to recover a true candidate rate.

use anyhow::Result;
use chrono::{Duration, Utc};
use hashfleet_protocol::AttackMode;

use crate::settings::SystemSettings;
use hashfleet_db::BenchmarkRepo;

/// Baseline for agents that have never benchmarked anything.
pub const DEFAULT_BASELINE_SPEED: i64 = 1_000_000;

/// Attack-mode scaling applied to averaged and default speeds.
pub fn attack_mode_modifier(mode: AttackMode) -> f64 {
    match mode {
        AttackMode::Straight => 1.2,
        AttackMode::Combination => 1.0,
        AttackMode::BruteForce => 0.8,
        AttackMode::HybridWordlistMask | AttackMode::HybridMaskWordlist => 0.6,
        AttackMode::Association => 0.5,
    }
}

#[derive(Clone)]
pub struct BenchmarkStore {
    repo: BenchmarkRepo,
    settings: SystemSettings,
}

impl BenchmarkStore {
    pub fn new(repo: BenchmarkRepo, settings: SystemSettings) -> Self {
        Self { repo, settings }
    }

    pub async fn record(
        &self,
        agent_id: &str,
        mode: AttackMode,
        hash_type_id: i64,
        salt_count_bucket: Option<i64>,
        speed: i64,
    ) -> Result<()> {
        self.repo
            .upsert(agent_id, mode, hash_type_id, salt_count_bucket, speed)
            .await?;
        Ok(())
    }

    /// Fresh exact-key speed, if one exists. The planner's benchmark gate
    /// uses this: no fresh exact benchmark means the assignment is skipped.
    pub async fn fresh_exact(
        &self,
        agent_id: &str,
        mode: AttackMode,
        hash_type_id: i64,
        salt_count_bucket: Option<i64>,
    ) -> Result<Option<i64>> {
        let ttl_hours = self.settings.benchmark_cache_duration_hours().await?;
        let cutoff = Utc::now() - Duration::hours(ttl_hours);

        let bench = self
            .repo
            .get_exact(agent_id, mode, hash_type_id, salt_count_bucket)
            .await?;
        Ok(bench.filter(|b| b.observed_at >= cutoff).map(|b| b.speed))
    }

    /// Exact speed when fresh, otherwise an estimate: the agent's recent
    /// average scaled by the attack-mode modifier, or a scaled baseline when
    /// the agent has no benchmarks at all.
    pub async fn get_or_estimate(
        &self,
        agent_id: &str,
        mode: AttackMode,
        hash_type_id: i64,
        salt_count_bucket: Option<i64>,
    ) -> Result<i64> {
        if let Some(speed) = self
            .fresh_exact(agent_id, mode, hash_type_id, salt_count_bucket)
            .await?
        {
            return Ok(speed);
        }

        let ttl_hours = self.settings.benchmark_cache_duration_hours().await?;
        let cutoff = Utc::now() - Duration::hours(ttl_hours);
        let recent = self.repo.list_recent_for_agent(agent_id, cutoff).await?;

        let modifier = attack_mode_modifier(mode);
        if recent.is_empty() {
            return Ok((DEFAULT_BASELINE_SPEED as f64 * modifier) as i64);
        }

        let average = recent.iter().map(|b| b.speed).sum::<i64>() / recent.len() as i64;
        Ok(((average as f64) * modifier) as i64)
    }
}
