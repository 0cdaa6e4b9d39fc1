//! Typed accessors over the system settings store.

use hashfleet_db::{Result, SettingsRepo};
use hashfleet_protocol::defaults;

/// Reads settings per call so admin changes apply on the next cycle.
#[derive(Clone)]
pub struct SystemSettings {
    repo: SettingsRepo,
}

impl SystemSettings {
    pub fn new(repo: SettingsRepo) -> Self {
        Self { repo }
    }

    pub async fn max_job_priority(&self) -> Result<i64> {
        self.repo
            .get_i64(
                defaults::KEY_MAX_JOB_PRIORITY,
                defaults::DEFAULT_MAX_JOB_PRIORITY,
            )
            .await
    }

    pub async fn benchmark_cache_duration_hours(&self) -> Result<i64> {
        self.repo
            .get_i64(
                defaults::KEY_BENCHMARK_CACHE_DURATION_HOURS,
                defaults::DEFAULT_BENCHMARK_CACHE_DURATION_HOURS,
            )
            .await
    }

    pub async fn chunk_fluctuation_percentage(&self) -> Result<i64> {
        self.repo
            .get_i64(
                defaults::KEY_CHUNK_FLUCTUATION_PERCENTAGE,
                defaults::DEFAULT_CHUNK_FLUCTUATION_PERCENTAGE,
            )
            .await
    }

    /// Heartbeat timeout, with `task_timeout_minutes` as a legacy fallback
    /// when the primary key is unset.
    pub async fn task_heartbeat_timeout_minutes(&self) -> Result<i64> {
        if let Some(value) = self.repo.get(defaults::KEY_TASK_HEARTBEAT_TIMEOUT_MINUTES).await? {
            if let Ok(parsed) = value.trim().parse() {
                return Ok(parsed);
            }
        }
        self.repo
            .get_i64(
                defaults::KEY_TASK_TIMEOUT_MINUTES,
                defaults::DEFAULT_TASK_HEARTBEAT_TIMEOUT_MINUTES,
            )
            .await
    }

    pub async fn reconnect_grace_period_minutes(&self) -> Result<i64> {
        self.repo
            .get_i64(
                defaults::KEY_RECONNECT_GRACE_PERIOD_MINUTES,
                defaults::DEFAULT_RECONNECT_GRACE_PERIOD_MINUTES,
            )
            .await
    }

    pub async fn max_chunk_retry_attempts(&self) -> Result<i64> {
        self.repo
            .get_i64(
                defaults::KEY_MAX_CHUNK_RETRY_ATTEMPTS,
                defaults::DEFAULT_MAX_CHUNK_RETRY_ATTEMPTS,
            )
            .await
    }

    pub async fn agent_hashlist_retention_hours(&self) -> Result<i64> {
        self.repo
            .get_i64(
                defaults::KEY_AGENT_HASHLIST_RETENTION_HOURS,
                defaults::DEFAULT_AGENT_HASHLIST_RETENTION_HOURS,
            )
            .await
    }

    pub async fn agent_offline_buffer_minutes(&self) -> Result<i64> {
        self.repo
            .get_i64(
                defaults::KEY_AGENT_OFFLINE_BUFFER_MINUTES,
                defaults::DEFAULT_AGENT_OFFLINE_BUFFER_MINUTES,
            )
            .await
    }
}
