//! Job execution storage.

use chrono::{DateTime, Utc};
use hashfleet_protocol::{AttackMode, IncrementMode, JobStatus};

use crate::error::{DbError, Result};
use crate::models::JobExecution;
use crate::pool::DbPool;

/// Fields supplied when instantiating a preset into a job execution.
#[derive(Debug, Clone)]
pub struct NewJobExecution {
    pub preset_job_id: Option<String>,
    pub hashlist_id: String,
    pub attack_mode: AttackMode,
    pub binary_version_id: Option<String>,
    pub priority: i64,
    pub chunk_size_seconds: i64,
    pub wordlist_ids: Vec<String>,
    pub rule_ids: Vec<String>,
    pub mask: Option<String>,
    pub base_keyspace: i64,
    pub effective_keyspace: i64,
    pub is_accurate_keyspace: bool,
    pub uses_rule_splitting: bool,
    pub multiplication_factor: i64,
    pub increment_mode: IncrementMode,
    pub increment_min: Option<i64>,
    pub increment_max: Option<i64>,
    pub max_agents: i64,
    pub created_by: Option<String>,
}

#[derive(Clone)]
pub struct JobRepo {
    pool: DbPool,
}

impl JobRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, id: &str, job: &NewJobExecution) -> Result<JobExecution> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO job_executions (
                id, preset_job_id, hashlist_id, attack_mode, binary_version_id,
                priority, chunk_size_seconds, status, wordlist_ids, rule_ids, mask,
                base_keyspace, total_keyspace, effective_keyspace,
                is_accurate_keyspace, uses_rule_splitting, multiplication_factor,
                increment_mode, increment_min, increment_max, max_agents,
                created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&job.preset_job_id)
        .bind(&job.hashlist_id)
        .bind(job.attack_mode.as_str())
        .bind(&job.binary_version_id)
        .bind(job.priority)
        .bind(job.chunk_size_seconds)
        .bind(serde_json::to_string(&job.wordlist_ids)?)
        .bind(serde_json::to_string(&job.rule_ids)?)
        .bind(&job.mask)
        .bind(job.base_keyspace)
        .bind(job.base_keyspace)
        .bind(job.effective_keyspace)
        .bind(job.is_accurate_keyspace)
        .bind(job.uses_rule_splitting)
        .bind(job.multiplication_factor)
        .bind(job.increment_mode.as_str())
        .bind(job.increment_min)
        .bind(job.increment_max)
        .bind(job.max_agents)
        .bind(&job.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    pub async fn get(&self, id: &str) -> Result<JobExecution> {
        sqlx::query_as("SELECT * FROM job_executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::missing("job execution", id))
    }

    pub async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobExecution>> {
        Ok(sqlx::query_as(
            "SELECT * FROM job_executions WHERE status = ? ORDER BY priority DESC, created_at",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Jobs eligible for scheduling, highest priority first, FIFO within a
    /// priority level.
    pub async fn list_schedulable(&self) -> Result<Vec<JobExecution>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM job_executions
            WHERE status IN ('pending', 'running')
            ORDER BY priority DESC, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Every job bound to a hashlist, terminal or not.
    pub async fn list_for_hashlist(&self, hashlist_id: &str) -> Result<Vec<JobExecution>> {
        Ok(sqlx::query_as(
            "SELECT * FROM job_executions WHERE hashlist_id = ? ORDER BY created_at",
        )
        .bind(hashlist_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Non-terminal jobs bound to a hashlist.
    pub async fn list_open_for_hashlist(&self, hashlist_id: &str) -> Result<Vec<JobExecution>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM job_executions
            WHERE hashlist_id = ? AND status NOT IN ('completed', 'failed')
            ORDER BY created_at
            "#,
        )
        .bind(hashlist_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Jobs in `running` whose row has not been touched since the cutoff.
    pub async fn list_running_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobExecution>> {
        Ok(sqlx::query_as(
            "SELECT * FROM job_executions WHERE status = 'running' AND updated_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn set_status(&self, id: &str, status: JobStatus) -> Result<()> {
        sqlx::query("UPDATE job_executions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Transition to running only if the job is still pending. Returns true
    /// when the transition happened.
    pub async fn start_if_pending(&self, id: &str) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE job_executions SET status = 'running', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE job_executions SET status = 'failed', error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_completed(&self, id: &str, progress_percent: f64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET status = 'completed', overall_progress_percent = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(progress_percent)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_dispatched_keyspace(&self, id: &str, delta: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET dispatched_keyspace = dispatched_keyspace + ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(delta)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_processed_keyspace(&self, id: &str, processed: i64, percent: f64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET processed_keyspace = ?, overall_progress_percent = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(processed)
        .bind(percent)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store computed keyspace totals (used after increment-layer expansion).
    pub async fn set_keyspace_totals(
        &self,
        id: &str,
        base_keyspace: i64,
        effective_keyspace: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET base_keyspace = ?, total_keyspace = ?, effective_keyspace = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(base_keyspace)
        .bind(base_keyspace)
        .bind(effective_keyspace)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Align `effective_keyspace` with what the tasks actually covered.
    pub async fn sync_effective_keyspace(&self, id: &str, effective: i64) -> Result<()> {
        sqlx::query(
            "UPDATE job_executions SET effective_keyspace = ?, updated_at = ? WHERE id = ?",
        )
        .bind(effective)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump the consecutive-failure counter and return the new value.
    pub async fn bump_consecutive_failures(&self, id: &str) -> Result<i64> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET consecutive_failures = consecutive_failures + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(
            sqlx::query_scalar("SELECT consecutive_failures FROM job_executions WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn reset_consecutive_failures(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE job_executions SET consecutive_failures = 0, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn touch(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE job_executions SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM job_executions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_memory;
    use crate::repo::hashlists::HashlistRepo;

    async fn setup() -> (JobRepo, DbPool) {
        let pool = connect_memory().await.unwrap();
        HashlistRepo::new(pool.clone())
            .create("hl", "hl", None, 0, false, "hashlists/hl.hash")
            .await
            .unwrap();
        (JobRepo::new(pool.clone()), pool)
    }

    fn new_job(hashlist: &str) -> NewJobExecution {
        NewJobExecution {
            preset_job_id: None,
            hashlist_id: hashlist.to_string(),
            attack_mode: AttackMode::Straight,
            binary_version_id: None,
            priority: 0,
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
            max_agents: 0,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn start_if_pending_is_one_shot() {
        let (repo, _pool) = setup().await;
        repo.create("j1", &new_job("hl")).await.unwrap();

        assert!(repo.start_if_pending("j1").await.unwrap());
        assert!(!repo.start_if_pending("j1").await.unwrap());
        assert_eq!(repo.get("j1").await.unwrap().status(), JobStatus::Running);
    }

    #[tokio::test]
    async fn schedulable_ordering_is_priority_then_fifo() {
        let (repo, _pool) = setup().await;
        let mut low = new_job("hl");
        low.priority = 1;
        let mut high = new_job("hl");
        high.priority = 5;

        repo.create("j-low", &low).await.unwrap();
        repo.create("j-high", &high).await.unwrap();

        let jobs = repo.list_schedulable().await.unwrap();
        assert_eq!(jobs[0].id, "j-high");
        assert_eq!(jobs[1].id, "j-low");
    }

    #[tokio::test]
    async fn failure_counter_roundtrip() {
        let (repo, _pool) = setup().await;
        repo.create("j1", &new_job("hl")).await.unwrap();
        assert_eq!(repo.bump_consecutive_failures("j1").await.unwrap(), 1);
        assert_eq!(repo.bump_consecutive_failures("j1").await.unwrap(), 2);
        repo.reset_consecutive_failures("j1").await.unwrap();
        assert_eq!(repo.get("j1").await.unwrap().consecutive_failures, 0);
    }
}
