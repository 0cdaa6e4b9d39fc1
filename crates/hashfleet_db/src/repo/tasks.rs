//! Job task storage.

use chrono::{DateTime, Utc};
use hashfleet_protocol::TaskStatus;

use crate::error::{DbError, Result};
use crate::models::JobTask;
use crate::pool::DbPool;

/// Fields supplied when persisting a planned chunk.
#[derive(Debug, Clone)]
pub struct NewJobTask {
    pub id: String,
    pub job_execution_id: String,
    pub increment_layer_id: Option<String>,
    pub agent_id: Option<String>,
    pub chunk_number: i64,
    pub chunk_duration: i64,
    pub benchmark_speed: Option<i64>,
    pub attack_cmd: String,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
    pub keyspace_processed: i64,
    pub effective_keyspace_start: i64,
    pub effective_keyspace_end: i64,
    pub is_keyspace_split: bool,
    pub is_rule_split_task: bool,
    pub rule_start_index: Option<i64>,
    pub rule_end_index: Option<i64>,
    pub rule_chunk_path: Option<String>,
}

#[derive(Clone)]
pub struct TaskRepo {
    pool: DbPool,
}

impl TaskRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task: &NewJobTask, status: TaskStatus) -> Result<JobTask> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO job_tasks (
                id, job_execution_id, increment_layer_id, agent_id, status,
                chunk_number, chunk_duration, benchmark_speed, attack_cmd,
                keyspace_start, keyspace_end, keyspace_processed,
                effective_keyspace_start, effective_keyspace_end,
                is_keyspace_split, is_rule_split_task,
                rule_start_index, rule_end_index, rule_chunk_path,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.job_execution_id)
        .bind(&task.increment_layer_id)
        .bind(&task.agent_id)
        .bind(status.as_str())
        .bind(task.chunk_number)
        .bind(task.chunk_duration)
        .bind(task.benchmark_speed)
        .bind(&task.attack_cmd)
        .bind(task.keyspace_start)
        .bind(task.keyspace_end)
        .bind(task.keyspace_processed)
        .bind(task.effective_keyspace_start)
        .bind(task.effective_keyspace_end)
        .bind(task.is_keyspace_split)
        .bind(task.is_rule_split_task)
        .bind(task.rule_start_index)
        .bind(task.rule_end_index)
        .bind(&task.rule_chunk_path)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(&task.id).await
    }

    pub async fn get(&self, id: &str) -> Result<JobTask> {
        sqlx::query_as("SELECT * FROM job_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::missing("task", id))
    }

    pub async fn list_for_job(&self, job_execution_id: &str) -> Result<Vec<JobTask>> {
        Ok(sqlx::query_as(
            "SELECT * FROM job_tasks WHERE job_execution_id = ? ORDER BY chunk_number",
        )
        .bind(job_execution_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Active tasks (assigned/running/reconnect_pending) for a job.
    pub async fn list_active_for_job(&self, job_execution_id: &str) -> Result<Vec<JobTask>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM job_tasks
            WHERE job_execution_id = ?
              AND status IN ('assigned', 'running', 'reconnect_pending')
            ORDER BY chunk_number
            "#,
        )
        .bind(job_execution_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_active_for_job(&self, job_execution_id: &str) -> Result<i64> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM job_tasks
            WHERE job_execution_id = ?
              AND status IN ('assigned', 'running', 'reconnect_pending')
            "#,
        )
        .bind(job_execution_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// The task currently occupying an agent, if any.
    pub async fn active_for_agent(&self, agent_id: &str) -> Result<Option<JobTask>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM job_tasks
            WHERE agent_id = ? AND status IN ('assigned', 'running', 'processing')
            LIMIT 1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Tasks an agent left behind when it disconnected.
    pub async fn open_tasks_for_agent(&self, agent_id: &str) -> Result<Vec<JobTask>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM job_tasks
            WHERE agent_id = ? AND status IN ('assigned', 'running')
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Tasks parked in reconnect_pending for an agent.
    pub async fn parked_tasks_for_agent(&self, agent_id: &str) -> Result<Vec<JobTask>> {
        Ok(sqlx::query_as(
            "SELECT * FROM job_tasks WHERE agent_id = ? AND status = 'reconnect_pending'",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Oldest pending task for a job (or a specific layer), used for
    /// reassignment before planning fresh chunks.
    pub async fn oldest_pending(
        &self,
        job_execution_id: &str,
        increment_layer_id: Option<&str>,
    ) -> Result<Option<JobTask>> {
        let task = match increment_layer_id {
            Some(layer_id) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM job_tasks
                    WHERE job_execution_id = ? AND increment_layer_id = ? AND status = 'pending'
                    ORDER BY created_at
                    LIMIT 1
                    "#,
                )
                .bind(job_execution_id)
                .bind(layer_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM job_tasks
                    WHERE job_execution_id = ? AND status = 'pending'
                    ORDER BY created_at
                    LIMIT 1
                    "#,
                )
                .bind(job_execution_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(task)
    }

    /// Highest `keyspace_end` over non-cancelled tasks of a job/layer. Seeds
    /// the planner's in-memory tracker exactly once per cycle.
    pub async fn max_keyspace_end(
        &self,
        job_execution_id: &str,
        increment_layer_id: Option<&str>,
    ) -> Result<i64> {
        let max: Option<i64> = match increment_layer_id {
            Some(layer_id) => {
                sqlx::query_scalar(
                    r#"
                    SELECT MAX(keyspace_end) FROM job_tasks
                    WHERE job_execution_id = ? AND increment_layer_id = ? AND status != 'cancelled'
                    "#,
                )
                .bind(job_execution_id)
                .bind(layer_id)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    SELECT MAX(keyspace_end) FROM job_tasks
                    WHERE job_execution_id = ? AND status != 'cancelled'
                    "#,
                )
                .bind(job_execution_id)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(max.unwrap_or(0))
    }

    /// Highest chunk number allocated for a job so far.
    pub async fn max_chunk_number(&self, job_execution_id: &str) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(chunk_number) FROM job_tasks WHERE job_execution_id = ?",
        )
        .bind(job_execution_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0))
    }

    /// Highest rule index handed out so far for a rule-split job.
    pub async fn max_rule_end(&self, job_execution_id: &str) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(rule_end_index) FROM job_tasks
            WHERE job_execution_id = ? AND is_rule_split_task = 1 AND status != 'cancelled'
            "#,
        )
        .bind(job_execution_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0))
    }

    pub async fn set_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        sqlx::query("UPDATE job_tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Hand a (possibly reused) task to an agent.
    pub async fn assign(
        &self,
        id: &str,
        agent_id: &str,
        benchmark_speed: Option<i64>,
        keyspace_start: i64,
        effective_keyspace_start: i64,
        is_keyspace_split: bool,
        attack_cmd: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET agent_id = ?, status = 'assigned', benchmark_speed = ?,
                keyspace_start = ?, effective_keyspace_start = ?,
                is_keyspace_split = ?, attack_cmd = ?,
                grace_deadline = NULL, assigned_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(agent_id)
        .bind(benchmark_speed)
        .bind(keyspace_start)
        .bind(effective_keyspace_start)
        .bind(is_keyspace_split)
        .bind(attack_cmd)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record an agent progress report.
    pub async fn record_progress(
        &self,
        id: &str,
        keyspace_processed: i64,
        effective_keyspace_processed: i64,
        benchmark_speed: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'running',
                keyspace_processed = MAX(keyspace_processed, ?),
                effective_keyspace_processed = MAX(effective_keyspace_processed, ?),
                benchmark_speed = COALESCE(?, benchmark_speed),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(keyspace_processed)
        .bind(effective_keyspace_processed)
        .bind(benchmark_speed)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Park a task while its agent is gone; the grace deadline decides when
    /// the reconciler gives up on the reconnect.
    pub async fn park_for_reconnect(&self, id: &str, grace_deadline: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'reconnect_pending', grace_deadline = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(grace_deadline.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Restore a parked task to its pre-disconnect state.
    pub async fn resume_from_reconnect(&self, id: &str, status: TaskStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = ?, grace_deadline = NULL, updated_at = ?
            WHERE id = ? AND status = 'reconnect_pending'
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Push a task back to pending without touching the retry counter (used
    /// when dispatch itself failed, which is not the agent's fault).
    pub async fn requeue(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'pending', agent_id = NULL, grace_deadline = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Clear the agent and push the task back to pending with a bumped retry
    /// counter.
    pub async fn reset_for_retry(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'pending', agent_id = NULL, grace_deadline = NULL,
                retry_count = retry_count + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn bump_retransmit(&self, id: &str) -> Result<i64> {
        sqlx::query(
            "UPDATE job_tasks SET retransmit_count = retransmit_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(
            sqlx::query_scalar("SELECT retransmit_count FROM job_tasks WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn set_expected_cracks(&self, id: &str, expected: i64) -> Result<()> {
        sqlx::query("UPDATE job_tasks SET expected_crack_count = ?, updated_at = ? WHERE id = ?")
            .bind(expected)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_received_cracks(&self, id: &str, delta: i64) -> Result<()> {
        sqlx::query(
            "UPDATE job_tasks SET received_crack_count = received_crack_count + ?, updated_at = ? WHERE id = ?",
        )
        .bind(delta)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Force the chunk to its end position (used when a hashlist finishes
    /// while the task is still nominally running).
    pub async fn force_complete_keyspace(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_tasks
            SET keyspace_processed = keyspace_end,
                effective_keyspace_processed = effective_keyspace_end,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Running/assigned tasks whose row has been silent since the cutoff.
    pub async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobTask>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM job_tasks
            WHERE status IN ('assigned', 'running') AND updated_at < ?
            "#,
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Processing tasks silent since the cutoff.
    pub async fn list_stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobTask>> {
        Ok(sqlx::query_as(
            "SELECT * FROM job_tasks WHERE status = 'processing' AND updated_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Parked tasks whose grace window has expired.
    pub async fn list_expired_reconnect(&self, now: DateTime<Utc>) -> Result<Vec<JobTask>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM job_tasks
            WHERE status = 'reconnect_pending' AND grace_deadline IS NOT NULL AND grace_deadline < ?
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Tasks that were mid-flight when the process last stopped.
    pub async fn list_inflight(&self) -> Result<Vec<JobTask>> {
        Ok(sqlx::query_as(
            "SELECT * FROM job_tasks WHERE status IN ('assigned', 'running')",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn list_processing(&self) -> Result<Vec<JobTask>> {
        Ok(
            sqlx::query_as("SELECT * FROM job_tasks WHERE status = 'processing'")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Sum of effective chunk widths over completed tasks of a job.
    pub async fn sum_completed_effective(&self, job_execution_id: &str) -> Result<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(effective_keyspace_end - effective_keyspace_start)
            FROM job_tasks
            WHERE job_execution_id = ? AND status = 'completed'
            "#,
        )
        .bind(job_execution_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.unwrap_or(0))
    }

    /// Sum of processed effective keyspace over non-cancelled tasks.
    pub async fn sum_effective_processed(&self, job_execution_id: &str) -> Result<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(effective_keyspace_processed)
            FROM job_tasks
            WHERE job_execution_id = ? AND status != 'cancelled'
            "#,
        )
        .bind(job_execution_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.unwrap_or(0))
    }

    /// Base keyspace consumed so far across a layer's tasks.
    pub async fn sum_base_processed_for_layer(&self, increment_layer_id: &str) -> Result<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(MAX(keyspace_processed - keyspace_start, 0))
            FROM job_tasks
            WHERE increment_layer_id = ? AND status != 'cancelled'
            "#,
        )
        .bind(increment_layer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.unwrap_or(0))
    }

    pub async fn count_by_status(&self, job_execution_id: &str, status: TaskStatus) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_tasks WHERE job_execution_id = ? AND status = ?",
        )
        .bind(job_execution_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn count_for_job(&self, job_execution_id: &str) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM job_tasks WHERE job_execution_id = ?")
                .bind(job_execution_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_memory;
    use crate::repo::hashlists::HashlistRepo;
    use crate::repo::jobs::{JobRepo, NewJobExecution};
    use hashfleet_protocol::{AttackMode, IncrementMode};

    async fn setup() -> TaskRepo {
        let pool = connect_memory().await.unwrap();
        HashlistRepo::new(pool.clone())
            .create("hl", "hl", None, 0, false, "hashlists/hl.hash")
            .await
            .unwrap();
        JobRepo::new(pool.clone())
            .create(
                "job",
                &NewJobExecution {
                    preset_job_id: None,
                    hashlist_id: "hl".into(),
                    attack_mode: AttackMode::Straight,
                    binary_version_id: None,
                    priority: 0,
                    chunk_size_seconds: 600,
                    wordlist_ids: vec!["w1".into()],
                    rule_ids: vec![],
                    mask: None,
                    base_keyspace: 10_000,
                    effective_keyspace: 10_000,
                    is_accurate_keyspace: true,
                    uses_rule_splitting: false,
                    multiplication_factor: 1,
                    increment_mode: IncrementMode::Off,
                    increment_min: None,
                    increment_max: None,
                    max_agents: 0,
                    created_by: None,
                },
            )
            .await
            .unwrap();
        TaskRepo::new(pool)
    }

    fn chunk(id: &str, number: i64, start: i64, end: i64) -> NewJobTask {
        NewJobTask {
            id: id.to_string(),
            job_execution_id: "job".into(),
            increment_layer_id: None,
            agent_id: Some("agent-1".into()),
            chunk_number: number,
            chunk_duration: 600,
            benchmark_speed: Some(100_000),
            attack_cmd: "-a 0".into(),
            keyspace_start: start,
            keyspace_end: end,
            keyspace_processed: start,
            effective_keyspace_start: start,
            effective_keyspace_end: end,
            is_keyspace_split: true,
            is_rule_split_task: false,
            rule_start_index: None,
            rule_end_index: None,
            rule_chunk_path: None,
        }
    }

    #[tokio::test]
    async fn max_keyspace_end_ignores_cancelled() {
        let repo = setup().await;
        repo.create(&chunk("t1", 1, 0, 4_000), TaskStatus::Assigned)
            .await
            .unwrap();
        repo.create(&chunk("t2", 2, 4_000, 8_000), TaskStatus::Assigned)
            .await
            .unwrap();
        repo.set_status("t2", TaskStatus::Cancelled).await.unwrap();

        assert_eq!(repo.max_keyspace_end("job", None).await.unwrap(), 4_000);
    }

    #[tokio::test]
    async fn progress_is_monotonic() {
        let repo = setup().await;
        repo.create(&chunk("t1", 1, 0, 4_000), TaskStatus::Assigned)
            .await
            .unwrap();

        repo.record_progress("t1", 2_000, 2_000, None).await.unwrap();
        // A late out-of-order report must not move the checkpoint backwards.
        repo.record_progress("t1", 1_500, 1_500, None).await.unwrap();

        let task = repo.get("t1").await.unwrap();
        assert_eq!(task.keyspace_processed, 2_000);
        assert_eq!(task.status(), TaskStatus::Running);
    }

    #[tokio::test]
    async fn reset_for_retry_clears_agent() {
        let repo = setup().await;
        repo.create(&chunk("t1", 1, 0, 4_000), TaskStatus::Running)
            .await
            .unwrap();
        repo.reset_for_retry("t1").await.unwrap();

        let task = repo.get("t1").await.unwrap();
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.agent_id, None);
        assert_eq!(task.retry_count, 1);
    }

    #[tokio::test]
    async fn expired_reconnect_selection() {
        let repo = setup().await;
        repo.create(&chunk("t1", 1, 0, 4_000), TaskStatus::Running)
            .await
            .unwrap();
        let past = Utc::now() - chrono::Duration::minutes(1);
        repo.park_for_reconnect("t1", past).await.unwrap();

        let expired = repo.list_expired_reconnect(Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "t1");
    }
}
