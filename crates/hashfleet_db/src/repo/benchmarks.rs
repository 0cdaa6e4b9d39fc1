//! Per-agent benchmark cache.
//!
//! Keyed by (agent, attack mode, hash type, salt bucket). For salted hash
//! types the bucket is the uncracked-hash count at measurement time; for
//! unsalted types it is NULL.

use chrono::{DateTime, Utc};
use hashfleet_protocol::AttackMode;

use crate::error::Result;
use crate::models::Benchmark;
use crate::pool::DbPool;

#[derive(Clone)]
pub struct BenchmarkRepo {
    pool: DbPool,
}

impl BenchmarkRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        agent_id: &str,
        attack_mode: AttackMode,
        hash_type_id: i64,
        salt_count_bucket: Option<i64>,
        speed: i64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let updated = sqlx::query(
            r#"
            UPDATE benchmarks SET speed = ?, observed_at = ?
            WHERE agent_id = ? AND attack_mode = ? AND hash_type_id = ?
              AND IFNULL(salt_count_bucket, -1) = IFNULL(?, -1)
            "#,
        )
        .bind(speed)
        .bind(&now)
        .bind(agent_id)
        .bind(attack_mode.as_str())
        .bind(hash_type_id)
        .bind(salt_count_bucket)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                r#"
                INSERT INTO benchmarks (agent_id, attack_mode, hash_type_id, salt_count_bucket, speed, observed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(agent_id)
            .bind(attack_mode.as_str())
            .bind(hash_type_id)
            .bind(salt_count_bucket)
            .bind(speed)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_exact(
        &self,
        agent_id: &str,
        attack_mode: AttackMode,
        hash_type_id: i64,
        salt_count_bucket: Option<i64>,
    ) -> Result<Option<Benchmark>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM benchmarks
            WHERE agent_id = ? AND attack_mode = ? AND hash_type_id = ?
              AND IFNULL(salt_count_bucket, -1) = IFNULL(?, -1)
            "#,
        )
        .bind(agent_id)
        .bind(attack_mode.as_str())
        .bind(hash_type_id)
        .bind(salt_count_bucket)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// All benchmarks observed for an agent since the cutoff.
    pub async fn list_recent_for_agent(
        &self,
        agent_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Benchmark>> {
        Ok(sqlx::query_as(
            "SELECT * FROM benchmarks WHERE agent_id = ? AND observed_at >= ?",
        )
        .bind(agent_id)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_for_agent(&self, agent_id: &str) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM benchmarks WHERE agent_id = ?")
                .bind(agent_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_memory;
    use crate::repo::agents::AgentRepo;

    async fn setup() -> BenchmarkRepo {
        let pool = connect_memory().await.unwrap();
        AgentRepo::new(pool.clone())
            .register("a1", "rig-01", None, None)
            .await
            .unwrap();
        BenchmarkRepo::new(pool)
    }

    #[tokio::test]
    async fn upsert_replaces_same_key() {
        let repo = setup().await;
        repo.upsert("a1", AttackMode::Straight, 0, None, 1_000_000)
            .await
            .unwrap();
        repo.upsert("a1", AttackMode::Straight, 0, None, 2_000_000)
            .await
            .unwrap();

        let bench = repo
            .get_exact("a1", AttackMode::Straight, 0, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bench.speed, 2_000_000);
        assert_eq!(repo.count_for_agent("a1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn salt_buckets_are_distinct_keys() {
        let repo = setup().await;
        repo.upsert("a1", AttackMode::Straight, 1800, Some(1_000), 200_000_000)
            .await
            .unwrap();
        repo.upsert("a1", AttackMode::Straight, 1800, Some(500), 400_000_000)
            .await
            .unwrap();

        assert_eq!(repo.count_for_agent("a1").await.unwrap(), 2);
        assert!(repo
            .get_exact("a1", AttackMode::Straight, 1800, None)
            .await
            .unwrap()
            .is_none());
    }
}
