//! Agent registry.

use chrono::Utc;
use hashfleet_protocol::AgentStatus;

use crate::error::{DbError, Result};
use crate::models::Agent;
use crate::pool::DbPool;

#[derive(Clone)]
pub struct AgentRepo {
    pool: DbPool,
}

impl AgentRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn register(
        &self,
        id: &str,
        name: &str,
        owner_id: Option<&str>,
        hardware: Option<&str>,
    ) -> Result<Agent> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO agents (id, name, owner_id, status, hardware, last_seen_at, created_at, updated_at)
            VALUES (?, ?, ?, 'idle', ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                hardware = excluded.hardware,
                last_seen_at = excluded.last_seen_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(owner_id)
        .bind(hardware)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    pub async fn get(&self, id: &str) -> Result<Agent> {
        sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::missing("agent", id))
    }

    pub async fn list(&self) -> Result<Vec<Agent>> {
        Ok(sqlx::query_as("SELECT * FROM agents ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Agents the scheduler may hand work to.
    pub async fn list_schedulable(&self) -> Result<Vec<Agent>> {
        Ok(sqlx::query_as(
            "SELECT * FROM agents WHERE status IN ('active', 'idle') ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn set_status(&self, id: &str, status: AgentStatus) -> Result<()> {
        sqlx::query("UPDATE agents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch_last_seen(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE agents SET last_seen_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump the consecutive-failure counter and return the new value.
    pub async fn bump_consecutive_failures(&self, id: &str) -> Result<i64> {
        sqlx::query(
            "UPDATE agents SET consecutive_failures = consecutive_failures + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(
            sqlx::query_scalar("SELECT consecutive_failures FROM agents WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn reset_consecutive_failures(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE agents SET consecutive_failures = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
