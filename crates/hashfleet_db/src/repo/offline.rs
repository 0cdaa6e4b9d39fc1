//! Agent offline notification buffer.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::OfflineBufferEntry;
use crate::pool::DbPool;

#[derive(Clone)]
pub struct OfflineBufferRepo {
    pool: DbPool,
}

impl OfflineBufferRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record a disconnect. At most one pending row may exist per agent; a
    /// second disconnect while one is pending keeps the earlier window.
    pub async fn buffer_disconnect(
        &self,
        agent_id: &str,
        disconnected_at: DateTime<Utc>,
        notification_due_at: DateTime<Utc>,
    ) -> Result<bool> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM agent_offline_buffer WHERE agent_id = ? AND status = 'pending'",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO agent_offline_buffer (agent_id, disconnected_at, notification_due_at, status)
            VALUES (?, ?, ?, 'pending')
            "#,
        )
        .bind(agent_id)
        .bind(disconnected_at.to_rfc3339())
        .bind(notification_due_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    /// Mark the agent's pending row reconnected. Returns whether a pending
    /// row existed.
    pub async fn mark_reconnected(&self, agent_id: &str) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE agent_offline_buffer SET status = 'reconnected' WHERE agent_id = ? AND status = 'pending'",
        )
        .bind(agent_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Pending rows whose notification window has elapsed.
    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<OfflineBufferEntry>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM agent_offline_buffer
            WHERE status = 'pending' AND notification_due_at <= ?
            ORDER BY notification_due_at
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn mark_sent(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE agent_offline_buffer SET status = 'sent' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM agent_offline_buffer WHERE disconnected_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_memory;
    use chrono::Duration;

    #[tokio::test]
    async fn single_pending_row_per_agent() {
        let repo = OfflineBufferRepo::new(connect_memory().await.unwrap());
        let now = Utc::now();
        assert!(repo
            .buffer_disconnect("a1", now, now + Duration::minutes(10))
            .await
            .unwrap());
        assert!(!repo
            .buffer_disconnect("a1", now, now + Duration::minutes(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn reconnect_suppresses_due_notification() {
        let repo = OfflineBufferRepo::new(connect_memory().await.unwrap());
        let past = Utc::now() - Duration::minutes(20);
        repo.buffer_disconnect("a1", past, past + Duration::minutes(10))
            .await
            .unwrap();
        repo.mark_reconnected("a1").await.unwrap();

        assert!(repo.list_due(Utc::now()).await.unwrap().is_empty());
    }
}
