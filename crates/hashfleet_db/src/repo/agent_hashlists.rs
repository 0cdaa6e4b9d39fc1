//! Per-(agent, hashlist) file-hash tracking.
//!
//! A row whose `file_hash` matches the server-side MD5 means the agent holds
//! the current hashlist bytes; any mismatch makes the next assignment resync.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::AgentHashlist;
use crate::pool::DbPool;

#[derive(Clone)]
pub struct AgentHashlistRepo {
    pool: DbPool,
}

impl AgentHashlistRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, agent_id: &str, hashlist_id: &str) -> Result<Option<AgentHashlist>> {
        Ok(sqlx::query_as(
            "SELECT * FROM agent_hashlists WHERE agent_id = ? AND hashlist_id = ?",
        )
        .bind(agent_id)
        .bind(hashlist_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn upsert(
        &self,
        agent_id: &str,
        hashlist_id: &str,
        file_path: &str,
        file_hash: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_hashlists (agent_id, hashlist_id, file_path, file_hash, last_used_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(agent_id, hashlist_id) DO UPDATE SET
                file_path = excluded.file_path,
                file_hash = excluded.file_hash,
                last_used_at = excluded.last_used_at
            "#,
        )
        .bind(agent_id)
        .bind(hashlist_id)
        .bind(file_path)
        .bind(file_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the stored hash on every agent row for a hashlist, forcing a
    /// resync on each agent's next assignment.
    pub async fn set_hash_for_hashlist(&self, hashlist_id: &str, file_hash: &str) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE agent_hashlists SET file_hash = ?, last_used_at = ? WHERE hashlist_id = ?",
        )
        .bind(file_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(hashlist_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    pub async fn touch(&self, agent_id: &str, hashlist_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE agent_hashlists SET last_used_at = ? WHERE agent_id = ? AND hashlist_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(agent_id)
        .bind(hashlist_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_unused_since(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM agent_hashlists WHERE last_used_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    pub async fn delete_for_hashlist(&self, hashlist_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM agent_hashlists WHERE hashlist_id = ?")
            .bind(hashlist_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    pub async fn list_for_hashlist(&self, hashlist_id: &str) -> Result<Vec<AgentHashlist>> {
        Ok(
            sqlx::query_as("SELECT * FROM agent_hashlists WHERE hashlist_id = ?")
                .bind(hashlist_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_memory;

    #[tokio::test]
    async fn fanout_replaces_every_agent_row() {
        let repo = AgentHashlistRepo::new(connect_memory().await.unwrap());
        repo.upsert("a1", "hl", "hashlists/hl.hash", "old").await.unwrap();
        repo.upsert("a2", "hl", "hashlists/hl.hash", "old").await.unwrap();

        let updated = repo.set_hash_for_hashlist("hl", "new").await.unwrap();
        assert_eq!(updated, 2);

        let row = repo.get("a1", "hl").await.unwrap().unwrap();
        assert_eq!(row.file_hash, "new");
    }

    #[tokio::test]
    async fn retention_cleanup_drops_stale_rows() {
        let repo = AgentHashlistRepo::new(connect_memory().await.unwrap());
        repo.upsert("a1", "hl", "hashlists/hl.hash", "h").await.unwrap();

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(repo.delete_unused_since(future).await.unwrap(), 1);
        assert!(repo.get("a1", "hl").await.unwrap().is_none());
    }
}
