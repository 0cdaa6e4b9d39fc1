//! Hashlist and hash-entry storage.

use chrono::Utc;
use sqlx::QueryBuilder;
use tracing::info;

use crate::error::{DbError, Result};
use crate::models::{HashEntry, Hashlist};
use crate::pool::DbPool;

/// SQLite variable limit headroom for bulk inserts.
const INSERT_BATCH: usize = 500;

#[derive(Clone)]
pub struct HashlistRepo {
    pool: DbPool,
}

impl HashlistRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: &str,
        name: &str,
        client_id: Option<&str>,
        hash_type_id: i64,
        is_salted: bool,
        file_path: &str,
    ) -> Result<Hashlist> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO hashlists (id, name, client_id, hash_type_id, is_salted, file_path, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(client_id)
        .bind(hash_type_id)
        .bind(is_salted)
        .bind(file_path)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(id).await
    }

    pub async fn get(&self, id: &str) -> Result<Hashlist> {
        sqlx::query_as("SELECT * FROM hashlists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::missing("hashlist", id))
    }

    pub async fn list(&self) -> Result<Vec<Hashlist>> {
        Ok(sqlx::query_as("SELECT * FROM hashlists ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Bulk-insert hash lines for a hashlist and refresh its total.
    pub async fn insert_hashes(&self, hashlist_id: &str, values: &[String]) -> Result<()> {
        for chunk in values.chunks(INSERT_BATCH) {
            let mut builder = QueryBuilder::<sqlx::Sqlite>::new(
                "INSERT INTO hashes (hashlist_id, hash_value) ",
            );
            builder.push_values(chunk, |mut b, value| {
                b.push_bind(hashlist_id).push_bind(value.as_str());
            });
            builder.build().execute(&self.pool).await?;
        }

        sqlx::query(
            r#"
            UPDATE hashlists
            SET total_hashes = (SELECT COUNT(*) FROM hashes WHERE hashlist_id = ?),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(hashlist_id)
        .bind(Utc::now().to_rfc3339())
        .bind(hashlist_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Uncracked hash values in insertion order, used to regenerate the
    /// on-disk hashlist file.
    pub async fn uncracked_values(&self, hashlist_id: &str) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            "SELECT hash_value FROM hashes WHERE hashlist_id = ? AND is_cracked = 0 ORDER BY id",
        )
        .bind(hashlist_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_uncracked(&self, hashlist_id: &str) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM hashes WHERE hashlist_id = ? AND is_cracked = 0",
        )
        .bind(hashlist_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Hashlists that contain any of the given hash values, cracked or not.
    pub async fn hashlists_containing(&self, values: &[String]) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for chunk in values.chunks(INSERT_BATCH) {
            let mut builder = QueryBuilder::<sqlx::Sqlite>::new(
                "SELECT DISTINCT hashlist_id FROM hashes WHERE hash_value IN (",
            );
            let mut separated = builder.separated(", ");
            for value in chunk {
                separated.push_bind(value.as_str());
            }
            builder.push(")");
            let ids: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
            found.extend(ids);
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    /// Mark hash values cracked wherever they occur. Returns the hashlist ids
    /// whose cracked counts changed.
    pub async fn mark_cracked(&self, cracks: &[(String, String)]) -> Result<Vec<String>> {
        if cracks.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<String> = cracks.iter().map(|(hash, _)| hash.clone()).collect();
        let affected = self.hashlists_containing(&values).await?;

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for (hash, plain) in cracks {
            sqlx::query(
                r#"
                UPDATE hashes
                SET is_cracked = 1, plain_text = ?, cracked_at = ?
                WHERE hash_value = ? AND is_cracked = 0
                "#,
            )
            .bind(plain)
            .bind(&now)
            .bind(hash)
            .execute(&mut *tx)
            .await?;
        }

        for hashlist_id in &affected {
            sqlx::query(
                r#"
                UPDATE hashlists
                SET cracked_hashes = (SELECT COUNT(*) FROM hashes WHERE hashlist_id = ? AND is_cracked = 1),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(hashlist_id)
            .bind(&now)
            .bind(hashlist_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("Recorded {} cracks across {} hashlists", cracks.len(), affected.len());
        Ok(affected)
    }

    pub async fn cracked_entries(&self, hashlist_id: &str) -> Result<Vec<HashEntry>> {
        Ok(sqlx::query_as(
            "SELECT * FROM hashes WHERE hashlist_id = ? AND is_cracked = 1 ORDER BY id",
        )
        .bind(hashlist_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Delete up to `limit` hash rows for a hashlist. Returns rows removed;
    /// zero means the hashlist is drained.
    pub async fn delete_hash_batch(&self, hashlist_id: &str, limit: i64) -> Result<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM hashes WHERE id IN (
                SELECT id FROM hashes WHERE hashlist_id = ? LIMIT ?
            )
            "#,
        )
        .bind(hashlist_id)
        .bind(limit)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM hashlists WHERE id = ?")
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

    async fn repo() -> HashlistRepo {
        HashlistRepo::new(connect_memory().await.unwrap())
    }

    #[tokio::test]
    async fn insert_updates_total() {
        let repo = repo().await;
        repo.create("hl1", "test", None, 0, false, "hashlists/hl1.hash")
            .await
            .unwrap();
        repo.insert_hashes("hl1", &["aaaa".into(), "bbbb".into(), "cccc".into()])
            .await
            .unwrap();

        let hashlist = repo.get("hl1").await.unwrap();
        assert_eq!(hashlist.total_hashes, 3);
        assert_eq!(hashlist.cracked_hashes, 0);
    }

    #[tokio::test]
    async fn mark_cracked_fans_out_across_hashlists() {
        let repo = repo().await;
        repo.create("h1", "one", None, 0, false, "hashlists/h1.hash")
            .await
            .unwrap();
        repo.create("h2", "two", None, 0, false, "hashlists/h2.hash")
            .await
            .unwrap();
        repo.insert_hashes("h1", &["shared".into(), "only1".into()])
            .await
            .unwrap();
        repo.insert_hashes("h2", &["shared".into()]).await.unwrap();

        let affected = repo
            .mark_cracked(&[("shared".into(), "password1".into())])
            .await
            .unwrap();
        assert_eq!(affected.len(), 2);

        assert_eq!(repo.get("h1").await.unwrap().cracked_hashes, 1);
        assert_eq!(repo.get("h2").await.unwrap().cracked_hashes, 1);
        assert_eq!(repo.uncracked_values("h1").await.unwrap(), vec!["only1"]);
        assert!(repo.uncracked_values("h2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_hash_batch_drains() {
        let repo = repo().await;
        repo.create("hl", "x", None, 0, false, "hashlists/hl.hash")
            .await
            .unwrap();
        let values: Vec<String> = (0..25).map(|i| format!("hash{}", i)).collect();
        repo.insert_hashes("hl", &values).await.unwrap();

        let mut total = 0;
        loop {
            let removed = repo.delete_hash_batch("hl", 10).await.unwrap();
            if removed == 0 {
                break;
            }
            total += removed;
        }
        assert_eq!(total, 25);
    }
}
