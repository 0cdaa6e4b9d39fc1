//! Wordlist and rule file registry.

use chrono::Utc;

use crate::error::{DbError, Result};
use crate::models::FileResource;
use crate::pool::DbPool;

pub const CATEGORY_WORDLIST: &str = "wordlist";
pub const CATEGORY_RULE: &str = "rule";

#[derive(Clone)]
pub struct FileResourceRepo {
    pool: DbPool,
}

impl FileResourceRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        id: &str,
        name: &str,
        category: &str,
        line_count: Option<i64>,
    ) -> Result<FileResource> {
        sqlx::query(
            "INSERT INTO file_resources (id, name, category, line_count, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(category)
        .bind(line_count)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get(id).await
    }

    pub async fn get(&self, id: &str) -> Result<FileResource> {
        sqlx::query_as("SELECT * FROM file_resources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::missing("file resource", id))
    }

    /// Resolve ids preserving the caller's ordering; a missing id fails the
    /// whole lookup so a job never silently loses a wordlist.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<FileResource>> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            resolved.push(self.get(id).await?);
        }
        Ok(resolved)
    }

    pub async fn list_by_category(&self, category: &str) -> Result<Vec<FileResource>> {
        Ok(
            sqlx::query_as("SELECT * FROM file_resources WHERE category = ? ORDER BY name")
                .bind(category)
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
    async fn get_many_preserves_order_and_fails_on_missing() {
        let repo = FileResourceRepo::new(connect_memory().await.unwrap());
        repo.insert("w1", "rockyou.txt", CATEGORY_WORDLIST, Some(14_344_392))
            .await
            .unwrap();
        repo.insert("w2", "common.txt", CATEGORY_WORDLIST, Some(10_000))
            .await
            .unwrap();

        let files = repo
            .get_many(&["w2".to_string(), "w1".to_string()])
            .await
            .unwrap();
        assert_eq!(files[0].id, "w2");
        assert_eq!(files[1].id, "w1");

        assert!(repo.get_many(&["missing".to_string()]).await.is_err());
    }
}
