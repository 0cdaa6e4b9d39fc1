//! String-typed system settings store.
//!
//! Values are read per use so an admin change takes effect on the next
//! scheduling or reconciliation cycle without a restart.

use crate::error::Result;
use crate::pool::DbPool;

#[derive(Clone)]
pub struct SettingsRepo {
    pool: DbPool,
}

impl SettingsRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT value FROM system_settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Integer setting with a default for missing or unparseable values.
    pub async fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self
            .get(key)
            .await?
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect_memory;

    #[tokio::test]
    async fn missing_key_falls_back_to_default() {
        let repo = SettingsRepo::new(connect_memory().await.unwrap());
        assert_eq!(repo.get_i64("chunk_fluctuation_percentage", 20).await.unwrap(), 20);

        repo.set("chunk_fluctuation_percentage", "35").await.unwrap();
        assert_eq!(repo.get_i64("chunk_fluctuation_percentage", 20).await.unwrap(), 35);
    }

    #[tokio::test]
    async fn garbage_value_falls_back_to_default() {
        let repo = SettingsRepo::new(connect_memory().await.unwrap());
        repo.set("max_chunk_retry_attempts", "not-a-number").await.unwrap();
        assert_eq!(repo.get_i64("max_chunk_retry_attempts", 3).await.unwrap(), 3);
    }
}
