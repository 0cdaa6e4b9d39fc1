//! Cracking-binary version registry.

use crate::error::Result;
use crate::models::BinaryVersion;
use crate::pool::DbPool;

#[derive(Clone)]
pub struct BinaryRepo {
    pool: DbPool,
}

impl BinaryRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, binary: &BinaryVersion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO binary_versions (id, version, kind, file_path, is_default, is_active)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&binary.id)
        .bind(&binary.version)
        .bind(&binary.kind)
        .bind(&binary.file_path)
        .bind(binary.is_default)
        .bind(binary.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Active binaries, newest version string first.
    pub async fn list_active(&self) -> Result<Vec<BinaryVersion>> {
        Ok(sqlx::query_as(
            "SELECT * FROM binary_versions WHERE is_active = 1 ORDER BY version DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_default(&self, kind: &str) -> Result<Option<BinaryVersion>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM binary_versions
            WHERE kind = ? AND is_active = 1
            ORDER BY is_default DESC, version DESC
            LIMIT 1
            "#,
        )
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<BinaryVersion>> {
        Ok(sqlx::query_as("SELECT * FROM binary_versions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}
