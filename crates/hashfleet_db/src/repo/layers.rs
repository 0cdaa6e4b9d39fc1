//! Job increment layer storage.
//!
//! Layers are processed in ascending `layer_index`; a layer's cumulative
//! effective-keyspace offset is the sum of earlier layers' effective
//! keyspaces, which the planner uses to report global job positions.

use hashfleet_protocol::LayerStatus;

use crate::error::{DbError, Result};
use crate::models::JobIncrementLayer;
use crate::pool::DbPool;

#[derive(Clone)]
pub struct JobLayerRepo {
    pool: DbPool,
}

impl JobLayerRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert the full layer set for a job in one transaction.
    pub async fn insert_layers(
        &self,
        job_execution_id: &str,
        layers: &[(String, i64, String, i64, i64, bool)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (id, layer_index, mask, base, effective, is_accurate) in layers {
            sqlx::query(
                r#"
                INSERT INTO job_increment_layers
                    (id, job_execution_id, layer_index, mask, base_keyspace,
                     effective_keyspace, is_accurate_keyspace)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(job_execution_id)
            .bind(layer_index)
            .bind(mask)
            .bind(base)
            .bind(effective)
            .bind(is_accurate)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<JobIncrementLayer> {
        sqlx::query_as("SELECT * FROM job_increment_layers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::missing("increment layer", id))
    }

    pub async fn list_for_job(&self, job_execution_id: &str) -> Result<Vec<JobIncrementLayer>> {
        Ok(sqlx::query_as(
            "SELECT * FROM job_increment_layers WHERE job_execution_id = ? ORDER BY layer_index",
        )
        .bind(job_execution_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// The lowest-index layer that has not completed, if any.
    pub async fn first_open_layer(
        &self,
        job_execution_id: &str,
    ) -> Result<Option<JobIncrementLayer>> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM job_increment_layers
            WHERE job_execution_id = ? AND status != 'completed'
            ORDER BY layer_index
            LIMIT 1
            "#,
        )
        .bind(job_execution_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Sum of effective keyspaces of layers before the given index.
    pub async fn effective_offset_before(
        &self,
        job_execution_id: &str,
        layer_index: i64,
    ) -> Result<i64> {
        let offset: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(effective_keyspace) FROM job_increment_layers
            WHERE job_execution_id = ? AND layer_index < ?
            "#,
        )
        .bind(job_execution_id)
        .bind(layer_index)
        .fetch_one(&self.pool)
        .await?;
        Ok(offset.unwrap_or(0))
    }

    /// Move a pending layer to running; later layers wait their turn.
    pub async fn start_if_pending(&self, id: &str) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE job_increment_layers SET status = 'running' WHERE id = ? AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    pub async fn set_status(&self, id: &str, status: LayerStatus) -> Result<()> {
        sqlx::query("UPDATE job_increment_layers SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn add_dispatched_keyspace(&self, id: &str, delta: i64) -> Result<()> {
        sqlx::query(
            "UPDATE job_increment_layers SET dispatched_keyspace = dispatched_keyspace + ? WHERE id = ?",
        )
        .bind(delta)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_progress(&self, id: &str, processed: i64, percent: f64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_increment_layers
            SET processed_keyspace = ?, overall_progress_percent = ?
            WHERE id = ?
            "#,
        )
        .bind(processed)
        .bind(percent)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
