//! Preset job definitions and their increment layers.

use chrono::Utc;
use hashfleet_protocol::{AttackMode, IncrementMode};

use crate::error::{DbError, Result};
use crate::models::{PresetIncrementLayer, PresetJob};
use crate::pool::DbPool;

/// Fields supplied when creating or updating a preset job.
#[derive(Debug, Clone)]
pub struct NewPresetJob {
    pub name: String,
    pub priority: i64,
    pub chunk_size_seconds: i64,
    pub attack_mode: AttackMode,
    pub wordlist_ids: Vec<String>,
    pub rule_ids: Vec<String>,
    pub mask: Option<String>,
    pub binary_version: String,
    pub increment_mode: IncrementMode,
    pub increment_min: Option<i64>,
    pub increment_max: Option<i64>,
    pub status_updates_enabled: bool,
    pub is_small_job: bool,
    pub allow_high_priority_override: bool,
    pub max_agents: i64,
}

#[derive(Clone)]
pub struct PresetJobRepo {
    pool: DbPool,
}

impl PresetJobRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, id: &str, preset: &NewPresetJob) -> Result<PresetJob> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO preset_jobs (
                id, name, priority, chunk_size_seconds, attack_mode,
                wordlist_ids, rule_ids, mask, binary_version,
                increment_mode, increment_min, increment_max,
                status_updates_enabled, is_small_job, allow_high_priority_override,
                max_agents, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&preset.name)
        .bind(preset.priority)
        .bind(preset.chunk_size_seconds)
        .bind(preset.attack_mode.as_str())
        .bind(serde_json::to_string(&preset.wordlist_ids)?)
        .bind(serde_json::to_string(&preset.rule_ids)?)
        .bind(&preset.mask)
        .bind(&preset.binary_version)
        .bind(preset.increment_mode.as_str())
        .bind(preset.increment_min)
        .bind(preset.increment_max)
        .bind(preset.status_updates_enabled)
        .bind(preset.is_small_job)
        .bind(preset.allow_high_priority_override)
        .bind(preset.max_agents)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::DuplicateName(preset.name.clone())
            }
            other => DbError::from(other),
        })?;

        self.get(id).await
    }

    pub async fn get(&self, id: &str) -> Result<PresetJob> {
        sqlx::query_as("SELECT * FROM preset_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::missing("preset job", id))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<PresetJob>> {
        Ok(sqlx::query_as("SELECT * FROM preset_jobs WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(&self) -> Result<Vec<PresetJob>> {
        Ok(
            sqlx::query_as("SELECT * FROM preset_jobs ORDER BY priority DESC, created_at")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Store the results of a keyspace calculation.
    pub async fn set_keyspace(
        &self,
        id: &str,
        base_keyspace: i64,
        effective_keyspace: i64,
        is_accurate: bool,
        multiplication_factor: i64,
        use_rule_splitting: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE preset_jobs
            SET base_keyspace = ?, effective_keyspace = ?, is_accurate_keyspace = ?,
                multiplication_factor = ?, use_rule_splitting = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(base_keyspace)
        .bind(effective_keyspace)
        .bind(is_accurate)
        .bind(multiplication_factor)
        .bind(use_rule_splitting)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically replace the preset's increment layers.
    ///
    /// Layers are exclusively owned by the preset; stale layers from a prior
    /// increment configuration must not survive.
    pub async fn replace_layers(
        &self,
        preset_job_id: &str,
        layers: &[(String, i64, String, i64, i64)],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM preset_increment_layers WHERE preset_job_id = ?")
            .bind(preset_job_id)
            .execute(&mut *tx)
            .await?;

        for (id, layer_index, mask, base, effective) in layers {
            sqlx::query(
                r#"
                INSERT INTO preset_increment_layers
                    (id, preset_job_id, layer_index, mask, base_keyspace, effective_keyspace)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(preset_job_id)
            .bind(layer_index)
            .bind(mask)
            .bind(base)
            .bind(effective)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn layers(&self, preset_job_id: &str) -> Result<Vec<PresetIncrementLayer>> {
        Ok(sqlx::query_as(
            "SELECT * FROM preset_increment_layers WHERE preset_job_id = ? ORDER BY layer_index",
        )
        .bind(preset_job_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Delete a preset and (via cascade) its layers.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM preset_jobs WHERE id = ?")
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

    fn straight_preset(name: &str) -> NewPresetJob {
        NewPresetJob {
            name: name.to_string(),
            priority: 10,
            chunk_size_seconds: 600,
            attack_mode: AttackMode::Straight,
            wordlist_ids: vec!["w1".into()],
            rule_ids: vec![],
            mask: None,
            binary_version: "default".into(),
            increment_mode: IncrementMode::Off,
            increment_min: None,
            increment_max: None,
            status_updates_enabled: true,
            is_small_job: false,
            allow_high_priority_override: false,
            max_agents: 0,
        }
    }

    #[tokio::test]
    async fn unique_name_is_enforced() {
        let repo = PresetJobRepo::new(connect_memory().await.unwrap());
        repo.create("p1", &straight_preset("nightly")).await.unwrap();
        let err = repo.create("p2", &straight_preset("nightly")).await;
        assert!(matches!(err, Err(DbError::DuplicateName(_))));
    }

    #[tokio::test]
    async fn replace_layers_destroys_previous_set() {
        let repo = PresetJobRepo::new(connect_memory().await.unwrap());
        repo.create("p1", &straight_preset("mask-job")).await.unwrap();

        repo.replace_layers(
            "p1",
            &[
                ("l1".into(), 1, "?l?l".into(), 676, 676),
                ("l2".into(), 2, "?l?l?l".into(), 17_576, 17_576),
            ],
        )
        .await
        .unwrap();
        repo.replace_layers("p1", &[("l3".into(), 1, "?d".into(), 10, 10)])
            .await
            .unwrap();

        let layers = repo.layers("p1").await.unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].mask, "?d");
    }
}
