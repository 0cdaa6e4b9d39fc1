//! Preset job creation and instantiation.
//!
//! Creating a preset validates its shape, prices its keyspace through the
//! binary, and expands increment layers. Instantiating binds the preset to a
//! hashlist as a runnable job execution, copying the layer set.

use anyhow::Context;
use hashfleet_db::models::{JobExecution, PresetJob};
use hashfleet_db::{
    JobLayerRepo, JobRepo, NewJobExecution, NewPresetJob, PresetJobRepo,
};
use hashfleet_ids::{JobId, LayerId, PresetJobId};
use thiserror::Error;
use tracing::info;

use crate::binaries::BinaryResolver;
use crate::increment::expand_layers;
use crate::keyspace::KeyspaceCalculator;
use crate::mask::Mask;
use crate::settings::SystemSettings;
use crate::validate::{validate_preset, ValidationError};
use hashfleet_protocol::IncrementMode;

/// Preset operations split validation failures (failed preconditions, never
/// retried) from everything else.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<hashfleet_db::DbError> for PresetError {
    fn from(err: hashfleet_db::DbError) -> Self {
        PresetError::Other(err.into())
    }
}

#[derive(Clone)]
pub struct PresetJobService {
    presets: PresetJobRepo,
    jobs: JobRepo,
    job_layers: JobLayerRepo,
    settings: SystemSettings,
    keyspace: KeyspaceCalculator,
    binaries: BinaryResolver,
}

impl PresetJobService {
    pub fn new(
        presets: PresetJobRepo,
        jobs: JobRepo,
        job_layers: JobLayerRepo,
        settings: SystemSettings,
        keyspace: KeyspaceCalculator,
        binaries: BinaryResolver,
    ) -> Self {
        Self {
            presets,
            jobs,
            job_layers,
            settings,
            keyspace,
            binaries,
        }
    }

    /// Validate, persist, and price a new preset job.
    pub async fn create_preset(&self, preset: &NewPresetJob) -> Result<PresetJob, PresetError> {
        let max_priority = self.settings.max_job_priority().await.map_err(anyhow::Error::from)?;
        validate_preset(preset, max_priority)?;

        let preset_id = PresetJobId::new().to_string();
        let created = self.presets.create(&preset_id, preset).await?;

        if preset.increment_mode.is_enabled() {
            self.expand_preset_layers(&created).await?;
        } else {
            let result = self
                .keyspace
                .calculate(&created)
                .await
                .context("keyspace calculation")?;
            self.presets
                .set_keyspace(
                    &preset_id,
                    result.base_keyspace,
                    result.effective_keyspace,
                    result.is_accurate,
                    result.multiplication_factor,
                    result.use_rule_splitting,
                )
                .await?;
        }

        let created = self.presets.get(&preset_id).await?;
        info!(
            "created preset '{}' (base {:?}, effective {:?}, accurate {})",
            created.name, created.base_keyspace, created.effective_keyspace,
            created.is_accurate_keyspace
        );
        Ok(created)
    }

    /// Expand an increment preset into per-length layers, price each via the
    /// binary, and roll the sums into the preset.
    async fn expand_preset_layers(&self, preset: &PresetJob) -> Result<(), PresetError> {
        let pattern = preset
            .mask
            .as_deref()
            .context("increment preset without a mask")?;
        let inverse = preset.increment_mode() == IncrementMode::IncrementInverse;
        let masks = expand_layers(pattern, preset.increment_min, preset.increment_max, inverse)?;

        let binary = self
            .binaries
            .resolve(&preset.binary_version)
            .await
            .context("resolving binary for layer pricing")?;

        let mut rows = Vec::with_capacity(masks.len());
        let mut base_total = 0i64;
        let mut effective_total = 0i64;
        for (index, layer_mask) in masks.iter().enumerate() {
            let layer_index = index as i64 + 1;
            let label = format!("{}_l{}", preset.id, layer_index);
            let base = self
                .keyspace
                .mask_keyspace(&binary, layer_mask, &label)
                .await
                .with_context(|| format!("pricing layer {} ({})", layer_index, layer_mask))?;
            let effective = Mask::parse(layer_mask)
                .map_err(ValidationError::from)?
                .keyspace();

            base_total = base_total.saturating_add(base);
            effective_total = effective_total.saturating_add(effective);
            rows.push((
                LayerId::new().to_string(),
                layer_index,
                layer_mask.clone(),
                base,
                effective,
            ));
        }

        self.presets.replace_layers(&preset.id, &rows).await?;
        self.presets
            .set_keyspace(&preset.id, base_total, effective_total, true, 1, false)
            .await?;
        Ok(())
    }

    /// Instantiate a preset into a job execution bound to a hashlist. For
    /// increment presets the layer set is copied onto the job.
    pub async fn instantiate(
        &self,
        preset_id: &str,
        hashlist_id: &str,
        created_by: Option<&str>,
    ) -> Result<JobExecution, PresetError> {
        let preset = self.presets.get(preset_id).await?;
        let binary = self
            .binaries
            .resolve(&preset.binary_version)
            .await
            .context("resolving binary for job")?;

        let job_id = JobId::new().to_string();
        let job = self
            .jobs
            .create(
                &job_id,
                &NewJobExecution {
                    preset_job_id: Some(preset.id.clone()),
                    hashlist_id: hashlist_id.to_string(),
                    attack_mode: preset.attack_mode(),
                    binary_version_id: Some(binary.id),
                    priority: preset.priority,
                    chunk_size_seconds: preset.chunk_size_seconds,
                    wordlist_ids: preset.wordlist_id_vec(),
                    rule_ids: preset.rule_id_vec(),
                    mask: preset.mask.clone(),
                    base_keyspace: preset.base_keyspace.unwrap_or(0),
                    effective_keyspace: preset.effective_keyspace.unwrap_or(0),
                    is_accurate_keyspace: preset.is_accurate_keyspace,
                    uses_rule_splitting: preset.use_rule_splitting,
                    multiplication_factor: preset.multiplication_factor,
                    increment_mode: preset.increment_mode(),
                    increment_min: preset.increment_min,
                    increment_max: preset.increment_max,
                    max_agents: preset.max_agents,
                    created_by: created_by.map(String::from),
                },
            )
            .await?;

        if preset.increment_mode().is_enabled() {
            let layers: Vec<_> = self
                .presets
                .layers(&preset.id)
                .await?
                .into_iter()
                .map(|layer| {
                    (
                        LayerId::new().to_string(),
                        layer.layer_index,
                        layer.mask,
                        layer.base_keyspace,
                        layer.effective_keyspace,
                        true,
                    )
                })
                .collect();
            self.job_layers.insert_layers(&job.id, &layers).await?;
        }

        info!("instantiated preset '{}' as job {}", preset.name, job.id);
        Ok(job)
    }
}
