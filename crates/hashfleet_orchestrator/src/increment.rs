//! Increment-layer expansion.
//!
//! An increment-mode mask job becomes an ordered sequence of per-length
//! sub-jobs, each with its own keyspace. Forward mode grows the mask from
//! the front; inverse mode drops tokens from the front instead.

use anyhow::{Context, Result};
use hashfleet_db::models::{JobExecution, JobIncrementLayer};
use hashfleet_db::{JobLayerRepo, JobRepo};
use hashfleet_ids::LayerId;
use tracing::info;

use crate::binaries::BinaryResolver;
use crate::keyspace::KeyspaceCalculator;
use crate::mask::Mask;
use crate::validate::ValidationError;

/// Expand a mask and [min, max] token range into ordered layer masks.
pub fn expand_layers(
    pattern: &str,
    increment_min: Option<i64>,
    increment_max: Option<i64>,
    inverse: bool,
) -> Result<Vec<String>, ValidationError> {
    let mask = Mask::parse(pattern)?;
    let len = mask.len() as i64;

    let min = increment_min.unwrap_or(1).max(1);
    let max = increment_max.unwrap_or(len).min(len);
    if min > len || max < min {
        return Err(ValidationError::BadIncrementRange { min, max, len });
    }

    let layers = (min..=max)
        .map(|count| {
            let count = count as usize;
            if inverse {
                mask.suffix(count).to_string()
            } else {
                mask.prefix(count).to_string()
            }
        })
        .collect();
    Ok(layers)
}

pub struct IncrementLayerBuilder {
    keyspace: KeyspaceCalculator,
    binaries: BinaryResolver,
    layers: JobLayerRepo,
    jobs: JobRepo,
}

impl IncrementLayerBuilder {
    pub fn new(
        keyspace: KeyspaceCalculator,
        binaries: BinaryResolver,
        layers: JobLayerRepo,
        jobs: JobRepo,
    ) -> Self {
        Self {
            keyspace,
            binaries,
            layers,
            jobs,
        }
    }

    /// Expand a job's increment mask, compute per-layer keyspaces, persist
    /// the layer set atomically, and roll the totals into the parent job.
    pub async fn build_for_job(&self, job: &JobExecution) -> Result<Vec<JobIncrementLayer>> {
        let pattern = job
            .mask
            .as_deref()
            .context("increment job without a mask")?;
        let inverse = job.increment_mode()
            == hashfleet_protocol::IncrementMode::IncrementInverse;
        let masks = expand_layers(pattern, job.increment_min, job.increment_max, inverse)?;

        let binary = self
            .binaries
            .resolve_id_or_default(job.binary_version_id.as_deref())
            .await?;

        let mut rows = Vec::with_capacity(masks.len());
        let mut base_total = 0i64;
        let mut effective_total = 0i64;
        for (index, layer_mask) in masks.iter().enumerate() {
            let layer_index = index as i64 + 1;
            let label = format!("{}_l{}", job.id, layer_index);
            let base = self
                .keyspace
                .mask_keyspace(&binary, layer_mask, &label)
                .await
                .with_context(|| format!("keyspace for layer {} ({})", layer_index, layer_mask))?;
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
                true,
            ));
        }

        self.layers.insert_layers(&job.id, &rows).await?;
        self.jobs
            .set_keyspace_totals(&job.id, base_total, effective_total)
            .await?;

        info!(
            "Expanded job {} into {} increment layers (effective keyspace {})",
            job.id,
            rows.len(),
            effective_total
        );
        self.layers.list_for_job(&job.id).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_mode_emits_prefixes() {
        let layers = expand_layers("?l?l?l?l?l?l", Some(2), Some(4), false).unwrap();
        assert_eq!(layers, vec!["?l?l", "?l?l?l", "?l?l?l?l"]);
    }

    #[test]
    fn inverse_mode_emits_suffixes() {
        let layers = expand_layers("?u?l?d", Some(1), Some(3), true).unwrap();
        assert_eq!(layers, vec!["?d", "?l?d", "?u?l?d"]);
    }

    #[test]
    fn bounds_default_and_clamp() {
        // min defaults to 1, max defaults to the token count
        let layers = expand_layers("?d?d?d", None, None, false).unwrap();
        assert_eq!(layers, vec!["?d", "?d?d", "?d?d?d"]);

        // max above the mask length clamps down
        let layers = expand_layers("?d?d", Some(1), Some(10), false).unwrap();
        assert_eq!(layers.len(), 2);
    }

    #[test]
    fn min_beyond_mask_length_fails() {
        assert!(matches!(
            expand_layers("?d?d", Some(3), None, false),
            Err(ValidationError::BadIncrementRange { .. })
        ));
    }

    #[test]
    fn max_below_min_fails() {
        assert!(matches!(
            expand_layers("?d?d?d?d", Some(3), Some(2), false),
            Err(ValidationError::BadIncrementRange { .. })
        ));
    }

    #[test]
    fn layer_masks_count_class_tokens_as_one() {
        let layers = expand_layers("ab?d?d", Some(3), Some(4), false).unwrap();
        assert_eq!(layers, vec!["ab?d", "ab?d?d"]);
    }
}
