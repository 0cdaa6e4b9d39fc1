//! Preset job shape validation.
//!
//! Runs on create and update; failures surface to the admin API as failed
//! preconditions and are never retried.

use hashfleet_db::NewPresetJob;
use hashfleet_protocol::AttackMode;
use thiserror::Error;

use crate::mask::{Mask, MaskError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("attack mode {mode} requires exactly {expected} wordlist(s), got {actual}")]
    WrongWordlistCount {
        mode: AttackMode,
        expected: usize,
        actual: usize,
    },
    #[error("attack mode {mode} allows at most {max} rule file(s), got {actual}")]
    TooManyRules {
        mode: AttackMode,
        max: usize,
        actual: usize,
    },
    #[error("attack mode {0} requires a mask")]
    MaskRequired(AttackMode),
    #[error("attack mode {0} does not accept a mask")]
    MaskNotAllowed(AttackMode),
    #[error("invalid mask: {0}")]
    InvalidMask(#[from] MaskError),
    #[error("attack mode {0} is not supported")]
    UnsupportedAttackMode(AttackMode),
    #[error("priority {actual} is outside [0, {max}]")]
    PriorityOutOfRange { actual: i64, max: i64 },
    #[error("chunk size must be positive, got {0}")]
    NonPositiveChunkSize(i64),
    #[error("increment settings require a mask-based attack mode")]
    IncrementWithoutMask,
    #[error("increment range [{min}, {max}] is invalid for a {len}-token mask")]
    BadIncrementRange { min: i64, max: i64, len: i64 },
    #[error("max_agents must not be negative, got {0}")]
    NegativeMaxAgents(i64),
}

/// Validate a preset job against the per-attack-mode shape table.
pub fn validate_preset(preset: &NewPresetJob, max_priority: i64) -> Result<(), ValidationError> {
    if preset.priority < 0 || preset.priority > max_priority {
        return Err(ValidationError::PriorityOutOfRange {
            actual: preset.priority,
            max: max_priority,
        });
    }
    if preset.chunk_size_seconds <= 0 {
        return Err(ValidationError::NonPositiveChunkSize(preset.chunk_size_seconds));
    }
    if preset.max_agents < 0 {
        return Err(ValidationError::NegativeMaxAgents(preset.max_agents));
    }

    let mode = preset.attack_mode;
    let wordlists = preset.wordlist_ids.len();
    let rules = preset.rule_ids.len();
    let has_mask = preset.mask.as_deref().map(str::trim).is_some_and(|m| !m.is_empty());

    match mode {
        AttackMode::Straight => {
            expect_wordlists(mode, 1, wordlists)?;
            if rules > 1 {
                return Err(ValidationError::TooManyRules {
                    mode,
                    max: 1,
                    actual: rules,
                });
            }
            reject_mask(mode, has_mask)?;
        }
        AttackMode::Combination => {
            expect_wordlists(mode, 2, wordlists)?;
            reject_rules(mode, rules)?;
            reject_mask(mode, has_mask)?;
        }
        AttackMode::BruteForce => {
            expect_wordlists(mode, 0, wordlists)?;
            reject_rules(mode, rules)?;
            require_valid_mask(mode, preset.mask.as_deref())?;
        }
        AttackMode::HybridWordlistMask | AttackMode::HybridMaskWordlist => {
            expect_wordlists(mode, 1, wordlists)?;
            reject_rules(mode, rules)?;
            require_valid_mask(mode, preset.mask.as_deref())?;
        }
        AttackMode::Association => {
            return Err(ValidationError::UnsupportedAttackMode(mode));
        }
    }

    if preset.increment_mode.is_enabled() {
        if !mode.requires_mask() {
            return Err(ValidationError::IncrementWithoutMask);
        }
        let mask = Mask::parse(preset.mask.as_deref().unwrap_or_default())?;
        let len = mask.len() as i64;
        let min = preset.increment_min.unwrap_or(1).max(1);
        let max = preset.increment_max.unwrap_or(len).min(len);
        if min > len || max < min {
            return Err(ValidationError::BadIncrementRange { min, max, len });
        }
    }

    Ok(())
}

fn expect_wordlists(
    mode: AttackMode,
    expected: usize,
    actual: usize,
) -> Result<(), ValidationError> {
    if actual != expected {
        return Err(ValidationError::WrongWordlistCount {
            mode,
            expected,
            actual,
        });
    }
    Ok(())
}

fn reject_rules(mode: AttackMode, actual: usize) -> Result<(), ValidationError> {
    if actual > 0 {
        return Err(ValidationError::TooManyRules {
            mode,
            max: 0,
            actual,
        });
    }
    Ok(())
}

fn reject_mask(mode: AttackMode, has_mask: bool) -> Result<(), ValidationError> {
    if has_mask {
        return Err(ValidationError::MaskNotAllowed(mode));
    }
    Ok(())
}

fn require_valid_mask(mode: AttackMode, mask: Option<&str>) -> Result<(), ValidationError> {
    let pattern = mask.map(str::trim).unwrap_or_default();
    if pattern.is_empty() {
        return Err(ValidationError::MaskRequired(mode));
    }
    Mask::parse(pattern)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashfleet_protocol::IncrementMode;

    fn preset(mode: AttackMode) -> NewPresetJob {
        NewPresetJob {
            name: "test".into(),
            priority: 10,
            chunk_size_seconds: 600,
            attack_mode: mode,
            wordlist_ids: vec![],
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

    #[test]
    fn straight_needs_exactly_one_wordlist() {
        let mut p = preset(AttackMode::Straight);
        assert!(matches!(
            validate_preset(&p, 1000),
            Err(ValidationError::WrongWordlistCount { .. })
        ));

        p.wordlist_ids = vec!["w1".into()];
        assert!(validate_preset(&p, 1000).is_ok());

        p.rule_ids = vec!["r1".into(), "r2".into()];
        assert!(matches!(
            validate_preset(&p, 1000),
            Err(ValidationError::TooManyRules { .. })
        ));
    }

    #[test]
    fn combination_needs_two_wordlists_and_no_rules() {
        let mut p = preset(AttackMode::Combination);
        p.wordlist_ids = vec!["w1".into(), "w2".into()];
        assert!(validate_preset(&p, 1000).is_ok());

        p.rule_ids = vec!["r1".into()];
        assert!(matches!(
            validate_preset(&p, 1000),
            Err(ValidationError::TooManyRules { .. })
        ));
    }

    #[test]
    fn brute_force_requires_valid_mask() {
        let mut p = preset(AttackMode::BruteForce);
        assert!(matches!(
            validate_preset(&p, 1000),
            Err(ValidationError::MaskRequired(_))
        ));

        p.mask = Some("?l?l?".into());
        assert!(matches!(
            validate_preset(&p, 1000),
            Err(ValidationError::InvalidMask(_))
        ));

        p.mask = Some("?l?l?d".into());
        assert!(validate_preset(&p, 1000).is_ok());
    }

    #[test]
    fn association_is_rejected() {
        let p = preset(AttackMode::Association);
        assert!(matches!(
            validate_preset(&p, 1000),
            Err(ValidationError::UnsupportedAttackMode(_))
        ));
    }

    #[test]
    fn priority_bound_comes_from_settings() {
        let mut p = preset(AttackMode::BruteForce);
        p.mask = Some("?d?d".into());
        p.priority = 1500;
        assert!(matches!(
            validate_preset(&p, 1000),
            Err(ValidationError::PriorityOutOfRange { .. })
        ));
        assert!(validate_preset(&p, 2000).is_ok());
    }

    #[test]
    fn increment_range_is_clamped_then_checked() {
        let mut p = preset(AttackMode::BruteForce);
        p.mask = Some("?l?l?l?l".into());
        p.increment_mode = IncrementMode::Increment;
        p.increment_min = Some(2);
        p.increment_max = Some(9);
        // max clamps to the mask length, so this is fine
        assert!(validate_preset(&p, 1000).is_ok());

        p.increment_min = Some(5);
        assert!(matches!(
            validate_preset(&p, 1000),
            Err(ValidationError::BadIncrementRange { .. })
        ));
    }
}
