//! Orchestrator configuration (plain data).

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Filesystem layout and timer cadence for the orchestrator.
///
/// All on-disk resources live under `data_dir`:
///
/// ```text
/// <data>/
///   hashlists/<hashlist_id>.hash
///   wordlists/<relative path>
///   rules/<relative path>
///   temp/rule_chunks/job_<uuid>/chunk_<n>.rule
/// ```
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub data_dir: PathBuf,
    /// Directory holding the cracking binaries.
    pub binary_dir: PathBuf,
    pub reconcile_interval: Duration,
    pub offline_sweep_interval: Duration,
    pub hashlist_cleanup_interval: Duration,
    pub progress_prune_interval: Duration,
}

impl OrchestratorConfig {
    pub fn new(data_dir: impl Into<PathBuf>, binary_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            binary_dir: binary_dir.into(),
            reconcile_interval: Duration::from_secs(60),
            offline_sweep_interval: Duration::from_secs(60),
            hashlist_cleanup_interval: Duration::from_secs(3600),
            progress_prune_interval: Duration::from_secs(300),
        }
    }

    pub fn hashlists_dir(&self) -> PathBuf {
        self.data_dir.join("hashlists")
    }

    pub fn hashlist_path(&self, hashlist_id: &str) -> PathBuf {
        self.hashlists_dir().join(format!("{}.hash", hashlist_id))
    }

    /// Agent-relative hashlist path used in attack commands and messages.
    pub fn hashlist_rel_path(&self, hashlist_id: &str) -> String {
        format!("hashlists/{}.hash", hashlist_id)
    }

    pub fn wordlist_path(&self, name: &str) -> PathBuf {
        self.data_dir.join("wordlists").join(name)
    }

    pub fn rule_path(&self, name: &str) -> PathBuf {
        self.data_dir.join("rules").join(name)
    }

    pub fn rule_chunk_dir(&self, job_id: &str) -> PathBuf {
        self.data_dir
            .join("temp")
            .join("rule_chunks")
            .join(format!("job_{}", job_id))
    }

    pub fn rule_chunk_path(&self, job_id: &str, chunk_number: i64) -> PathBuf {
        self.rule_chunk_dir(job_id)
            .join(format!("chunk_{}.rule", chunk_number))
    }

    /// Strip the data root, yielding the agent-relative form of a path.
    pub fn rel_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.data_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
