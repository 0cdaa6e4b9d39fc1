//! In-memory progress tracking for long-running hashlist operations.
//!
//! Ingest and deletion both run for minutes on large hashlists; the admin
//! API polls these records for live counts. Entries in a terminal phase are
//! pruned by a periodic sweep.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use hashfleet_db::{AgentHashlistRepo, HashlistRepo, JobRepo};
use hashfleet_protocol::ProgressPhase;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::hashlist_sync::HashlistSync;
use crate::rule_split::RuleSplitManager;

/// Rows deleted per batch while draining a hashlist.
const DELETE_BATCH_SIZE: i64 = 5_000;
/// Upper bound on a single hashlist deletion.
const DELETION_DEADLINE: std::time::Duration = std::time::Duration::from_secs(2 * 60 * 60);
/// Hashes inserted per batch during ingest.
const INGEST_BATCH_SIZE: usize = 5_000;
/// Terminal entries older than this are pruned.
const PRUNE_AFTER_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub phase: ProgressPhase,
    pub checked: u64,
    pub total: u64,
    pub deleted: u64,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    fn new() -> Self {
        Self {
            phase: ProgressPhase::Pending,
            checked: 0,
            total: 0,
            deleted: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Keyed map of hashlist id to progress record, shared across callers.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<HashMap<String, ProgressRecord>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, key: &str) {
        let mut map = self.inner.write().expect("progress tracker lock");
        map.insert(key.to_string(), ProgressRecord::new());
    }

    pub fn set_phase(&self, key: &str, phase: ProgressPhase) {
        let mut map = self.inner.write().expect("progress tracker lock");
        if let Some(record) = map.get_mut(key) {
            record.phase = phase;
            record.updated_at = Utc::now();
        }
    }

    pub fn update_counts(&self, key: &str, checked: u64, total: u64, deleted: u64) {
        let mut map = self.inner.write().expect("progress tracker lock");
        if let Some(record) = map.get_mut(key) {
            record.checked = checked;
            record.total = total;
            record.deleted = deleted;
            record.updated_at = Utc::now();
        }
    }

    pub fn fail(&self, key: &str, error: impl Into<String>) {
        let mut map = self.inner.write().expect("progress tracker lock");
        if let Some(record) = map.get_mut(key) {
            record.phase = ProgressPhase::Failed;
            record.error = Some(error.into());
            record.updated_at = Utc::now();
        }
    }

    pub fn get(&self, key: &str) -> Option<ProgressRecord> {
        self.inner
            .read()
            .expect("progress tracker lock")
            .get(key)
            .cloned()
    }

    /// Drop terminal records older than the prune window. Returns how many
    /// were removed.
    pub fn prune_terminal(&self) -> usize {
        let cutoff = Utc::now() - Duration::minutes(PRUNE_AFTER_MINUTES);
        let mut map = self.inner.write().expect("progress tracker lock");
        let before = map.len();
        map.retain(|_, record| !(record.phase.is_terminal() && record.updated_at < cutoff));
        before - map.len()
    }
}

/// Streams a hashlist out of existence while keeping memory bounded and the
/// progress record current.
#[derive(Clone)]
pub struct HashlistDeletionService {
    config: OrchestratorConfig,
    hashlists: HashlistRepo,
    agent_hashlists: AgentHashlistRepo,
    jobs: JobRepo,
    rule_split: RuleSplitManager,
    pub tracker: ProgressTracker,
}

impl HashlistDeletionService {
    pub fn new(
        config: OrchestratorConfig,
        hashlists: HashlistRepo,
        agent_hashlists: AgentHashlistRepo,
        jobs: JobRepo,
        rule_split: RuleSplitManager,
    ) -> Self {
        Self {
            config,
            hashlists,
            agent_hashlists,
            jobs,
            rule_split,
            tracker: ProgressTracker::new(),
        }
    }

    pub async fn delete_hashlist(&self, hashlist_id: &str) -> Result<()> {
        self.tracker.begin(hashlist_id);
        let bounded = tokio::time::timeout(DELETION_DEADLINE, self.delete_inner(hashlist_id));
        match bounded.await {
            Ok(Ok(())) => {
                self.tracker.set_phase(hashlist_id, ProgressPhase::Completed);
                Ok(())
            }
            Ok(Err(err)) => {
                self.tracker.fail(hashlist_id, format!("{:#}", err));
                Err(err)
            }
            Err(_) => {
                let err = anyhow::anyhow!(
                    "deletion of hashlist {} exceeded the {}h deadline",
                    hashlist_id,
                    DELETION_DEADLINE.as_secs() / 3600
                );
                self.tracker.fail(hashlist_id, err.to_string());
                Err(err)
            }
        }
    }

    async fn delete_inner(&self, hashlist_id: &str) -> Result<()> {
        let hashlist = self.hashlists.get(hashlist_id).await?;
        let total = hashlist.total_hashes.max(0) as u64;

        self.tracker.set_phase(hashlist_id, ProgressPhase::DeletingHashes);
        let mut deleted = 0u64;
        loop {
            let removed = self
                .hashlists
                .delete_hash_batch(hashlist_id, DELETE_BATCH_SIZE)
                .await?;
            if removed == 0 {
                break;
            }
            deleted += removed;
            self.tracker.update_counts(hashlist_id, deleted, total, deleted);
        }

        self.tracker
            .set_phase(hashlist_id, ProgressPhase::ClearingReferences);
        let jobs = self.jobs.list_for_hashlist(hashlist_id).await?;
        for job in &jobs {
            self.jobs.delete(&job.id).await?;
        }
        self.agent_hashlists.delete_for_hashlist(hashlist_id).await?;

        self.tracker
            .set_phase(hashlist_id, ProgressPhase::CleaningOrphans);
        for job in &jobs {
            self.rule_split.remove_job_chunks(&job.id);
        }
        let file = self.config.hashlist_path(hashlist_id);
        if let Err(err) = std::fs::remove_file(&file) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove hashlist file {}: {}", file.display(), err);
            }
        }

        self.tracker.set_phase(hashlist_id, ProgressPhase::Finalizing);
        self.hashlists.delete(hashlist_id).await?;

        info!(
            "deleted hashlist {} ({} hashes, {} jobs)",
            hashlist_id,
            deleted,
            jobs.len()
        );
        Ok(())
    }
}

/// Streams hash lines into a new hashlist: normalizes, counts, persists in
/// batches, then writes the on-disk file.
#[derive(Clone)]
pub struct HashlistIngestService {
    hashlists: HashlistRepo,
    sync: HashlistSync,
    pub tracker: ProgressTracker,
}

impl HashlistIngestService {
    pub fn new(hashlists: HashlistRepo, sync: HashlistSync) -> Self {
        Self {
            hashlists,
            sync,
            tracker: ProgressTracker::new(),
        }
    }

    /// Ingest newline-delimited hashes from a source file into an already
    /// created hashlist row.
    pub async fn ingest_file(&self, hashlist_id: &str, source: &std::path::Path) -> Result<()> {
        self.tracker.begin(hashlist_id);
        self.tracker.set_phase(hashlist_id, ProgressPhase::Processing);

        match self.ingest_inner(hashlist_id, source).await {
            Ok(count) => {
                self.tracker.update_counts(hashlist_id, count, count, 0);
                self.tracker.set_phase(hashlist_id, ProgressPhase::Completed);
                Ok(())
            }
            Err(err) => {
                self.tracker.fail(hashlist_id, format!("{:#}", err));
                Err(err)
            }
        }
    }

    async fn ingest_inner(&self, hashlist_id: &str, source: &std::path::Path) -> Result<u64> {
        use std::io::BufRead;

        let file = std::fs::File::open(source)
            .with_context(|| format!("opening {}", source.display()))?;
        let reader = std::io::BufReader::new(file);

        let mut batch = Vec::with_capacity(INGEST_BATCH_SIZE);
        let mut count = 0u64;
        for line in reader.lines() {
            let line = line?;
            let hash = line.trim();
            if hash.is_empty() {
                continue;
            }
            batch.push(hash.to_string());
            count += 1;

            if batch.len() >= INGEST_BATCH_SIZE {
                self.hashlists.insert_hashes(hashlist_id, &batch).await?;
                self.tracker.update_counts(hashlist_id, count, 0, 0);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.hashlists.insert_hashes(hashlist_id, &batch).await?;
        }

        self.tracker.set_phase(hashlist_id, ProgressPhase::Finalizing);
        self.sync.regenerate_file(hashlist_id).await?;

        info!("ingested {} hashes into hashlist {}", count, hashlist_id);
        Ok(count)
    }
}
