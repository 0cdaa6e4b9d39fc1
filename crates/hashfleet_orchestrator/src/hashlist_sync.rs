//! Hashlist file synchronization and crack fan-out.
//!
//! The server-side hashlist file holds only uncracked hashes. Every crack
//! batch may touch *other* hashlists sharing the same hash values, so
//! regeneration fans out across all of them; each affected file is rewritten
//! via temp-file + rename and every agent tracking row gets the new MD5,
//! forcing a resync on the agent's next assignment.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use hashfleet_db::{AgentHashlistRepo, HashlistRepo};
use hashfleet_ids::{AgentId, HashlistId};
use hashfleet_protocol::FileSyncRequest;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::settings::SystemSettings;

/// Result of applying one crack batch.
#[derive(Debug, Clone, Default)]
pub struct CrackOutcome {
    /// Number of `hash:plain` lines accepted.
    pub applied: usize,
    /// Every hashlist whose contents changed.
    pub affected_hashlists: Vec<String>,
    /// The subset of affected hashlists with zero uncracked hashes left.
    pub fully_cracked: Vec<String>,
}

#[derive(Clone)]
pub struct HashlistSync {
    config: OrchestratorConfig,
    hashlists: HashlistRepo,
    agent_hashlists: AgentHashlistRepo,
    settings: SystemSettings,
}

impl HashlistSync {
    pub fn new(
        config: OrchestratorConfig,
        hashlists: HashlistRepo,
        agent_hashlists: AgentHashlistRepo,
        settings: SystemSettings,
    ) -> Self {
        Self {
            config,
            hashlists,
            agent_hashlists,
            settings,
        }
    }

    /// Write (or rewrite) a hashlist's on-disk file from its uncracked
    /// entries and propagate the new MD5 to every agent tracking row.
    /// Returns the new hash.
    pub async fn regenerate_file(&self, hashlist_id: &str) -> Result<String> {
        let values = self.hashlists.uncracked_values(hashlist_id).await?;
        let path = self.config.hashlist_path(hashlist_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("hash.tmp");
        let mut digest = md5::Context::new();
        {
            let mut file = std::fs::File::create(&tmp_path)
                .with_context(|| format!("creating {}", tmp_path.display()))?;
            let mut writer = std::io::BufWriter::new(&mut file);
            for value in &values {
                writer.write_all(value.as_bytes())?;
                writer.write_all(b"\n")?;
                digest.consume(value.as_bytes());
                digest.consume(b"\n");
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming into {}", path.display()))?;

        let file_hash = hex::encode(digest.compute().0);
        self.agent_hashlists
            .set_hash_for_hashlist(hashlist_id, &file_hash)
            .await?;

        info!(
            "Regenerated hashlist {} ({} uncracked hashes, md5 {})",
            hashlist_id,
            values.len(),
            file_hash
        );
        Ok(file_hash)
    }

    /// Build the file-sync request for an (agent, hashlist) pair, updating
    /// the tracking row when the agent's recorded hash is stale. The byte
    /// transfer itself is the transport's business.
    pub async fn prepare_sync(
        &self,
        agent_id: &str,
        hashlist_id: &str,
        extra_files: Vec<String>,
    ) -> Result<FileSyncRequest> {
        let path = self.config.hashlist_path(hashlist_id);
        let current_hash = file_md5(&path)
            .with_context(|| format!("hashing {}", path.display()))?;

        let rel_path = self.config.hashlist_rel_path(hashlist_id);
        match self.agent_hashlists.get(agent_id, hashlist_id).await? {
            Some(row) if row.file_hash == current_hash => {
                self.agent_hashlists.touch(agent_id, hashlist_id).await?;
            }
            _ => {
                self.agent_hashlists
                    .upsert(agent_id, hashlist_id, &rel_path, &current_hash)
                    .await?;
            }
        }

        Ok(FileSyncRequest {
            agent_id: AgentId::parse(agent_id).context("agent id")?,
            hashlist_id: HashlistId::parse(hashlist_id).context("hashlist id")?,
            file_path: rel_path,
            file_hash: current_hash,
            extra_files,
        })
    }

    /// Apply a batch of `hash:plain` lines. Cracks are deduplicated across
    /// every hashlist containing the hash value; each affected hashlist file
    /// is regenerated atomically.
    pub async fn apply_crack_batch(&self, lines: &[String]) -> Result<CrackOutcome> {
        let mut cracks = Vec::with_capacity(lines.len());
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((hash, plain)) if !hash.is_empty() => {
                    cracks.push((hash.to_string(), plain.to_string()));
                }
                _ => warn!("ignoring malformed crack line: {:?}", line),
            }
        }
        if cracks.is_empty() {
            return Ok(CrackOutcome::default());
        }

        let affected = self.hashlists.mark_cracked(&cracks).await?;
        let mut fully_cracked = Vec::new();
        for hashlist_id in &affected {
            self.regenerate_file(hashlist_id).await?;
            let hashlist = self.hashlists.get(hashlist_id).await?;
            if hashlist.is_fully_cracked() {
                fully_cracked.push(hashlist_id.clone());
            }
        }

        Ok(CrackOutcome {
            applied: cracks.len(),
            affected_hashlists: affected,
            fully_cracked,
        })
    }

    /// Drop agent tracking rows unused past the retention window.
    pub async fn cleanup_stale_rows(&self) -> Result<u64> {
        let retention_hours = self.settings.agent_hashlist_retention_hours().await?;
        let cutoff = Utc::now() - Duration::hours(retention_hours);
        let deleted = self.agent_hashlists.delete_unused_since(cutoff).await?;
        if deleted > 0 {
            info!("Dropped {} stale agent-hashlist rows", deleted);
        }
        Ok(deleted)
    }
}

/// MD5 of a file, streamed in fixed-size chunks.
pub fn file_md5(path: &Path) -> Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut digest = md5::Context::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        digest.consume(&buffer[..read]);
    }
    Ok(hex::encode(digest.compute().0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashfleet_db::{connect_memory, SettingsRepo};

    async fn setup() -> (tempfile::TempDir, HashlistSync, HashlistRepo, AgentHashlistRepo) {
        let dir = tempfile::tempdir().unwrap();
        let pool = connect_memory().await.unwrap();
        let hashlists = HashlistRepo::new(pool.clone());
        let agent_hashlists = AgentHashlistRepo::new(pool.clone());
        let sync = HashlistSync::new(
            OrchestratorConfig::new(dir.path(), dir.path().join("bin")),
            hashlists.clone(),
            agent_hashlists.clone(),
            SystemSettings::new(SettingsRepo::new(pool)),
        );
        (dir, sync, hashlists, agent_hashlists)
    }

    #[tokio::test]
    async fn cross_hashlist_crack_updates_both_files_and_rows() {
        let (dir, sync, hashlists, agent_hashlists) = setup().await;
        for (id, values) in [("h1", vec!["shared", "only1"]), ("h2", vec!["shared"])] {
            hashlists
                .create(id, id, None, 0, false, &format!("hashlists/{}.hash", id))
                .await
                .unwrap();
            hashlists
                .insert_hashes(id, &values.iter().map(|s| s.to_string()).collect::<Vec<_>>())
                .await
                .unwrap();
            sync.regenerate_file(id).await.unwrap();
        }
        agent_hashlists.upsert("a1", "h1", "hashlists/h1.hash", "stale").await.unwrap();
        agent_hashlists.upsert("a2", "h2", "hashlists/h2.hash", "stale").await.unwrap();

        let outcome = sync
            .apply_crack_batch(&["shared:password1".to_string()])
            .await
            .unwrap();

        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.affected_hashlists.len(), 2);
        assert_eq!(outcome.fully_cracked, vec!["h2".to_string()]);

        // h1's file keeps only the uncracked hash, h2's file is empty
        let h1 = std::fs::read_to_string(dir.path().join("hashlists/h1.hash")).unwrap();
        assert_eq!(h1, "only1\n");
        let h2 = std::fs::read_to_string(dir.path().join("hashlists/h2.hash")).unwrap();
        assert_eq!(h2, "");

        // both agents now carry the new hashes, not "stale"
        let row1 = agent_hashlists.get("a1", "h1").await.unwrap().unwrap();
        let row2 = agent_hashlists.get("a2", "h2").await.unwrap().unwrap();
        assert_ne!(row1.file_hash, "stale");
        assert_ne!(row2.file_hash, "stale");
    }

    #[tokio::test]
    async fn regenerated_file_line_count_matches_uncracked() {
        let (dir, sync, hashlists, _) = setup().await;
        hashlists
            .create("hl", "hl", None, 0, false, "hashlists/hl.hash")
            .await
            .unwrap();
        let values: Vec<String> = (0..10).map(|i| format!("hash{:02}", i)).collect();
        hashlists.insert_hashes("hl", &values).await.unwrap();
        sync.regenerate_file("hl").await.unwrap();

        sync.apply_crack_batch(&["hash03:x".into(), "hash07:y".into()])
            .await
            .unwrap();

        let hashlist = hashlists.get("hl").await.unwrap();
        let content = std::fs::read_to_string(dir.path().join("hashlists/hl.hash")).unwrap();
        let lines = content.lines().count() as i64;
        assert_eq!(lines, hashlist.total_hashes - hashlist.cracked_hashes);
    }

    #[tokio::test]
    async fn prepare_sync_detects_stale_agent_hash() {
        let (_dir, sync, hashlists, agent_hashlists) = setup().await;
        let agent_id = AgentId::new().to_string();
        let hashlist_id = HashlistId::new().to_string();
        hashlists
            .create(&hashlist_id, "hl", None, 0, false, "hashlists/hl.hash")
            .await
            .unwrap();
        hashlists
            .insert_hashes(&hashlist_id, &["aaaa".to_string()])
            .await
            .unwrap();
        let current = sync.regenerate_file(&hashlist_id).await.unwrap();

        let request = sync.prepare_sync(&agent_id, &hashlist_id, vec![]).await.unwrap();
        assert_eq!(request.file_hash, current);

        let row = agent_hashlists.get(&agent_id, &hashlist_id).await.unwrap().unwrap();
        assert_eq!(row.file_hash, current);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let (_dir, sync, hashlists, _) = setup().await;
        hashlists
            .create("hl", "hl", None, 0, false, "hashlists/hl.hash")
            .await
            .unwrap();
        hashlists
            .insert_hashes("hl", &["aaaa".to_string()])
            .await
            .unwrap();
        sync.regenerate_file("hl").await.unwrap();

        let outcome = sync
            .apply_crack_batch(&["no-separator".into(), ":empty-hash".into(), "aaaa:pw".into()])
            .await
            .unwrap();
        assert_eq!(outcome.applied, 1);
    }
}
