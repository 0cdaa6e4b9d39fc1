//! Binary-version pattern resolution.
//!
//! Preset jobs carry a version *pattern*, not a concrete binary id, so a
//! preset created against "7.0" keeps working when 7.0.2 replaces 7.0.1.
//! Supported patterns: `default` (or empty), an exact version, or a version
//! prefix.

use anyhow::{bail, Context, Result};
use hashfleet_db::models::BinaryVersion;
use hashfleet_db::BinaryRepo;
use std::path::PathBuf;

pub const BINARY_KIND_CRACKER: &str = "cracker";

#[derive(Clone)]
pub struct BinaryResolver {
    repo: BinaryRepo,
    binary_dir: PathBuf,
}

impl BinaryResolver {
    pub fn new(repo: BinaryRepo, binary_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            binary_dir: binary_dir.into(),
        }
    }

    /// Resolve a version pattern to a concrete active binary.
    ///
    /// Among pattern matches, a binary flagged `is_default` wins; otherwise
    /// the first active match (newest version) is taken.
    pub async fn resolve(&self, pattern: &str) -> Result<BinaryVersion> {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern.eq_ignore_ascii_case("default") {
            return self
                .repo
                .get_default(BINARY_KIND_CRACKER)
                .await?
                .context("no active cracking binary registered");
        }

        let candidates = self.repo.list_active().await?;
        let matches: Vec<&BinaryVersion> = candidates
            .iter()
            .filter(|b| b.version == pattern || b.version.starts_with(pattern))
            .collect();

        if let Some(default) = matches.iter().find(|b| b.is_default) {
            return Ok((*default).clone());
        }
        match matches.first() {
            Some(first) => Ok((*first).clone()),
            None => bail!("no active binary matches version pattern '{}'", pattern),
        }
    }

    /// Resolve a stored binary id, falling back to the registry default when
    /// the job carries none.
    pub async fn resolve_id_or_default(&self, binary_id: Option<&str>) -> Result<BinaryVersion> {
        if let Some(id) = binary_id {
            if let Some(binary) = self.repo.get(id).await? {
                return Ok(binary);
            }
            bail!("binary version {} is no longer registered", id);
        }
        self.repo
            .get_default(BINARY_KIND_CRACKER)
            .await?
            .context("no active cracking binary registered")
    }

    /// Absolute filesystem path of a resolved binary.
    pub fn path_of(&self, binary: &BinaryVersion) -> PathBuf {
        self.binary_dir.join(&binary.file_path)
    }

    pub fn binary_dir(&self) -> &PathBuf {
        &self.binary_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashfleet_db::connect_memory;

    async fn resolver_with(binaries: &[(&str, &str, bool, bool)]) -> BinaryResolver {
        let pool = connect_memory().await.unwrap();
        let repo = BinaryRepo::new(pool);
        for (id, version, is_default, is_active) in binaries {
            repo.insert(&BinaryVersion {
                id: id.to_string(),
                version: version.to_string(),
                kind: BINARY_KIND_CRACKER.to_string(),
                file_path: format!("cracker-{}", version),
                is_default: *is_default,
                is_active: *is_active,
            })
            .await
            .unwrap();
        }
        BinaryResolver::new(repo, "/opt/fleet/binaries")
    }

    #[tokio::test]
    async fn default_pattern_uses_registry_default() {
        let resolver = resolver_with(&[("b1", "6.2.6", true, true), ("b2", "7.0.0", false, true)])
            .await;
        assert_eq!(resolver.resolve("default").await.unwrap().id, "b1");
        assert_eq!(resolver.resolve("").await.unwrap().id, "b1");
    }

    #[tokio::test]
    async fn prefix_pattern_prefers_flagged_default() {
        let resolver = resolver_with(&[
            ("b1", "7.0.1", false, true),
            ("b2", "7.0.2", true, true),
            ("b3", "6.2.6", false, true),
        ])
        .await;
        assert_eq!(resolver.resolve("7.0").await.unwrap().id, "b2");
    }

    #[tokio::test]
    async fn inactive_binaries_never_match() {
        let resolver = resolver_with(&[("b1", "7.0.1", false, false)]).await;
        assert!(resolver.resolve("7.0").await.is_err());
    }

    #[tokio::test]
    async fn exact_match_without_default_takes_first() {
        let resolver = resolver_with(&[("b1", "6.2.6", false, true)]).await;
        assert_eq!(resolver.resolve("6.2.6").await.unwrap().id, "b1");
    }
}
