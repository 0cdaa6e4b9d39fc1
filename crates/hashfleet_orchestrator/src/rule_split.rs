//! Rule-file splitting.
//!
//! Rule splitting parallelizes a job along the rule axis: agents share the
//! full base keyspace but each runs a contiguous slice of the rule file.
//! Slices are materialized as chunk files under the job's temp directory and
//! removed when their task finishes.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;

/// A rule line is anything that is not blank and not a comment.
fn is_rule_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Count effective rules in a rule file.
pub fn count_rules(path: &Path) -> Result<i64> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening rule file {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut count = 0i64;
    for line in reader.lines() {
        if is_rule_line(&line?) {
            count += 1;
        }
    }
    Ok(count)
}

#[derive(Clone)]
pub struct RuleSplitManager {
    config: OrchestratorConfig,
}

impl RuleSplitManager {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Carve rules `[start, end)` out of `source` into the deterministic
    /// chunk path for (job, chunk). Returns the chunk path.
    pub fn carve_chunk(
        &self,
        source: &Path,
        job_id: &str,
        chunk_number: i64,
        rule_start: i64,
        rule_end: i64,
    ) -> Result<PathBuf> {
        if rule_end <= rule_start {
            bail!("empty rule range [{}, {})", rule_start, rule_end);
        }

        let chunk_dir = self.config.rule_chunk_dir(job_id);
        fs::create_dir_all(&chunk_dir)
            .with_context(|| format!("creating rule chunk dir {}", chunk_dir.display()))?;
        let chunk_path = self.config.rule_chunk_path(job_id, chunk_number);

        let file = fs::File::open(source)
            .with_context(|| format!("opening rule file {}", source.display()))?;
        let reader = BufReader::new(file);
        let mut writer = BufWriter::new(
            fs::File::create(&chunk_path)
                .with_context(|| format!("creating rule chunk {}", chunk_path.display()))?,
        );

        let mut index = 0i64;
        let mut written = 0i64;
        for line in reader.lines() {
            let line = line?;
            if !is_rule_line(&line) {
                continue;
            }
            if index >= rule_end {
                break;
            }
            if index >= rule_start {
                writeln!(writer, "{}", line)?;
                written += 1;
            }
            index += 1;
        }
        writer.flush()?;

        if written == 0 {
            let _ = fs::remove_file(&chunk_path);
            bail!(
                "rule range [{}, {}) is beyond the end of {}",
                rule_start,
                rule_end,
                source.display()
            );
        }

        debug!(
            "Carved {} rules into {} for job {}",
            written,
            chunk_path.display(),
            job_id
        );
        Ok(chunk_path)
    }

    /// Remove one task's chunk file.
    pub fn remove_chunk(&self, chunk_path: &Path) {
        if let Err(err) = fs::remove_file(chunk_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove rule chunk {}: {}", chunk_path.display(), err);
            }
        }
    }

    /// Remove a job's whole rule chunk directory.
    pub fn remove_job_chunks(&self, job_id: &str) {
        let dir = self.config.rule_chunk_dir(job_id);
        if let Err(err) = fs::remove_dir_all(&dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove rule chunks for job {}: {}", job_id, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_file(dir: &Path) -> PathBuf {
        let path = dir.join("test.rule");
        // 10 rules with a comment and a blank line interleaved
        let mut content = String::from("# best-of rules\n\n");
        for i in 0..10 {
            content.push_str(&format!("$'{}'\n", i));
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn manager(dir: &Path) -> RuleSplitManager {
        RuleSplitManager::new(OrchestratorConfig::new(dir, dir.join("bin")))
    }

    #[test]
    fn count_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = rule_file(dir.path());
        assert_eq!(count_rules(&path).unwrap(), 10);
    }

    #[test]
    fn carve_extracts_half_open_range() {
        let dir = tempfile::tempdir().unwrap();
        let source = rule_file(dir.path());
        let manager = manager(dir.path());

        let chunk = manager.carve_chunk(&source, "job1", 2, 3, 7).unwrap();
        let lines: Vec<String> = fs::read_to_string(&chunk)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        assert_eq!(lines, vec!["$'3'", "$'4'", "$'5'", "$'6'"]);
        assert!(chunk.ends_with("temp/rule_chunks/job_job1/chunk_2.rule"));
    }

    #[test]
    fn carve_beyond_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = rule_file(dir.path());
        let manager = manager(dir.path());
        assert!(manager.carve_chunk(&source, "job1", 1, 10, 20).is_err());
    }

    #[test]
    fn job_cleanup_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = rule_file(dir.path());
        let manager = manager(dir.path());

        manager.carve_chunk(&source, "job1", 1, 0, 5).unwrap();
        manager.remove_job_chunks("job1");
        assert!(!dir.path().join("temp/rule_chunks/job_job1").exists());
    }
}
