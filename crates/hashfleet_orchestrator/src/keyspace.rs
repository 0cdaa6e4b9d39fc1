//! Keyspace calculation via the cracking binary.
//!
//! `base_keyspace` is the price of one full wordlist/mask traversal;
//! `effective_keyspace` additionally counts rule expansion and salted-hash
//! duplication. Both come from the binary itself so the numbers match what
//! agents will actually report against.

use anyhow::{bail, Context, Result};
use hashfleet_db::models::{BinaryVersion, PresetJob};
use hashfleet_db::FileResourceRepo;
use hashfleet_protocol::AttackMode;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::binaries::BinaryResolver;
use crate::config::OrchestratorConfig;

/// Deadline for a full keyspace query.
const KEYSPACE_DEADLINE: Duration = Duration::from_secs(120);
/// Deadline for a single mask-layer keyspace query.
const LAYER_KEYSPACE_DEADLINE: Duration = Duration::from_secs(30);
/// Attempts for the total-candidates query when another instance holds the
/// binary's lock files.
const TOTAL_CANDIDATES_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(5);
/// Substring the binary prints when a concurrent instance is running.
const INSTANCE_CONFLICT_MARKER: &str = "already an instance";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyspaceResult {
    pub base_keyspace: i64,
    pub effective_keyspace: i64,
    pub is_accurate: bool,
    pub multiplication_factor: i64,
    pub use_rule_splitting: bool,
}

#[derive(Clone)]
pub struct KeyspaceCalculator {
    config: OrchestratorConfig,
    binaries: BinaryResolver,
    files: FileResourceRepo,
}

impl KeyspaceCalculator {
    pub fn new(
        config: OrchestratorConfig,
        binaries: BinaryResolver,
        files: FileResourceRepo,
    ) -> Self {
        Self {
            config,
            binaries,
            files,
        }
    }

    /// Compute base and effective keyspace for a preset job.
    ///
    /// The base query must succeed; the total-candidates query may fall back
    /// to `base x rule_count` with `is_accurate = false` when the binary
    /// cannot produce it.
    pub async fn calculate(&self, preset: &PresetJob) -> Result<KeyspaceResult> {
        let binary = self
            .binaries
            .resolve(&preset.binary_version)
            .await
            .with_context(|| format!("resolving binary for preset {}", preset.id))?;

        let attack = self.attack_args(preset).await?;
        let rule_count = preset.rule_id_vec().len() as i64;

        let base = self
            .query_value(&binary, &attack, "--keyspace", KEYSPACE_DEADLINE, &preset.id)
            .await
            .context("keyspace query failed")?;

        match self.query_total_candidates(&binary, &attack, &preset.id).await {
            Ok(effective) => {
                let multiplication_factor = (effective / base).max(1);
                Ok(KeyspaceResult {
                    base_keyspace: base,
                    effective_keyspace: effective,
                    is_accurate: true,
                    multiplication_factor,
                    use_rule_splitting: rule_count > 0,
                })
            }
            Err(err) => {
                // Conservative estimate: treat each rule file as one rule.
                warn!(
                    "total-candidates unavailable for preset {}, estimating: {:#}",
                    preset.id, err
                );
                let multiplication_factor = rule_count.max(1);
                Ok(KeyspaceResult {
                    base_keyspace: base,
                    effective_keyspace: base.saturating_mul(multiplication_factor),
                    is_accurate: false,
                    multiplication_factor,
                    use_rule_splitting: false,
                })
            }
        }
    }

    /// Base keyspace of a bare mask (increment layers), short deadline.
    pub async fn mask_keyspace(
        &self,
        binary: &BinaryVersion,
        mask: &str,
        label: &str,
    ) -> Result<i64> {
        let attack = vec![
            "-a".to_string(),
            AttackMode::BruteForce.binary_code().to_string(),
            mask.to_string(),
        ];
        self.query_value(binary, &attack, "--keyspace", LAYER_KEYSPACE_DEADLINE, label)
            .await
    }

    /// Attack-mode argument list with server-side absolute resource paths.
    async fn attack_args(&self, preset: &PresetJob) -> Result<Vec<String>> {
        let mode = preset.attack_mode();
        let wordlists = self.files.get_many(&preset.wordlist_id_vec()).await?;
        let rules = self.files.get_many(&preset.rule_id_vec()).await?;
        let mask = preset.mask.clone().unwrap_or_default();

        let mut args = vec!["-a".to_string(), mode.binary_code().to_string()];
        match mode {
            AttackMode::Straight => {
                args.push(self.wordlist_arg(&wordlists[0].name));
                for rule in &rules {
                    args.push("-r".to_string());
                    args.push(self.rule_arg(&rule.name));
                }
            }
            AttackMode::Combination => {
                args.push(self.wordlist_arg(&wordlists[0].name));
                args.push(self.wordlist_arg(&wordlists[1].name));
            }
            AttackMode::BruteForce => {
                args.push(mask);
            }
            AttackMode::HybridWordlistMask => {
                args.push(self.wordlist_arg(&wordlists[0].name));
                args.push(mask);
            }
            AttackMode::HybridMaskWordlist => {
                args.push(mask);
                args.push(self.wordlist_arg(&wordlists[0].name));
            }
            AttackMode::Association => bail!("attack mode association is not supported"),
        }
        Ok(args)
    }

    fn wordlist_arg(&self, name: &str) -> String {
        self.config.wordlist_path(name).to_string_lossy().into_owned()
    }

    fn rule_arg(&self, name: &str) -> String {
        self.config.rule_path(name).to_string_lossy().into_owned()
    }

    /// Run the total-candidates query, retrying instance conflicts.
    async fn query_total_candidates(
        &self,
        binary: &BinaryVersion,
        attack: &[String],
        label: &str,
    ) -> Result<i64> {
        let mut attempt = 1;
        loop {
            match self
                .query_value(binary, attack, "--total-candidates", KEYSPACE_DEADLINE, label)
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = err.to_string().contains(INSTANCE_CONFLICT_MARKER);
                    if !retryable || attempt >= TOTAL_CANDIDATES_ATTEMPTS {
                        return Err(err);
                    }
                    debug!(
                        "instance conflict on total-candidates (attempt {}/{}), retrying",
                        attempt, TOTAL_CANDIDATES_ATTEMPTS
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Invoke the binary with a query flag and parse the last stdout line as
    /// a positive i64. Session scratch files are removed regardless of the
    /// outcome.
    async fn query_value(
        &self,
        binary: &BinaryVersion,
        attack: &[String],
        query_flag: &str,
        deadline: Duration,
        label: &str,
    ) -> Result<i64> {
        let session = new_session_id(label);
        let binary_path = self.binaries.path_of(binary);

        let mut command = Command::new(&binary_path);
        command
            .args(attack)
            .arg(query_flag)
            .arg("--restore-disable")
            .arg("--session")
            .arg(&session)
            .arg("--quiet")
            .current_dir(&self.config.data_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = run_with_deadline(command, deadline, &binary_path).await;

        // Scratch files land both next to the binary and in the workdir.
        cleanup_session_files(&self.config.data_dir, &session);
        cleanup_session_files(self.binaries.binary_dir(), &session);

        let output = result?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            bail!(
                "binary {} exited with {}: {}",
                binary.version,
                output.status,
                stderr.trim()
            );
        }

        let last_line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .with_context(|| format!("binary {} produced no output", binary.version))?;

        let value: i64 = last_line
            .parse()
            .with_context(|| format!("unparseable keyspace output '{}'", last_line))?;
        if value <= 0 {
            bail!("binary reported non-positive keyspace {}", value);
        }
        Ok(value)
    }
}

async fn run_with_deadline(
    mut command: Command,
    deadline: Duration,
    binary_path: &Path,
) -> Result<std::process::Output> {
    let child = command
        .spawn()
        .with_context(|| format!("failed to start binary {}", binary_path.display()))?;

    match tokio::time::timeout(deadline, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => bail!(
            "binary {} exceeded the {}s deadline",
            binary_path.display(),
            deadline.as_secs()
        ),
    }
}

/// Unique scratch session name: `keyspace_<label>_<nanos>`.
fn new_session_id(label: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("keyspace_{}_{}", label, nanos)
}

/// Remove every `<session>.*` file in a directory.
fn cleanup_session_files(dir: &Path, session: &str) {
    let prefix = format!("{}.", session);
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(&prefix) {
            if let Err(err) = std::fs::remove_file(entry.path()) {
                warn!("failed to remove scratch file {:?}: {}", name, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashfleet_db::{connect_memory, BinaryRepo, PresetJobRepo};
    use hashfleet_protocol::IncrementMode;
    use std::os::unix::fs::PermissionsExt;

    /// Write a stub cracking binary that prints canned output.
    fn write_stub(dir: &Path, name: &str, script: &str) {
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    async fn setup(script: &str) -> (tempfile::TempDir, KeyspaceCalculator, PresetJobRepo) {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let binary_dir = dir.path().join("binaries");
        std::fs::create_dir_all(data_dir.join("wordlists")).unwrap();
        std::fs::create_dir_all(data_dir.join("rules")).unwrap();
        std::fs::create_dir_all(&binary_dir).unwrap();
        write_stub(&binary_dir, "cracker", script);
        std::fs::write(data_dir.join("wordlists/list.txt"), "a\nb\n").unwrap();

        let pool = connect_memory().await.unwrap();
        let binaries = BinaryRepo::new(pool.clone());
        binaries
            .insert(&BinaryVersion {
                id: "b1".into(),
                version: "7.0.0".into(),
                kind: "cracker".into(),
                file_path: "cracker".into(),
                is_default: true,
                is_active: true,
            })
            .await
            .unwrap();

        let files = FileResourceRepo::new(pool.clone());
        files
            .insert("w1", "list.txt", hashfleet_db::CATEGORY_WORDLIST, Some(2))
            .await
            .unwrap();
        files
            .insert("r1", "best64.rule", hashfleet_db::CATEGORY_RULE, Some(64))
            .await
            .unwrap();

        let config = OrchestratorConfig::new(&data_dir, &binary_dir);
        let calculator = KeyspaceCalculator::new(
            config,
            BinaryResolver::new(binaries, &binary_dir),
            files,
        );
        (dir, calculator, PresetJobRepo::new(pool))
    }

    async fn straight_preset(presets: &PresetJobRepo, rules: Vec<String>) -> PresetJob {
        presets
            .create(
                "p1",
                &hashfleet_db::NewPresetJob {
                    name: "stub".into(),
                    priority: 0,
                    chunk_size_seconds: 600,
                    attack_mode: AttackMode::Straight,
                    wordlist_ids: vec!["w1".into()],
                    rule_ids: rules,
                    mask: None,
                    binary_version: "default".into(),
                    increment_mode: IncrementMode::Off,
                    increment_min: None,
                    increment_max: None,
                    status_updates_enabled: true,
                    is_small_job: false,
                    allow_high_priority_override: false,
                    max_agents: 0,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn accurate_result_from_both_queries() {
        // --keyspace prints 1000, --total-candidates prints 64000
        let script = r#"#!/bin/sh
for arg in "$@"; do
  if [ "$arg" = "--keyspace" ]; then echo 1000; exit 0; fi
  if [ "$arg" = "--total-candidates" ]; then echo 64000; exit 0; fi
done
exit 1
"#;
        let (_dir, calculator, presets) = setup(script).await;
        let preset = straight_preset(&presets, vec!["r1".into()]).await;

        let result = calculator.calculate(&preset).await.unwrap();
        assert_eq!(result.base_keyspace, 1000);
        assert_eq!(result.effective_keyspace, 64_000);
        assert!(result.is_accurate);
        assert_eq!(result.multiplication_factor, 64);
        assert!(result.use_rule_splitting);
    }

    #[tokio::test]
    async fn total_candidates_failure_falls_back_to_estimate() {
        let script = r#"#!/bin/sh
for arg in "$@"; do
  if [ "$arg" = "--keyspace" ]; then echo 5000; exit 0; fi
  if [ "$arg" = "--total-candidates" ]; then echo garbage; exit 0; fi
done
exit 1
"#;
        let (_dir, calculator, presets) = setup(script).await;
        let preset = straight_preset(&presets, vec!["r1".into()]).await;

        let result = calculator.calculate(&preset).await.unwrap();
        assert_eq!(result.base_keyspace, 5000);
        assert_eq!(result.effective_keyspace, 5000);
        assert!(!result.is_accurate);
        assert_eq!(result.multiplication_factor, 1);
        assert!(!result.use_rule_splitting);
    }

    #[tokio::test]
    async fn non_positive_keyspace_is_rejected() {
        let script = "#!/bin/sh\necho 0\n";
        let (_dir, calculator, presets) = setup(script).await;
        let preset = straight_preset(&presets, vec![]).await;
        assert!(calculator.calculate(&preset).await.is_err());
    }

    #[tokio::test]
    async fn scratch_files_are_cleaned_up() {
        // The stub writes a session log next to its workdir before answering.
        let script = r#"#!/bin/sh
session=""
grab=0
for arg in "$@"; do
  if [ $grab = 1 ]; then session="$arg"; grab=0; fi
  if [ "$arg" = "--session" ]; then grab=1; fi
done
touch "./$session.log" "./$session.potfile"
echo 1000
"#;
        let (dir, calculator, presets) = setup(script).await;
        let preset = straight_preset(&presets, vec![]).await;
        calculator.calculate(&preset).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("data"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("keyspace_"))
            .collect();
        assert!(leftovers.is_empty(), "scratch files left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn mask_keyspace_uses_brute_force_form() {
        let script = r#"#!/bin/sh
mode=""
grab=0
for arg in "$@"; do
  if [ $grab = 1 ]; then mode="$arg"; grab=0; fi
  if [ "$arg" = "-a" ]; then grab=1; fi
done
if [ "$mode" = "3" ]; then echo 676; else echo 1; fi
"#;
        let (_dir, calculator, _presets) = setup(script).await;
        let binary = BinaryVersion {
            id: "b1".into(),
            version: "7.0.0".into(),
            kind: "cracker".into(),
            file_path: "cracker".into(),
            is_default: true,
            is_active: true,
        };
        let keyspace = calculator
            .mask_keyspace(&binary, "?l?l", "layer-test")
            .await
            .unwrap();
        assert_eq!(keyspace, 676);
    }
}
