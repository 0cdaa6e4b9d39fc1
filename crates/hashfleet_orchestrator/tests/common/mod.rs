//! Shared fixture for orchestrator integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use hashfleet_db::{
    connect_memory, AgentRepo, BenchmarkRepo, DbPool, FileResourceRepo, HashlistRepo, JobRepo,
    NewJobExecution,
};
use hashfleet_ids::{AgentId, HashlistId, JobId};
use hashfleet_orchestrator::{
    AgentTransport, Orchestrator, OrchestratorConfig, RecordingBus,
};
use hashfleet_protocol::{AttackMode, FileSyncRequest, IncrementMode, JobAssignment, JobStop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Transport double that records every message and can be told to fail
/// assigns.
#[derive(Default)]
pub struct MockTransport {
    pub file_syncs: Mutex<Vec<FileSyncRequest>>,
    pub assignments: Mutex<Vec<(String, JobAssignment)>>,
    pub stops: Mutex<Vec<(String, JobStop)>>,
    pub fail_assigns: AtomicBool,
}

impl MockTransport {
    pub fn assignments(&self) -> Vec<(String, JobAssignment)> {
        self.assignments.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<(String, JobStop)> {
        self.stops.lock().unwrap().clone()
    }

    pub fn set_fail_assigns(&self, fail: bool) {
        self.fail_assigns.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentTransport for MockTransport {
    async fn send_file_sync(&self, request: FileSyncRequest) -> anyhow::Result<()> {
        self.file_syncs.lock().unwrap().push(request);
        Ok(())
    }

    async fn send_job_assign(
        &self,
        agent_id: &AgentId,
        assignment: JobAssignment,
    ) -> anyhow::Result<()> {
        if self.fail_assigns.load(Ordering::SeqCst) {
            anyhow::bail!("transport down");
        }
        self.assignments
            .lock()
            .unwrap()
            .push((agent_id.to_string(), assignment));
        Ok(())
    }

    async fn send_job_stop(&self, agent_id: &AgentId, stop: JobStop) -> anyhow::Result<()> {
        self.stops.lock().unwrap().push((agent_id.to_string(), stop));
        Ok(())
    }
}

pub struct TestFleet {
    pub orchestrator: Orchestrator,
    pub pool: DbPool,
    pub transport: Arc<MockTransport>,
    pub bus: Arc<RecordingBus>,
    pub dir: TempDir,
}

pub async fn fleet() -> TestFleet {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    for sub in ["hashlists", "wordlists", "rules", "temp"] {
        std::fs::create_dir_all(data_dir.join(sub)).unwrap();
    }
    let binary_dir = dir.path().join("binaries");
    std::fs::create_dir_all(&binary_dir).unwrap();

    let pool = connect_memory().await.unwrap();
    let transport = Arc::new(MockTransport::default());
    let bus = Arc::new(RecordingBus::new());
    let config = OrchestratorConfig::new(&data_dir, &binary_dir);
    let orchestrator = Orchestrator::new(pool.clone(), config, transport.clone(), bus.clone());

    TestFleet {
        orchestrator,
        pool,
        transport,
        bus,
        dir,
    }
}

impl TestFleet {
    /// Create a hashlist with `count` synthetic hashes and its on-disk file.
    pub async fn create_hashlist(&self, count: usize, is_salted: bool) -> String {
        let id = HashlistId::new().to_string();
        let repo = HashlistRepo::new(self.pool.clone());
        repo.create(
            &id,
            "test-hashlist",
            None,
            if is_salted { 1800 } else { 0 },
            is_salted,
            &format!("hashlists/{}.hash", id),
        )
        .await
        .unwrap();

        let values: Vec<String> = (0..count).map(|i| format!("{}-{:06x}", &id[..8], i)).collect();
        repo.insert_hashes(&id, &values).await.unwrap();
        self.orchestrator
            .hashlist_sync()
            .regenerate_file(&id)
            .await
            .unwrap();
        id
    }

    /// Register a wordlist resource row (the planner only needs the name).
    pub async fn register_wordlist(&self, name: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        FileResourceRepo::new(self.pool.clone())
            .insert(&id, name, hashfleet_db::CATEGORY_WORDLIST, None)
            .await
            .unwrap();
        id
    }

    /// Register a rule resource row and write `rules` rule lines to disk.
    pub async fn register_rule_file(&self, name: &str, rules: usize) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        FileResourceRepo::new(self.pool.clone())
            .insert(&id, name, hashfleet_db::CATEGORY_RULE, Some(rules as i64))
            .await
            .unwrap();

        let mut content = String::new();
        for i in 0..rules {
            content.push_str(&format!("${}\n", i));
        }
        std::fs::write(
            self.orchestrator.config().rule_path(name),
            content,
        )
        .unwrap();
        id
    }

    /// Register an idle agent with a fresh benchmark for the given key.
    pub async fn register_agent(
        &self,
        mode: AttackMode,
        hash_type_id: i64,
        salt_bucket: Option<i64>,
        speed: i64,
    ) -> String {
        let id = AgentId::new().to_string();
        AgentRepo::new(self.pool.clone())
            .register(&id, "test-rig", None, None)
            .await
            .unwrap();
        BenchmarkRepo::new(self.pool.clone())
            .upsert(&id, mode, hash_type_id, salt_bucket, speed)
            .await
            .unwrap();
        id
    }

    /// Create a straight-mode job over one wordlist.
    pub async fn create_straight_job(
        &self,
        hashlist_id: &str,
        wordlist_id: &str,
        base_keyspace: i64,
        chunk_seconds: i64,
    ) -> String {
        let id = JobId::new().to_string();
        JobRepo::new(self.pool.clone())
            .create(
                &id,
                &NewJobExecution {
                    preset_job_id: None,
                    hashlist_id: hashlist_id.to_string(),
                    attack_mode: AttackMode::Straight,
                    binary_version_id: None,
                    priority: 10,
                    chunk_size_seconds: chunk_seconds,
                    wordlist_ids: vec![wordlist_id.to_string()],
                    rule_ids: vec![],
                    mask: None,
                    base_keyspace,
                    effective_keyspace: base_keyspace,
                    is_accurate_keyspace: true,
                    uses_rule_splitting: false,
                    multiplication_factor: 1,
                    increment_mode: IncrementMode::Off,
                    increment_min: None,
                    increment_max: None,
                    max_agents: 0,
                    created_by: None,
                },
            )
            .await
            .unwrap();
        id
    }

    /// Create a rule-splitting job: full wordlist per agent, rules sliced.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_rule_split_job(
        &self,
        hashlist_id: &str,
        wordlist_id: &str,
        rule_id: &str,
        base_keyspace: i64,
        total_rules: i64,
        chunk_seconds: i64,
    ) -> String {
        let id = JobId::new().to_string();
        JobRepo::new(self.pool.clone())
            .create(
                &id,
                &NewJobExecution {
                    preset_job_id: None,
                    hashlist_id: hashlist_id.to_string(),
                    attack_mode: AttackMode::Straight,
                    binary_version_id: None,
                    priority: 10,
                    chunk_size_seconds: chunk_seconds,
                    wordlist_ids: vec![wordlist_id.to_string()],
                    rule_ids: vec![rule_id.to_string()],
                    mask: None,
                    base_keyspace,
                    effective_keyspace: base_keyspace * total_rules,
                    is_accurate_keyspace: true,
                    uses_rule_splitting: true,
                    multiplication_factor: total_rules,
                    increment_mode: IncrementMode::Off,
                    increment_min: None,
                    increment_max: None,
                    max_agents: 0,
                    created_by: None,
                },
            )
            .await
            .unwrap();
        id
    }
}
