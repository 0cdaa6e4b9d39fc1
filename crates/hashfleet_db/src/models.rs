//! Row models.
//!
//! Status and mode columns are stored as their canonical string form; the
//! typed accessors parse them back into the protocol enums. Repositories are
//! the only writers, so a row that fails to parse indicates corruption and
//! falls back to the enum default.

use chrono::{DateTime, Utc};
use hashfleet_protocol::{
    AgentStatus, AttackMode, IncrementMode, JobStatus, LayerStatus, OfflineBufferStatus,
    TaskStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, Clone, FromRow)]
pub struct Hashlist {
    pub id: String,
    pub name: String,
    pub client_id: Option<String>,
    pub hash_type_id: i64,
    pub is_salted: bool,
    pub total_hashes: i64,
    pub cracked_hashes: i64,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hashlist {
    pub fn uncracked_count(&self) -> i64 {
        (self.total_hashes - self.cracked_hashes).max(0)
    }

    pub fn is_fully_cracked(&self) -> bool {
        self.total_hashes > 0 && self.cracked_hashes >= self.total_hashes
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HashEntry {
    pub id: i64,
    pub hashlist_id: String,
    pub hash_value: String,
    pub plain_text: Option<String>,
    pub is_cracked: bool,
    pub cracked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PresetJob {
    pub id: String,
    pub name: String,
    pub priority: i64,
    pub chunk_size_seconds: i64,
    pub attack_mode: String,
    pub wordlist_ids: String,
    pub rule_ids: String,
    pub mask: Option<String>,
    pub binary_version: String,
    pub increment_mode: String,
    pub increment_min: Option<i64>,
    pub increment_max: Option<i64>,
    pub status_updates_enabled: bool,
    pub is_small_job: bool,
    pub allow_high_priority_override: bool,
    pub max_agents: i64,
    pub base_keyspace: Option<i64>,
    pub effective_keyspace: Option<i64>,
    pub is_accurate_keyspace: bool,
    pub use_rule_splitting: bool,
    pub multiplication_factor: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PresetJob {
    pub fn attack_mode(&self) -> AttackMode {
        AttackMode::from_str(&self.attack_mode).unwrap_or(AttackMode::Straight)
    }

    pub fn increment_mode(&self) -> IncrementMode {
        IncrementMode::from_str(&self.increment_mode).unwrap_or_default()
    }

    pub fn wordlist_id_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.wordlist_ids).unwrap_or_default()
    }

    pub fn rule_id_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.rule_ids).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PresetIncrementLayer {
    pub id: String,
    pub preset_job_id: String,
    pub layer_index: i64,
    pub mask: String,
    pub base_keyspace: i64,
    pub effective_keyspace: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct JobExecution {
    pub id: String,
    pub preset_job_id: Option<String>,
    pub hashlist_id: String,
    pub attack_mode: String,
    pub binary_version_id: Option<String>,
    pub priority: i64,
    pub chunk_size_seconds: i64,
    pub status: String,
    pub wordlist_ids: String,
    pub rule_ids: String,
    pub mask: Option<String>,
    pub base_keyspace: i64,
    pub total_keyspace: i64,
    pub effective_keyspace: i64,
    pub processed_keyspace: i64,
    pub dispatched_keyspace: i64,
    pub is_accurate_keyspace: bool,
    pub uses_rule_splitting: bool,
    pub multiplication_factor: i64,
    pub increment_mode: String,
    pub increment_min: Option<i64>,
    pub increment_max: Option<i64>,
    pub max_agents: i64,
    pub consecutive_failures: i64,
    pub error_message: Option<String>,
    pub overall_progress_percent: f64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobExecution {
    pub fn status(&self) -> JobStatus {
        JobStatus::from_str(&self.status).unwrap_or_default()
    }

    pub fn attack_mode(&self) -> AttackMode {
        AttackMode::from_str(&self.attack_mode).unwrap_or(AttackMode::Straight)
    }

    pub fn increment_mode(&self) -> IncrementMode {
        IncrementMode::from_str(&self.increment_mode).unwrap_or_default()
    }

    pub fn wordlist_id_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.wordlist_ids).unwrap_or_default()
    }

    pub fn rule_id_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.rule_ids).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct JobIncrementLayer {
    pub id: String,
    pub job_execution_id: String,
    pub layer_index: i64,
    pub mask: String,
    pub status: String,
    pub base_keyspace: i64,
    pub effective_keyspace: i64,
    pub dispatched_keyspace: i64,
    pub processed_keyspace: i64,
    pub is_accurate_keyspace: bool,
    pub overall_progress_percent: f64,
}

impl JobIncrementLayer {
    pub fn status(&self) -> LayerStatus {
        LayerStatus::from_str(&self.status).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct JobTask {
    pub id: String,
    pub job_execution_id: String,
    pub increment_layer_id: Option<String>,
    pub agent_id: Option<String>,
    pub status: String,
    pub chunk_number: i64,
    pub chunk_duration: i64,
    pub benchmark_speed: Option<i64>,
    pub attack_cmd: String,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
    pub keyspace_processed: i64,
    pub effective_keyspace_start: i64,
    pub effective_keyspace_end: i64,
    pub effective_keyspace_processed: i64,
    pub is_keyspace_split: bool,
    pub is_rule_split_task: bool,
    pub rule_start_index: Option<i64>,
    pub rule_end_index: Option<i64>,
    pub rule_chunk_path: Option<String>,
    pub retry_count: i64,
    pub retransmit_count: i64,
    pub expected_crack_count: i64,
    pub received_crack_count: i64,
    pub grace_deadline: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobTask {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_str(&self.status).unwrap_or_default()
    }

    /// Base-keyspace width of this chunk.
    pub fn keyspace_size(&self) -> i64 {
        self.keyspace_end - self.keyspace_start
    }

    /// Work left in the chunk after the last reported checkpoint.
    pub fn remaining_keyspace(&self) -> i64 {
        (self.keyspace_end - self.keyspace_processed.max(self.keyspace_start)).max(0)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub status: String,
    pub consecutive_failures: i64,
    pub hardware: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn status(&self) -> AgentStatus {
        AgentStatus::from_str(&self.status).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Benchmark {
    pub id: i64,
    pub agent_id: String,
    pub attack_mode: String,
    pub hash_type_id: i64,
    pub salt_count_bucket: Option<i64>,
    pub speed: i64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AgentHashlist {
    pub agent_id: String,
    pub hashlist_id: String,
    pub file_path: String,
    pub file_hash: String,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OfflineBufferEntry {
    pub id: i64,
    pub agent_id: String,
    pub disconnected_at: DateTime<Utc>,
    pub notification_due_at: DateTime<Utc>,
    pub status: String,
}

impl OfflineBufferEntry {
    pub fn status(&self) -> OfflineBufferStatus {
        OfflineBufferStatus::from_str(&self.status).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BinaryVersion {
    pub id: String,
    pub version: String,
    pub kind: String,
    pub file_path: String,
    pub is_default: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileResource {
    pub id: String,
    /// Path relative to the category directory under the data root.
    pub name: String,
    pub category: String,
    pub line_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}
