//! Agent message payloads.
//!
//! The transport decides how these go over the wire; the core only fixes the
//! message kinds and their fields.

use hashfleet_ids::{AgentId, HashlistId, JobId, TaskId};
use serde::{Deserialize, Serialize};

/// Ask an agent to verify (and if needed fetch) the current hashlist bytes.
///
/// The round trip is bounded by the dispatcher's file-sync deadline, which is
/// generous because agents hash wordlists that can run to tens of gigabytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSyncRequest {
    pub agent_id: AgentId,
    pub hashlist_id: HashlistId,
    /// Path of the hashlist relative to the agent's data root.
    pub file_path: String,
    /// MD5 of the current hashlist bytes on the server.
    pub file_hash: String,
    /// Additional files (wordlists, rules, rule chunks) the task needs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_files: Vec<String>,
}

/// Hand a planned chunk to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAssignment {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub hashlist_id: HashlistId,
    /// Fully constructed binary invocation for this chunk.
    pub attack_cmd: String,
    pub chunk_number: i64,
    /// Target wall-clock duration for the chunk, seconds.
    pub chunk_duration: i64,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
    /// Whether the command carries skip/limit chunk flags.
    pub is_keyspace_split: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_chunk_path: Option<String>,
    /// Whether the agent should emit periodic status updates.
    pub report_status: bool,
}

/// Tell an agent to abandon a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStop {
    pub task_id: TaskId,
}

/// Periodic progress report from an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgressReport {
    pub task_id: TaskId,
    /// Absolute base-keyspace position, not a delta.
    pub keyspace_processed: i64,
    /// Observed hash rate for this chunk, if the agent measured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark_speed: Option<i64>,
    /// Binary status code; 6 means every hash in the list is cracked.
    pub status_code: i32,
    /// Number of crack batches the agent still intends to flush.
    #[serde(default)]
    pub pending_crack_batches: i64,
}

/// A batch of `hash:plain` lines recovered by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrackBatch {
    pub task_id: TaskId,
    pub lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_roundtrips_through_json() {
        let assignment = JobAssignment {
            task_id: TaskId::new(),
            job_id: JobId::new(),
            hashlist_id: HashlistId::new(),
            attack_cmd: "-a 0 -m 0 hashlists/x.hash wordlists/rockyou.txt".to_string(),
            chunk_number: 1,
            chunk_duration: 600,
            keyspace_start: 0,
            keyspace_end: 1_000_000,
            is_keyspace_split: true,
            rule_chunk_path: None,
            report_status: true,
        };

        let json = serde_json::to_string(&assignment).unwrap();
        let parsed: JobAssignment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, assignment);
        // Absent option stays off the wire entirely.
        assert!(!json.contains("rule_chunk_path"));
    }

    #[test]
    fn progress_report_defaults() {
        let task_id = TaskId::new();
        let json = format!(
            r#"{{"task_id":"{}","keyspace_processed":42,"status_code":3}}"#,
            task_id
        );
        let report: TaskProgressReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.keyspace_processed, 42);
        assert_eq!(report.benchmark_speed, None);
        assert_eq!(report.pending_crack_batches, 0);
    }
}
