//! Canonical enums used across all crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Agent status code meaning "still cracking".
pub const STATUS_CODE_RUNNING: i32 = 3;
/// Agent status code meaning "keyspace exhausted".
pub const STATUS_CODE_EXHAUSTED: i32 = 5;
/// Agent status code meaning "every hash in the list is cracked".
pub const STATUS_CODE_ALL_CRACKED: i32 = 6;

// ============================================================================
// Attack mode
// ============================================================================

/// Cracking-binary attack family.
///
/// The numeric codes follow the binary's `-a` flag. `Association` exists in
/// the closed set but is rejected at preset validation; nothing else in the
/// core branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackMode {
    Straight,
    Combination,
    BruteForce,
    HybridWordlistMask,
    HybridMaskWordlist,
    Association,
}

impl AttackMode {
    pub const ALL: &'static [AttackMode] = &[
        AttackMode::Straight,
        AttackMode::Combination,
        AttackMode::BruteForce,
        AttackMode::HybridWordlistMask,
        AttackMode::HybridMaskWordlist,
        AttackMode::Association,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackMode::Straight => "straight",
            AttackMode::Combination => "combination",
            AttackMode::BruteForce => "brute_force",
            AttackMode::HybridWordlistMask => "hybrid_wordlist_mask",
            AttackMode::HybridMaskWordlist => "hybrid_mask_wordlist",
            AttackMode::Association => "association",
        }
    }

    /// Numeric code passed to the cracking binary's attack-mode flag.
    pub fn binary_code(&self) -> u8 {
        match self {
            AttackMode::Straight => 0,
            AttackMode::Combination => 1,
            AttackMode::BruteForce => 3,
            AttackMode::HybridWordlistMask => 6,
            AttackMode::HybridMaskWordlist => 7,
            AttackMode::Association => 9,
        }
    }

    /// Whether this mode requires a mask pattern.
    pub fn requires_mask(&self) -> bool {
        matches!(
            self,
            AttackMode::BruteForce
                | AttackMode::HybridWordlistMask
                | AttackMode::HybridMaskWordlist
        )
    }
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AttackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "straight" => Ok(AttackMode::Straight),
            "combination" => Ok(AttackMode::Combination),
            "brute_force" | "bruteforce" => Ok(AttackMode::BruteForce),
            "hybrid_wordlist_mask" => Ok(AttackMode::HybridWordlistMask),
            "hybrid_mask_wordlist" => Ok(AttackMode::HybridMaskWordlist),
            "association" => Ok(AttackMode::Association),
            _ => Err(format!("Invalid attack mode: '{}'", s)),
        }
    }
}

// ============================================================================
// Increment mode
// ============================================================================

/// How a mask job walks candidate lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IncrementMode {
    #[default]
    Off,
    /// Grow the mask from `increment_min` tokens up to `increment_max`.
    Increment,
    /// Shrink the mask from the front instead of truncating the tail.
    IncrementInverse,
}

impl IncrementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncrementMode::Off => "off",
            IncrementMode::Increment => "increment",
            IncrementMode::IncrementInverse => "increment_inverse",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, IncrementMode::Off)
    }
}

impl fmt::Display for IncrementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IncrementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(IncrementMode::Off),
            "increment" => Ok(IncrementMode::Increment),
            "increment_inverse" => Ok(IncrementMode::IncrementInverse),
            _ => Err(format!("Invalid increment mode: '{}'", s)),
        }
    }
}

// ============================================================================
// Job execution status
// ============================================================================

/// Lifecycle of a job execution. This is the CANONICAL definition - use this
/// everywhere for job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    /// Trailing crack batches still being flushed after the keyspace is done.
    Processing,
}

impl JobStatus {
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Processing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Processing => "processing",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "completed" | "complete" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "processing" => Ok(JobStatus::Processing),
            _ => Err(format!("Invalid job status: '{}'", s)),
        }
    }
}

// ============================================================================
// Task status
// ============================================================================

/// Lifecycle of a single chunk of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not sent; eligible for reassignment on the next cycle.
    #[default]
    Pending,
    /// Sent to an agent, awaiting the first status report.
    Assigned,
    /// Agent is reporting progress.
    Running,
    /// Cracking work finished, crack batches still being flushed.
    Processing,
    /// Retransmit budget exhausted while waiting for crack batches.
    ProcessingError,
    Completed,
    Failed,
    /// Agent lost; a grace-period timer is armed.
    ReconnectPending,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Running => "running",
            TaskStatus::Processing => "processing",
            TaskStatus::ProcessingError => "processing_error",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::ReconnectPending => "reconnect_pending",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Task occupies an agent slot and counts against job liveness.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Assigned | TaskStatus::Running | TaskStatus::ReconnectPending
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "running" => Ok(TaskStatus::Running),
            "processing" => Ok(TaskStatus::Processing),
            "processing_error" => Ok(TaskStatus::ProcessingError),
            "completed" | "complete" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "reconnect_pending" => Ok(TaskStatus::ReconnectPending),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            _ => Err(format!("Invalid task status: '{}'", s)),
        }
    }
}

// ============================================================================
// Agent status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Working on a task.
    Active,
    /// Connected, nothing assigned.
    #[default]
    Idle,
    /// Too many consecutive task failures; excluded from scheduling.
    Error,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Idle => "idle",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        }
    }

    /// Whether the scheduler may hand this agent work.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, AgentStatus::Active | AgentStatus::Idle)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AgentStatus::Active),
            "idle" => Ok(AgentStatus::Idle),
            "error" => Ok(AgentStatus::Error),
            "offline" => Ok(AgentStatus::Offline),
            _ => Err(format!("Invalid agent status: '{}'", s)),
        }
    }
}

// ============================================================================
// Increment layer status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    #[default]
    Pending,
    Running,
    Completed,
}

impl LayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerStatus::Pending => "pending",
            LayerStatus::Running => "running",
            LayerStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for LayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LayerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(LayerStatus::Pending),
            "running" => Ok(LayerStatus::Running),
            "completed" | "complete" => Ok(LayerStatus::Completed),
            _ => Err(format!("Invalid layer status: '{}'", s)),
        }
    }
}

// ============================================================================
// Agent offline buffer status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfflineBufferStatus {
    /// Waiting out the notification grace window.
    #[default]
    Pending,
    /// `agent_offline` event has been emitted.
    Sent,
    /// Agent came back before the window expired.
    Reconnected,
}

impl OfflineBufferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfflineBufferStatus::Pending => "pending",
            OfflineBufferStatus::Sent => "sent",
            OfflineBufferStatus::Reconnected => "reconnected",
        }
    }
}

impl fmt::Display for OfflineBufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OfflineBufferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OfflineBufferStatus::Pending),
            "sent" => Ok(OfflineBufferStatus::Sent),
            "reconnected" => Ok(OfflineBufferStatus::Reconnected),
            _ => Err(format!("Invalid offline buffer status: '{}'", s)),
        }
    }
}

// ============================================================================
// Long-running progress phases (hashlist ingest / deletion)
// ============================================================================

/// Phase of an async hashlist ingest or deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    #[default]
    Pending,
    DeletingHashes,
    Processing,
    ClearingReferences,
    CleaningOrphans,
    Finalizing,
    Completed,
    Failed,
}

impl ProgressPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressPhase::Pending => "pending",
            ProgressPhase::DeletingHashes => "deleting_hashes",
            ProgressPhase::Processing => "processing",
            ProgressPhase::ClearingReferences => "clearing_references",
            ProgressPhase::CleaningOrphans => "cleaning_orphans",
            ProgressPhase::Finalizing => "finalizing",
            ProgressPhase::Completed => "completed",
            ProgressPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressPhase::Completed | ProgressPhase::Failed)
    }
}

impl fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_mode_roundtrip() {
        for mode in AttackMode::ALL {
            let parsed: AttackMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, *mode);
        }
    }

    #[test]
    fn task_status_active_set() {
        assert!(TaskStatus::Assigned.is_active());
        assert!(TaskStatus::Running.is_active());
        assert!(TaskStatus::ReconnectPending.is_active());
        assert!(!TaskStatus::Processing.is_active());
        assert!(!TaskStatus::Pending.is_active());
    }

    #[test]
    fn job_status_parses_legacy_complete() {
        assert_eq!(JobStatus::from_str("complete").unwrap(), JobStatus::Completed);
    }

    #[test]
    fn mask_modes_require_mask() {
        assert!(AttackMode::BruteForce.requires_mask());
        assert!(AttackMode::HybridWordlistMask.requires_mask());
        assert!(!AttackMode::Straight.requires_mask());
    }
}
