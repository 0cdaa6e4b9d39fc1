//! Hashfleet control-plane vocabulary.
//!
//! Canonical enums, agent message payloads, and domain events shared by the
//! orchestrator, the persistence layer, and the admin service. The agent
//! wire framing itself lives in the transport implementation; this crate
//! only defines the *messages* the core emits and consumes.

pub mod defaults;
pub mod events;
pub mod messages;
pub mod types;

pub use events::FleetEvent;
pub use messages::{CrackBatch, FileSyncRequest, JobAssignment, JobStop, TaskProgressReport};
pub use types::{
    AgentStatus, AttackMode, IncrementMode, JobStatus, LayerStatus, OfflineBufferStatus,
    ProgressPhase, TaskStatus, STATUS_CODE_ALL_CRACKED, STATUS_CODE_EXHAUSTED,
    STATUS_CODE_RUNNING,
};
