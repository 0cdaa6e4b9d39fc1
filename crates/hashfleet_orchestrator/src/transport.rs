//! Seam between the orchestrator and the per-agent wire protocol.
//!
//! The real implementation frames these messages onto the agent links; the
//! core never opens a socket itself.

use anyhow::Result;
use async_trait::async_trait;
use hashfleet_ids::AgentId;
use hashfleet_protocol::{FileSyncRequest, JobAssignment, JobStop};

#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Round trip: ask the agent to verify its local files against the given
    /// hashes and fetch anything stale. Returns once the agent confirms.
    async fn send_file_sync(&self, request: FileSyncRequest) -> Result<()>;

    async fn send_job_assign(&self, agent_id: &AgentId, assignment: JobAssignment) -> Result<()>;

    async fn send_job_stop(&self, agent_id: &AgentId, stop: JobStop) -> Result<()>;
}
