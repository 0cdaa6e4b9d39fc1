//! Domain events handed to the notification bus.
//!
//! Consumers fan these out to in-app, email, and webhook channels; the core
//! treats emission as fire-and-forget.

use hashfleet_ids::{AgentId, HashlistId, JobId, TaskId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum FleetEvent {
    JobCompleted {
        job_id: JobId,
        hashlist_id: HashlistId,
        cracked_hashes: i64,
        total_hashes: i64,
    },
    TaskCompleted {
        task_id: TaskId,
        job_id: JobId,
        agent_id: Option<AgentId>,
    },
    AgentOffline {
        agent_id: AgentId,
        /// How long the agent had been gone when the event fired, seconds.
        offline_for_secs: i64,
    },
    WebhookFailure {
        target: String,
        error: String,
    },
}

impl FleetEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            FleetEvent::JobCompleted { .. } => "job_completed",
            FleetEvent::TaskCompleted { .. } => "task_completed",
            FleetEvent::AgentOffline { .. } => "agent_offline",
            FleetEvent::WebhookFailure { .. } => "webhook_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_tag_matches_serde() {
        let event = FleetEvent::AgentOffline {
            agent_id: AgentId::new(),
            offline_for_secs: 600,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event_type":"agent_offline""#));
        assert_eq!(event.event_type(), "agent_offline");
    }
}
