//! Agent offline buffering.
//!
//! A disconnect is not immediately an outage: the event is buffered for a
//! configurable window and only becomes an `agent_offline` notification if
//! the agent stays gone past its due time.

use anyhow::Result;
use chrono::{Duration, Utc};
use hashfleet_db::{AgentRepo, OfflineBufferRepo};
use hashfleet_ids::AgentId;
use hashfleet_protocol::defaults::OFFLINE_BUFFER_GC_DAYS;
use hashfleet_protocol::{AgentStatus, FleetEvent};
use std::sync::Arc;
use tracing::{info, warn};

use crate::notify::NotificationBus;
use crate::settings::SystemSettings;

#[derive(Clone)]
pub struct AgentOfflineMonitor {
    buffer: OfflineBufferRepo,
    agents: AgentRepo,
    settings: SystemSettings,
    notifier: Arc<dyn NotificationBus>,
}

impl AgentOfflineMonitor {
    pub fn new(
        buffer: OfflineBufferRepo,
        agents: AgentRepo,
        settings: SystemSettings,
        notifier: Arc<dyn NotificationBus>,
    ) -> Self {
        Self {
            buffer,
            agents,
            settings,
            notifier,
        }
    }

    /// Arm the notification window for a disconnected agent. A second
    /// disconnect while one window is pending keeps the earlier one.
    pub async fn record_disconnect(&self, agent_id: &str) -> Result<()> {
        let now = Utc::now();
        let buffer_minutes = self.settings.agent_offline_buffer_minutes().await?;
        let created = self
            .buffer
            .buffer_disconnect(agent_id, now, now + Duration::minutes(buffer_minutes))
            .await?;
        if created {
            info!(
                "buffered disconnect of agent {} ({}min notification window)",
                agent_id, buffer_minutes
            );
        }
        Ok(())
    }

    /// Cancel the pending window; the agent came back in time.
    pub async fn record_reconnect(&self, agent_id: &str) -> Result<()> {
        if self.buffer.mark_reconnected(agent_id).await? {
            info!("agent {} reconnected within the offline window", agent_id);
        }
        Ok(())
    }

    /// Periodic sweep: emit `agent_offline` for due windows and garbage
    /// collect ancient rows. Per-item failures are logged, never fatal.
    pub async fn run_once(&self) -> Result<usize> {
        let now = Utc::now();
        let due = self.buffer.list_due(now).await?;
        let mut emitted = 0;

        for entry in due {
            let agent_id = match AgentId::parse(&entry.agent_id) {
                Ok(agent_id) => agent_id,
                Err(err) => {
                    warn!("offline buffer row {} has bad agent id: {}", entry.id, err);
                    self.buffer.mark_sent(entry.id).await?;
                    continue;
                }
            };

            self.agents
                .set_status(&entry.agent_id, AgentStatus::Offline)
                .await?;
            self.notifier.emit(FleetEvent::AgentOffline {
                agent_id,
                offline_for_secs: (now - entry.disconnected_at).num_seconds(),
            });
            self.buffer.mark_sent(entry.id).await?;
            emitted += 1;
        }

        let gc_cutoff = now - Duration::days(OFFLINE_BUFFER_GC_DAYS);
        self.buffer.delete_older_than(gc_cutoff).await?;
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingBus;
    use hashfleet_db::{connect_memory, SettingsRepo};

    async fn setup() -> (AgentOfflineMonitor, Arc<RecordingBus>, String) {
        let pool = connect_memory().await.unwrap();
        let agent_id = AgentId::new().to_string();
        let agents = AgentRepo::new(pool.clone());
        agents.register(&agent_id, "rig-01", None, None).await.unwrap();

        let bus = Arc::new(RecordingBus::new());
        let monitor = AgentOfflineMonitor::new(
            OfflineBufferRepo::new(pool.clone()),
            agents,
            SystemSettings::new(SettingsRepo::new(pool.clone())),
            bus.clone(),
        );
        (monitor, bus, agent_id)
    }

    #[tokio::test]
    async fn disconnect_does_not_fire_before_window() {
        let (monitor, bus, agent_id) = setup().await;
        monitor.record_disconnect(&agent_id).await.unwrap();
        assert_eq!(monitor.run_once().await.unwrap(), 0);
        assert!(bus.events().is_empty());
    }

    #[tokio::test]
    async fn reconnect_within_window_suppresses_event() {
        let (monitor, bus, agent_id) = setup().await;
        monitor.record_disconnect(&agent_id).await.unwrap();
        monitor.record_reconnect(&agent_id).await.unwrap();
        assert_eq!(monitor.run_once().await.unwrap(), 0);
        assert!(bus.events().is_empty());
    }

    #[tokio::test]
    async fn due_window_emits_and_marks_agent_offline() {
        let pool = connect_memory().await.unwrap();
        let agent_id = AgentId::new().to_string();
        let agents = AgentRepo::new(pool.clone());
        agents.register(&agent_id, "rig-01", None, None).await.unwrap();

        let bus = Arc::new(RecordingBus::new());
        let buffer = OfflineBufferRepo::new(pool.clone());
        let monitor = AgentOfflineMonitor::new(
            buffer.clone(),
            agents.clone(),
            SystemSettings::new(SettingsRepo::new(pool)),
            bus.clone(),
        );

        // Window armed in the past so the sweep finds it due.
        let past = Utc::now() - Duration::minutes(30);
        buffer
            .buffer_disconnect(&agent_id, past, past + Duration::minutes(10))
            .await
            .unwrap();

        assert_eq!(monitor.run_once().await.unwrap(), 1);
        assert_eq!(bus.events().len(), 1);
        assert_eq!(
            agents.get(&agent_id).await.unwrap().status(),
            AgentStatus::Offline
        );

        // The sweep is idempotent: the sent row does not fire again.
        assert_eq!(monitor.run_once().await.unwrap(), 0);
    }
}
