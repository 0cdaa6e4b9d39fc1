//! Process-wide notification dispatcher.
//!
//! Set once at startup, read without locking afterwards. Emission is
//! fire-and-forget; consumers fan events out to in-app, email, and webhook
//! channels on their own time.

use hashfleet_protocol::FleetEvent;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub trait NotificationBus: Send + Sync {
    fn emit(&self, event: FleetEvent);
}

static DISPATCHER: OnceLock<Arc<dyn NotificationBus>> = OnceLock::new();

/// Install the global dispatcher. Later calls are ignored.
pub fn set_notifier(bus: Arc<dyn NotificationBus>) {
    let _ = DISPATCHER.set(bus);
}

/// Emit an event through the installed dispatcher; a no-op before startup
/// wiring completes.
pub fn emit(event: FleetEvent) {
    match DISPATCHER.get() {
        Some(bus) => bus.emit(event),
        None => debug!("Dropping {} event: no notifier installed", event.event_type()),
    }
}

/// Collects events in memory; the notifier used across the test suites.
#[derive(Default)]
pub struct RecordingBus {
    events: std::sync::Mutex<Vec<FleetEvent>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FleetEvent> {
        self.events.lock().expect("recording bus lock").clone()
    }
}

impl NotificationBus for RecordingBus {
    fn emit(&self, event: FleetEvent) {
        self.events.lock().expect("recording bus lock").push(event);
    }
}
