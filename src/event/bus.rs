use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::events::ScoringEvent;

/// Event bus carrying scoring events from the write path to background handlers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScoringEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` undelivered events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emits an event to all current subscribers; never blocks the caller
    pub fn emit(&self, event: ScoringEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(
                    event_type = event_type,
                    receivers = receiver_count,
                    "Scoring event emitted"
                );
            }
            Err(_) => {
                warn!(event_type = event_type, "Scoring event emitted with no receivers");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScoringEvent> {
        self.sender.subscribe()
    }
}
