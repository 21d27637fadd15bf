//! Activation lifecycle events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers lag rather than block.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Something that happened to this install's activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivationEvent {
    /// The install is activated (freshly or after verification).
    Activated,
    /// The install is not, or no longer, activated.
    Deactivated,
    /// A user-initiated activation request started.
    BeginActivationRequest,
    /// A user-initiated activation request finished, whatever the result.
    EndActivationRequest,
    /// The license has no activation slots left.
    NoActivationsLeft,
    /// Deactivation was requested and is waiting for confirmation.
    DeactivationRequested,
    /// The server refused the license.
    InvalidLicense { reason: String },
}

/// Fan-out of activation events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ActivationEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Returns a receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ActivationEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Having no subscribers is fine.
    pub fn publish(&self, event: ActivationEvent) {
        let _ = self.sender.send(event);
    }
}
