//! Event bus for broadcasting board events to in-process subscribers

use super::{BoardEvent, EventEmitter};
use tokio::sync::broadcast;
use tracing::debug;

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Event bus that distributes BoardEvents via `tokio::sync::broadcast`
///
/// Emitting never blocks. Events sent while nobody listens are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BoardEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: BoardEvent) {
        let entity_type = event.entity_type;
        let action = event.action;
        let entity_id = event.entity_id;
        if let Ok(n) = self.sender.send(event) {
            debug!(
                entity_type = ?entity_type,
                action = ?action,
                %entity_id,
                subscribers = n,
                "BoardEvent emitted"
            );
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
