use crate::echo::{EchoComment, EchoPost};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Domain events pushed to connected clients over the SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A new anonymous report was published
    PostCreated(EchoPost),

    /// A comment landed on an existing report
    CommentAdded { post_id: String, comment: EchoComment },

    /// The delayed registration side effect ran; the event id is now in the
    /// user's joined list
    RegistrationCompleted { event_id: String },

    /// The user confirmed a pending study plan
    PlanActivated { items: usize },

    /// A connect handshake with a directory profile finished
    ConnectionEstablished { profile_id: String },
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // We ignore the error if there are no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
