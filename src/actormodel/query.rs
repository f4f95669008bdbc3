//! Broadcasts committed events to subscribers.
//!
//! The publisher is a `cqrs_es::Query` over every `ActorState`, dispatched
//! by the actor right after a batch has been persisted and applied.

use crate::actormodel::state::ActorState;
use crate::actormodel::types::{ActorId, ActorType};
use crate::actormodel::ModelAggregate;
use crate::serialization::Manifested;
use crate::value::Value;
use async_trait::async_trait;
use cqrs_es::{EventEnvelope, Query};
use tokio::sync::broadcast;

/// A committed event as seen from outside the actor.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub actor_id: ActorId,
    pub actor_type: ActorType,
    pub sequence: u64,
    pub manifest: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl<A: ModelAggregate> Query<ActorState<A>> for EventPublisher {
    async fn dispatch(&self, aggregate_id: &str, events: &[EventEnvelope<ActorState<A>>]) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        for envelope in events {
            let payload = match Value::from_serde(&envelope.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(actor = aggregate_id, "Failed to publish event: {}", e);
                    continue;
                }
            };
            let _ = self.sender.send(PublishedEvent {
                actor_id: ActorId::from(aggregate_id),
                actor_type: A::ACTOR_TYPE,
                sequence: envelope.sequence as u64,
                manifest: envelope.payload.manifest().to_string(),
                payload,
            });
        }
    }
}
