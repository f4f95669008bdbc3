//! Journal events: kernel bookkeeping plus the family's own events.

use crate::actormodel::message::{CommandEnvelope, CommandMetadata};
use crate::actormodel::types::{ActorId, ActorType, EngineVersion, MessageId, TenantId, TimestampUtc};
use crate::serialization::Manifested;
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

/// Manifests of the events every actor family shares.
pub const KERNEL_EVENT_MANIFESTS: &[&str] = &[
    "ActorRequestStored",
    "ActorRequestExecuted",
    "EngineVersionChanged",
    "DebugModeChanged",
    "DebugEvent",
    "ActorModified",
];

/// A family's own events.
pub trait EventPayload: DomainEvent + Manifested {
    fn manifests() -> &'static [&'static str];

    /// Events that close a transaction.
    fn is_commit_event(&self) -> bool {
        false
    }
}

/// Who caused an event, on which actor, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub actor_id: ActorId,
    #[serde(default)]
    pub tenant: Option<TenantId>,
    pub user_id: String,
    pub message_id: MessageId,
    pub timestamp: TimestampUtc,
}

impl From<&CommandMetadata> for EventMetadata {
    fn from(metadata: &CommandMetadata) -> Self {
        Self {
            actor_id: metadata.actor_id.clone(),
            tenant: metadata.tenant.clone(),
            user_id: metadata.user.user_id.clone(),
            message_id: metadata.message_id.clone(),
            timestamp: metadata.timestamp,
        }
    }
}

/// Events the kernel writes on behalf of every family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum ActorEvent<C> {
    ActorRequestStored {
        message_id: MessageId,
        source_actor: ActorId,
        source_type: ActorType,
        command: C,
    },
    ActorRequestExecuted {
        message_id: MessageId,
    },
    EngineVersionChanged {
        version: EngineVersion,
    },
    DebugModeChanged {
        enabled: bool,
    },
    DebugEvent {
        messages: Vec<String>,
    },
    ActorModified {
        last_modified: TimestampUtc,
    },
}

impl<C> ActorEvent<C> {
    pub fn manifest(&self) -> &'static str {
        match self {
            Self::ActorRequestStored { .. } => "ActorRequestStored",
            Self::ActorRequestExecuted { .. } => "ActorRequestExecuted",
            Self::EngineVersionChanged { .. } => "EngineVersionChanged",
            Self::DebugModeChanged { .. } => "DebugModeChanged",
            Self::DebugEvent { .. } => "DebugEvent",
            Self::ActorModified { .. } => "ActorModified",
        }
    }

    pub fn is_commit_event(&self) -> bool {
        matches!(
            self,
            Self::ActorRequestStored { .. }
                | Self::ActorRequestExecuted { .. }
                | Self::ActorModified { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum EventBody<C, E> {
    Actor(ActorEvent<C>),
    Model(E),
}

impl<C, E: EventPayload> EventBody<C, E> {
    pub fn is_commit_event(&self) -> bool {
        match self {
            Self::Actor(event) => event.is_commit_event(),
            Self::Model(event) => event.is_commit_event(),
        }
    }
}

impl<C, E: Manifested> Manifested for EventBody<C, E> {
    fn manifest(&self) -> &'static str {
        match self {
            Self::Actor(event) => event.manifest(),
            Self::Model(event) => event.manifest(),
        }
    }
}

/// One journal record's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEvent<C, E> {
    pub metadata: EventMetadata,
    pub body: EventBody<C, E>,
}

impl<C, E> JournalEvent<C, E> {
    pub fn new(metadata: EventMetadata, body: EventBody<C, E>) -> Self {
        Self { metadata, body }
    }

    pub fn actor(metadata: EventMetadata, event: ActorEvent<C>) -> Self {
        Self::new(metadata, EventBody::Actor(event))
    }

    pub fn model(metadata: EventMetadata, event: E) -> Self {
        Self::new(metadata, EventBody::Model(event))
    }

    pub fn model_event(&self) -> Option<&E> {
        match &self.body {
            EventBody::Model(event) => Some(event),
            EventBody::Actor(_) => None,
        }
    }
}

impl<C, E: Manifested> Manifested for JournalEvent<C, E> {
    fn manifest(&self) -> &'static str {
        self.body.manifest()
    }
}

impl<C: CommandEnvelope, E: EventPayload> DomainEvent for JournalEvent<C, E> {
    fn event_type(&self) -> String {
        self.manifest().to_string()
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}

/// What part of an actor an event touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EventPath {
    Actor,
    PlanItem(String),
    CaseFile(String),
    TeamMember(String),
}
