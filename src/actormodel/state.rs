//! Kernel state wrapped around a family aggregate.
//!
//! `ActorState` is itself a `cqrs_es::Aggregate`: its `handle` turns one
//! [`Transaction`] into a batch of journal events and its `apply` folds them
//! back in. Both the online path and replay go through the same `apply`.

use crate::actormodel::errors::CommandError;
use crate::actormodel::event::{ActorEvent, EventBody, EventMetadata, EventPayload, JournalEvent};
use crate::actormodel::message::{CommandEnvelope, CommandMetadata, Incoming, KernelCommand, ModelCommand};
use crate::actormodel::response::ModelResponse;
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::{ActorId, ActorType, EngineVersion, MessageId, TenantId, TimestampUtc};
use crate::actormodel::ModelAggregate;
use crate::serialization::Manifested;
use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A request accepted from another actor and not yet executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRequest<C> {
    pub source_actor: ActorId,
    pub source_type: ActorType,
    pub command: C,
}

/// How many executed request ids an actor remembers for duplicate detection.
pub const EXECUTED_REQUEST_WINDOW: usize = 1024;

/// Ids of the most recently executed requests, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "VecDeque<MessageId>", into = "VecDeque<MessageId>")]
pub struct ExecutedRequests {
    order: VecDeque<MessageId>,
    ids: BTreeSet<MessageId>,
}

impl ExecutedRequests {
    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.ids.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remembers `message_id`, forgetting the oldest id past the window.
    fn insert(&mut self, message_id: MessageId) {
        if !self.ids.insert(message_id.clone()) {
            return;
        }
        self.order.push_back(message_id);
        while self.order.len() > EXECUTED_REQUEST_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

impl From<VecDeque<MessageId>> for ExecutedRequests {
    fn from(order: VecDeque<MessageId>) -> Self {
        let mut requests = Self::default();
        for message_id in order {
            requests.insert(message_id);
        }
        requests
    }
}

impl From<ExecutedRequests> for VecDeque<MessageId> {
    fn from(requests: ExecutedRequests) -> Self {
        requests.order
    }
}

/// One unit of work for the kernel.
#[derive(Debug, Clone, PartialEq)]
pub enum Transaction<C> {
    Command(C),
    StoreRequest {
        source_actor: ActorId,
        source_type: ActorType,
        command: C,
    },
    ExecuteRequest {
        message_id: MessageId,
    },
    Kernel(ModelCommand<KernelCommand>),
    Response {
        response: ModelResponse,
        metadata: CommandMetadata,
    },
}

impl<C: CommandEnvelope> From<Incoming<C>> for Transaction<C> {
    fn from(incoming: Incoming<C>) -> Self {
        match incoming {
            Incoming::Command(command) => Self::Command(command),
            Incoming::Request {
                source_actor,
                source_type,
                command,
            } => Self::StoreRequest {
                source_actor,
                source_type,
                command,
            },
            Incoming::Kernel(command) => Self::Kernel(command),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ActorState<A: ModelAggregate> {
    #[serde(default)]
    pub actor_id: ActorId,
    #[serde(default)]
    pub tenant: Option<TenantId>,
    #[serde(default)]
    pub engine_version: Option<EngineVersion>,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub last_modified: Option<TimestampUtc>,
    #[serde(default)]
    pub stored_requests: BTreeMap<MessageId, StoredRequest<A::Command>>,
    #[serde(default)]
    pub executed_requests: ExecutedRequests,
    pub model: A,
}

impl<A: ModelAggregate> Default for ActorState<A> {
    fn default() -> Self {
        Self {
            actor_id: ActorId::default(),
            tenant: None,
            engine_version: None,
            debug_mode: false,
            last_modified: None,
            stored_requests: BTreeMap::new(),
            executed_requests: ExecutedRequests::default(),
            model: A::default(),
        }
    }
}

impl<A: ModelAggregate> ActorState<A> {
    pub fn exists(&self) -> bool {
        self.model.exists()
    }

    pub fn knows_request(&self, message_id: &MessageId) -> bool {
        self.stored_requests.contains_key(message_id) || self.executed_requests.contains(message_id)
    }

    pub fn debug_enabled(&self, services: &EngineServices) -> bool {
        self.debug_mode || services.config.actor.debug
    }

    /// Reception checks that run before any processing.
    pub fn admit(&self, actor_id: &ActorId, incoming: &Incoming<A::Command>) -> Result<(), CommandError> {
        let metadata = incoming.metadata();
        let manifest = incoming.manifest();
        if metadata.tenant.as_ref().is_none_or(|t| t.as_str().trim().is_empty()) {
            return Err(CommandError::MissingTenant {
                message: format!("Command {} does not have a tenant", manifest),
            });
        }
        if &metadata.actor_id != actor_id {
            return Err(CommandError::invalid(format!(
                "Command targets actor '{}' but was delivered to '{}'",
                metadata.actor_id, actor_id
            )));
        }

        let (bootstrap, inner_manifest) = match incoming {
            Incoming::Command(command) | Incoming::Request { command, .. } => {
                (command.is_bootstrap(), command.manifest())
            }
            Incoming::Kernel(command) => (false, command.manifest()),
        };
        if bootstrap && self.exists() {
            return Err(CommandError::ActorExists {
                message: format!("{} with id '{}' already exists", A::ACTOR_TYPE, actor_id),
            });
        }
        if !bootstrap && !self.exists() {
            return Err(CommandError::invalid(format!(
                "Expected bootstrap command in {} instead of {}",
                A::ACTOR_TYPE,
                inner_manifest
            )));
        }
        Ok(())
    }

    /// Metadata the events of `transaction` will carry.
    pub fn transaction_metadata(
        &self,
        transaction: &Transaction<A::Command>,
    ) -> Result<CommandMetadata, CommandError> {
        match transaction {
            Transaction::Command(command) | Transaction::StoreRequest { command, .. } => {
                Ok(command.metadata().clone())
            }
            Transaction::ExecuteRequest { message_id } => self
                .stored_requests
                .get(message_id)
                .map(|stored| stored.command.metadata().clone())
                .ok_or_else(|| {
                    CommandError::invalid(format!("There is no stored request {}", message_id))
                }),
            Transaction::Kernel(command) => Ok(command.metadata.clone()),
            Transaction::Response { metadata, .. } => Ok(metadata.clone()),
        }
    }

    /// Events persisted when a transaction fails: the debug trace, and the
    /// executed marker so a failed request is not retried.
    pub fn failure_events(
        &self,
        transaction: &Transaction<A::Command>,
        error: &CommandError,
        services: &EngineServices,
    ) -> Vec<JournalEvent<A::Command, A::Event>> {
        let Ok(metadata) = self.transaction_metadata(transaction) else {
            return Vec::new();
        };
        let event_metadata = EventMetadata::from(&metadata);
        let mut events = Vec::new();
        if self.debug_enabled(services) && self.exists() {
            events.push(JournalEvent::actor(
                event_metadata.clone(),
                ActorEvent::DebugEvent {
                    messages: vec![format!("{} failed: {}", transaction_label(transaction), error)],
                },
            ));
        }
        if let Transaction::ExecuteRequest { message_id } = transaction {
            events.push(JournalEvent::actor(
                event_metadata,
                ActorEvent::ActorRequestExecuted {
                    message_id: message_id.clone(),
                },
            ));
        }
        events
    }

    fn commit_body(
        &self,
        metadata: &CommandMetadata,
        model_events: &[A::Event],
    ) -> EventBody<A::Command, A::Event> {
        let mut staged = self.model.clone();
        for event in model_events {
            staged.apply(event.clone());
        }
        match staged.commit_event(metadata) {
            Some(event) => EventBody::Model(event),
            None => EventBody::Actor(ActorEvent::ActorModified {
                last_modified: metadata.timestamp,
            }),
        }
    }
}

fn transaction_label<C: CommandEnvelope>(transaction: &Transaction<C>) -> String {
    match transaction {
        Transaction::Command(command) => command.manifest().to_string(),
        Transaction::StoreRequest { command, .. } => format!("request {}", command.manifest()),
        Transaction::ExecuteRequest { message_id } => format!("stored request {}", message_id),
        Transaction::Kernel(command) => command.manifest().to_string(),
        Transaction::Response { response, .. } => format!("response {}", response.manifest()),
    }
}

#[async_trait]
impl<A: ModelAggregate> Aggregate for ActorState<A> {
    type Command = Transaction<A::Command>;
    type Event = JournalEvent<A::Command, A::Event>;
    type Error = CommandError;
    type Services = EngineServices;

    fn aggregate_type() -> String {
        A::ACTOR_TYPE.as_str().to_string()
    }

    async fn handle(
        &self,
        transaction: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let metadata = self.transaction_metadata(&transaction)?;
        let label = transaction_label(&transaction);
        let mut model_events: Vec<A::Event> = Vec::new();
        let mut bodies: Vec<EventBody<A::Command, A::Event>> = Vec::new();

        match transaction {
            Transaction::Command(command) => {
                model_events = self.model.handle(command, services).await?;
            }
            Transaction::StoreRequest {
                source_actor,
                source_type,
                command,
            } => {
                let message_id = command.metadata().message_id.clone();
                if self.knows_request(&message_id) {
                    return Ok(Vec::new());
                }
                bodies.push(EventBody::Actor(ActorEvent::ActorRequestStored {
                    message_id,
                    source_actor,
                    source_type,
                    command,
                }));
            }
            Transaction::ExecuteRequest { message_id } => {
                let stored = self.stored_requests.get(&message_id).ok_or_else(|| {
                    CommandError::invalid(format!("There is no stored request {}", message_id))
                })?;
                model_events = self.model.handle(stored.command.clone(), services).await?;
                bodies.push(EventBody::Actor(ActorEvent::ActorRequestExecuted { message_id }));
            }
            Transaction::Kernel(command) => match command.command {
                KernelCommand::SwitchDebugMode { enabled, .. } => {
                    if enabled != self.debug_mode {
                        bodies.push(EventBody::Actor(ActorEvent::DebugModeChanged { enabled }));
                    }
                }
            },
            Transaction::Response { response, metadata } => {
                model_events = match response.error() {
                    Some(error) => self.model.handle_failure(&response, error, &metadata, services)?,
                    None => self.model.handle_success(&response, &metadata, services)?,
                };
            }
        }

        if model_events.is_empty() && bodies.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch: Vec<EventBody<A::Command, A::Event>> = Vec::new();
        if self.engine_version.as_ref() != Some(&services.engine_version) {
            batch.push(EventBody::Actor(ActorEvent::EngineVersionChanged {
                version: services.engine_version.clone(),
            }));
        }
        let commit = if bodies.last().is_some_and(|b| b.is_commit_event())
            || model_events.last().is_some_and(|e| e.is_commit_event())
        {
            None
        } else {
            Some(self.commit_body(&metadata, &model_events))
        };
        batch.extend(model_events.into_iter().map(EventBody::Model));
        batch.extend(bodies);
        batch.extend(commit);

        if self.debug_enabled(services) {
            let mut messages = vec![format!("{} by {}", label, metadata.user.user_id)];
            messages.extend(batch.iter().map(|body| format!("event {}", body.manifest())));
            batch.insert(0, EventBody::Actor(ActorEvent::DebugEvent { messages }));
        }

        let event_metadata = EventMetadata::from(&metadata);
        Ok(batch
            .into_iter()
            .map(|body| JournalEvent::new(event_metadata.clone(), body))
            .collect())
    }

    fn apply(&mut self, event: Self::Event) {
        let JournalEvent { metadata, body } = event;
        if self.actor_id.as_str().is_empty() {
            self.actor_id = metadata.actor_id;
        }
        if self.tenant.is_none() {
            self.tenant = metadata.tenant;
        }
        self.last_modified = Some(metadata.timestamp);

        match body {
            EventBody::Actor(event) => match event {
                ActorEvent::ActorRequestStored {
                    message_id,
                    source_actor,
                    source_type,
                    command,
                } => {
                    self.stored_requests.insert(
                        message_id,
                        StoredRequest {
                            source_actor,
                            source_type,
                            command,
                        },
                    );
                }
                ActorEvent::ActorRequestExecuted { message_id } => {
                    self.stored_requests.remove(&message_id);
                    self.executed_requests.insert(message_id);
                }
                ActorEvent::EngineVersionChanged { version } => {
                    self.engine_version = Some(version);
                }
                ActorEvent::DebugModeChanged { enabled } => {
                    self.debug_mode = enabled;
                }
                ActorEvent::DebugEvent { .. } | ActorEvent::ActorModified { .. } => {}
            },
            EventBody::Model(event) => self.model.apply(event),
        }
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
