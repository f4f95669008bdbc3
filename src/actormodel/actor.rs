//! The ractor actor hosting one model aggregate instance.
//!
//! The actor owns its [`ActorState`] exclusively; its mailbox serializes
//! commands, responses, ticks and snapshot triggers.

use crate::actormodel::errors::CommandError;
use crate::actormodel::message::{CommandMetadata, Incoming, OutgoingRequest, REQUEST_MANIFEST};
use crate::actormodel::query::EventPublisher;
use crate::actormodel::registry::{EngineRegistries, FamilyEvent};
use crate::actormodel::response::ModelResponse;
use crate::actormodel::services::EngineServices;
use crate::actormodel::state::{ActorState, Transaction};
use crate::actormodel::types::{ActorId, ActorType, MessageId};
use crate::actormodel::ModelAggregate;
use crate::journal::{Journal, NewEvent, StoredSnapshot};
use crate::logging::TransactionLogger;
use crate::serialization::{ManifestWrapper, Manifested};
use crate::value::Value;
use async_trait::async_trait;
use cqrs_es::{Aggregate, AggregateError, EventEnvelope, Query};
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

const SYSTEM_FAILURE: &str =
    "Handling the request resulted in a system failure. Check the server logs for more information.";

/// Messages understood by every model actor.
pub enum ModelActorMessage {
    /// An incoming command or request; the response goes to the port if any.
    Deliver(ManifestWrapper, Option<oneshot::Sender<ModelResponse>>),
    /// Response to a request this actor sent.
    Response(ModelResponse),
    /// Run a stored request that has no executed marker yet.
    ResumeRequest(MessageId),
    Tick,
    /// Write a snapshot if the generation is still current.
    SaveSnapshot(u64),
    Inspect(oneshot::Sender<ActorInspection>),
}

/// Delivery of messages between actors.
pub trait ActorRouter: Send + Sync {
    fn send_request(&self, source: &ActorId, source_type: ActorType, request: OutgoingRequest);
    fn send_response(&self, target: &ActorId, target_type: ActorType, response: ModelResponse);
    /// The actor stopped itself after being idle.
    fn passivated(&self, actor_id: &ActorId);
}

/// Everything an actor needs from the system that spawned it.
#[derive(Clone)]
pub struct ActorContext {
    pub services: EngineServices,
    pub journal: Arc<dyn Journal>,
    pub registries: Arc<EngineRegistries>,
    pub router: Arc<dyn ActorRouter>,
    pub publisher: EventPublisher,
    pub audit: Option<Arc<TransactionLogger>>,
}

#[derive(Clone)]
pub struct ModelActorArgs {
    pub actor_id: ActorId,
    pub context: ActorContext,
}

/// Read-only view of a running actor.
#[derive(Debug, Clone, Serialize)]
pub struct ActorInspection {
    pub actor_id: ActorId,
    pub actor_type: ActorType,
    pub sequence: u64,
    pub broken: Option<String>,
    pub pending_requests: usize,
    pub state: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum Lifecycle {
    Active,
    Broken(String),
}

struct PendingRequest {
    target: ActorId,
    metadata: CommandMetadata,
}

enum PersistFailure {
    Conflict,
    Io(#[allow(dead_code)] String),
}

pub struct ModelActorState<A: ModelAggregate> {
    actor_id: ActorId,
    context: ActorContext,
    lifecycle: Lifecycle,
    state: ActorState<A>,
    sequence: u64,
    snapshot_sequence: u64,
    snapshot_generation: u64,
    pending: HashMap<MessageId, PendingRequest>,
    last_activity: Instant,
    ticker: Option<JoinHandle<()>>,
}

pub struct ModelActor<A>(PhantomData<fn() -> A>);

impl<A> ModelActor<A> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<A> Default for ModelActor<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort message id of an undecodable wire message.
fn wire_message_id(wrapper: &ManifestWrapper) -> MessageId {
    let content = if wrapper.manifest == REQUEST_MANIFEST {
        wrapper.content.get("command").and_then(|c| c.get("content"))
    } else {
        Some(&wrapper.content)
    };
    content
        .and_then(|c| c.get("metadata"))
        .and_then(|m| m.get("message_id"))
        .and_then(Value::as_str)
        .map(MessageId::from)
        .unwrap_or_else(MessageId::random)
}

impl<A: ModelAggregate> ModelActor<A> {
    async fn recover(
        actor_id: &ActorId,
        context: &ActorContext,
    ) -> Result<(ActorState<A>, u64, u64), String> {
        let config = &context.services.config;
        let registries = A::registries(&context.registries);
        let mut state = ActorState::<A>::default();
        let mut sequence = 0u64;

        match context.journal.load_snapshot(actor_id).await {
            Ok(Some(snapshot)) => {
                if snapshot.schema_version != config.journal.snapshot_schema
                    || snapshot.manifest != ActorState::<A>::aggregate_type()
                {
                    tracing::warn!(
                        actor = %actor_id,
                        schema = snapshot.schema_version,
                        "Discarding incompatible snapshot, replaying full journal"
                    );
                } else {
                    match snapshot.state.to_serde::<ActorState<A>>() {
                        Ok(restored) => {
                            state = restored;
                            sequence = snapshot.sequence;
                        }
                        Err(e) => tracing::warn!(
                            actor = %actor_id,
                            "Discarding unreadable snapshot, replaying full journal: {}",
                            e
                        ),
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(actor = %actor_id, "Snapshot could not be loaded: {}", e),
        }
        let snapshot_sequence = sequence;

        let records = context
            .journal
            .read_events(actor_id, sequence)
            .await
            .map_err(|e| format!("journal could not be read: {}", e))?;
        for record in records {
            let event = registries
                .decode_event(&record)
                .map_err(|e| format!("event {} could not be replayed: {}", record.sequence, e))?;
            state.apply(event);
            sequence = record.sequence;
        }
        state.model.recovery_completed();
        Ok((state, sequence, snapshot_sequence))
    }

    fn respond_failure(rt: &ModelActorState<A>, message_id: MessageId, error: CommandError) -> ModelResponse {
        ModelResponse::failure(message_id, rt.actor_id.clone(), error)
            .with_last_modified(rt.state.last_modified)
    }

    async fn deliver(
        &self,
        myself: &ActorRef<ModelActorMessage>,
        rt: &mut ModelActorState<A>,
        wrapper: ManifestWrapper,
    ) -> ModelResponse {
        if let Lifecycle::Broken(reason) = &rt.lifecycle {
            let error = CommandError::NotRecovered {
                message: format!("{} {} has not recovered properly: {}", A::ACTOR_TYPE, rt.actor_id, reason),
            };
            return Self::respond_failure(rt, wire_message_id(&wrapper), error);
        }

        let fallback_id = wire_message_id(&wrapper);
        let registries = A::registries(&rt.context.registries);
        let incoming = match Incoming::decode(A::ACTOR_TYPE, wrapper, &registries.commands) {
            Ok(incoming) => incoming,
            Err(error) => return Self::respond_failure(rt, fallback_id, error),
        };
        let message_id = incoming.metadata().message_id.clone();
        let source = match &incoming {
            Incoming::Request {
                source_actor,
                source_type,
                ..
            } => Some((source_actor.clone(), *source_type)),
            _ => None,
        };

        if let Some((source_actor, source_type)) = &source {
            if rt.state.knows_request(&message_id) {
                tracing::debug!(actor = %rt.actor_id, message = %message_id, "Duplicate request");
                let response = ModelResponse::not_modified(message_id, rt.actor_id.clone());
                if rt.state.executed_requests.contains(&response.message_id) {
                    rt.context
                        .router
                        .send_response(source_actor, *source_type, response.clone());
                }
                return response;
            }
        }

        if let Err(error) = rt.state.admit(&rt.actor_id, &incoming) {
            let response = Self::respond_failure(rt, message_id, error);
            if let Some((source_actor, source_type)) = &source {
                rt.context
                    .router
                    .send_response(source_actor, *source_type, response.clone());
            }
            return response;
        }

        let response = self.run_transaction(myself, rt, Transaction::from(incoming)).await;
        if source.is_some() && rt.state.stored_requests.contains_key(&message_id) {
            let _ = myself.send_message(ModelActorMessage::ResumeRequest(message_id));
        }
        response
    }

    async fn run_transaction(
        &self,
        myself: &ActorRef<ModelActorMessage>,
        rt: &mut ModelActorState<A>,
        transaction: Transaction<A::Command>,
    ) -> ModelResponse {
        let services = rt.context.services.clone();
        let metadata = match rt.state.transaction_metadata(&transaction) {
            Ok(metadata) => metadata,
            Err(error) => return Self::respond_failure(rt, MessageId::random(), error),
        };
        let message_id = metadata.message_id.clone();
        let command = match &transaction {
            Transaction::Command(command) => Some(command.clone()),
            Transaction::ExecuteRequest { message_id } => rt
                .state
                .stored_requests
                .get(message_id)
                .map(|stored| stored.command.clone()),
            _ => None,
        };
        let label = command
            .as_ref()
            .map(|c| c.manifest())
            .unwrap_or("kernel");

        let events = match Aggregate::handle(&rt.state, transaction.clone(), &services).await {
            Ok(events) => events,
            Err(error) => {
                tracing::debug!(actor = %rt.actor_id, command = label, "Command failed: {}", error);
                let events = rt.state.failure_events(&transaction, &error, &services);
                if !events.is_empty() {
                    if let Err(PersistFailure::Conflict) = self.persist(myself, rt, events).await {
                        self.break_actor(myself, rt, "journal sequence conflict");
                    }
                }
                self.audit_command(rt, label, &metadata, error.to_string().as_str());
                return Self::respond_failure(rt, message_id, error);
            }
        };

        if events.is_empty() {
            let value = command.and_then(|c| rt.state.model.respond(&c, &[], &services));
            self.audit_command(rt, label, &metadata, "not modified");
            return match value {
                Some(value) => ModelResponse::accepted(message_id, rt.actor_id.clone(), value),
                None => ModelResponse::not_modified(message_id, rt.actor_id.clone()),
            }
            .with_last_modified(rt.state.last_modified);
        }

        let model_events: Vec<A::Event> = events
            .iter()
            .filter_map(|event| event.model_event().cloned())
            .collect();
        match self.persist(myself, rt, events).await {
            Ok(()) => {}
            Err(PersistFailure::Conflict) => {
                self.break_actor(myself, rt, "journal sequence conflict");
                return Self::respond_failure(rt, message_id, CommandError::EngineChoked {
                    message: SYSTEM_FAILURE.to_string(),
                });
            }
            Err(PersistFailure::Io(_)) => {
                return Self::respond_failure(rt, message_id, CommandError::EngineChoked {
                    message: SYSTEM_FAILURE.to_string(),
                });
            }
        }
        self.audit_command(rt, label, &metadata, "accepted");

        let value = command.and_then(|c| rt.state.model.respond(&c, &model_events, &services));
        let requests = rt
            .state
            .model
            .outgoing_requests(&metadata, &model_events, &services);
        for request in requests {
            rt.pending.insert(
                request.message_id.clone(),
                PendingRequest {
                    target: request.target.clone(),
                    metadata: metadata.clone(),
                },
            );
            rt.context
                .router
                .send_request(&rt.actor_id, A::ACTOR_TYPE, request);
        }

        ModelResponse::accepted(message_id, rt.actor_id.clone(), value.unwrap_or_default())
            .with_last_modified(rt.state.last_modified)
    }

    /// Appends a batch, retrying an I/O failure once, then applies it.
    async fn persist(
        &self,
        myself: &ActorRef<ModelActorMessage>,
        rt: &mut ModelActorState<A>,
        events: Vec<FamilyEvent<A>>,
    ) -> Result<(), PersistFailure> {
        let mut batch = Vec::with_capacity(events.len());
        for event in &events {
            let payload = Value::from_serde(event).map_err(|e| {
                tracing::error!(actor = %rt.actor_id, "Event could not be encoded: {}", e);
                PersistFailure::Io(e.to_string())
            })?;
            batch.push(NewEvent {
                manifest: event.manifest().to_string(),
                payload,
                metadata: HashMap::from([
                    ("user_id".to_string(), event.metadata.user_id.clone()),
                    ("message_id".to_string(), event.metadata.message_id.to_string()),
                ]),
            });
        }

        let journal = rt.context.journal.clone();
        let mut result = journal.append(&rt.actor_id, rt.sequence, batch.clone()).await;
        if matches!(
            result,
            Err(AggregateError::UnexpectedError(_)) | Err(AggregateError::DatabaseConnectionError(_))
        ) {
            tracing::warn!(actor = %rt.actor_id, "Journal append failed, retrying once");
            result = journal.append(&rt.actor_id, rt.sequence, batch).await;
        }

        let stored = match result {
            Ok(stored) => stored,
            Err(AggregateError::AggregateConflict) => {
                tracing::error!(
                    actor = %rt.actor_id,
                    expected = rt.sequence,
                    "Journal sequence conflict, actor state is no longer trustworthy"
                );
                return Err(PersistFailure::Conflict);
            }
            Err(e) => {
                tracing::error!(actor = %rt.actor_id, "Journal append failed: {}", e);
                return Err(PersistFailure::Io(e.to_string()));
            }
        };

        let mut envelopes = Vec::with_capacity(stored.len());
        for (record, event) in stored.iter().zip(events) {
            rt.state.apply(event.clone());
            rt.sequence = record.sequence;
            envelopes.push(EventEnvelope {
                aggregate_id: rt.actor_id.to_string(),
                sequence: record.sequence as usize,
                payload: event,
                metadata: record.metadata.clone(),
            });
        }
        <EventPublisher as Query<ActorState<A>>>::dispatch(
            &rt.context.publisher,
            rt.actor_id.as_str(),
            &envelopes,
        )
        .await;

        if let Some(audit) = &rt.context.audit {
            let manifests: Vec<String> = stored.iter().map(|r| r.manifest.clone()).collect();
            audit.log_batch(rt.actor_id.as_str(), stored.first().map(|r| r.sequence).unwrap_or(0), &manifests);
        }
        self.schedule_snapshot(myself, rt);
        Ok(())
    }

    /// Schedules a snapshot once enough events have been written. A newer
    /// batch bumps the generation, which voids the pending save.
    fn schedule_snapshot(&self, myself: &ActorRef<ModelActorMessage>, rt: &mut ModelActorState<A>) {
        let every = rt.context.services.config.journal.snapshot_every;
        if every == 0 || rt.sequence - rt.snapshot_sequence < every {
            return;
        }
        rt.snapshot_generation += 1;
        let generation = rt.snapshot_generation;
        myself.send_after(rt.context.services.config.snapshot_delay(), move || {
            ModelActorMessage::SaveSnapshot(generation)
        });
    }

    async fn save_snapshot(&self, rt: &mut ModelActorState<A>) {
        let state = match Value::from_serde(&rt.state) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(actor = %rt.actor_id, "Snapshot could not be encoded: {}", e);
                return;
            }
        };
        let snapshot = StoredSnapshot {
            actor_id: rt.actor_id.clone(),
            sequence: rt.sequence,
            manifest: ActorState::<A>::aggregate_type(),
            schema_version: rt.context.services.config.journal.snapshot_schema,
            snapshot_at: rt.context.services.clock.now(),
            state,
        };
        match rt.context.journal.save_snapshot(snapshot).await {
            Ok(()) => {
                tracing::debug!(actor = %rt.actor_id, sequence = rt.sequence, "Snapshot saved");
                rt.snapshot_sequence = rt.sequence;
            }
            Err(e) => tracing::warn!(actor = %rt.actor_id, "Snapshot could not be saved: {}", e),
        }
    }

    async fn on_response(
        &self,
        myself: &ActorRef<ModelActorMessage>,
        rt: &mut ModelActorState<A>,
        response: ModelResponse,
    ) {
        let Some(pending) = rt.pending.remove(&response.message_id) else {
            tracing::warn!(
                actor = %rt.actor_id,
                message = %response.message_id,
                "Ignoring response to an unknown request"
            );
            return;
        };
        if rt.lifecycle != Lifecycle::Active {
            return;
        }
        tracing::debug!(
            actor = %rt.actor_id,
            from = %pending.target,
            response = response.manifest(),
            "Handling response"
        );
        let mut metadata = pending.metadata;
        metadata.message_id = MessageId::random();
        metadata.timestamp = rt.context.services.clock.now();
        let outcome = self
            .run_transaction(myself, rt, Transaction::Response { response, metadata })
            .await;
        if let Some(error) = outcome.error() {
            tracing::warn!(actor = %rt.actor_id, "Response handling failed: {}", error);
        }
    }

    async fn resume_request(
        &self,
        myself: &ActorRef<ModelActorMessage>,
        rt: &mut ModelActorState<A>,
        message_id: MessageId,
    ) {
        if rt.lifecycle != Lifecycle::Active {
            return;
        }
        let Some(stored) = rt.state.stored_requests.get(&message_id).cloned() else {
            return;
        };
        let response = self
            .run_transaction(myself, rt, Transaction::ExecuteRequest { message_id })
            .await;
        rt.context
            .router
            .send_response(&stored.source_actor, stored.source_type, response);
    }

    async fn on_tick(&self, myself: &ActorRef<ModelActorMessage>, rt: &mut ModelActorState<A>) {
        if rt.lifecycle == Lifecycle::Active && rt.state.exists() {
            let mut metadata = CommandMetadata::system(&rt.actor_id, rt.state.tenant.clone());
            metadata.timestamp = rt.context.services.clock.now();
            let commands = rt
                .state
                .model
                .tick_commands(&metadata, &rt.context.services);
            for command in commands {
                let response = self
                    .run_transaction(myself, rt, Transaction::Command(command))
                    .await;
                if let Some(error) = response.error() {
                    tracing::warn!(actor = %rt.actor_id, "Tick command failed: {}", error);
                }
                rt.last_activity = Instant::now();
            }
        }

        let Some(idle_period) = rt.context.services.config.idle_period() else {
            return;
        };
        let idle = rt.pending.is_empty()
            && rt.state.stored_requests.is_empty()
            && rt.last_activity.elapsed() >= idle_period;
        if idle && rt.state.model.passivates() {
            tracing::debug!(actor = %rt.actor_id, "Passivating idle actor");
            if let Some(audit) = &rt.context.audit {
                audit.log_lifecycle(rt.actor_id.as_str(), "passivated");
            }
            rt.context.router.passivated(&rt.actor_id);
            myself.stop(Some("passivated".to_string()));
        }
    }

    fn break_actor(&self, myself: &ActorRef<ModelActorMessage>, rt: &mut ModelActorState<A>, reason: &str) {
        rt.lifecycle = Lifecycle::Broken(reason.to_string());
        if let Some(audit) = &rt.context.audit {
            audit.log_lifecycle(rt.actor_id.as_str(), reason);
        }
        myself.stop(Some(reason.to_string()));
    }

    fn audit_command(&self, rt: &ModelActorState<A>, manifest: &str, metadata: &CommandMetadata, outcome: &str) {
        if let Some(audit) = &rt.context.audit {
            audit.log_command(rt.actor_id.as_str(), manifest, &metadata.user.user_id, outcome);
        }
    }

    fn inspect(rt: &ModelActorState<A>) -> ActorInspection {
        ActorInspection {
            actor_id: rt.actor_id.clone(),
            actor_type: A::ACTOR_TYPE,
            sequence: rt.sequence,
            broken: match &rt.lifecycle {
                Lifecycle::Active => None,
                Lifecycle::Broken(reason) => Some(reason.clone()),
            },
            pending_requests: rt.pending.len(),
            state: Value::from_serde(&rt.state).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl<A: ModelAggregate> Actor for ModelActor<A> {
    type Msg = ModelActorMessage;
    type State = ModelActorState<A>;
    type Arguments = ModelActorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let ModelActorArgs { actor_id, context } = args;
        let (lifecycle, state, sequence, snapshot_sequence) =
            match Self::recover(&actor_id, &context).await {
                Ok((state, sequence, snapshot_sequence)) => {
                    tracing::debug!(actor = %actor_id, sequence, "Recovered");
                    (Lifecycle::Active, state, sequence, snapshot_sequence)
                }
                Err(reason) => {
                    tracing::error!(actor = %actor_id, "Recovery failed: {}", reason);
                    (Lifecycle::Broken(reason), ActorState::default(), 0, 0)
                }
            };
        if let Some(audit) = &context.audit {
            let change = match &lifecycle {
                Lifecycle::Active => "recovered".to_string(),
                Lifecycle::Broken(reason) => format!("broken: {}", reason),
            };
            audit.log_lifecycle(actor_id.as_str(), &change);
        }

        Ok(ModelActorState {
            actor_id,
            context,
            lifecycle,
            state,
            sequence,
            snapshot_sequence,
            snapshot_generation: 0,
            pending: HashMap::new(),
            last_activity: Instant::now(),
            ticker: None,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let period = A::tick_interval(&state.context.services.config);
        state.ticker = Some(myself.send_interval(period, || ModelActorMessage::Tick));
        if state.lifecycle == Lifecycle::Active {
            for message_id in state.state.stored_requests.keys() {
                let _ = myself.send_message(ModelActorMessage::ResumeRequest(message_id.clone()));
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ModelActorMessage::Deliver(wrapper, reply) => {
                state.last_activity = Instant::now();
                let response = self.deliver(&myself, state, wrapper).await;
                if let Some(reply) = reply {
                    if reply.send(response).is_err() {
                        tracing::debug!(actor = %state.actor_id, "Reply channel closed");
                    }
                }
            }
            ModelActorMessage::Response(response) => {
                state.last_activity = Instant::now();
                self.on_response(&myself, state, response).await;
            }
            ModelActorMessage::ResumeRequest(message_id) => {
                state.last_activity = Instant::now();
                self.resume_request(&myself, state, message_id).await;
            }
            ModelActorMessage::Tick => self.on_tick(&myself, state).await,
            ModelActorMessage::SaveSnapshot(generation) => {
                if generation == state.snapshot_generation && state.lifecycle == Lifecycle::Active {
                    self.save_snapshot(state).await;
                }
            }
            ModelActorMessage::Inspect(reply) => {
                let _ = reply.send(Self::inspect(state));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/actor_tests.rs"]
mod tests;
