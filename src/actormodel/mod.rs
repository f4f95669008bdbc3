//! Event-sourced actor kernel.
//!
//! Every actor family (case, tenant, consent group, timer service, board,
//! process task) is a [`ModelAggregate`]. The kernel wraps it in
//! [`state::ActorState`], which adds the bookkeeping all families share,
//! and runs it inside a [`actor::ModelActor`]:
//!
//! ```text
//! ManifestWrapper -> decode -> admit -> ActorState::handle (staged)
//!                 -> Journal::append -> apply -> respond -> outgoing requests
//! ```
//!
//! Recovery replays the same `apply` from the journal, optionally starting
//! from a snapshot.

pub mod actor;
pub mod errors;
pub mod event;
pub mod message;
pub mod query;
pub mod registry;
pub mod response;
pub mod services;
pub mod state;
pub mod system;
pub mod types;

pub use actor::{ActorContext, ActorRouter, ModelActor, ModelActorMessage};
pub use errors::CommandError;
pub use event::{ActorEvent, EventBody, EventMetadata, EventPath, EventPayload, JournalEvent};
pub use message::{
    CommandEnvelope, CommandMetadata, CommandPayload, KernelCommand, ModelCommand,
    OutgoingRequest, RequestModelActor,
};
pub use registry::{EngineRegistries, FamilyRegistries, MessageCatalog};
pub use response::{ModelResponse, ResponseBody};
pub use services::{EngineClock, EngineServices};
pub use state::{ActorState, Transaction};
pub use system::{CaseSystem, SystemError};
pub use types::{ActorId, ActorType, EngineVersion, MessageId, TenantId, TimestampUtc, UserIdentity};

use crate::config::EngineConfig;
use crate::value::Value;
use cqrs_es::Aggregate;
use std::fmt::Debug;
use std::time::Duration;

/// A family aggregate the kernel can host.
///
/// `handle` validates and processes one command against `&self` and returns
/// the events; `apply` is the only mutator and runs both online and during
/// replay. The remaining hooks have neutral defaults.
pub trait ModelAggregate:
    Aggregate<
        Command: CommandEnvelope,
        Event: EventPayload,
        Error = CommandError,
        Services = EngineServices,
    > + Clone
    + Debug
    + 'static
{
    const ACTOR_TYPE: ActorType;

    /// Whether a bootstrap command has created this actor.
    fn exists(&self) -> bool;

    /// Value returned in the accepted response, computed on the new state.
    fn respond(&self, _command: &Self::Command, _events: &[Self::Event], _services: &EngineServices) -> Option<Value> {
        None
    }

    /// The family's own commit event, computed on the new state.
    fn commit_event(&self, _metadata: &CommandMetadata) -> Option<Self::Event> {
        None
    }

    /// Requests to other actors caused by freshly committed events.
    /// Never called during recovery.
    fn outgoing_requests(
        &self,
        _metadata: &CommandMetadata,
        _events: &[Self::Event],
        _services: &EngineServices,
    ) -> Vec<OutgoingRequest> {
        Vec::new()
    }

    fn handle_success(
        &self,
        _response: &ModelResponse,
        _metadata: &CommandMetadata,
        _services: &EngineServices,
    ) -> Result<Vec<Self::Event>, CommandError> {
        Ok(Vec::new())
    }

    fn handle_failure(
        &self,
        _response: &ModelResponse,
        _error: &CommandError,
        _metadata: &CommandMetadata,
        _services: &EngineServices,
    ) -> Result<Vec<Self::Event>, CommandError> {
        Ok(Vec::new())
    }

    /// Runs once after replay, before the first command.
    fn recovery_completed(&mut self) {}

    /// Commands the actor sends itself on the housekeeping tick.
    fn tick_commands(
        &self,
        _metadata: &CommandMetadata,
        _services: &EngineServices,
    ) -> Vec<Self::Command> {
        Vec::new()
    }

    /// Period of the housekeeping tick.
    fn tick_interval(config: &EngineConfig) -> Duration {
        config.tick_interval()
    }

    /// Whether the actor may stop itself when idle.
    fn passivates(&self) -> bool {
        true
    }

    fn registries(all: &EngineRegistries) -> &FamilyRegistries<Self>;
}
