//! Per-actor event journal with snapshots.
//!
//! The journal works on manifest-tagged [`Value`] payloads; decoding into
//! typed events happens in the actor through the family registries.

pub mod file_store;
pub mod memory;

pub use file_store::FileJournal;
pub use memory::MemoryJournal;

use crate::actormodel::errors::CommandError;
use crate::actormodel::types::{ActorId, TimestampUtc};
use crate::value::Value;
use async_trait::async_trait;
use cqrs_es::AggregateError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `AggregateConflict` means the expected sequence did not match;
/// `UnexpectedError` is I/O; `DeserializationError` is a bad record.
pub type JournalError = AggregateError<CommandError>;

/// An event ready to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub manifest: String,
    pub payload: Value,
    pub metadata: HashMap<String, String>,
}

/// A journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub actor_id: ActorId,
    pub sequence: u64,
    pub recorded_at: TimestampUtc,
    pub manifest: String,
    pub payload: Value,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub actor_id: ActorId,
    /// Sequence of the last event folded into `state`.
    pub sequence: u64,
    pub manifest: String,
    pub schema_version: u32,
    pub snapshot_at: TimestampUtc,
    pub state: Value,
}

#[async_trait]
pub trait Journal: Send + Sync {
    /// Events of `actor_id` with a sequence greater than `after`, in order.
    async fn read_events(
        &self,
        actor_id: &ActorId,
        after: u64,
    ) -> Result<Vec<StoredEvent>, JournalError>;

    /// Appends a batch atomically. Fails with `AggregateConflict` when the
    /// last stored sequence differs from `expected_sequence`.
    async fn append(
        &self,
        actor_id: &ActorId,
        expected_sequence: u64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, JournalError>;

    async fn load_snapshot(&self, actor_id: &ActorId)
        -> Result<Option<StoredSnapshot>, JournalError>;

    async fn save_snapshot(&self, snapshot: StoredSnapshot) -> Result<(), JournalError>;

    /// Every actor with at least one event.
    async fn actor_ids(&self) -> Result<Vec<ActorId>, JournalError>;
}

pub(crate) fn unexpected(e: impl std::error::Error + Send + Sync + 'static) -> JournalError {
    AggregateError::UnexpectedError(Box::new(e))
}

pub(crate) fn stamp(
    actor_id: &ActorId,
    first_sequence: u64,
    events: Vec<NewEvent>,
) -> Vec<StoredEvent> {
    let recorded_at = TimestampUtc::now();
    events
        .into_iter()
        .enumerate()
        .map(|(offset, event)| StoredEvent {
            actor_id: actor_id.clone(),
            sequence: first_sequence + offset as u64,
            recorded_at,
            manifest: event.manifest,
            payload: event.payload,
            metadata: event.metadata,
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/journal_tests.rs"]
mod tests;
