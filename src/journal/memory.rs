//! In-memory journal for tests and throwaway systems.

use super::{stamp, unexpected, Journal, JournalError, NewEvent, StoredEvent, StoredSnapshot};
use crate::actormodel::types::ActorId;
use async_trait::async_trait;
use cqrs_es::AggregateError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryJournal {
    events: Mutex<HashMap<ActorId, Vec<StoredEvent>>>,
    snapshots: Mutex<HashMap<ActorId, StoredSnapshot>>,
    failing_appends: AtomicUsize,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` appends fail with an I/O error.
    pub fn fail_next_appends(&self, count: usize) {
        self.failing_appends.store(count, Ordering::SeqCst);
    }

    /// Number of events stored for `actor_id`.
    pub async fn event_count(&self, actor_id: &ActorId) -> usize {
        self.events
            .lock()
            .await
            .get(actor_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Manifests stored for `actor_id`, in order.
    pub async fn manifests(&self, actor_id: &ActorId) -> Vec<String> {
        self.events
            .lock()
            .await
            .get(actor_id)
            .map(|events| events.iter().map(|e| e.manifest.clone()).collect())
            .unwrap_or_default()
    }

    fn take_failure(&self) -> bool {
        self.failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn read_events(
        &self,
        actor_id: &ActorId,
        after: u64,
    ) -> Result<Vec<StoredEvent>, JournalError> {
        Ok(self
            .events
            .lock()
            .await
            .get(actor_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.sequence > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append(
        &self,
        actor_id: &ActorId,
        expected_sequence: u64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, JournalError> {
        if self.take_failure() {
            return Err(unexpected(std::io::Error::other("injected append failure")));
        }
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let mut all = self.events.lock().await;
        let log = all.entry(actor_id.clone()).or_default();
        let current = log.last().map(|e| e.sequence).unwrap_or(0);
        if current != expected_sequence {
            return Err(AggregateError::AggregateConflict);
        }
        let records = stamp(actor_id, expected_sequence + 1, events);
        log.extend(records.iter().cloned());
        Ok(records)
    }

    async fn load_snapshot(
        &self,
        actor_id: &ActorId,
    ) -> Result<Option<StoredSnapshot>, JournalError> {
        Ok(self.snapshots.lock().await.get(actor_id).cloned())
    }

    async fn save_snapshot(&self, snapshot: StoredSnapshot) -> Result<(), JournalError> {
        self.snapshots
            .lock()
            .await
            .insert(snapshot.actor_id.clone(), snapshot);
        Ok(())
    }

    async fn actor_ids(&self) -> Result<Vec<ActorId>, JournalError> {
        let mut ids: Vec<ActorId> = self
            .events
            .lock()
            .await
            .iter()
            .filter(|(_, events)| !events.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
