//! Supervisor owning every model actor.
//!
//! Actors are spawned linked to the supervisor. When one stops or fails it
//! is dropped from the directory; the next message addressed to it
//! activates a fresh instance, which recovers from the journal.

use crate::actormodel::actor::{ModelActor, ModelActorArgs, ModelActorMessage};
use crate::actormodel::types::{ActorId, ActorType};
use crate::board::Board;
use crate::cmmn::Case;
use crate::consentgroup::ConsentGroup;
use crate::processtask::ProcessTask;
use crate::tenant::Tenant;
use crate::timerservice::TimerService;
use async_trait::async_trait;
use ractor::{Actor, ActorCell, ActorProcessingErr, ActorRef, ActorStatus, SpawnErr, SupervisionEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Clone)]
pub struct DirectoryEntry {
    pub actor_type: ActorType,
    pub actor: ActorRef<ModelActorMessage>,
}

/// Running actors by id.
#[derive(Default)]
pub struct ActorDirectory {
    entries: Mutex<HashMap<ActorId, DirectoryEntry>>,
}

impl ActorDirectory {
    /// The entry for `actor_id` if its actor still accepts messages.
    pub fn live(&self, actor_id: &ActorId) -> Option<DirectoryEntry> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(actor_id)
            .filter(|entry| {
                matches!(
                    entry.actor.get_status(),
                    ActorStatus::Unstarted | ActorStatus::Starting | ActorStatus::Running
                )
            })
            .cloned()
    }

    pub fn insert(&self, actor_id: ActorId, entry: DirectoryEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(actor_id, entry);
        }
    }

    /// Removes `actor_id` if it still points at `actor`.
    pub fn forget(&self, actor_id: &ActorId, actor: &ActorCell) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries
                .get(actor_id)
                .is_some_and(|entry| entry.actor.get_id() == actor.get_id())
            {
                entries.remove(actor_id);
            }
        }
    }

    /// Removes whichever entry belongs to the stopped `cell`.
    pub fn remove_cell(&self, cell: &ActorCell) -> Option<ActorId> {
        let mut entries = self.entries.lock().ok()?;
        let actor_id = entries
            .iter()
            .find(|(_, entry)| entry.actor.get_id() == cell.get_id())
            .map(|(id, _)| id.clone())?;
        entries.remove(&actor_id);
        Some(actor_id)
    }

    /// Removes `actor_id` if its actor is shutting down.
    pub fn forget_stopped(&self, actor_id: &ActorId) {
        if let Ok(mut entries) = self.entries.lock() {
            let stopped = entries.get(actor_id).is_some_and(|entry| {
                !matches!(
                    entry.actor.get_status(),
                    ActorStatus::Unstarted | ActorStatus::Starting | ActorStatus::Running
                )
            });
            if stopped {
                entries.remove(actor_id);
            }
        }
    }

    pub fn ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn actors(&self) -> Vec<ActorRef<ModelActorMessage>> {
        self.entries
            .lock()
            .map(|entries| entries.values().map(|entry| entry.actor.clone()).collect())
            .unwrap_or_default()
    }
}

pub enum SupervisorMsg {
    Spawn {
        actor_type: ActorType,
        args: ModelActorArgs,
        reply: oneshot::Sender<Result<ActorRef<ModelActorMessage>, SpawnErr>>,
    },
}

pub struct ActorSupervisor;

async fn spawn_model(
    actor_type: ActorType,
    args: ModelActorArgs,
    supervisor: ActorCell,
) -> Result<ActorRef<ModelActorMessage>, SpawnErr> {
    let spawned = match actor_type {
        ActorType::Case => {
            ModelActor::<Case>::spawn_linked(None, ModelActor::new(), args, supervisor).await
        }
        ActorType::Tenant => {
            ModelActor::<Tenant>::spawn_linked(None, ModelActor::new(), args, supervisor).await
        }
        ActorType::ConsentGroup => {
            ModelActor::<ConsentGroup>::spawn_linked(None, ModelActor::new(), args, supervisor)
                .await
        }
        ActorType::TimerService => {
            ModelActor::<TimerService>::spawn_linked(None, ModelActor::new(), args, supervisor)
                .await
        }
        ActorType::Board => {
            ModelActor::<Board>::spawn_linked(None, ModelActor::new(), args, supervisor).await
        }
        ActorType::ProcessTask => {
            ModelActor::<ProcessTask>::spawn_linked(None, ModelActor::new(), args, supervisor)
                .await
        }
    };
    spawned.map(|(actor, _handle)| actor)
}

#[async_trait]
impl Actor for ActorSupervisor {
    type Msg = SupervisorMsg;
    type State = Arc<ActorDirectory>;
    type Arguments = Arc<ActorDirectory>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        directory: Arc<ActorDirectory>,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(directory)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        msg: Self::Msg,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match msg {
            SupervisorMsg::Spawn {
                actor_type,
                args,
                reply,
            } => {
                let actor_id = args.actor_id.clone();
                let spawned = spawn_model(actor_type, args, myself.get_cell()).await;
                if let Err(e) = &spawned {
                    tracing::error!(actor = %actor_id, "Failed to spawn {} actor: {}", actor_type, e);
                }
                let _ = reply.send(spawned);
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        evt: SupervisionEvent,
        directory: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match evt {
            SupervisionEvent::ActorFailed(cell, err) => {
                let actor_id = directory.remove_cell(&cell);
                tracing::warn!(actor = ?actor_id, "Model actor failed: {}", err);
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                let actor_id = directory.remove_cell(&cell);
                tracing::debug!(actor = ?actor_id, reason = ?reason, "Model actor stopped");
            }
            _ => {}
        }
        Ok(())
    }
}
