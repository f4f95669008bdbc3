//! The case system: routing, activation and supervision of model actors.
//!
//! External code talks to the engine only through [`CaseSystem`]. Messages
//! travel as [`ManifestWrapper`]s; the message catalog tells which family
//! owns a manifest, and the target actor is activated on demand.

pub mod supervisor;

use crate::actormodel::actor::{
    ActorContext, ActorInspection, ActorRouter, ModelActorArgs, ModelActorMessage,
};
use crate::actormodel::errors::CommandError;
use crate::actormodel::message::{CommandPayload, ModelCommand, OutgoingRequest, RequestModelActor};
use crate::actormodel::query::{EventPublisher, PublishedEvent};
use crate::actormodel::registry::EngineRegistries;
use crate::actormodel::response::ModelResponse;
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::{ActorId, ActorType};
use crate::journal::Journal;
use crate::logging::TransactionLogger;
use crate::serialization::{ManifestWrapper, SerializationError};
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorRef};
use std::sync::{Arc, Weak};
use supervisor::{ActorDirectory, ActorSupervisor, DirectoryEntry, SupervisorMsg};
use tokio::sync::{broadcast, oneshot, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("failed to start {actor_type} actor '{actor_id}': {message}")]
    Spawn {
        actor_type: ActorType,
        actor_id: ActorId,
        message: String,
    },
    #[error("actor '{actor_id}' is a {existing}, not a {requested}")]
    WrongActorType {
        actor_id: ActorId,
        existing: ActorType,
        requested: ActorType,
    },
    #[error("actor '{actor_id}' did not answer")]
    NoAnswer { actor_id: ActorId },
    #[error("failed to set up the case system: {0}")]
    Setup(String),
}

struct SystemInner {
    context: ActorContext,
    directory: Arc<ActorDirectory>,
    spawn_lock: Mutex<()>,
    supervisor: ActorRef<SupervisorMsg>,
    supervisor_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running engine. Cheap to clone.
#[derive(Clone)]
pub struct CaseSystem {
    inner: Arc<SystemInner>,
}

struct SystemRouter {
    system: Weak<SystemInner>,
}

impl SystemRouter {
    fn system(&self) -> Option<CaseSystem> {
        self.system.upgrade().map(|inner| CaseSystem { inner })
    }
}

impl ActorRouter for SystemRouter {
    fn send_request(&self, source: &ActorId, source_type: ActorType, request: OutgoingRequest) {
        let Some(system) = self.system() else {
            return;
        };
        let source = source.clone();
        tokio::spawn(async move {
            let OutgoingRequest {
                target,
                target_type,
                message_id,
                command,
            } = request;
            let envelope = RequestModelActor {
                source_actor: source.clone(),
                source_type,
                command,
            };
            let outcome = match ManifestWrapper::wrap(&envelope) {
                Ok(wrapper) => system.deliver(target_type, &target, wrapper).await,
                Err(e) => Err(SystemError::from(e)),
            };
            if let Err(e) = outcome {
                tracing::warn!(from = %source, to = %target, "Request could not be delivered: {}", e);
                let failure = ModelResponse::failure(message_id, target, CommandError::invalid(e.to_string()));
                system.respond(source_type, &source, failure).await;
            }
        });
    }

    fn send_response(&self, target: &ActorId, target_type: ActorType, response: ModelResponse) {
        let Some(system) = self.system() else {
            return;
        };
        let target = target.clone();
        tokio::spawn(async move {
            system.respond(target_type, &target, response).await;
        });
    }

    fn passivated(&self, actor_id: &ActorId) {
        if let Some(inner) = self.system.upgrade() {
            inner.directory.forget_stopped(actor_id);
        }
    }
}

impl CaseSystem {
    /// Starts the engine and activates the timer service.
    pub async fn start(services: EngineServices, journal: Arc<dyn Journal>) -> Result<Self, SystemError> {
        let registries = Arc::new(EngineRegistries::build()?);
        let audit = if services.config.logging.audit_log {
            let path = crate::engine_paths::audit_log_path()
                .map_err(|e| SystemError::Setup(e.to_string()))?;
            let logger =
                TransactionLogger::new(&path).map_err(|e| SystemError::Setup(e.to_string()))?;
            Some(Arc::new(logger))
        } else {
            None
        };

        let directory = Arc::new(ActorDirectory::default());
        let (supervisor, handle) = ActorSupervisor::spawn(None, ActorSupervisor, directory.clone())
            .await
            .map_err(|e| SystemError::Setup(e.to_string()))?;

        let inner = Arc::new_cyclic(|weak: &Weak<SystemInner>| SystemInner {
            context: ActorContext {
                services,
                journal,
                registries,
                router: Arc::new(SystemRouter {
                    system: weak.clone(),
                }),
                publisher: EventPublisher::default(),
                audit,
            },
            directory,
            spawn_lock: Mutex::new(()),
            supervisor,
            supervisor_handle: Mutex::new(Some(handle)),
        });
        let system = Self { inner };

        let timer_service = ActorId::from(system.config().timer_service.actor_id.as_str());
        system.actor_ref(ActorType::TimerService, &timer_service).await?;
        Ok(system)
    }

    pub fn config(&self) -> &crate::config::EngineConfig {
        &self.inner.context.services.config
    }

    pub fn services(&self) -> &EngineServices {
        &self.inner.context.services
    }

    pub fn registries(&self) -> &EngineRegistries {
        &self.inner.context.registries
    }

    /// Committed events of every actor, as they are persisted.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.inner.context.publisher.subscribe()
    }

    /// Ids of the actors currently in memory.
    pub fn active_actors(&self) -> Vec<ActorId> {
        self.inner.directory.ids()
    }

    /// Sends a message and waits for its response.
    pub async fn ask(&self, message: ManifestWrapper) -> Result<ModelResponse, SystemError> {
        let (actor_type, actor_id) = self.inner.context.registries.catalog.route(&message)?;
        self.deliver(actor_type, &actor_id, message).await
    }

    /// Sends a command and waits for its response.
    pub async fn ask_command<P: CommandPayload>(
        &self,
        command: &ModelCommand<P>,
    ) -> Result<ModelResponse, SystemError> {
        self.ask(command.wrap()?).await
    }

    /// Sends a message without waiting for the response.
    pub async fn tell(&self, message: ManifestWrapper) -> Result<(), SystemError> {
        let (actor_type, actor_id) = self.inner.context.registries.catalog.route(&message)?;
        let actor = self.actor_ref(actor_type, &actor_id).await?;
        if actor
            .send_message(ModelActorMessage::Deliver(message.clone(), None))
            .is_err()
        {
            self.inner.directory.forget(&actor_id, &actor.get_cell());
            let actor = self.actor_ref(actor_type, &actor_id).await?;
            actor
                .send_message(ModelActorMessage::Deliver(message, None))
                .map_err(|_| SystemError::NoAnswer { actor_id })?;
        }
        Ok(())
    }

    /// State of an actor, activating it when it is not in memory.
    pub async fn inspect(
        &self,
        actor_type: ActorType,
        actor_id: &ActorId,
    ) -> Result<ActorInspection, SystemError> {
        for _ in 0..2 {
            let actor = self.actor_ref(actor_type, actor_id).await?;
            let (tx, rx) = oneshot::channel();
            if actor.send_message(ModelActorMessage::Inspect(tx)).is_ok() {
                if let Ok(inspection) = rx.await {
                    return Ok(inspection);
                }
            }
            self.inner.directory.forget(actor_id, &actor.get_cell());
        }
        Err(SystemError::NoAnswer {
            actor_id: actor_id.clone(),
        })
    }

    /// Stops every actor and the supervisor.
    pub async fn shutdown(&self) {
        let actors = self.inner.directory.actors();
        // An actor that already stopped on its own reports an error here.
        futures::future::join_all(
            actors
                .iter()
                .map(|actor| actor.stop_and_wait(Some("shutdown".to_string()), None)),
        )
        .await;
        self.inner.supervisor.stop(Some("shutdown".to_string()));
        if let Some(handle) = self.inner.supervisor_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Delivers to a known target, retrying once if the actor was stopping.
    async fn deliver(
        &self,
        actor_type: ActorType,
        actor_id: &ActorId,
        message: ManifestWrapper,
    ) -> Result<ModelResponse, SystemError> {
        for _ in 0..2 {
            let actor = self.actor_ref(actor_type, actor_id).await?;
            let (tx, rx) = oneshot::channel();
            if actor
                .send_message(ModelActorMessage::Deliver(message.clone(), Some(tx)))
                .is_ok()
            {
                if let Ok(response) = rx.await {
                    return Ok(response);
                }
            }
            self.inner.directory.forget(actor_id, &actor.get_cell());
        }
        Err(SystemError::NoAnswer {
            actor_id: actor_id.clone(),
        })
    }

    async fn respond(&self, actor_type: ActorType, actor_id: &ActorId, response: ModelResponse) {
        match self.actor_ref(actor_type, actor_id).await {
            Ok(actor) => {
                if actor.send_message(ModelActorMessage::Response(response)).is_err() {
                    tracing::warn!(actor = %actor_id, "Response could not be delivered");
                }
            }
            Err(e) => tracing::warn!(actor = %actor_id, "Response could not be delivered: {}", e),
        }
    }

    async fn actor_ref(
        &self,
        actor_type: ActorType,
        actor_id: &ActorId,
    ) -> Result<ActorRef<ModelActorMessage>, SystemError> {
        let check = |entry: DirectoryEntry| {
            if entry.actor_type == actor_type {
                Ok(entry.actor)
            } else {
                Err(SystemError::WrongActorType {
                    actor_id: actor_id.clone(),
                    existing: entry.actor_type,
                    requested: actor_type,
                })
            }
        };
        if let Some(entry) = self.inner.directory.live(actor_id) {
            return check(entry);
        }

        let _guard = self.inner.spawn_lock.lock().await;
        if let Some(entry) = self.inner.directory.live(actor_id) {
            return check(entry);
        }
        let (tx, rx) = oneshot::channel();
        let args = ModelActorArgs {
            actor_id: actor_id.clone(),
            context: self.inner.context.clone(),
        };
        let spawn_error = |message: String| SystemError::Spawn {
            actor_type,
            actor_id: actor_id.clone(),
            message,
        };
        self.inner
            .supervisor
            .send_message(SupervisorMsg::Spawn {
                actor_type,
                args,
                reply: tx,
            })
            .map_err(|e| spawn_error(e.to_string()))?;
        let actor = rx
            .await
            .map_err(|e| spawn_error(e.to_string()))?
            .map_err(|e| spawn_error(e.to_string()))?;
        tracing::debug!(actor = %actor_id, "Activated {} actor", actor_type);
        self.inner.directory.insert(
            actor_id.clone(),
            DirectoryEntry {
                actor_type,
                actor: actor.clone(),
            },
        );
        Ok(actor)
    }
}

#[cfg(test)]
#[path = "tests/system_tests.rs"]
mod tests;
