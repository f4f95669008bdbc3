//! Startup-built manifest registries for every actor family.

use crate::actormodel::event::{JournalEvent, KERNEL_EVENT_MANIFESTS};
use crate::actormodel::message::{CommandEnvelope, REQUEST_MANIFEST, SWITCH_DEBUG_MANIFEST};
use crate::actormodel::response::{response_registry, ModelResponse};
use crate::actormodel::types::{ActorId, ActorType};
use crate::actormodel::ModelAggregate;
use crate::board::Board;
use crate::cmmn::Case;
use crate::consentgroup::ConsentGroup;
use crate::journal::StoredEvent;
use crate::processtask::ProcessTask;
use crate::serialization::{
    decode_serde, ManifestRegistry, ManifestWrapper, Manifested, SerializationError,
};
use crate::tenant::Tenant;
use crate::timerservice::TimerService;
use crate::value::Value;
use cqrs_es::Aggregate;
use std::collections::HashMap;

pub type FamilyEvent<A> = JournalEvent<<A as Aggregate>::Command, <A as Aggregate>::Event>;

/// Command and event decoders of one family.
pub struct FamilyRegistries<A: ModelAggregate> {
    pub commands: ManifestRegistry<A::Command>,
    pub events: ManifestRegistry<FamilyEvent<A>>,
}

impl<A: ModelAggregate> FamilyRegistries<A> {
    pub fn build() -> Result<Self, SerializationError> {
        let mut commands = ManifestRegistry::new(A::ACTOR_TYPE.as_str());
        commands.register_all(
            <A::Command as CommandEnvelope>::manifests(),
            decode_serde::<A::Command>,
        )?;

        let mut events = ManifestRegistry::new(A::ACTOR_TYPE.as_str());
        events.register_all(KERNEL_EVENT_MANIFESTS, decode_serde::<FamilyEvent<A>>)?;
        events.register_all(
            <A::Event as crate::actormodel::EventPayload>::manifests(),
            decode_serde::<FamilyEvent<A>>,
        )?;
        Ok(Self { commands, events })
    }

    /// Decodes a journal record, checking it holds what its manifest says.
    pub fn decode_event(&self, stored: &StoredEvent) -> Result<FamilyEvent<A>, SerializationError> {
        let event = self.events.decode(&stored.manifest, stored.payload.clone())?;
        if event.manifest() != stored.manifest {
            return Err(SerializationError::Decode {
                manifest: stored.manifest.clone(),
                message: format!("record contains a {} event", event.manifest()),
            });
        }
        Ok(event)
    }
}

/// Maps every command manifest to the family that handles it.
#[derive(Debug, Default)]
pub struct MessageCatalog {
    owners: HashMap<&'static str, ActorType>,
}

impl MessageCatalog {
    pub fn register(
        &mut self,
        actor_type: ActorType,
        manifests: &[&'static str],
    ) -> Result<(), SerializationError> {
        for manifest in manifests {
            if self.owners.insert(manifest, actor_type).is_some() {
                return Err(SerializationError::DuplicateManifest {
                    manifest: manifest.to_string(),
                    registry: "message catalog",
                });
            }
        }
        Ok(())
    }

    pub fn owner(&self, manifest: &str) -> Option<ActorType> {
        self.owners.get(manifest).copied()
    }

    /// Target actor and family of a wire message.
    pub fn route(&self, message: &ManifestWrapper) -> Result<(ActorType, ActorId), SerializationError> {
        let unknown = || SerializationError::UnknownManifest {
            manifest: message.manifest.clone(),
            registry: "message catalog",
        };
        let (manifest, content) = match message.manifest.as_str() {
            REQUEST_MANIFEST => {
                let inner = message.content.get("command").ok_or_else(unknown)?;
                let manifest = inner.get("manifest").and_then(Value::as_str).ok_or_else(unknown)?;
                (manifest, inner.get("content").ok_or_else(unknown)?)
            }
            other => (other, &message.content),
        };

        let actor_type = if manifest == SWITCH_DEBUG_MANIFEST {
            content
                .get("command")
                .and_then(|command| command.get("actor_type"))
                .cloned()
                .and_then(|value| value.to_serde::<ActorType>().ok())
                .ok_or_else(unknown)?
        } else {
            self.owner(manifest).ok_or_else(|| SerializationError::UnknownManifest {
                manifest: manifest.to_string(),
                registry: "message catalog",
            })?
        };

        let actor_id = content
            .get("metadata")
            .and_then(|metadata| metadata.get("actor_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| SerializationError::Decode {
                manifest: manifest.to_string(),
                message: "message has no target actor id".to_string(),
            })?;
        Ok((actor_type, ActorId::from(actor_id)))
    }
}

/// All registries of the engine, built once at startup and shared.
pub struct EngineRegistries {
    pub case: FamilyRegistries<Case>,
    pub tenant: FamilyRegistries<Tenant>,
    pub consent_group: FamilyRegistries<ConsentGroup>,
    pub timer_service: FamilyRegistries<TimerService>,
    pub board: FamilyRegistries<Board>,
    pub process_task: FamilyRegistries<ProcessTask>,
    pub responses: ManifestRegistry<ModelResponse>,
    pub catalog: MessageCatalog,
}

impl EngineRegistries {
    pub fn build() -> Result<Self, SerializationError> {
        let registries = Self {
            case: FamilyRegistries::build()?,
            tenant: FamilyRegistries::build()?,
            consent_group: FamilyRegistries::build()?,
            timer_service: FamilyRegistries::build()?,
            board: FamilyRegistries::build()?,
            process_task: FamilyRegistries::build()?,
            responses: response_registry()?,
            catalog: MessageCatalog::default(),
        };
        let mut catalog = MessageCatalog::default();
        catalog.register(ActorType::Case, registries.case.manifests())?;
        catalog.register(ActorType::Tenant, registries.tenant.manifests())?;
        catalog.register(ActorType::ConsentGroup, registries.consent_group.manifests())?;
        catalog.register(ActorType::TimerService, registries.timer_service.manifests())?;
        catalog.register(ActorType::Board, registries.board.manifests())?;
        catalog.register(ActorType::ProcessTask, registries.process_task.manifests())?;
        Ok(Self {
            catalog,
            ..registries
        })
    }
}

impl<A: ModelAggregate> FamilyRegistries<A> {
    fn manifests(&self) -> &'static [&'static str] {
        <A::Command as CommandEnvelope>::manifests()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
