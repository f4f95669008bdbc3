//! Command envelopes and the kernel's own messages.

use crate::actormodel::errors::CommandError;
use crate::actormodel::types::{ActorId, ActorType, MessageId, TenantId, TimestampUtc, UserIdentity};
use crate::serialization::{ManifestRegistry, ManifestWrapper, Manifested, SerializationError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Manifest of the cross-actor request envelope.
pub const REQUEST_MANIFEST: &str = "RequestModelActor";
/// Manifest of the debug switch understood by every family.
pub const SWITCH_DEBUG_MANIFEST: &str = "SwitchDebugMode";

/// Who sent a command, to which actor, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMetadata {
    pub message_id: MessageId,
    pub actor_id: ActorId,
    #[serde(default)]
    pub tenant: Option<TenantId>,
    pub user: UserIdentity,
    #[serde(default)]
    pub timestamp: TimestampUtc,
}

impl CommandMetadata {
    pub fn new(actor_id: impl Into<ActorId>, tenant: impl Into<TenantId>, user: UserIdentity) -> Self {
        Self {
            message_id: MessageId::random(),
            actor_id: actor_id.into(),
            tenant: Some(tenant.into()),
            user,
            timestamp: TimestampUtc::now(),
        }
    }

    /// Metadata for commands an actor issues on its own behalf.
    pub fn system(actor_id: &ActorId, tenant: Option<TenantId>) -> Self {
        Self {
            message_id: MessageId::random(),
            actor_id: actor_id.clone(),
            tenant,
            user: UserIdentity::new(format!("system:{}", actor_id)),
            timestamp: TimestampUtc::now(),
        }
    }

    /// Same sender and tenant, addressed to another actor under a fresh id.
    pub fn forward_to(&self, target: &ActorId) -> Self {
        Self {
            message_id: MessageId::random(),
            actor_id: target.clone(),
            tenant: self.tenant.clone(),
            user: self.user.clone(),
            timestamp: TimestampUtc::now(),
        }
    }
}

/// The family-specific part of a command.
pub trait CommandPayload:
    Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    fn manifest(&self) -> &'static str;

    /// Every manifest of the family, registered at startup.
    fn manifests() -> &'static [&'static str];

    /// Commands that may create the actor.
    fn is_bootstrap(&self) -> bool {
        false
    }
}

/// A family command together with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCommand<P> {
    pub metadata: CommandMetadata,
    pub command: P,
}

impl<P: CommandPayload> ModelCommand<P> {
    pub fn new(metadata: CommandMetadata, command: P) -> Self {
        Self { metadata, command }
    }

    pub fn wrap(&self) -> Result<ManifestWrapper, SerializationError> {
        ManifestWrapper::wrap(self)
    }
}

impl<P: CommandPayload> Manifested for ModelCommand<P> {
    fn manifest(&self) -> &'static str {
        self.command.manifest()
    }
}

/// What the kernel needs to know about a family's command type.
pub trait CommandEnvelope:
    Manifested + Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync + 'static
{
    fn metadata(&self) -> &CommandMetadata;
    fn is_bootstrap(&self) -> bool;
    fn manifests() -> &'static [&'static str];
}

impl<P: CommandPayload> CommandEnvelope for ModelCommand<P> {
    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    fn is_bootstrap(&self) -> bool {
        self.command.is_bootstrap()
    }

    fn manifests() -> &'static [&'static str] {
        P::manifests()
    }
}

/// Commands handled by the kernel itself, for every family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum KernelCommand {
    SwitchDebugMode { actor_type: ActorType, enabled: bool },
}

impl CommandPayload for KernelCommand {
    fn manifest(&self) -> &'static str {
        match self {
            Self::SwitchDebugMode { .. } => SWITCH_DEBUG_MANIFEST,
        }
    }

    fn manifests() -> &'static [&'static str] {
        &[SWITCH_DEBUG_MANIFEST]
    }
}

/// A command sent by one actor to another.
///
/// The receiver stores it before running it, so the request survives a
/// crash between acceptance and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestModelActor {
    pub source_actor: ActorId,
    pub source_type: ActorType,
    pub command: ManifestWrapper,
}

impl Manifested for RequestModelActor {
    fn manifest(&self) -> &'static str {
        REQUEST_MANIFEST
    }
}

/// A request an actor wants to send after its events are committed.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingRequest {
    pub target: ActorId,
    pub target_type: ActorType,
    pub message_id: MessageId,
    pub command: ManifestWrapper,
}

impl OutgoingRequest {
    pub fn new<P: CommandPayload>(
        target_type: ActorType,
        command: &ModelCommand<P>,
    ) -> Result<Self, SerializationError> {
        Ok(Self {
            target: command.metadata.actor_id.clone(),
            target_type,
            message_id: command.metadata.message_id.clone(),
            command: command.wrap()?,
        })
    }
}

/// A decoded message as the kernel sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming<C> {
    Command(C),
    Request {
        source_actor: ActorId,
        source_type: ActorType,
        command: C,
    },
    Kernel(ModelCommand<KernelCommand>),
}

impl<C: CommandEnvelope> Incoming<C> {
    pub fn metadata(&self) -> &CommandMetadata {
        match self {
            Self::Command(command) | Self::Request { command, .. } => command.metadata(),
            Self::Kernel(command) => &command.metadata,
        }
    }

    pub fn manifest(&self) -> &'static str {
        match self {
            Self::Command(command) => command.manifest(),
            Self::Request { .. } => REQUEST_MANIFEST,
            Self::Kernel(command) => command.manifest(),
        }
    }

    /// Decodes a wire message for an actor of `actor_type`.
    pub fn decode(
        actor_type: ActorType,
        wrapper: ManifestWrapper,
        commands: &ManifestRegistry<C>,
    ) -> Result<Self, CommandError> {
        match wrapper.manifest.as_str() {
            REQUEST_MANIFEST => {
                let request: RequestModelActor =
                    crate::serialization::decode_serde(wrapper.content)
                        .map_err(|e| CommandError::invalid(e.to_string()))?;
                let command = decode_command(actor_type, request.command, commands)?;
                Ok(Self::Request {
                    source_actor: request.source_actor,
                    source_type: request.source_type,
                    command,
                })
            }
            SWITCH_DEBUG_MANIFEST => crate::serialization::decode_serde(wrapper.content)
                .map(Self::Kernel)
                .map_err(|e| CommandError::invalid(e.to_string())),
            _ => decode_command(actor_type, wrapper, commands).map(Self::Command),
        }
    }
}

fn decode_command<C: CommandEnvelope>(
    actor_type: ActorType,
    wrapper: ManifestWrapper,
    commands: &ManifestRegistry<C>,
) -> Result<C, CommandError> {
    let manifest = wrapper.manifest.clone();
    let command = commands.decode_wrapper(wrapper).map_err(|e| match e {
        SerializationError::UnknownManifest { .. } => CommandError::invalid(format!(
            "{} does not support commands of type {}",
            actor_type, manifest
        )),
        other => CommandError::invalid(other.to_string()),
    })?;
    if command.manifest() != manifest {
        return Err(CommandError::invalid(format!(
            "Message announced as {} contains a {} command",
            manifest,
            command.manifest()
        )));
    }
    Ok(command)
}
