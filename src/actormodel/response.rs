//! Responses sent back to the caller of a command.

use crate::actormodel::errors::CommandError;
use crate::actormodel::types::{ActorId, MessageId, TimestampUtc};
use crate::serialization::{decode_serde, ManifestRegistry, Manifested, SerializationError};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Manifests a response can travel under.
pub const RESPONSE_MANIFESTS: &[&str] = &[
    "CommandAccepted",
    "NotModified",
    "CommandFailure",
    "SecurityFailure",
    "TransitionDeniedFailure",
    "CaseTeamFailure",
    "ActorExistsFailure",
    "ActorChokedFailure",
    "EngineChokedFailure",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum ResponseBody {
    Accepted {
        #[serde(default)]
        value: Value,
    },
    NotModified,
    Failure {
        error: CommandError,
    },
}

/// Answer to exactly one command, correlated by message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub message_id: MessageId,
    pub actor_id: ActorId,
    #[serde(default)]
    pub last_modified: Option<TimestampUtc>,
    pub body: ResponseBody,
}

impl ModelResponse {
    pub fn accepted(message_id: MessageId, actor_id: ActorId, value: Value) -> Self {
        Self {
            message_id,
            actor_id,
            last_modified: None,
            body: ResponseBody::Accepted { value },
        }
    }

    pub fn not_modified(message_id: MessageId, actor_id: ActorId) -> Self {
        Self {
            message_id,
            actor_id,
            last_modified: None,
            body: ResponseBody::NotModified,
        }
    }

    pub fn failure(message_id: MessageId, actor_id: ActorId, error: CommandError) -> Self {
        Self {
            message_id,
            actor_id,
            last_modified: None,
            body: ResponseBody::Failure { error },
        }
    }

    pub fn with_last_modified(mut self, last_modified: Option<TimestampUtc>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.body, ResponseBody::Failure { .. })
    }

    pub fn error(&self) -> Option<&CommandError> {
        match &self.body {
            ResponseBody::Failure { error } => Some(error),
            _ => None,
        }
    }

    /// The value of an accepted response; `Null` otherwise.
    pub fn value(&self) -> &Value {
        static NULL: Value = Value::Null;
        match &self.body {
            ResponseBody::Accepted { value } => value,
            _ => &NULL,
        }
    }
}

impl Manifested for ModelResponse {
    fn manifest(&self) -> &'static str {
        match &self.body {
            ResponseBody::Accepted { .. } => "CommandAccepted",
            ResponseBody::NotModified => "NotModified",
            ResponseBody::Failure { error } => match error {
                CommandError::Authorization { .. } => "SecurityFailure",
                CommandError::TransitionDenied { .. } => "TransitionDeniedFailure",
                CommandError::CaseTeam { .. } => "CaseTeamFailure",
                CommandError::ActorExists { .. } => "ActorExistsFailure",
                CommandError::ActorChoked { .. } => "ActorChokedFailure",
                CommandError::EngineChoked { .. } => "EngineChokedFailure",
                CommandError::InvalidCommand { .. }
                | CommandError::MissingTenant { .. }
                | CommandError::InvalidDefinition { .. }
                | CommandError::NotRecovered { .. } => "CommandFailure",
            },
        }
    }
}

pub fn response_registry() -> Result<ManifestRegistry<ModelResponse>, SerializationError> {
    let mut registry = ManifestRegistry::new("response");
    registry.register_all(RESPONSE_MANIFESTS, decode_serde::<ModelResponse>)?;
    Ok(registry)
}
