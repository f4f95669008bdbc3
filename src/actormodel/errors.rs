//! Error taxonomy for command handling.
//!
//! Every variant ends up in a failure response; none of them escapes the
//! actor loop as a fault.

use serde::{Deserialize, Serialize};

/// Errors raised while receiving, validating or processing a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandError {
    /// The command does not fit the actor or its current state.
    #[error("{message}")]
    InvalidCommand { message: String },
    /// The command carries no tenant.
    #[error("{message}")]
    MissingTenant { message: String },
    /// The user may not perform the command.
    #[error("{message}")]
    Authorization { message: String },
    /// A plan-item transition is not permitted for the user.
    #[error("{message}")]
    TransitionDenied { message: String },
    /// A team invariant would be violated.
    #[error("{message}")]
    CaseTeam { message: String },
    /// The case definition cannot be used.
    #[error("{message}")]
    InvalidDefinition { message: String },
    /// A bootstrap command reached an actor that already exists.
    #[error("{message}")]
    ActorExists { message: String },
    /// The actor failed to recover and does not accept commands.
    #[error("{message}")]
    NotRecovered { message: String },
    /// Processing hit an unexpected error.
    #[error("{message}")]
    ActorChoked { message: String },
    /// The events could not be persisted.
    #[error("{message}")]
    EngineChoked { message: String },
}

impl CommandError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::TransitionDenied {
            message: message.into(),
        }
    }

    pub fn team(message: impl Into<String>) -> Self {
        Self::CaseTeam {
            message: message.into(),
        }
    }

    pub fn definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    pub fn choked(message: impl Into<String>) -> Self {
        Self::ActorChoked {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidCommand { message }
            | Self::MissingTenant { message }
            | Self::Authorization { message }
            | Self::TransitionDenied { message }
            | Self::CaseTeam { message }
            | Self::InvalidDefinition { message }
            | Self::ActorExists { message }
            | Self::NotRecovered { message }
            | Self::ActorChoked { message }
            | Self::EngineChoked { message } => message,
        }
    }

    /// Whether this error belongs to the invalid-command family.
    pub fn is_invalid_command(&self) -> bool {
        matches!(
            self,
            Self::InvalidCommand { .. } | Self::MissingTenant { .. }
        )
    }

    /// Failures that leave staged state behind and warrant a debug trace.
    pub fn is_system_failure(&self) -> bool {
        matches!(self, Self::ActorChoked { .. } | Self::EngineChoked { .. })
    }
}
