//! Boards: a titled set of columns owned by one user.

use crate::actormodel::errors::CommandError;
use crate::actormodel::event::EventPayload;
use crate::actormodel::message::{CommandPayload, ModelCommand};
use crate::actormodel::registry::{EngineRegistries, FamilyRegistries};
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::ActorType;
use crate::actormodel::ModelAggregate;
use crate::serialization::Manifested;
use async_trait::async_trait;
use cqrs_es::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};

pub type BoardMessage = ModelCommand<BoardCommand>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub column_id: String,
    pub title: String,
    /// Case role that works the column, if any.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum BoardCommand {
    CreateBoard {
        title: String,
    },
    UpdateBoard {
        title: String,
    },
    AddColumn {
        column_id: String,
        title: String,
        #[serde(default)]
        role: Option<String>,
    },
    RemoveColumn {
        column_id: String,
    },
}

impl CommandPayload for BoardCommand {
    fn manifest(&self) -> &'static str {
        match self {
            Self::CreateBoard { .. } => "CreateBoard",
            Self::UpdateBoard { .. } => "UpdateBoard",
            Self::AddColumn { .. } => "AddColumn",
            Self::RemoveColumn { .. } => "RemoveColumn",
        }
    }

    fn manifests() -> &'static [&'static str] {
        &["CreateBoard", "UpdateBoard", "AddColumn", "RemoveColumn"]
    }

    fn is_bootstrap(&self) -> bool {
        matches!(self, Self::CreateBoard { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum BoardEvent {
    BoardCreated { title: String, owner: String },
    BoardUpdated { title: String },
    ColumnAdded { column: Column },
    ColumnRemoved { column_id: String },
}

impl Manifested for BoardEvent {
    fn manifest(&self) -> &'static str {
        match self {
            Self::BoardCreated { .. } => "BoardCreated",
            Self::BoardUpdated { .. } => "BoardUpdated",
            Self::ColumnAdded { .. } => "ColumnAdded",
            Self::ColumnRemoved { .. } => "ColumnRemoved",
        }
    }
}

impl DomainEvent for BoardEvent {
    fn event_type(&self) -> String {
        self.manifest().to_string()
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}

impl EventPayload for BoardEvent {
    fn manifests() -> &'static [&'static str] {
        &["BoardCreated", "BoardUpdated", "ColumnAdded", "ColumnRemoved"]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Board {
    title: String,
    owner: Option<String>,
    columns: Vec<Column>,
}

impl Board {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.column_id == column_id)
    }
}

#[async_trait]
impl Aggregate for Board {
    type Command = BoardMessage;
    type Event = BoardEvent;
    type Error = CommandError;
    type Services = EngineServices;

    fn aggregate_type() -> String {
        ActorType::Board.as_str().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let ModelCommand { metadata, command } = command;
        if let BoardCommand::CreateBoard { title } = command {
            if title.trim().is_empty() {
                return Err(CommandError::invalid("A board needs a title"));
            }
            return Ok(vec![BoardEvent::BoardCreated {
                title,
                owner: metadata.user.user_id,
            }]);
        }
        if self.owner.as_deref() != Some(metadata.user.user_id.as_str()) {
            return Err(CommandError::unauthorized("Only the board owner can change the board"));
        }
        match command {
            BoardCommand::CreateBoard { .. } => Ok(Vec::new()),
            BoardCommand::UpdateBoard { title } if title == self.title => Ok(Vec::new()),
            BoardCommand::UpdateBoard { title } => Ok(vec![BoardEvent::BoardUpdated { title }]),
            BoardCommand::AddColumn { column_id, title, role } => {
                if self.column(&column_id).is_some() {
                    return Err(CommandError::invalid(format!("Column '{}' already exists", column_id)));
                }
                Ok(vec![BoardEvent::ColumnAdded {
                    column: Column { column_id, title, role },
                }])
            }
            BoardCommand::RemoveColumn { column_id } => {
                if self.column(&column_id).is_none() {
                    return Err(CommandError::invalid(format!("Board has no column '{}'", column_id)));
                }
                Ok(vec![BoardEvent::ColumnRemoved { column_id }])
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            BoardEvent::BoardCreated { title, owner } => {
                self.title = title;
                self.owner = Some(owner);
            }
            BoardEvent::BoardUpdated { title } => self.title = title,
            BoardEvent::ColumnAdded { column } => self.columns.push(column),
            BoardEvent::ColumnRemoved { column_id } => self.columns.retain(|c| c.column_id != column_id),
        }
    }
}

impl ModelAggregate for Board {
    const ACTOR_TYPE: ActorType = ActorType::Board;

    fn exists(&self) -> bool {
        self.owner.is_some()
    }

    fn registries(all: &EngineRegistries) -> &FamilyRegistries<Self> {
        &all.board
    }
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
