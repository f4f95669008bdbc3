//! Process task actors: run a registered process for a case task and
//! report the outcome to the parent case.

pub mod implementation;

use crate::actormodel::errors::CommandError;
use crate::actormodel::event::EventPayload;
use crate::actormodel::message::{CommandMetadata, CommandPayload, ModelCommand, OutgoingRequest};
use crate::actormodel::registry::{EngineRegistries, FamilyRegistries};
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::ActorType;
use crate::actormodel::ModelAggregate;
use crate::cmmn::commands::{CaseCommand, ParentLink};
use crate::serialization::Manifested;
use crate::value::{Value, ValueMap};
use async_trait::async_trait;
use cqrs_es::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};

pub type ProcessMessage = ModelCommand<ProcessCommand>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum ProcessCommand {
    StartProcess {
        process: String,
        #[serde(default)]
        input: Value,
        parent: ParentLink,
    },
    TerminateProcess,
}

impl CommandPayload for ProcessCommand {
    fn manifest(&self) -> &'static str {
        match self {
            Self::StartProcess { .. } => "StartProcess",
            Self::TerminateProcess => "TerminateProcess",
        }
    }

    fn manifests() -> &'static [&'static str] {
        &["StartProcess", "TerminateProcess"]
    }

    fn is_bootstrap(&self) -> bool {
        matches!(self, Self::StartProcess { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum ProcessEvent {
    ProcessStarted {
        process: String,
        input: Value,
        parent: ParentLink,
    },
    ProcessCompleted {
        output: Value,
    },
    ProcessFailed {
        error: String,
    },
    ProcessTerminated,
}

impl Manifested for ProcessEvent {
    fn manifest(&self) -> &'static str {
        match self {
            Self::ProcessStarted { .. } => "ProcessStarted",
            Self::ProcessCompleted { .. } => "ProcessCompleted",
            Self::ProcessFailed { .. } => "ProcessFailed",
            Self::ProcessTerminated => "ProcessTerminated",
        }
    }
}

impl DomainEvent for ProcessEvent {
    fn event_type(&self) -> String {
        self.manifest().to_string()
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}

impl EventPayload for ProcessEvent {
    fn manifests() -> &'static [&'static str] {
        &["ProcessStarted", "ProcessCompleted", "ProcessFailed", "ProcessTerminated"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessStatus {
    #[default]
    Null,
    Running,
    Completed,
    Failed,
    Terminated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessTask {
    process: String,
    parent: Option<ParentLink>,
    status: ProcessStatus,
    output: Value,
}

impl ProcessTask {
    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn output(&self) -> &Value {
        &self.output
    }
}

#[async_trait]
impl Aggregate for ProcessTask {
    type Command = ProcessMessage;
    type Event = ProcessEvent;
    type Error = CommandError;
    type Services = EngineServices;

    fn aggregate_type() -> String {
        ActorType::ProcessTask.as_str().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command.command {
            ProcessCommand::StartProcess { process, input, parent } => {
                let outcome = match services.processes.get(&process) {
                    Some(implementation) => implementation.run(&input),
                    None => Err(format!("No process implementation named '{}'", process)),
                };
                let finished = match outcome {
                    Ok(output) => ProcessEvent::ProcessCompleted { output },
                    Err(error) => {
                        tracing::debug!(process = %process, "Process failed: {}", error);
                        ProcessEvent::ProcessFailed { error }
                    }
                };
                Ok(vec![
                    ProcessEvent::ProcessStarted { process, input, parent },
                    finished,
                ])
            }
            ProcessCommand::TerminateProcess => Ok(match self.status {
                ProcessStatus::Running => vec![ProcessEvent::ProcessTerminated],
                _ => Vec::new(),
            }),
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ProcessEvent::ProcessStarted { process, parent, .. } => {
                self.process = process;
                self.parent = Some(parent);
                self.status = ProcessStatus::Running;
            }
            ProcessEvent::ProcessCompleted { output } => {
                self.output = output;
                self.status = ProcessStatus::Completed;
            }
            ProcessEvent::ProcessFailed { .. } => self.status = ProcessStatus::Failed,
            ProcessEvent::ProcessTerminated => self.status = ProcessStatus::Terminated,
        }
    }
}

impl ModelAggregate for ProcessTask {
    const ACTOR_TYPE: ActorType = ActorType::ProcessTask;

    fn exists(&self) -> bool {
        self.status != ProcessStatus::Null
    }

    fn outgoing_requests(
        &self,
        metadata: &CommandMetadata,
        events: &[ProcessEvent],
        _services: &EngineServices,
    ) -> Vec<OutgoingRequest> {
        let Some(parent) = &self.parent else {
            return Vec::new();
        };
        let task_id = parent.task_id.clone();
        let command = events.iter().find_map(|event| match event {
            ProcessEvent::ProcessCompleted { output } => Some(CaseCommand::CompleteTask {
                task_id: task_id.clone(),
                output: output.clone(),
            }),
            ProcessEvent::ProcessFailed { error } => Some(CaseCommand::FailTask {
                task_id: task_id.clone(),
                output: Value::Map(ValueMap::new().with("error", error.as_str())),
            }),
            _ => None,
        });
        let Some(command) = command else {
            return Vec::new();
        };
        let command = ModelCommand::new(metadata.forward_to(&parent.case_id), command);
        match OutgoingRequest::new(ActorType::Case, &command) {
            Ok(request) => vec![request],
            Err(e) => {
                tracing::error!(process = %metadata.actor_id, "Callback could not be encoded: {}", e);
                Vec::new()
            }
        }
    }

    fn registries(all: &EngineRegistries) -> &FamilyRegistries<Self> {
        &all.process_task
    }
}

#[cfg(test)]
#[path = "tests/processtask_tests.rs"]
mod tests;
