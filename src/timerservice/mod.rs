//! The timer service: a single durable actor holding every pending case
//! timer. A polling tick fires due timers as `Occur` transitions on the
//! owning case.

use crate::actormodel::errors::CommandError;
use crate::actormodel::event::EventPayload;
use crate::actormodel::message::{CommandMetadata, CommandPayload, ModelCommand, OutgoingRequest};
use crate::actormodel::registry::{EngineRegistries, FamilyRegistries};
use crate::actormodel::response::ModelResponse;
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::{ActorId, ActorType, MessageId, TenantId, TimestampUtc, UserIdentity};
use crate::actormodel::ModelAggregate;
use crate::cmmn::commands::CaseCommand;
use crate::cmmn::state_machine::Transition;
use crate::config::EngineConfig;
use crate::serialization::Manifested;
use async_trait::async_trait;
use cqrs_es::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub type TimerMessage = ModelCommand<TimerCommand>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum TimerCommand {
    /// Registers a timer; the timer id is the timer event's plan item id.
    SetTimer {
        timer_id: String,
        case_id: ActorId,
        due_at: TimestampUtc,
    },
    CancelTimer {
        timer_id: String,
    },
    /// Sent by the service to itself on its polling tick.
    FireDueTimers,
}

impl CommandPayload for TimerCommand {
    fn manifest(&self) -> &'static str {
        match self {
            Self::SetTimer { .. } => "SetTimer",
            Self::CancelTimer { .. } => "CancelTimer",
            Self::FireDueTimers => "FireDueTimers",
        }
    }

    fn manifests() -> &'static [&'static str] {
        &["SetTimer", "CancelTimer", "FireDueTimers"]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub timer_id: String,
    pub case_id: ActorId,
    pub due_at: TimestampUtc,
    /// Identity the `Occur` transition is sent with.
    pub user: UserIdentity,
    pub tenant: Option<TenantId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum TimerEvent {
    TimerSet { timer: Timer },
    TimerCanceled { timer_id: String },
    TimerFired { timer: Timer },
}

impl Manifested for TimerEvent {
    fn manifest(&self) -> &'static str {
        match self {
            Self::TimerSet { .. } => "TimerSet",
            Self::TimerCanceled { .. } => "TimerCanceled",
            Self::TimerFired { .. } => "TimerFired",
        }
    }
}

impl DomainEvent for TimerEvent {
    fn event_type(&self) -> String {
        self.manifest().to_string()
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}

impl EventPayload for TimerEvent {
    fn manifests() -> &'static [&'static str] {
        &["TimerSet", "TimerCanceled", "TimerFired"]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimerService {
    timers: BTreeMap<String, Timer>,
}

impl TimerService {
    pub fn timers(&self) -> impl Iterator<Item = &Timer> {
        self.timers.values()
    }

    pub fn get(&self, timer_id: &str) -> Option<&Timer> {
        self.timers.get(timer_id)
    }

    fn due(&self, now: TimestampUtc) -> impl Iterator<Item = &Timer> {
        self.timers.values().filter(move |timer| timer.due_at <= now)
    }
}

#[async_trait]
impl Aggregate for TimerService {
    type Command = TimerMessage;
    type Event = TimerEvent;
    type Error = CommandError;
    type Services = EngineServices;

    fn aggregate_type() -> String {
        ActorType::TimerService.as_str().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let ModelCommand { metadata, command } = command;
        match command {
            TimerCommand::SetTimer {
                timer_id,
                case_id,
                due_at,
            } => {
                let timer = Timer {
                    timer_id,
                    case_id,
                    due_at,
                    user: metadata.user,
                    tenant: metadata.tenant,
                };
                if self.timers.get(&timer.timer_id) == Some(&timer) {
                    return Ok(Vec::new());
                }
                Ok(vec![TimerEvent::TimerSet { timer }])
            }
            TimerCommand::CancelTimer { timer_id } => {
                if self.timers.contains_key(&timer_id) {
                    Ok(vec![TimerEvent::TimerCanceled { timer_id }])
                } else {
                    Ok(Vec::new())
                }
            }
            TimerCommand::FireDueTimers => Ok(self
                .due(services.clock.now())
                .map(|timer| TimerEvent::TimerFired { timer: timer.clone() })
                .collect()),
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            TimerEvent::TimerSet { timer } => {
                self.timers.insert(timer.timer_id.clone(), timer);
            }
            TimerEvent::TimerCanceled { timer_id } => {
                self.timers.remove(&timer_id);
            }
            TimerEvent::TimerFired { timer } => {
                self.timers.remove(&timer.timer_id);
            }
        }
    }
}

impl ModelAggregate for TimerService {
    const ACTOR_TYPE: ActorType = ActorType::TimerService;

    /// The service creates itself; any of its commands may come first.
    fn exists(&self) -> bool {
        true
    }

    fn outgoing_requests(
        &self,
        _metadata: &CommandMetadata,
        events: &[TimerEvent],
        services: &EngineServices,
    ) -> Vec<OutgoingRequest> {
        events
            .iter()
            .filter_map(|event| match event {
                TimerEvent::TimerFired { timer } => Some(timer),
                _ => None,
            })
            .filter_map(|timer| {
                let metadata = CommandMetadata {
                    message_id: MessageId::random(),
                    actor_id: timer.case_id.clone(),
                    tenant: timer.tenant.clone(),
                    user: timer.user.clone(),
                    timestamp: services.clock.now(),
                };
                let command = ModelCommand::new(
                    metadata,
                    CaseCommand::MakePlanItemTransition {
                        identifier: timer.timer_id.clone(),
                        transition: Transition::Occur,
                    },
                );
                OutgoingRequest::new(ActorType::Case, &command)
                    .inspect_err(|e| tracing::error!(timer = %timer.timer_id, "Timer request could not be encoded: {}", e))
                    .ok()
            })
            .collect()
    }

    fn handle_failure(
        &self,
        response: &ModelResponse,
        error: &CommandError,
        _metadata: &CommandMetadata,
        _services: &EngineServices,
    ) -> Result<Vec<TimerEvent>, CommandError> {
        tracing::warn!(case = %response.actor_id, "Fired timer was rejected: {}", error);
        Ok(Vec::new())
    }

    fn tick_commands(&self, metadata: &CommandMetadata, services: &EngineServices) -> Vec<TimerMessage> {
        if self.due(services.clock.now()).next().is_none() {
            return Vec::new();
        }
        vec![ModelCommand::new(metadata.clone(), TimerCommand::FireDueTimers)]
    }

    fn tick_interval(config: &EngineConfig) -> Duration {
        config.timer_poll_interval()
    }

    fn passivates(&self) -> bool {
        false
    }

    fn registries(all: &EngineRegistries) -> &FamilyRegistries<Self> {
        &all.timer_service
    }
}

#[cfg(test)]
#[path = "tests/timerservice_tests.rs"]
mod tests;
