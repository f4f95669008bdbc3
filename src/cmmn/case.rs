//! The `Case` aggregate.

use crate::actormodel::errors::CommandError;
use crate::actormodel::message::{CommandMetadata, ModelCommand, OutgoingRequest};
use crate::actormodel::registry::{EngineRegistries, FamilyRegistries};
use crate::actormodel::response::ModelResponse;
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::{ActorId, ActorType, TimestampUtc, UserIdentity};
use crate::actormodel::ModelAggregate;
use crate::cmmn::casefile::{CaseFile, CaseFilePath};
use crate::cmmn::commands::{CaseCommand, CaseMessage, ParentLink};
use crate::cmmn::definition::{CaseDefinition, PlanItemKind};
use crate::cmmn::engine::CaseTransaction;
use crate::cmmn::events::CaseEvent;
use crate::cmmn::expression::{parse_duration, EvaluationContext, ExpressionEvaluator};
use crate::cmmn::plan::{Plan, PlanItem};
use crate::cmmn::sentry::{Criterion, CriterionKind, SentryNetwork};
use crate::cmmn::state_machine::{PlanItemType, State, Transition};
use crate::cmmn::team::CaseTeam;
use crate::processtask::ProcessCommand;
use crate::serialization::Manifested;
use crate::timerservice::TimerCommand;
use crate::value::{Value, ValueMap};
use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Case {
    definition: Option<Arc<CaseDefinition>>,
    parent: Option<ParentLink>,
    plan: Plan,
    case_file: CaseFile,
    team: CaseTeam,
    sentries: SentryNetwork,
    last_modified: Option<TimestampUtc>,
}

/// A discretionary item that can be planned right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscretionaryItem {
    pub name: String,
    pub definition_id: String,
    pub item_type: PlanItemType,
    pub parent_id: String,
    pub parent_name: String,
}

impl Case {
    pub fn definition(&self) -> Option<&Arc<CaseDefinition>> {
        self.definition.as_ref()
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn case_file(&self) -> &CaseFile {
        &self.case_file
    }

    pub fn team(&self) -> &CaseTeam {
        &self.team
    }

    pub fn sentries(&self) -> &SentryNetwork {
        &self.sentries
    }

    pub(crate) fn sentries_mut(&mut self) -> &mut SentryNetwork {
        &mut self.sentries
    }

    pub fn last_modified(&self) -> Option<TimestampUtc> {
        self.last_modified
    }

    /// Discretionary items applicable in active stages. Authorization is
    /// only checked when a user is given.
    pub fn discretionary_items(
        &self,
        user: Option<&UserIdentity>,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Vec<DiscretionaryItem> {
        let Some(definition) = &self.definition else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for stage in self.plan.items() {
            if !stage.item_type.is_stage() || stage.state != State::Active {
                continue;
            }
            let Some(stage_definition) = definition.item(&stage.definition_id) else {
                continue;
            };
            for child in stage_definition.children().iter().filter(|c| c.discretionary) {
                let context = EvaluationContext::new(self.case_file.root()).for_item(&child.name);
                let applicable = match &child.applicability {
                    None => true,
                    Some(expression) => evaluator
                        .evaluate_condition(expression, &context)
                        .unwrap_or_else(|e| {
                            tracing::warn!("Applicability rule of '{}' failed: {}", child.name, e);
                            false
                        }),
                };
                let authorized = user.is_none_or(|u| self.team.has_any_role(u, &child.authorized_roles));
                if applicable && authorized {
                    found.push(DiscretionaryItem {
                        name: child.name.clone(),
                        definition_id: child.id.clone(),
                        item_type: child.item_type(),
                        parent_id: stage.id.clone(),
                        parent_name: stage.name.clone(),
                    });
                }
            }
        }
        found
    }

    fn plan_summary(&self) -> Value {
        Value::List(
            self.plan
                .items()
                .into_iter()
                .map(|item| {
                    Value::Map(
                        ValueMap::new()
                            .with("id", item.id.as_str())
                            .with("name", item.name.as_str())
                            .with("type", format!("{:?}", item.item_type))
                            .with("state", format!("{:?}", item.state)),
                    )
                })
                .collect(),
        )
    }

    fn apply_created(&mut self, item: PlanItem) {
        let Some(definition) = self.definition.clone() else {
            return;
        };
        let Some(item_definition) = definition.item(&item.definition_id) else {
            return;
        };
        let id = item.id.clone();
        self.plan.insert(item);
        let criteria = item_definition
            .entry_criteria
            .iter()
            .map(|c| Criterion::new(&id, CriterionKind::Entry, c))
            .chain(
                item_definition
                    .exit_criteria
                    .iter()
                    .map(|c| Criterion::new(&id, CriterionKind::Exit, c)),
            );
        for criterion in criteria {
            let criterion_id = criterion.id.clone();
            self.sentries.add(criterion);
            if self.case_file.is_released() {
                self.sentries.catch_up(&criterion_id, &self.plan, &self.case_file);
            }
        }
    }

    fn timer_requests(
        &self,
        item: &PlanItem,
        transition: Transition,
        from: State,
        to: State,
        metadata: &CommandMetadata,
        services: &EngineServices,
    ) -> Option<ModelCommand<TimerCommand>> {
        let timer_service = ActorId::from(services.config.timer_service.actor_id.as_str());
        let request_metadata = metadata.forward_to(&timer_service);
        if transition == Transition::Create && to == State::Available {
            let definition = self.definition.as_ref()?.item(&item.definition_id)?;
            let PlanItemKind::TimerEvent { duration } = &definition.kind else {
                return None;
            };
            let delay = parse_duration(duration).ok()?;
            return Some(ModelCommand::new(
                request_metadata,
                TimerCommand::SetTimer {
                    timer_id: item.id.clone(),
                    case_id: metadata.actor_id.clone(),
                    due_at: metadata.timestamp.plus(delay),
                },
            ));
        }
        if from == State::Available && transition != Transition::Occur && to != State::Available {
            return Some(ModelCommand::new(
                request_metadata,
                TimerCommand::CancelTimer {
                    timer_id: item.id.clone(),
                },
            ));
        }
        None
    }
}

fn started(transition: Transition) -> bool {
    matches!(transition, Transition::Start | Transition::ManualStart)
}

#[async_trait]
impl Aggregate for Case {
    type Command = CaseMessage;
    type Event = CaseEvent;
    type Error = CommandError;
    type Services = EngineServices;

    fn aggregate_type() -> String {
        ActorType::Case.as_str().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let ModelCommand { metadata, command } = command;
        CaseTransaction::new(self, &metadata, services).run(command)
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CaseEvent::CaseDefinitionApplied { definition, parent } => {
                self.definition = Some(Arc::new(*definition));
                self.parent = parent;
            }
            CaseEvent::PlanItemCreated {
                plan_item_id,
                name,
                definition_id,
                item_type,
                index,
                stage_id,
            } => self.apply_created(PlanItem {
                id: plan_item_id,
                name,
                definition_id,
                item_type,
                index,
                stage_id,
                state: State::Null,
                history_state: State::Null,
                last_transition: None,
                required: false,
                repeats: false,
                created_order: 0,
                assignee: None,
            }),
            CaseEvent::PlanItemTransitioned {
                plan_item_id,
                to,
                history_state,
                transition,
                ..
            } => {
                if let Some(item) = self.plan.get_mut(&plan_item_id) {
                    item.state = to;
                    item.history_state = history_state;
                    item.last_transition = Some(transition);
                    self.sentries.on_plan_item(&self.plan, &plan_item_id, transition);
                }
            }
            CaseEvent::RequiredRuleEvaluated {
                plan_item_id,
                required,
            } => {
                if let Some(item) = self.plan.get_mut(&plan_item_id) {
                    item.required = required;
                }
            }
            CaseEvent::RepetitionRuleEvaluated {
                plan_item_id,
                repeats,
            } => {
                if let Some(item) = self.plan.get_mut(&plan_item_id) {
                    item.repeats = repeats;
                }
            }
            CaseEvent::TaskOutputFilled { .. } => {}
            CaseEvent::HumanTaskAssigned { plan_item_id, assignee }
            | CaseEvent::HumanTaskClaimed { plan_item_id, assignee } => {
                if let Some(item) = self.plan.get_mut(&plan_item_id) {
                    item.assignee = Some(assignee);
                }
            }
            CaseEvent::HumanTaskRevoked { plan_item_id } => {
                if let Some(item) = self.plan.get_mut(&plan_item_id) {
                    item.assignee = None;
                }
            }
            CaseEvent::CaseFileItemTransitioned {
                path,
                transition,
                value,
            } => match CaseFilePath::parse(&path) {
                Ok(parsed) => {
                    if let Some((path, transition)) = self.case_file.apply(&parsed, transition, value) {
                        self.sentries.on_case_file(&path, transition);
                    }
                }
                Err(e) => tracing::warn!("Skipping case file event with bad path: {}", e),
            },
            CaseEvent::CaseFileBootstrapReleased => {
                for (path, transition) in self.case_file.release() {
                    self.sentries.on_case_file(&path, transition);
                }
            }
            CaseEvent::TeamMemberAdded { member } | CaseEvent::TeamMemberChanged { member } => {
                self.team.put(member);
            }
            CaseEvent::TeamMemberRemoved { key } => self.team.remove(&key),
            CaseEvent::CaseModified { last_modified, .. } => {
                self.last_modified = Some(last_modified);
                // Closes a batch; its activations were handled by the transaction.
                self.sentries.take_activations();
            }
        }
    }
}

impl ModelAggregate for Case {
    const ACTOR_TYPE: ActorType = ActorType::Case;

    fn exists(&self) -> bool {
        self.definition.is_some()
    }

    fn respond(&self, command: &CaseMessage, events: &[CaseEvent], services: &EngineServices) -> Option<Value> {
        match &command.command {
            CaseCommand::GetDiscretionaryItems => {
                let items = self.discretionary_items(Some(&command.metadata.user), services.evaluator.as_ref());
                Value::from_serde(&items).ok()
            }
            CaseCommand::StartCase { .. } => Some(Value::Map(
                ValueMap::new()
                    .with("case_id", command.metadata.actor_id.as_str())
                    .with("plan", self.plan_summary()),
            )),
            CaseCommand::AddDiscretionaryItem { .. } => events.iter().find_map(|event| match event {
                CaseEvent::PlanItemCreated { plan_item_id, .. } => Some(Value::Map(
                    ValueMap::new().with("plan_item_id", plan_item_id.as_str()),
                )),
                _ => None,
            }),
            _ => None,
        }
    }

    fn commit_event(&self, metadata: &CommandMetadata) -> Option<CaseEvent> {
        Some(CaseEvent::CaseModified {
            last_modified: metadata.timestamp,
            active_items: self.plan.active_count(),
        })
    }

    fn outgoing_requests(
        &self,
        metadata: &CommandMetadata,
        events: &[CaseEvent],
        services: &EngineServices,
    ) -> Vec<OutgoingRequest> {
        let mut requests = Vec::new();
        let mut push = |request: Result<OutgoingRequest, crate::serialization::SerializationError>| match request {
            Ok(request) => requests.push(request),
            Err(e) => tracing::error!(case = %metadata.actor_id, "Request could not be encoded: {}", e),
        };
        let Some(definition) = &self.definition else {
            return Vec::new();
        };
        for event in events {
            let CaseEvent::PlanItemTransitioned {
                plan_item_id,
                from,
                to,
                transition,
                ..
            } = event
            else {
                continue;
            };
            let Some(item) = self.plan.get(plan_item_id) else {
                continue;
            };
            match item.item_type {
                PlanItemType::TimerEvent => {
                    if let Some(command) = self.timer_requests(item, *transition, *from, *to, metadata, services) {
                        push(OutgoingRequest::new(ActorType::TimerService, &command));
                    }
                }
                PlanItemType::CaseTask if started(*transition) => {
                    let Some(PlanItemKind::CaseTask { case }) = definition.item(&item.definition_id).map(|d| &d.kind)
                    else {
                        continue;
                    };
                    let sub_case = ActorId::from(item.id.as_str());
                    let command = ModelCommand::new(
                        metadata.forward_to(&sub_case),
                        CaseCommand::StartCase {
                            definition: case.clone(),
                            input: self.case_file.root().clone(),
                            team: self.team.members().cloned().collect(),
                            parent: Some(ParentLink {
                                case_id: metadata.actor_id.clone(),
                                task_id: item.id.clone(),
                            }),
                        },
                    );
                    push(OutgoingRequest::new(ActorType::Case, &command));
                }
                PlanItemType::ProcessTask if started(*transition) => {
                    let Some(PlanItemKind::ProcessTask { process }) =
                        definition.item(&item.definition_id).map(|d| &d.kind)
                    else {
                        continue;
                    };
                    let process_id = ActorId::from(item.id.as_str());
                    let command = ModelCommand::new(
                        metadata.forward_to(&process_id),
                        ProcessCommand::StartProcess {
                            process: process.clone(),
                            input: self.case_file.root().clone(),
                            parent: ParentLink {
                                case_id: metadata.actor_id.clone(),
                                task_id: item.id.clone(),
                            },
                        },
                    );
                    push(OutgoingRequest::new(ActorType::ProcessTask, &command));
                }
                PlanItemType::CasePlan => {
                    let Some(parent) = &self.parent else {
                        continue;
                    };
                    let output = self.case_file.root().clone();
                    let task_id = parent.task_id.clone();
                    let command = match to {
                        State::Completed => CaseCommand::CompleteTask { task_id, output },
                        State::Terminated | State::Failed => CaseCommand::FailTask { task_id, output },
                        _ => continue,
                    };
                    let command = ModelCommand::new(metadata.forward_to(&parent.case_id), command);
                    push(OutgoingRequest::new(ActorType::Case, &command));
                }
                _ => {}
            }
        }
        requests
    }

    fn handle_failure(
        &self,
        response: &ModelResponse,
        error: &CommandError,
        metadata: &CommandMetadata,
        services: &EngineServices,
    ) -> Result<Vec<CaseEvent>, CommandError> {
        let task = self.plan.get(response.actor_id.as_str()).filter(|item| {
            matches!(item.item_type, PlanItemType::CaseTask | PlanItemType::ProcessTask)
                && item.state == State::Active
        });
        match task {
            Some(task) => {
                tracing::debug!(
                    case = %metadata.actor_id,
                    task = %task.id,
                    response = response.manifest(),
                    "Faulting task after failed request: {}",
                    error
                );
                CaseTransaction::new(self, metadata, services).fault_task(&task.id)
            }
            None => {
                tracing::warn!(
                    case = %metadata.actor_id,
                    from = %response.actor_id,
                    "Request failed: {}",
                    error
                );
                Ok(Vec::new())
            }
        }
    }

    fn recovery_completed(&mut self) {
        self.sentries.take_activations();
    }

    fn registries(all: &EngineRegistries) -> &FamilyRegistries<Self> {
        &all.case
    }
}
