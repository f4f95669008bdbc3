//! Works out one case command against a staged copy of the case.
//!
//! Every emitted event is applied to the staged copy immediately, so later
//! decisions see its effect. Follow-up work (a plan item entering a state,
//! a criterion becoming satisfied) is queued FIFO and drained until quiet.
//! The kernel discards the staged copy and applies the returned events to
//! the real state once they are persisted.

use crate::actormodel::errors::CommandError;
use crate::actormodel::message::CommandMetadata;
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::UserIdentity;
use crate::cmmn::case::Case;
use crate::cmmn::casefile::{CaseFilePath, CaseFilePlanner};
use crate::cmmn::commands::{CaseCommand, ParentLink};
use crate::cmmn::definition::{CaseDefinition, PlanItemDefinition, PlanItemKind, RuleDefinition};
use crate::cmmn::events::CaseEvent;
use crate::cmmn::expression::EvaluationContext;
use crate::cmmn::plan::PlanItem;
use crate::cmmn::sentry::{Criterion, CriterionKind};
use crate::cmmn::state_machine::{PlanItemType, State, Transition};
use crate::cmmn::team::{CaseTeam, Member, MemberKey};
use crate::value::Value;
use cqrs_es::Aggregate;
use std::collections::VecDeque;
use std::sync::Arc;

mod tasks;
mod team;

#[derive(Debug)]
enum Work {
    /// A plan item went through a transition.
    Entered {
        item_id: String,
        transition: Transition,
        from: State,
        to: State,
    },
    /// A criterion's on-parts all became active.
    Criterion(String),
    /// A repeat instance created by an entry criterion must be entered.
    Enter(String),
}

pub(crate) struct CaseTransaction<'a> {
    case: Case,
    events: Vec<CaseEvent>,
    work: VecDeque<Work>,
    steps: usize,
    metadata: &'a CommandMetadata,
    services: &'a EngineServices,
}

impl<'a> CaseTransaction<'a> {
    pub(crate) fn new(case: &Case, metadata: &'a CommandMetadata, services: &'a EngineServices) -> Self {
        let mut case = case.clone();
        // Activations from the last applied batch were already handled.
        case.sentries_mut().take_activations();
        Self {
            case,
            events: Vec::new(),
            work: VecDeque::new(),
            steps: 0,
            metadata,
            services,
        }
    }

    pub(crate) fn run(mut self, command: CaseCommand) -> Result<Vec<CaseEvent>, CommandError> {
        if !matches!(command, CaseCommand::StartCase { .. }) {
            self.definition()?;
            self.authorize(&command)?;
        }
        match command {
            CaseCommand::StartCase {
                definition,
                input,
                team,
                parent,
            } => return self.start_case(&definition, &input, team, parent),
            CaseCommand::MakePlanItemTransition {
                identifier,
                transition,
            } => self.make_plan_item_transition(&identifier, transition)?,
            CaseCommand::CompleteHumanTask { task_id, output } => self.complete_human_task(&task_id, output)?,
            CaseCommand::CompleteTask { task_id, output } => {
                self.finish_task(&task_id, output, Transition::Complete)?
            }
            CaseCommand::FailTask { task_id, output } => self.finish_task(&task_id, output, Transition::Fault)?,
            CaseCommand::AssignTask { task_id, assignee } => self.assign_task(&task_id, assignee)?,
            CaseCommand::ClaimTask { task_id } => self.claim_task(&task_id)?,
            CaseCommand::RevokeTask { task_id } => self.revoke_task(&task_id)?,
            CaseCommand::GetDiscretionaryItems => {}
            CaseCommand::AddDiscretionaryItem {
                name,
                parent_id,
                plan_item_id,
            } => self.add_discretionary_item(&name, &parent_id, plan_item_id)?,
            CaseCommand::CreateCaseFileItem { path, value } => {
                self.change_case_file(&path, |planner, path| planner.create(path, &value))?
            }
            CaseCommand::UpdateCaseFileItem { path, value } => {
                self.change_case_file(&path, |planner, path| planner.update(path, &value))?
            }
            CaseCommand::ReplaceCaseFileItem { path, value } => {
                self.change_case_file(&path, |planner, path| planner.replace(path, &value))?
            }
            CaseCommand::DeleteCaseFileItem { path } => {
                self.change_case_file(&path, |planner, path| planner.delete(path))?
            }
            CaseCommand::SetCaseTeamUser { user_id, roles, owner } => {
                self.set_member(MemberKey::User(user_id), roles, owner)?
            }
            CaseCommand::SetCaseTeamGroup { group_id, roles, owner } => {
                self.set_member(MemberKey::Group(group_id), roles, owner)?
            }
            CaseCommand::SetCaseTeamTenantRole {
                tenant_role,
                roles,
                owner,
            } => self.set_member(MemberKey::TenantRole(tenant_role), roles, owner)?,
            CaseCommand::RemoveCaseTeamUser { user_id } => self.remove_member(MemberKey::User(user_id))?,
            CaseCommand::RemoveCaseTeamGroup { group_id } => self.remove_member(MemberKey::Group(group_id))?,
            CaseCommand::RemoveCaseTeamTenantRole { tenant_role } => {
                self.remove_member(MemberKey::TenantRole(tenant_role))?
            }
            CaseCommand::SetCaseTeam { members } => self.set_team(members)?,
        }
        self.finish()
    }

    /// Faults an active case or process task after its request failed.
    pub(crate) fn fault_task(mut self, task_id: &str) -> Result<Vec<CaseEvent>, CommandError> {
        self.transition(task_id, Transition::Fault)?;
        self.finish()
    }

    fn finish(mut self) -> Result<Vec<CaseEvent>, CommandError> {
        self.drain()?;
        Ok(self.events)
    }

    fn user(&self) -> &'a UserIdentity {
        &self.metadata.user
    }

    fn definition(&self) -> Result<Arc<CaseDefinition>, CommandError> {
        self.case
            .definition()
            .cloned()
            .ok_or_else(|| CommandError::invalid(format!("Case {} has not been started", self.metadata.actor_id)))
    }

    fn item(&self, id: &str) -> Result<PlanItem, CommandError> {
        self.case.plan().get(id).cloned().ok_or_else(|| {
            CommandError::invalid(format!(
                "There is no plan item with identifier '{}' in case {}",
                id, self.metadata.actor_id
            ))
        })
    }

    fn authorize(&self, command: &CaseCommand) -> Result<(), CommandError> {
        let user = self.user();
        if command.is_team_command() {
            if !self.case.team().is_owner(user) {
                return Err(CommandError::unauthorized("Only case team owners can change the case team"));
            }
        } else if command.requires_membership() && !self.case.team().is_member(user) {
            return Err(CommandError::unauthorized(format!(
                "User {} is not part of the case team",
                user.user_id
            )));
        }
        Ok(())
    }

    fn emit(&mut self, event: CaseEvent) {
        if let CaseEvent::PlanItemTransitioned {
            plan_item_id,
            from,
            to,
            transition,
            ..
        } = &event
        {
            self.work.push_back(Work::Entered {
                item_id: plan_item_id.clone(),
                transition: *transition,
                from: *from,
                to: *to,
            });
        }
        self.case.apply(event.clone());
        self.events.push(event);
        let mut activations = self.case.sentries_mut().take_activations();
        let sentries = self.case.sentries();
        activations.sort_by_key(|id| sentries.get(id).map(|c| c.kind == CriterionKind::Exit));
        self.work.extend(activations.into_iter().map(Work::Criterion));
    }

    fn drain(&mut self) -> Result<(), CommandError> {
        let limit = self.services.config.case.max_transition_iterations;
        while let Some(work) = self.work.pop_front() {
            self.steps += 1;
            if self.steps > limit {
                return Err(CommandError::choked(format!(
                    "Case {} did not settle within {} steps",
                    self.metadata.actor_id, limit
                )));
            }
            match work {
                Work::Entered {
                    item_id,
                    transition,
                    from,
                    to,
                } => self.entered(&item_id, transition, from, to)?,
                Work::Criterion(id) => self.fire(&id)?,
                Work::Enter(item_id) => {
                    let item = self.item(&item_id)?;
                    if item.state == State::Available {
                        self.enter(&item)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Emits the transition when the state machine allows it.
    fn transition(&mut self, id: &str, transition: Transition) -> Result<bool, CommandError> {
        let item = self.item(id)?;
        let Some(to) = item.target(transition) else {
            return Ok(false);
        };
        let history_state = if to == State::Suspended {
            item.state
        } else {
            item.history_state
        };
        self.emit(CaseEvent::PlanItemTransitioned {
            plan_item_id: item.id,
            from: item.state,
            to,
            history_state,
            transition,
        });
        Ok(true)
    }

    fn create_item(
        &mut self,
        definition: &PlanItemDefinition,
        stage_id: Option<&str>,
        index: u32,
        id: String,
    ) -> Result<String, CommandError> {
        let item_type = match stage_id {
            None => PlanItemType::CasePlan,
            Some(_) => definition.item_type(),
        };
        self.emit(CaseEvent::PlanItemCreated {
            plan_item_id: id.clone(),
            name: definition.name.clone(),
            definition_id: definition.id.clone(),
            item_type,
            index,
            stage_id: stage_id.map(str::to_string),
        });
        self.transition(&id, Transition::Create)?;
        Ok(id)
    }

    fn rule_holds(&self, rule: Option<&RuleDefinition>, item_name: &str) -> Result<bool, CommandError> {
        let Some(rule) = rule else {
            return Ok(false);
        };
        match &rule.condition {
            None => Ok(true),
            Some(expression) => self.condition(expression, item_name),
        }
    }

    fn condition(&self, expression: &str, item_name: &str) -> Result<bool, CommandError> {
        let context = EvaluationContext::new(self.case.case_file().root())
            .for_item(item_name)
            .for_user(self.user());
        self.services
            .evaluator
            .evaluate_condition(expression, &context)
            .map_err(|e| CommandError::invalid(e.to_string()))
    }

    fn satisfied(&self, criterion: &Criterion) -> Result<bool, CommandError> {
        if !criterion.on_parts_satisfied() {
            return Ok(false);
        }
        match &criterion.if_part {
            None => Ok(true),
            Some(expression) => self.condition(expression, &criterion.target),
        }
    }

    fn entered(&mut self, id: &str, transition: Transition, from: State, to: State) -> Result<(), CommandError> {
        let definition = self.definition()?;
        let item = self.item(id)?;
        let Some(item_definition) = definition.item(&item.definition_id) else {
            return Ok(());
        };

        if transition == Transition::Create && to == State::Available {
            if item_definition.repetition.is_some() {
                let repeats = self.rule_holds(item_definition.repetition.as_ref(), &item.name)?;
                self.emit(CaseEvent::RepetitionRuleEvaluated {
                    plan_item_id: item.id.clone(),
                    repeats,
                });
            }
            if item_definition.required.is_some() {
                let required = self.rule_holds(item_definition.required.as_ref(), &item.name)?;
                self.emit(CaseEvent::RequiredRuleEvaluated {
                    plan_item_id: item.id.clone(),
                    required,
                });
            }
            let criteria = self.case.sentries().for_target(&item.id, CriterionKind::Entry);
            let mut ready = criteria.is_empty();
            for criterion in criteria {
                ready = ready || self.satisfied(criterion)?;
            }
            if ready {
                self.enter(&item)?;
            }
            return Ok(());
        }

        if item.item_type.is_stage() {
            match (transition, to) {
                (Transition::Create | Transition::Start | Transition::ManualStart, State::Active) => {
                    let mut created = false;
                    for child in item_definition.children().iter().filter(|c| !c.discretionary) {
                        let child_id = uuid::Uuid::new_v4().to_string();
                        self.create_item(child, Some(&item.id), 0, child_id)?;
                        created = true;
                    }
                    if !created {
                        self.try_complete(&item.id)?;
                    }
                }
                (Transition::Suspend | Transition::ParentSuspend, State::Suspended) => {
                    self.cascade(&item.id, |_| Some(Transition::ParentSuspend))?;
                }
                (Transition::Resume | Transition::ParentResume, _) if from == State::Suspended => {
                    self.cascade(&item.id, |child| {
                        (child.state == State::Suspended).then_some(Transition::ParentResume)
                    })?;
                }
                (_, State::Completed | State::Terminated) => {
                    self.cascade(&item.id, |child| Some(child.state_machine().exit_transition()))?;
                }
                _ => {}
            }
        }

        if matches!(to, State::Completed | State::Terminated) && item.item_type != PlanItemType::CasePlan {
            let has_entry_criteria = !item_definition.entry_criteria.is_empty();
            if item.repeats && !has_entry_criteria && self.stage_active(&item) {
                self.repeat(&item, item_definition)?;
            }
        }
        if to.is_semi_terminal() {
            if let Some(stage_id) = &item.stage_id {
                self.try_complete(stage_id)?;
            }
        }
        Ok(())
    }

    /// Sends a transition to every non-final child of a stage.
    fn cascade(&mut self, stage_id: &str, pick: impl Fn(&PlanItem) -> Option<Transition>) -> Result<(), CommandError> {
        let children: Vec<(String, Transition)> = self
            .case
            .plan()
            .children(stage_id)
            .into_iter()
            .filter(|child| !child.state.is_final())
            .filter_map(|child| pick(child).map(|t| (child.id.clone(), t)))
            .collect();
        for (child_id, transition) in children {
            self.transition(&child_id, transition)?;
        }
        Ok(())
    }

    fn stage_active(&self, item: &PlanItem) -> bool {
        match &item.stage_id {
            None => true,
            Some(stage_id) => self
                .case
                .plan()
                .get(stage_id)
                .is_some_and(|stage| stage.state == State::Active),
        }
    }

    /// Start or enable a task or stage, occur a milestone. Events wait.
    fn enter(&mut self, item: &PlanItem) -> Result<(), CommandError> {
        let definition = self.definition()?;
        let transition = match item.item_type {
            PlanItemType::Milestone => Transition::Occur,
            PlanItemType::UserEvent | PlanItemType::TimerEvent | PlanItemType::CasePlan => return Ok(()),
            PlanItemType::HumanTask
            | PlanItemType::CaseTask
            | PlanItemType::ProcessTask
            | PlanItemType::Stage => {
                let manual = definition
                    .item(&item.definition_id)
                    .and_then(|d| d.manual_activation.as_ref());
                if self.rule_holds(manual, &item.name)? {
                    Transition::Enable
                } else {
                    Transition::Start
                }
            }
        };
        self.transition(&item.id, transition)?;
        Ok(())
    }

    fn repeat(&mut self, item: &PlanItem, definition: &PlanItemDefinition) -> Result<String, CommandError> {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(case = %self.metadata.actor_id, item = %item.name, index = item.index + 1, "Repeating plan item");
        self.create_item(definition, item.stage_id.as_deref(), item.index + 1, id)
    }

    fn fire(&mut self, criterion_id: &str) -> Result<(), CommandError> {
        let Some(criterion) = self.case.sentries().get(criterion_id).cloned() else {
            return Ok(());
        };
        let Ok(target) = self.item(&criterion.target) else {
            return Ok(());
        };
        if !self.satisfied(&criterion)? {
            return Ok(());
        }
        match criterion.kind {
            CriterionKind::Entry => {
                if target.state == State::Available {
                    self.enter(&target)?;
                } else if target.repeats && target.state != State::Null && self.stage_active(&target) {
                    let definition = self.definition()?;
                    if let Some(item_definition) = definition.item(&target.definition_id) {
                        let latest = self
                            .case
                            .plan()
                            .latest_instance(&target.definition_id, target.stage_id.as_deref())
                            .map(|latest| latest.id.clone());
                        // Only the newest instance spawns the next one.
                        if latest.as_deref() == Some(target.id.as_str()) {
                            let id = self.repeat(&target, item_definition)?;
                            self.work.push_back(Work::Enter(id));
                        }
                    }
                }
            }
            CriterionKind::Exit => {
                if !target.state.is_final() {
                    self.transition(&target.id, target.state_machine().exit_transition())?;
                }
            }
        }
        Ok(())
    }

    fn try_complete(&mut self, stage_id: &str) -> Result<(), CommandError> {
        let stage = self.item(stage_id)?;
        if stage.state != State::Active {
            return Ok(());
        }
        let definition = self.definition()?;
        let plan = self.case.plan();
        let children = plan.children(stage_id);
        if children.iter().any(|child| child.state == State::Active) {
            return Ok(());
        }
        let autocomplete = definition
            .item(&stage.definition_id)
            .is_some_and(|d| d.autocomplete());
        let complete = if autocomplete {
            children
                .iter()
                .filter(|child| child.required)
                .all(|child| child.state.is_semi_terminal())
        } else {
            children.iter().all(|child| child.state.is_semi_terminal())
                && !self
                    .case
                    .discretionary_items(None, self.services.evaluator.as_ref())
                    .iter()
                    .any(|d| d.parent_id == stage_id)
        };
        if complete {
            self.transition(stage_id, Transition::Complete)?;
        }
        Ok(())
    }

    fn check_permission(&self, item: &PlanItem, transition: Transition) -> Result<(), CommandError> {
        let user = self.user();
        let team = self.case.team();
        let denied = || {
            CommandError::denied(format!(
                "User '{}' does not have permission to perform transition {} on '{}'",
                user.user_id, transition, item.name
            ))
        };
        if !team.is_member(user) {
            return Err(denied());
        }
        let definition = self.definition()?;
        let item_definition = definition.item(&item.definition_id);
        let allowed = match (item.item_type, item_definition) {
            (PlanItemType::HumanTask, Some(d)) => {
                let performs = match &d.kind {
                    PlanItemKind::HumanTask { performer: Some(role) } => team.roles_of(user).contains(role),
                    _ => true,
                };
                // An assigned task is completed by its assignee only.
                performs
                    && (transition != Transition::Complete
                        || !matches!(&item.assignee, Some(assignee) if *assignee != user.user_id))
            }
            (PlanItemType::UserEvent, Some(d)) => team.has_any_role(user, &d.authorized_roles),
            (PlanItemType::CasePlan, _) => !matches!(
                transition,
                Transition::Complete | Transition::Terminate | Transition::Suspend | Transition::Reactivate
            ) || team.is_owner(user),
            _ => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(denied())
        }
    }

    fn check_no_active_children(&self, item: &PlanItem, transition: Transition) -> Result<(), CommandError> {
        if transition == Transition::Complete
            && item.item_type.is_stage()
            && self
                .case
                .plan()
                .children(&item.id)
                .iter()
                .any(|child| child.state == State::Active)
        {
            return Err(CommandError::invalid(
                "Cannot complete the stage as there are active items remaining",
            ));
        }
        Ok(())
    }

    fn make_plan_item_transition(&mut self, identifier: &str, transition: Transition) -> Result<(), CommandError> {
        if let Some(item) = self.case.plan().get(identifier).cloned() {
            if !self.stage_active(&item) {
                return Err(CommandError::invalid(format!(
                    "Cannot perform action '{}' on '{}', since the surrounding stage is not active",
                    transition, item.name
                )));
            }
            self.check_permission(&item, transition)?;
            self.check_no_active_children(&item, transition)?;
            self.transition(&item.id, transition)?;
            return Ok(());
        }
        // By name: every instance in an active stage, newest first.
        let targets: Vec<PlanItem> = self
            .case
            .plan()
            .by_name(identifier)
            .into_iter()
            .filter(|item| self.stage_active(item))
            .cloned()
            .collect();
        if targets.is_empty() {
            return Err(CommandError::invalid(format!(
                "There is no plan item with identifier '{}' in case {}",
                identifier, self.metadata.actor_id
            )));
        }
        for item in &targets {
            self.check_permission(item, transition)?;
            self.check_no_active_children(item, transition)?;
        }
        for item in targets {
            self.transition(&item.id, transition)?;
        }
        Ok(())
    }

    fn complete_human_task(&mut self, task_id: &str, output: Value) -> Result<(), CommandError> {
        let task = self.item(task_id)?;
        if task.item_type != PlanItemType::HumanTask {
            return Err(CommandError::invalid(format!("Plan item '{}' is not a human task", task.name)));
        }
        self.check_permission(&task, Transition::Complete)?;
        if task.state != State::Active {
            return Err(CommandError::invalid(format!(
                "Cannot complete task '{}' because it is in state {:?}",
                task.name, task.state
            )));
        }
        self.services.task_validator.validate(&task.name, &output)?;
        self.emit(CaseEvent::TaskOutputFilled {
            plan_item_id: task.id.clone(),
            output: output.clone(),
        });
        self.map_output(&output)?;
        self.transition(&task.id, Transition::Complete)?;
        Ok(())
    }

    /// Callback of a sub-case or process. Ignored once the task moved on.
    fn finish_task(&mut self, task_id: &str, output: Value, transition: Transition) -> Result<(), CommandError> {
        let task = self.item(task_id)?;
        if !matches!(task.item_type, PlanItemType::CaseTask | PlanItemType::ProcessTask) {
            return Err(CommandError::invalid(format!(
                "Plan item '{}' is not a case or process task",
                task.name
            )));
        }
        if task.state != State::Active {
            tracing::debug!(case = %self.metadata.actor_id, task = %task.name, state = ?task.state, "Ignoring late task callback");
            return Ok(());
        }
        self.emit(CaseEvent::TaskOutputFilled {
            plan_item_id: task.id.clone(),
            output: output.clone(),
        });
        if transition == Transition::Complete {
            self.map_output(&output)?;
        }
        self.transition(&task.id, transition)?;
        Ok(())
    }

    fn add_discretionary_item(
        &mut self,
        name: &str,
        parent_id: &str,
        plan_item_id: Option<String>,
    ) -> Result<(), CommandError> {
        let stage = self.item(parent_id)?;
        if !stage.item_type.is_stage() || stage.state != State::Active {
            return Err(CommandError::invalid(format!(
                "Cannot plan discretionary item in stage '{}' since it is not active",
                stage.name
            )));
        }
        let available = self
            .case
            .discretionary_items(Some(self.user()), self.services.evaluator.as_ref());
        let Some(found) = available
            .into_iter()
            .find(|d| d.name == name && d.parent_id == stage.id)
        else {
            return Err(CommandError::unauthorized(format!(
                "User '{}' cannot plan '{}' in stage '{}'",
                self.user().user_id,
                name,
                stage.name
            )));
        };
        let definition = self.definition()?;
        let Some(item_definition) = definition.item(&found.definition_id) else {
            return Ok(());
        };
        if let Some(id) = &plan_item_id {
            if self.case.plan().get(id).is_some() {
                return Err(CommandError::invalid(format!("Plan item '{}' already exists", id)));
            }
        }
        let id = plan_item_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.create_item(item_definition, Some(&stage.id), 0, id)?;
        Ok(())
    }

    fn emit_changes(&mut self, planner: CaseFilePlanner<'_>) {
        for change in planner.into_changes() {
            self.emit(CaseEvent::CaseFileItemTransitioned {
                path: change.path.to_string(),
                transition: change.transition,
                value: change.value,
            });
        }
    }

    fn change_case_file(
        &mut self,
        path: &str,
        change: impl FnOnce(&mut CaseFilePlanner<'_>, &CaseFilePath) -> Result<(), CommandError>,
    ) -> Result<(), CommandError> {
        let definition = self.definition()?;
        let path = CaseFilePath::parse(path)?;
        let mut planner = CaseFilePlanner::new(&definition, self.case.case_file());
        change(&mut planner, &path)?;
        self.emit_changes(planner);
        Ok(())
    }

    /// Writes task output into top-level case-file items of the same name.
    fn map_output(&mut self, output: &Value) -> Result<(), CommandError> {
        let Some(entries) = output.as_map() else {
            return Ok(());
        };
        let definition = self.definition()?;
        let mut planner = CaseFilePlanner::new(&definition, self.case.case_file());
        for (key, value) in entries.iter() {
            let Some(item) = definition.case_file.iter().find(|d| d.name == key) else {
                tracing::debug!(case = %self.metadata.actor_id, "Output '{}' has no case file item", key);
                continue;
            };
            let path = CaseFilePath::parse(key)?;
            if item.multiplicity.is_many() {
                planner.create(&path, value)?;
            } else {
                planner.update(&path, value)?;
            }
        }
        self.emit_changes(planner);
        Ok(())
    }

    fn start_case(
        mut self,
        name: &str,
        input: &Value,
        team: Vec<Member>,
        parent: Option<ParentLink>,
    ) -> Result<Vec<CaseEvent>, CommandError> {
        let definition = self
            .services
            .definitions
            .read(name, self.user(), self.metadata.tenant.as_ref())?;
        definition.validate()?;
        let members = if team.is_empty() {
            vec![Member::user(self.user().user_id.clone()).owner()]
        } else {
            CaseTeam::validate_new_team(&team, &definition)?;
            team
        };
        self.emit(CaseEvent::CaseDefinitionApplied {
            definition: Box::new((*definition).clone()),
            parent,
        });
        for member in members {
            self.emit(CaseEvent::TeamMemberAdded { member });
        }
        match input {
            Value::Null => {}
            Value::Map(entries) => {
                let mut planner = CaseFilePlanner::new(&definition, self.case.case_file());
                for (key, value) in entries.iter() {
                    planner.create(&CaseFilePath::parse(key)?, value)?;
                }
                self.emit_changes(planner);
            }
            other => {
                return Err(CommandError::invalid(format!(
                    "Case input must be an object, got {}",
                    other.kind()
                )))
            }
        }
        let case_id = self.metadata.actor_id.to_string();
        self.create_item(&definition.plan, None, 0, case_id)?;
        self.drain()?;
        // Input transitions reach the sentries only now, with the plan in place.
        self.emit(CaseEvent::CaseFileBootstrapReleased);
        self.finish()
    }
}
