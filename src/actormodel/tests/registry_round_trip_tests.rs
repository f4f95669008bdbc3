use super::*;
use crate::actormodel::errors::CommandError;
use crate::actormodel::message::CommandPayload;
use crate::actormodel::response::RESPONSE_MANIFESTS;
use crate::actormodel::types::{EngineVersion, TenantId};
use crate::actormodel::EventPayload;
use crate::board::{BoardEvent, Column};
use crate::cmmn::casefile::CaseFileTransition;
use crate::cmmn::team::{Member, MemberKey};
use crate::cmmn::{CaseDefinition, CaseEvent, ParentLink, PlanItemType, State, Transition};
use crate::consentgroup::{ConsentGroupCommand, ConsentGroupEvent, ConsentGroupMember};
use crate::processtask::{ProcessCommand, ProcessEvent};
use crate::tenant::{TenantCommand, TenantUser};
use crate::timerservice::{Timer, TimerEvent};
use crate::value::ValueMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Sends every sample over the wire form and back through `registry`, and
/// checks the samples cover exactly the registered manifests.
fn assert_wire_round_trip<T>(registry: &ManifestRegistry<T>, expected: &[&str], samples: Vec<T>)
where
    T: Serialize + Manifested + PartialEq + Debug,
{
    let mut seen = BTreeSet::new();
    for sample in samples {
        let wire = ManifestWrapper::wrap(&sample).expect("wrap").to_value();
        let text = serde_json::to_string(&wire).expect("to json");
        let parsed: Value = serde_json::from_str(&text).expect("from json");
        let wrapper = ManifestWrapper::from_value(&parsed).expect("unwrap");
        let decoded = registry.decode_wrapper(wrapper).expect("decode");
        assert_eq!(decoded, sample);
        seen.insert(sample.manifest());
    }
    let expected: BTreeSet<&str> = expected.iter().copied().collect();
    assert_eq!(seen, expected, "{} registry", registry.name());
    assert_eq!(registry.len(), expected.len(), "{} registry", registry.name());
}

fn command<P: CommandPayload>(actor_id: &str, payload: P) -> ModelCommand<P> {
    ModelCommand::new(CommandMetadata::new(actor_id, "acme", UserIdentity::new("alice")), payload)
}

fn event_manifests<E: EventPayload>() -> Vec<&'static str> {
    KERNEL_EVENT_MANIFESTS.iter().chain(E::manifests()).copied().collect()
}

/// The kernel events of a family followed by its own events.
fn journal<P: CommandPayload, E>(stored: ModelCommand<P>, events: Vec<E>) -> Vec<JournalEvent<ModelCommand<P>, E>> {
    let metadata = EventMetadata::from(&stored.metadata);
    let kernel = vec![
        ActorEvent::ActorRequestStored {
            message_id: stored.metadata.message_id.clone(),
            source_actor: ActorId::from("case-1"),
            source_type: ActorType::Case,
            command: stored,
        },
        ActorEvent::ActorRequestExecuted {
            message_id: MessageId::from("m-1"),
        },
        ActorEvent::EngineVersionChanged {
            version: EngineVersion::new("1.2.0", "abc123"),
        },
        ActorEvent::DebugModeChanged { enabled: true },
        ActorEvent::DebugEvent {
            messages: vec!["entered stage".to_string()],
        },
        ActorEvent::ActorModified {
            last_modified: TimestampUtc::now(),
        },
    ];
    kernel
        .into_iter()
        .map(|event| JournalEvent::actor(metadata.clone(), event))
        .chain(events.into_iter().map(|event| JournalEvent::model(metadata.clone(), event)))
        .collect()
}

fn roles(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn output() -> Value {
    Value::Map(ValueMap::new().with("Decision", "approved"))
}

fn case_commands() -> Vec<ModelCommand<CaseCommand>> {
    let path = |p: &str| p.to_string();
    [
        CaseCommand::StartCase {
            definition: "claims".to_string(),
            input: output(),
            team: vec![Member::user("alice").owner().with_role("clerk")],
            parent: Some(ParentLink {
                case_id: ActorId::from("parent"),
                task_id: "task-1".to_string(),
            }),
        },
        CaseCommand::MakePlanItemTransition {
            identifier: "Assess".to_string(),
            transition: Transition::Suspend,
        },
        CaseCommand::CompleteHumanTask {
            task_id: "t1".to_string(),
            output: output(),
        },
        CaseCommand::CompleteTask {
            task_id: "t2".to_string(),
            output: output(),
        },
        CaseCommand::FailTask {
            task_id: "t2".to_string(),
            output: Value::from("broken"),
        },
        CaseCommand::AssignTask {
            task_id: "t1".to_string(),
            assignee: "bob".to_string(),
        },
        CaseCommand::ClaimTask { task_id: "t1".to_string() },
        CaseCommand::RevokeTask { task_id: "t1".to_string() },
        CaseCommand::GetDiscretionaryItems,
        CaseCommand::AddDiscretionaryItem {
            name: "Escalate".to_string(),
            parent_id: "case-1".to_string(),
            plan_item_id: Some("escalate-1".to_string()),
        },
        CaseCommand::CreateCaseFileItem {
            path: path("Order"),
            value: output(),
        },
        CaseCommand::UpdateCaseFileItem {
            path: path("Order"),
            value: output(),
        },
        CaseCommand::ReplaceCaseFileItem {
            path: path("Order/Lines[0]"),
            value: output(),
        },
        CaseCommand::DeleteCaseFileItem { path: path("Order") },
        CaseCommand::SetCaseTeamUser {
            user_id: "bob".to_string(),
            roles: roles(&["approver"]),
            owner: false,
        },
        CaseCommand::SetCaseTeamGroup {
            group_id: "finance".to_string(),
            roles: roles(&["clerk", "approver"]),
            owner: true,
        },
        CaseCommand::SetCaseTeamTenantRole {
            tenant_role: "auditor".to_string(),
            roles: BTreeSet::new(),
            owner: false,
        },
        CaseCommand::RemoveCaseTeamUser {
            user_id: "bob".to_string(),
        },
        CaseCommand::RemoveCaseTeamGroup {
            group_id: "finance".to_string(),
        },
        CaseCommand::RemoveCaseTeamTenantRole {
            tenant_role: "auditor".to_string(),
        },
        CaseCommand::SetCaseTeam {
            members: vec![Member::user("alice").owner(), Member::user("carol")],
        },
    ]
    .into_iter()
    .map(|payload| command("case-1", payload))
    .collect()
}

fn case_events() -> Vec<CaseEvent> {
    let definition: CaseDefinition = serde_yaml::from_str(
        r#"
name: wire
roles: [clerk]
plan:
  id: plan
  name: Plan
  type: Stage
  items:
    - id: assess
      name: Assess
      type: HumanTask
      performer: clerk
"#,
    )
    .expect("definition parses");
    let id = || "assess-1".to_string();
    vec![
        CaseEvent::CaseDefinitionApplied {
            definition: Box::new(definition),
            parent: None,
        },
        CaseEvent::PlanItemCreated {
            plan_item_id: id(),
            name: "Assess".to_string(),
            definition_id: "assess".to_string(),
            item_type: PlanItemType::HumanTask,
            index: 2,
            stage_id: Some("case-1".to_string()),
        },
        CaseEvent::PlanItemTransitioned {
            plan_item_id: id(),
            from: State::Active,
            to: State::Suspended,
            history_state: State::Active,
            transition: Transition::Suspend,
        },
        CaseEvent::RequiredRuleEvaluated {
            plan_item_id: id(),
            required: true,
        },
        CaseEvent::RepetitionRuleEvaluated {
            plan_item_id: id(),
            repeats: false,
        },
        CaseEvent::TaskOutputFilled {
            plan_item_id: id(),
            output: output(),
        },
        CaseEvent::HumanTaskAssigned {
            plan_item_id: id(),
            assignee: "bob".to_string(),
        },
        CaseEvent::HumanTaskClaimed {
            plan_item_id: id(),
            assignee: "alice".to_string(),
        },
        CaseEvent::HumanTaskRevoked { plan_item_id: id() },
        CaseEvent::CaseFileItemTransitioned {
            path: "Order/Lines[0]".to_string(),
            transition: CaseFileTransition::Replace,
            value: output(),
        },
        CaseEvent::CaseFileBootstrapReleased,
        CaseEvent::TeamMemberAdded {
            member: Member::user("alice").owner(),
        },
        CaseEvent::TeamMemberChanged {
            member: Member::user("alice").with_role("clerk"),
        },
        CaseEvent::TeamMemberRemoved {
            key: MemberKey::Group("finance".to_string()),
        },
        CaseEvent::CaseModified {
            last_modified: TimestampUtc::now(),
            active_items: 3,
        },
    ]
}

#[test]
fn test_case_messages_survive_the_wire() {
    let registries = EngineRegistries::build().expect("registries");
    assert_wire_round_trip(&registries.case.commands, CaseCommand::manifests(), case_commands());
    let stored = command("case-1", CaseCommand::GetDiscretionaryItems);
    assert_wire_round_trip(
        &registries.case.events,
        &event_manifests::<CaseEvent>(),
        journal(stored, case_events()),
    );
}

#[test]
fn test_tenant_and_consent_group_messages_survive_the_wire() {
    let registries = EngineRegistries::build().expect("registries");
    let user = TenantUser::new("bob");
    let tenant_commands = vec![
        TenantCommand::CreateTenant {
            name: "acme".to_string(),
            users: vec![TenantUser::new("alice").owner()],
        },
        TenantCommand::SetTenantUser { user: user.clone() },
        TenantCommand::RemoveTenantUser {
            user_id: "bob".to_string(),
        },
        TenantCommand::DisableTenant,
        TenantCommand::EnableTenant,
    ];
    assert_wire_round_trip(
        &registries.tenant.commands,
        TenantCommand::manifests(),
        tenant_commands.into_iter().map(|c| command("acme", c)).collect(),
    );
    let tenant_events = vec![
        TenantEvent::TenantCreated {
            name: "acme".to_string(),
        },
        TenantEvent::TenantUserSet { user },
        TenantEvent::TenantUserRemoved {
            user_id: "bob".to_string(),
        },
        TenantEvent::TenantDisabled,
        TenantEvent::TenantEnabled,
    ];
    assert_wire_round_trip(
        &registries.tenant.events,
        &event_manifests::<TenantEvent>(),
        journal(command("acme", TenantCommand::DisableTenant), tenant_events),
    );

    let member = ConsentGroupMember::new("carol").owner();
    let group_commands = vec![
        ConsentGroupCommand::CreateConsentGroup {
            members: vec![member.clone()],
        },
        ConsentGroupCommand::SetConsentGroupMember { member: member.clone() },
        ConsentGroupCommand::RemoveConsentGroupMember {
            user_id: "carol".to_string(),
        },
    ];
    assert_wire_round_trip(
        &registries.consent_group.commands,
        ConsentGroupCommand::manifests(),
        group_commands.into_iter().map(|c| command("group-1", c)).collect(),
    );
    let group_events = vec![
        ConsentGroupEvent::ConsentGroupCreated {
            tenant: Some(TenantId::from("acme")),
        },
        ConsentGroupEvent::ConsentGroupMemberAdded { member: member.clone() },
        ConsentGroupEvent::ConsentGroupMemberChanged { member },
        ConsentGroupEvent::ConsentGroupMemberRemoved {
            user_id: "carol".to_string(),
        },
    ];
    let stored = command(
        "group-1",
        ConsentGroupCommand::RemoveConsentGroupMember {
            user_id: "dave".to_string(),
        },
    );
    assert_wire_round_trip(
        &registries.consent_group.events,
        &event_manifests::<ConsentGroupEvent>(),
        journal(stored, group_events),
    );
}

#[test]
fn test_service_messages_survive_the_wire() {
    let registries = EngineRegistries::build().expect("registries");
    let due_at = TimestampUtc::now();
    let timer = Timer {
        timer_id: "reminder-1".to_string(),
        case_id: ActorId::from("case-1"),
        due_at,
        user: UserIdentity::new("alice"),
        tenant: Some(TenantId::from("acme")),
    };
    let timer_commands = vec![
        TimerCommand::SetTimer {
            timer_id: "reminder-1".to_string(),
            case_id: ActorId::from("case-1"),
            due_at,
        },
        TimerCommand::CancelTimer {
            timer_id: "reminder-1".to_string(),
        },
        TimerCommand::FireDueTimers,
    ];
    assert_wire_round_trip(
        &registries.timer_service.commands,
        TimerCommand::manifests(),
        timer_commands.into_iter().map(|c| command("timer-service", c)).collect(),
    );
    let timer_events = vec![
        TimerEvent::TimerSet { timer: timer.clone() },
        TimerEvent::TimerCanceled {
            timer_id: "reminder-1".to_string(),
        },
        TimerEvent::TimerFired { timer },
    ];
    assert_wire_round_trip(
        &registries.timer_service.events,
        &event_manifests::<TimerEvent>(),
        journal(command("timer-service", TimerCommand::FireDueTimers), timer_events),
    );

    let board_commands = vec![
        BoardCommand::CreateBoard {
            title: "Claims".to_string(),
        },
        BoardCommand::UpdateBoard {
            title: "Open claims".to_string(),
        },
        BoardCommand::AddColumn {
            column_id: "todo".to_string(),
            title: "To do".to_string(),
            role: Some("clerk".to_string()),
        },
        BoardCommand::RemoveColumn {
            column_id: "todo".to_string(),
        },
    ];
    assert_wire_round_trip(
        &registries.board.commands,
        BoardCommand::manifests(),
        board_commands.into_iter().map(|c| command("board-1", c)).collect(),
    );
    let board_events = vec![
        BoardEvent::BoardCreated {
            title: "Claims".to_string(),
            owner: "alice".to_string(),
        },
        BoardEvent::BoardUpdated {
            title: "Open claims".to_string(),
        },
        BoardEvent::ColumnAdded {
            column: Column {
                column_id: "todo".to_string(),
                title: "To do".to_string(),
                role: None,
            },
        },
        BoardEvent::ColumnRemoved {
            column_id: "todo".to_string(),
        },
    ];
    let stored = command(
        "board-1",
        BoardCommand::RemoveColumn {
            column_id: "done".to_string(),
        },
    );
    assert_wire_round_trip(
        &registries.board.events,
        &event_manifests::<BoardEvent>(),
        journal(stored, board_events),
    );

    let parent = ParentLink {
        case_id: ActorId::from("case-1"),
        task_id: "job-1".to_string(),
    };
    let process_commands = vec![
        ProcessCommand::StartProcess {
            process: "echo".to_string(),
            input: output(),
            parent: parent.clone(),
        },
        ProcessCommand::TerminateProcess,
    ];
    assert_wire_round_trip(
        &registries.process_task.commands,
        ProcessCommand::manifests(),
        process_commands.into_iter().map(|c| command("job-1", c)).collect(),
    );
    let process_events = vec![
        ProcessEvent::ProcessStarted {
            process: "echo".to_string(),
            input: output(),
            parent,
        },
        ProcessEvent::ProcessCompleted { output: output() },
        ProcessEvent::ProcessFailed {
            error: "no such process".to_string(),
        },
        ProcessEvent::ProcessTerminated,
    ];
    assert_wire_round_trip(
        &registries.process_task.events,
        &event_manifests::<ProcessEvent>(),
        journal(command("job-1", ProcessCommand::TerminateProcess), process_events),
    );
}

#[test]
fn test_every_response_kind_survives_the_wire() {
    let registries = EngineRegistries::build().expect("registries");
    let message = |n: &str| n.to_string();
    let errors = vec![
        CommandError::InvalidCommand { message: message("bad") },
        CommandError::MissingTenant { message: message("tenant") },
        CommandError::Authorization { message: message("no") },
        CommandError::TransitionDenied { message: message("denied") },
        CommandError::CaseTeam { message: message("owners") },
        CommandError::InvalidDefinition { message: message("definition") },
        CommandError::ActorExists { message: message("exists") },
        CommandError::NotRecovered { message: message("broken") },
        CommandError::ActorChoked { message: message("loop") },
        CommandError::EngineChoked { message: message("journal") },
    ];
    let id = || MessageId::from("m-7");
    let actor = || ActorId::from("case-1");
    let mut responses = vec![
        ModelResponse::accepted(id(), actor(), output()).with_last_modified(Some(TimestampUtc::now())),
        ModelResponse::not_modified(id(), actor()),
    ];
    responses.extend(errors.into_iter().map(|error| ModelResponse::failure(id(), actor(), error)));
    assert_wire_round_trip(&registries.responses, RESPONSE_MANIFESTS, responses);
}
