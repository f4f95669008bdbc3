use super::*;
use crate::cmmn::plan::PlanItem;
use crate::cmmn::state_machine::{PlanItemType, State};

fn item(id: &str, definition_id: &str, item_type: PlanItemType, stage_id: Option<&str>) -> PlanItem {
    PlanItem {
        id: id.to_string(),
        name: definition_id.to_string(),
        definition_id: definition_id.to_string(),
        item_type,
        index: 0,
        stage_id: stage_id.map(str::to_string),
        state: State::Available,
        history_state: State::Null,
        last_transition: Some(Transition::Create),
        required: false,
        repeats: false,
        created_order: 0,
        assignee: None,
    }
}

fn plan() -> Plan {
    let mut plan = Plan::default();
    plan.insert(item("case", "plan", PlanItemType::CasePlan, None));
    plan.insert(item("a", "A", PlanItemType::HumanTask, Some("case")));
    plan.insert(item("b", "B", PlanItemType::HumanTask, Some("case")));
    plan
}

fn on_plan_item(id: &str, item: &str, event: Transition) -> CriterionDefinition {
    CriterionDefinition {
        id: id.to_string(),
        on_parts: vec![OnPartDefinition::PlanItem {
            item: item.to_string(),
            event,
        }],
        if_part: None,
    }
}

#[test]
fn test_plan_item_on_part_activates_criterion() {
    let plan = plan();
    let mut network = SentryNetwork::default();
    network.add(Criterion::new("b", CriterionKind::Entry, &on_plan_item("after_a", "A", Transition::Complete)));
    assert_eq!(network.len(), 1);
    assert_eq!(network.for_target("b", CriterionKind::Entry).len(), 1);
    assert!(network.for_target("b", CriterionKind::Exit).is_empty());

    network.on_plan_item(&plan, "a", Transition::Start);
    assert!(network.take_activations().is_empty());

    network.on_plan_item(&plan, "a", Transition::Complete);
    assert_eq!(network.take_activations(), vec!["b/after_a".to_string()]);
    assert!(network.get("b/after_a").is_some_and(Criterion::on_parts_satisfied));
    assert!(network.take_activations().is_empty());
}

#[test]
fn test_later_transition_deactivates_on_part() {
    let plan = plan();
    let mut network = SentryNetwork::default();
    let definition = CriterionDefinition {
        id: "both".to_string(),
        on_parts: vec![
            OnPartDefinition::PlanItem {
                item: "A".to_string(),
                event: Transition::Complete,
            },
            OnPartDefinition::CaseFile {
                path: "Order".to_string(),
                event: CaseFileTransition::Update,
            },
        ],
        if_part: Some("Order/Ok".to_string()),
    };
    network.add(Criterion::new("b", CriterionKind::Exit, &definition));

    network.on_plan_item(&plan, "a", Transition::Complete);
    assert!(network.take_activations().is_empty());
    network.on_case_file("Order", CaseFileTransition::Create);
    assert!(network.take_activations().is_empty());
    network.on_case_file("Order", CaseFileTransition::Update);
    assert_eq!(network.take_activations(), vec!["b/both".to_string()]);
    assert_eq!(
        network.get("b/both").and_then(|c| c.if_part.clone()),
        Some("Order/Ok".to_string())
    );
}

#[test]
fn test_case_file_on_part_matches_any_list_element() {
    let mut network = SentryNetwork::default();
    let definition = CriterionDefinition {
        id: "line".to_string(),
        on_parts: vec![OnPartDefinition::CaseFile {
            path: "Order/Lines".to_string(),
            event: CaseFileTransition::Create,
        }],
        if_part: None,
    };
    network.add(Criterion::new("m", CriterionKind::Entry, &definition));
    network.on_case_file("Order/Lines[3]", CaseFileTransition::Create);
    assert_eq!(network.take_activations(), vec!["m/line".to_string()]);
}

#[test]
fn test_catch_up_sets_flags_without_activation() {
    let mut plan = plan();
    if let Some(a) = plan.get_mut("a") {
        a.last_transition = Some(Transition::Complete);
        a.state = State::Completed;
    }
    let mut file = CaseFile::default();
    let order = CaseFilePath::parse("Order").expect("path");
    file.apply(&order, CaseFileTransition::Create, crate::value::Value::Null);

    let mut network = SentryNetwork::default();
    let definition = CriterionDefinition {
        id: "caught".to_string(),
        on_parts: vec![
            OnPartDefinition::PlanItem {
                item: "A".to_string(),
                event: Transition::Complete,
            },
            OnPartDefinition::CaseFile {
                path: "Order".to_string(),
                event: CaseFileTransition::Create,
            },
        ],
        if_part: None,
    };
    network.add(Criterion::new("b", CriterionKind::Entry, &definition));
    network.catch_up("b/caught", &plan, &file);
    assert!(network.get("b/caught").is_some_and(Criterion::on_parts_satisfied));
    assert!(network.take_activations().is_empty());
}

#[test]
fn test_sources_in_sibling_stage_instances_are_out_of_scope() {
    let mut plan = Plan::default();
    plan.insert(item("case", "plan", PlanItemType::CasePlan, None));
    plan.insert(item("s0", "S", PlanItemType::Stage, Some("case")));
    plan.insert(item("s1", "S", PlanItemType::Stage, Some("case")));
    plan.insert(item("a0", "A", PlanItemType::HumanTask, Some("s0")));
    plan.insert(item("b1", "B", PlanItemType::HumanTask, Some("s1")));

    let mut network = SentryNetwork::default();
    network.add(Criterion::new("b1", CriterionKind::Entry, &on_plan_item("after_a", "A", Transition::Complete)));
    network.on_plan_item(&plan, "a0", Transition::Complete);
    assert!(network.take_activations().is_empty());

    plan.insert(item("a1", "A", PlanItemType::HumanTask, Some("s1")));
    network.on_plan_item(&plan, "a1", Transition::Complete);
    assert_eq!(network.take_activations(), vec!["b1/after_a".to_string()]);
}
