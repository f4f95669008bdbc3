use super::*;

const ORDER: &str = r#"
name: order
roles: [clerk, approver]
case_file:
  - name: Order
    children:
      - name: Lines
        multiplicity: zero_or_more
plan:
  id: plan
  name: Order handling
  type: Stage
  items:
    - id: review
      name: Review
      type: HumanTask
      performer: clerk
    - id: approve
      name: Approve
      type: HumanTask
      performer: approver
      entry_criteria:
        - id: after_review
          on_parts:
            - source: plan_item
              item: review
              event: Complete
    - id: reminder
      name: Reminder
      type: TimerEvent
      duration: PT4H
    - id: lines_added
      name: Lines added
      type: Milestone
      entry_criteria:
        - id: on_line
          on_parts:
            - source: case_file
              path: Order/Lines
              event: Create
"#;

fn order() -> CaseDefinition {
    serde_yaml::from_str(ORDER).expect("definition parses")
}

#[test]
fn test_parse_and_validate() {
    let definition = order();
    definition.validate().expect("valid");
    assert_eq!(definition.items().len(), 5);
    assert_eq!(definition.items()[0].id, "plan");
    assert_eq!(
        definition.item("approve").map(PlanItemDefinition::item_type),
        Some(PlanItemType::HumanTask)
    );
    assert_eq!(definition.parent_of("approve").map(|d| d.id.as_str()), Some("plan"));
}

#[test]
fn test_case_file_item_lookup_ignores_indices() {
    let definition = order();
    let path = CaseFilePath::parse("Order/Lines[3]").expect("path");
    let item = definition.case_file_item(&path).expect("defined");
    assert!(item.multiplicity.is_many());
    let missing = CaseFilePath::parse("Order/Customer").expect("path");
    assert!(definition.case_file_item(&missing).is_none());
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let mut definition = order();
    if let PlanItemKind::Stage { items, .. } = &mut definition.plan.kind {
        let copy = items[0].clone();
        items.push(copy);
    }
    let err = definition.validate().unwrap_err();
    assert!(err.message().contains("plan item id 'review' is used twice"), "{}", err);
}

#[test]
fn test_undefined_role_is_rejected() {
    let mut definition = order();
    definition.roles.remove("approver");
    let err = definition.validate().unwrap_err();
    assert!(matches!(err, CommandError::InvalidDefinition { .. }));
    assert!(err.message().contains("undefined role 'approver'"));
}

#[test]
fn test_unknown_on_part_sources_are_rejected() {
    let text = ORDER.replace("item: review", "item: nowhere");
    let definition: CaseDefinition = serde_yaml::from_str(&text).expect("parses");
    assert!(definition.validate().unwrap_err().message().contains("unknown plan item 'nowhere'"));

    let text = ORDER.replace("path: Order/Lines", "path: Order/Missing");
    let definition: CaseDefinition = serde_yaml::from_str(&text).expect("parses");
    assert!(definition
        .validate()
        .unwrap_err()
        .message()
        .contains("unknown case file item 'Order/Missing'"));
}

#[test]
fn test_bad_timer_duration_is_rejected() {
    let text = ORDER.replace("PT4H", "four hours");
    let definition: CaseDefinition = serde_yaml::from_str(&text).expect("parses");
    assert!(definition.validate().unwrap_err().message().contains("invalid duration"));
}

#[test]
fn test_case_plan_must_be_a_stage() {
    let mut definition = order();
    definition.plan.kind = PlanItemKind::Milestone;
    assert!(definition.validate().is_err());
}
