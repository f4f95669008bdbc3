use super::*;
use proptest::prelude::*;

fn chain_definition(length: usize) -> CaseDefinition {
    let mut items = String::new();
    for i in 0..length {
        items.push_str(&format!("    - id: m{i}\n      name: M{i}\n      type: Milestone\n"));
        if i > 0 {
            items.push_str(&format!(
                "      entry_criteria:\n        - id: after\n          on_parts:\n            - source: plan_item\n              item: m{}\n              event: Occur\n",
                i - 1
            ));
        }
    }
    parse(&format!(
        "name: chain\nplan:\n  id: plan\n  name: Chain\n  type: Stage\n  items:\n{items}"
    ))
}

#[derive(Debug, Clone)]
enum TeamChange {
    Set { user: usize, owner: bool },
    Remove { user: usize },
}

fn team_change() -> impl Strategy<Value = TeamChange> {
    prop_oneof![
        (0..4usize, any::<bool>()).prop_map(|(user, owner)| TeamChange::Set { user, owner }),
        (0..4usize).prop_map(|user| TeamChange::Remove { user }),
    ]
}

const NAMES: [&str; 4] = ["alice", "bob", "carol", "dave"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_milestone_chain_settles(length in 1usize..20) {
        let definitions = InMemoryDefinitions::new().with(chain_definition(length));
        let services = EngineServices::default().with_definitions(Arc::new(definitions));
        let metadata = CommandMetadata::new(CASE_ID, "acme", user("alice"));
        let mut case = Case::default();
        let events = futures::executor::block_on(
            case.handle(ModelCommand::new(metadata, start("chain")), &services),
        )
        .expect("start");
        for event in events {
            case.apply(event);
        }
        let milestones: Vec<_> = case.plan().items().into_iter().filter(|i| i.item_type == PlanItemType::Milestone).collect();
        prop_assert_eq!(milestones.len(), length);
        prop_assert!(milestones.iter().all(|m| m.state == State::Completed));
        prop_assert_eq!(case.plan().case_plan().map(|p| p.state), Some(State::Completed));
    }

    #[test]
    fn test_case_team_keeps_an_owner(changes in prop::collection::vec(team_change(), 1..25)) {
        let mut harness = futures::executor::block_on(sequence_case());
        for change in changes {
            let acting = harness
                .case
                .team()
                .members()
                .find(|m| m.owner)
                .and_then(|m| match &m.key {
                    MemberKey::User(id) => Some(id.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            let command = match change {
                TeamChange::Set { user, owner } => CaseCommand::SetCaseTeamUser {
                    user_id: NAMES[user].to_string(),
                    roles: Default::default(),
                    owner,
                },
                TeamChange::Remove { user } => CaseCommand::RemoveCaseTeamUser { user_id: NAMES[user].to_string() },
            };
            let _ = futures::executor::block_on(harness.send(&acting, command));
            prop_assert!(harness.case.team().owner_count() >= 1);
        }
    }

    #[test]
    fn test_every_transition_follows_the_state_machine(
        steps in prop::collection::vec(
            (
                prop::sample::select(vec!["Work", "Cancel", "Reminder", "Line seen", "Intake"]),
                prop::sample::select(Transition::ALL.to_vec()),
            ),
            1..15,
        )
    ) {
        let mut harness = Harness::new();
        futures::executor::block_on(harness.send("alice", start("intake"))).expect("start");
        for (name, transition) in steps {
            let command = CaseCommand::MakePlanItemTransition { identifier: name.to_string(), transition };
            let message = ModelCommand::new(harness.metadata("alice"), command);
            let Ok(events) = futures::executor::block_on(harness.case.handle(message, &harness.services)) else {
                continue;
            };
            for event in &events {
                if let CaseEvent::PlanItemTransitioned { plan_item_id, from, to, transition, .. } = event {
                    let item = harness.case.plan().get(plan_item_id).expect("item exists");
                    prop_assert_eq!(item.state, *from);
                    prop_assert_eq!(item.target(*transition), Some(*to));
                }
                harness.case.apply(event.clone());
            }
        }
    }
}
