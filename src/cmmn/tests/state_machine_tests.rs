use super::*;
use proptest::prelude::*;

#[test]
fn test_task_happy_path() {
    let sm = PlanItemType::HumanTask.state_machine();
    let available = sm.target(State::Null, Transition::Create, State::Null);
    assert_eq!(available, Some(State::Available));
    let active = sm.target(State::Available, Transition::Start, State::Null);
    assert_eq!(active, Some(State::Active));
    assert_eq!(
        sm.target(State::Active, Transition::Complete, State::Null),
        Some(State::Completed)
    );
}

#[test]
fn test_manual_activation_path() {
    let sm = StateMachine::TaskStage;
    assert_eq!(sm.target(State::Available, Transition::Enable, State::Null), Some(State::Enabled));
    assert_eq!(sm.target(State::Enabled, Transition::Disable, State::Null), Some(State::Disabled));
    assert_eq!(sm.target(State::Disabled, Transition::Reenable, State::Null), Some(State::Enabled));
    assert_eq!(sm.target(State::Enabled, Transition::ManualStart, State::Null), Some(State::Active));
    assert_eq!(sm.target(State::Available, Transition::ManualStart, State::Null), None);
}

#[test]
fn test_parent_resume_restores_history() {
    let sm = StateMachine::TaskStage;
    assert_eq!(
        sm.target(State::Suspended, Transition::ParentResume, State::Enabled),
        Some(State::Enabled)
    );
    assert_eq!(
        sm.target(State::Suspended, Transition::ParentResume, State::Null),
        Some(State::Available)
    );
}

#[test]
fn test_events_and_milestones() {
    let sm = PlanItemType::TimerEvent.state_machine();
    assert_eq!(sm, StateMachine::EventMilestone);
    assert_eq!(sm.target(State::Available, Transition::Occur, State::Null), Some(State::Completed));
    assert_eq!(sm.target(State::Completed, Transition::Occur, State::Null), None);
    assert_eq!(sm.exit_transition(), Transition::ParentTerminate);
}

#[test]
fn test_case_plan_starts_active_and_closes() {
    let sm = PlanItemType::CasePlan.state_machine();
    assert_eq!(sm.target(State::Null, Transition::Create, State::Null), Some(State::Active));
    assert_eq!(sm.target(State::Completed, Transition::Close, State::Null), Some(State::Closed));
    assert_eq!(sm.target(State::Completed, Transition::Reactivate, State::Null), Some(State::Active));
    assert_eq!(sm.target(State::Closed, Transition::Reactivate, State::Null), None);
}

#[test]
fn test_type_predicates() {
    assert!(PlanItemType::CaseTask.is_task());
    assert!(PlanItemType::CasePlan.is_stage());
    assert!(PlanItemType::UserEvent.is_event());
    assert!(!PlanItemType::Milestone.is_event());
    assert!(State::Disabled.is_semi_terminal());
    assert!(!State::Disabled.is_final());
    assert!(State::Closed.is_final());
}

fn machine() -> impl Strategy<Value = StateMachine> {
    prop_oneof![
        Just(StateMachine::EventMilestone),
        Just(StateMachine::TaskStage),
        Just(StateMachine::CasePlan),
    ]
}

proptest! {
    #[test]
    fn test_no_transition_leaves_closed_or_discarded(
        sm in machine(),
        transition in prop::sample::select(Transition::ALL.to_vec()),
        history in prop::sample::select(State::ALL.to_vec()),
    ) {
        prop_assert_eq!(sm.target(State::Closed, transition, history), None);
        prop_assert_eq!(sm.target(State::Discarded, transition, history), None);
    }

    #[test]
    fn test_create_only_from_null(
        sm in machine(),
        from in prop::sample::select(State::ALL.to_vec()),
    ) {
        let target = sm.target(from, Transition::Create, State::Null);
        prop_assert_eq!(target.is_some(), from == State::Null);
    }

    #[test]
    fn test_exit_transition_ends_every_non_final_item(
        sm in machine(),
        from in prop::sample::select(State::ALL.to_vec()),
    ) {
        if let Some(target) = sm.target(from, sm.exit_transition(), State::Null) {
            prop_assert!(!from.is_final());
            prop_assert_eq!(target, State::Terminated);
        }
    }
}
