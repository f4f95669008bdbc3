//! Plan-item lifecycles.
//!
//! Three tables cover all plan-item types: events and milestones, tasks and
//! stages, and the case plan itself.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanItemType {
    CasePlan,
    Stage,
    HumanTask,
    CaseTask,
    ProcessTask,
    Milestone,
    UserEvent,
    TimerEvent,
}

impl PlanItemType {
    pub fn is_task(self) -> bool {
        matches!(
            self,
            PlanItemType::HumanTask | PlanItemType::CaseTask | PlanItemType::ProcessTask
        )
    }

    pub fn is_stage(self) -> bool {
        matches!(self, PlanItemType::Stage | PlanItemType::CasePlan)
    }

    pub fn is_event(self) -> bool {
        matches!(self, PlanItemType::UserEvent | PlanItemType::TimerEvent)
    }

    pub fn state_machine(self) -> StateMachine {
        match self {
            PlanItemType::CasePlan => StateMachine::CasePlan,
            PlanItemType::Stage
            | PlanItemType::HumanTask
            | PlanItemType::CaseTask
            | PlanItemType::ProcessTask => StateMachine::TaskStage,
            PlanItemType::Milestone | PlanItemType::UserEvent | PlanItemType::TimerEvent => {
                StateMachine::EventMilestone
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum State {
    #[default]
    Null,
    Available,
    Enabled,
    Disabled,
    Active,
    Suspended,
    Failed,
    Completed,
    Terminated,
    Closed,
    Discarded,
}

impl State {
    pub const ALL: [State; 11] = [
        State::Null,
        State::Available,
        State::Enabled,
        State::Disabled,
        State::Active,
        State::Suspended,
        State::Failed,
        State::Completed,
        State::Terminated,
        State::Closed,
        State::Discarded,
    ];

    /// States that let the surrounding stage complete.
    pub fn is_semi_terminal(self) -> bool {
        matches!(
            self,
            State::Completed | State::Terminated | State::Disabled | State::Failed
        )
    }

    /// States no exit transition can leave.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            State::Completed | State::Terminated | State::Closed | State::Discarded
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    Create,
    Enable,
    Disable,
    Reenable,
    Start,
    ManualStart,
    Suspend,
    Resume,
    Reactivate,
    Fault,
    Complete,
    Terminate,
    Exit,
    Occur,
    ParentSuspend,
    ParentResume,
    ParentTerminate,
    Close,
}

impl Transition {
    pub const ALL: [Transition; 18] = [
        Transition::Create,
        Transition::Enable,
        Transition::Disable,
        Transition::Reenable,
        Transition::Start,
        Transition::ManualStart,
        Transition::Suspend,
        Transition::Resume,
        Transition::Reactivate,
        Transition::Fault,
        Transition::Complete,
        Transition::Terminate,
        Transition::Exit,
        Transition::Occur,
        Transition::ParentSuspend,
        Transition::ParentResume,
        Transition::ParentTerminate,
        Transition::Close,
    ];
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMachine {
    EventMilestone,
    TaskStage,
    CasePlan,
}

impl StateMachine {
    /// Target state of `transition` from `from`, or `None` when illegal.
    /// `history` is the state before the last suspension.
    pub fn target(self, from: State, transition: Transition, history: State) -> Option<State> {
        use State::*;
        use Transition as T;
        match self {
            StateMachine::EventMilestone => match (transition, from) {
                (T::Create, Null) => Some(Available),
                (T::Suspend | T::ParentSuspend, Available) => Some(Suspended),
                (T::Terminate, Available) => Some(Terminated),
                (T::Occur, Available) => Some(Completed),
                (T::Resume | T::ParentResume, Suspended) => Some(Available),
                (T::ParentTerminate, Available | Suspended) => Some(Terminated),
                _ => None,
            },
            StateMachine::TaskStage => match (transition, from) {
                (T::Create, Null) => Some(Available),
                (T::Enable, Available) => Some(Enabled),
                (T::Start, Available) => Some(Active),
                (T::Disable, Enabled) => Some(Disabled),
                (T::ManualStart, Enabled) => Some(Active),
                (T::Reenable, Disabled) => Some(Enabled),
                (T::Suspend, Active) => Some(Suspended),
                (T::Resume, Suspended) => Some(Active),
                (T::Fault, Active) => Some(Failed),
                (T::Reactivate, Failed) => Some(Active),
                (T::Complete, Active) => Some(Completed),
                (T::Terminate, Active) => Some(Terminated),
                (T::Exit, Available | Active | Enabled | Disabled | Suspended | Failed) => Some(Terminated),
                (T::ParentSuspend, Available | Active | Enabled | Disabled) => Some(Suspended),
                (T::ParentResume, Suspended) => Some(if history == Null { Available } else { history }),
                _ => None,
            },
            StateMachine::CasePlan => match (transition, from) {
                (T::Create, Null) => Some(Active),
                (T::Suspend, Active) => Some(Suspended),
                (T::Terminate, Active) => Some(Terminated),
                (T::Complete, Active) => Some(Completed),
                (T::Fault, Active) => Some(Failed),
                (T::Reactivate, Completed | Terminated | Failed | Suspended) => Some(Active),
                (T::Close, Completed | Terminated | Failed | Suspended) => Some(Closed),
                _ => None,
            },
        }
    }

    /// Transition a parent (or exit criterion) uses to end the item.
    pub fn exit_transition(self) -> Transition {
        match self {
            StateMachine::EventMilestone => Transition::ParentTerminate,
            StateMachine::TaskStage => Transition::Exit,
            StateMachine::CasePlan => Transition::Terminate,
        }
    }
}

#[cfg(test)]
#[path = "tests/state_machine_tests.rs"]
mod tests;
