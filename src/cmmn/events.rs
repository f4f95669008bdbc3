//! Case events.

use crate::actormodel::event::{EventPath, EventPayload};
use crate::actormodel::types::TimestampUtc;
use crate::cmmn::casefile::CaseFileTransition;
use crate::cmmn::commands::ParentLink;
use crate::cmmn::definition::CaseDefinition;
use crate::cmmn::state_machine::{PlanItemType, State, Transition};
use crate::cmmn::team::{Member, MemberKey};
use crate::serialization::Manifested;
use crate::value::Value;
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum CaseEvent {
    CaseDefinitionApplied {
        definition: Box<CaseDefinition>,
        #[serde(default)]
        parent: Option<ParentLink>,
    },
    PlanItemCreated {
        plan_item_id: String,
        name: String,
        definition_id: String,
        item_type: PlanItemType,
        index: u32,
        stage_id: Option<String>,
    },
    PlanItemTransitioned {
        plan_item_id: String,
        from: State,
        to: State,
        history_state: State,
        transition: Transition,
    },
    RequiredRuleEvaluated {
        plan_item_id: String,
        required: bool,
    },
    RepetitionRuleEvaluated {
        plan_item_id: String,
        repeats: bool,
    },
    TaskOutputFilled {
        plan_item_id: String,
        output: Value,
    },
    /// Set by a case owner or a team member on behalf of someone else.
    HumanTaskAssigned {
        plan_item_id: String,
        assignee: String,
    },
    HumanTaskClaimed {
        plan_item_id: String,
        assignee: String,
    },
    HumanTaskRevoked {
        plan_item_id: String,
    },
    CaseFileItemTransitioned {
        path: String,
        transition: CaseFileTransition,
        value: Value,
    },
    CaseFileBootstrapReleased,
    TeamMemberAdded {
        member: Member,
    },
    TeamMemberChanged {
        member: Member,
    },
    TeamMemberRemoved {
        key: MemberKey,
    },
    CaseModified {
        last_modified: TimestampUtc,
        active_items: usize,
    },
}

const CASE_EVENT_MANIFESTS: &[&str] = &[
    "CaseDefinitionApplied",
    "PlanItemCreated",
    "PlanItemTransitioned",
    "RequiredRuleEvaluated",
    "RepetitionRuleEvaluated",
    "TaskOutputFilled",
    "HumanTaskAssigned",
    "HumanTaskClaimed",
    "HumanTaskRevoked",
    "CaseFileItemTransitioned",
    "CaseFileBootstrapReleased",
    "TeamMemberAdded",
    "TeamMemberChanged",
    "TeamMemberRemoved",
    "CaseModified",
];

impl CaseEvent {
    /// The part of the case the event updates.
    pub fn path(&self) -> EventPath {
        match self {
            Self::PlanItemCreated { plan_item_id, .. }
            | Self::PlanItemTransitioned { plan_item_id, .. }
            | Self::RequiredRuleEvaluated { plan_item_id, .. }
            | Self::RepetitionRuleEvaluated { plan_item_id, .. }
            | Self::TaskOutputFilled { plan_item_id, .. }
            | Self::HumanTaskAssigned { plan_item_id, .. }
            | Self::HumanTaskClaimed { plan_item_id, .. }
            | Self::HumanTaskRevoked { plan_item_id } => EventPath::PlanItem(plan_item_id.clone()),
            Self::CaseFileItemTransitioned { path, .. } => EventPath::CaseFile(path.clone()),
            Self::TeamMemberAdded { member } | Self::TeamMemberChanged { member } => {
                EventPath::TeamMember(member.key.to_string())
            }
            Self::TeamMemberRemoved { key } => EventPath::TeamMember(key.to_string()),
            Self::CaseDefinitionApplied { .. }
            | Self::CaseFileBootstrapReleased
            | Self::CaseModified { .. } => EventPath::Actor,
        }
    }
}

impl Manifested for CaseEvent {
    fn manifest(&self) -> &'static str {
        match self {
            Self::CaseDefinitionApplied { .. } => "CaseDefinitionApplied",
            Self::PlanItemCreated { .. } => "PlanItemCreated",
            Self::PlanItemTransitioned { .. } => "PlanItemTransitioned",
            Self::RequiredRuleEvaluated { .. } => "RequiredRuleEvaluated",
            Self::RepetitionRuleEvaluated { .. } => "RepetitionRuleEvaluated",
            Self::TaskOutputFilled { .. } => "TaskOutputFilled",
            Self::HumanTaskAssigned { .. } => "HumanTaskAssigned",
            Self::HumanTaskClaimed { .. } => "HumanTaskClaimed",
            Self::HumanTaskRevoked { .. } => "HumanTaskRevoked",
            Self::CaseFileItemTransitioned { .. } => "CaseFileItemTransitioned",
            Self::CaseFileBootstrapReleased => "CaseFileBootstrapReleased",
            Self::TeamMemberAdded { .. } => "TeamMemberAdded",
            Self::TeamMemberChanged { .. } => "TeamMemberChanged",
            Self::TeamMemberRemoved { .. } => "TeamMemberRemoved",
            Self::CaseModified { .. } => "CaseModified",
        }
    }
}

impl DomainEvent for CaseEvent {
    fn event_type(&self) -> String {
        self.manifest().to_string()
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}

impl EventPayload for CaseEvent {
    fn manifests() -> &'static [&'static str] {
        CASE_EVENT_MANIFESTS
    }

    fn is_commit_event(&self) -> bool {
        matches!(self, Self::CaseModified { .. })
    }
}
