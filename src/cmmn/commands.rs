//! Case commands.

use crate::actormodel::message::{CommandPayload, ModelCommand};
use crate::actormodel::types::ActorId;
use crate::cmmn::state_machine::Transition;
use crate::cmmn::team::Member;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type CaseMessage = ModelCommand<CaseCommand>;

/// The case and task a sub-case reports back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub case_id: ActorId,
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum CaseCommand {
    StartCase {
        /// Name of the definition in the definition repository.
        definition: String,
        #[serde(default)]
        input: Value,
        /// Initial team. The starting user becomes owner when empty.
        #[serde(default)]
        team: Vec<Member>,
        #[serde(default)]
        parent: Option<ParentLink>,
    },
    MakePlanItemTransition {
        /// Plan item id, or a name matching every item with that name.
        identifier: String,
        transition: Transition,
    },
    CompleteHumanTask {
        task_id: String,
        #[serde(default)]
        output: Value,
    },
    /// Callback from a sub-case or process.
    CompleteTask {
        task_id: String,
        #[serde(default)]
        output: Value,
    },
    /// Callback from a sub-case or process.
    FailTask {
        task_id: String,
        #[serde(default)]
        output: Value,
    },
    /// Hands an active human task to a team member.
    AssignTask {
        task_id: String,
        assignee: String,
    },
    ClaimTask {
        task_id: String,
    },
    /// Returns an assigned task to the unassigned pool.
    RevokeTask {
        task_id: String,
    },
    GetDiscretionaryItems,
    AddDiscretionaryItem {
        /// Definition name of the discretionary item.
        name: String,
        /// Stage to plan it in.
        parent_id: String,
        #[serde(default)]
        plan_item_id: Option<String>,
    },
    CreateCaseFileItem { path: String, value: Value },
    UpdateCaseFileItem { path: String, value: Value },
    ReplaceCaseFileItem { path: String, value: Value },
    DeleteCaseFileItem { path: String },
    SetCaseTeamUser {
        user_id: String,
        #[serde(default)]
        roles: BTreeSet<String>,
        #[serde(default)]
        owner: bool,
    },
    SetCaseTeamGroup {
        group_id: String,
        #[serde(default)]
        roles: BTreeSet<String>,
        #[serde(default)]
        owner: bool,
    },
    SetCaseTeamTenantRole {
        tenant_role: String,
        #[serde(default)]
        roles: BTreeSet<String>,
        #[serde(default)]
        owner: bool,
    },
    RemoveCaseTeamUser { user_id: String },
    RemoveCaseTeamGroup { group_id: String },
    RemoveCaseTeamTenantRole { tenant_role: String },
    SetCaseTeam { members: Vec<Member> },
}

const CASE_COMMAND_MANIFESTS: &[&str] = &[
    "StartCase",
    "MakePlanItemTransition",
    "CompleteHumanTask",
    "CompleteTask",
    "FailTask",
    "AssignTask",
    "ClaimTask",
    "RevokeTask",
    "GetDiscretionaryItems",
    "AddDiscretionaryItem",
    "CreateCaseFileItem",
    "UpdateCaseFileItem",
    "ReplaceCaseFileItem",
    "DeleteCaseFileItem",
    "SetCaseTeamUser",
    "SetCaseTeamGroup",
    "SetCaseTeamTenantRole",
    "RemoveCaseTeamUser",
    "RemoveCaseTeamGroup",
    "RemoveCaseTeamTenantRole",
    "SetCaseTeam",
];

impl CaseCommand {
    /// Commands that change the team.
    pub fn is_team_command(&self) -> bool {
        matches!(
            self,
            Self::SetCaseTeamUser { .. }
                | Self::SetCaseTeamGroup { .. }
                | Self::SetCaseTeamTenantRole { .. }
                | Self::RemoveCaseTeamUser { .. }
                | Self::RemoveCaseTeamGroup { .. }
                | Self::RemoveCaseTeamTenantRole { .. }
                | Self::SetCaseTeam { .. }
        )
    }

    /// Commands any team member may send.
    pub fn requires_membership(&self) -> bool {
        !matches!(
            self,
            Self::StartCase { .. }
                | Self::MakePlanItemTransition { .. }
                | Self::CompleteHumanTask { .. }
                | Self::CompleteTask { .. }
                | Self::FailTask { .. }
        )
    }
}

impl CommandPayload for CaseCommand {
    fn manifest(&self) -> &'static str {
        match self {
            Self::StartCase { .. } => "StartCase",
            Self::MakePlanItemTransition { .. } => "MakePlanItemTransition",
            Self::CompleteHumanTask { .. } => "CompleteHumanTask",
            Self::CompleteTask { .. } => "CompleteTask",
            Self::FailTask { .. } => "FailTask",
            Self::AssignTask { .. } => "AssignTask",
            Self::ClaimTask { .. } => "ClaimTask",
            Self::RevokeTask { .. } => "RevokeTask",
            Self::GetDiscretionaryItems => "GetDiscretionaryItems",
            Self::AddDiscretionaryItem { .. } => "AddDiscretionaryItem",
            Self::CreateCaseFileItem { .. } => "CreateCaseFileItem",
            Self::UpdateCaseFileItem { .. } => "UpdateCaseFileItem",
            Self::ReplaceCaseFileItem { .. } => "ReplaceCaseFileItem",
            Self::DeleteCaseFileItem { .. } => "DeleteCaseFileItem",
            Self::SetCaseTeamUser { .. } => "SetCaseTeamUser",
            Self::SetCaseTeamGroup { .. } => "SetCaseTeamGroup",
            Self::SetCaseTeamTenantRole { .. } => "SetCaseTeamTenantRole",
            Self::RemoveCaseTeamUser { .. } => "RemoveCaseTeamUser",
            Self::RemoveCaseTeamGroup { .. } => "RemoveCaseTeamGroup",
            Self::RemoveCaseTeamTenantRole { .. } => "RemoveCaseTeamTenantRole",
            Self::SetCaseTeam { .. } => "SetCaseTeam",
        }
    }

    fn manifests() -> &'static [&'static str] {
        CASE_COMMAND_MANIFESTS
    }

    fn is_bootstrap(&self) -> bool {
        matches!(self, Self::StartCase { .. })
    }
}
