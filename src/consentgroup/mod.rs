//! Consent groups: named sets of users that can join case teams as one
//! member. A group belongs to the tenant it was created in.

use crate::actormodel::errors::CommandError;
use crate::actormodel::event::EventPayload;
use crate::actormodel::message::{CommandPayload, ModelCommand};
use crate::actormodel::registry::{EngineRegistries, FamilyRegistries};
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::{ActorType, TenantId, UserIdentity};
use crate::actormodel::ModelAggregate;
use crate::serialization::Manifested;
use async_trait::async_trait;
use cqrs_es::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type ConsentGroupMessage = ModelCommand<ConsentGroupCommand>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentGroupMember {
    pub user_id: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub owner: bool,
}

impl ConsentGroupMember {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: BTreeSet::new(),
            owner: false,
        }
    }

    pub fn owner(mut self) -> Self {
        self.owner = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum ConsentGroupCommand {
    CreateConsentGroup { members: Vec<ConsentGroupMember> },
    SetConsentGroupMember { member: ConsentGroupMember },
    RemoveConsentGroupMember { user_id: String },
}

impl CommandPayload for ConsentGroupCommand {
    fn manifest(&self) -> &'static str {
        match self {
            Self::CreateConsentGroup { .. } => "CreateConsentGroup",
            Self::SetConsentGroupMember { .. } => "SetConsentGroupMember",
            Self::RemoveConsentGroupMember { .. } => "RemoveConsentGroupMember",
        }
    }

    fn manifests() -> &'static [&'static str] {
        &[
            "CreateConsentGroup",
            "SetConsentGroupMember",
            "RemoveConsentGroupMember",
        ]
    }

    fn is_bootstrap(&self) -> bool {
        matches!(self, Self::CreateConsentGroup { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum ConsentGroupEvent {
    ConsentGroupCreated { tenant: Option<TenantId> },
    ConsentGroupMemberAdded { member: ConsentGroupMember },
    ConsentGroupMemberChanged { member: ConsentGroupMember },
    ConsentGroupMemberRemoved { user_id: String },
}

impl Manifested for ConsentGroupEvent {
    fn manifest(&self) -> &'static str {
        match self {
            Self::ConsentGroupCreated { .. } => "ConsentGroupCreated",
            Self::ConsentGroupMemberAdded { .. } => "ConsentGroupMemberAdded",
            Self::ConsentGroupMemberChanged { .. } => "ConsentGroupMemberChanged",
            Self::ConsentGroupMemberRemoved { .. } => "ConsentGroupMemberRemoved",
        }
    }
}

impl DomainEvent for ConsentGroupEvent {
    fn event_type(&self) -> String {
        self.manifest().to_string()
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}

impl EventPayload for ConsentGroupEvent {
    fn manifests() -> &'static [&'static str] {
        &[
            "ConsentGroupCreated",
            "ConsentGroupMemberAdded",
            "ConsentGroupMemberChanged",
            "ConsentGroupMemberRemoved",
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentGroup {
    created: bool,
    tenant: Option<TenantId>,
    members: BTreeMap<String, ConsentGroupMember>,
}

const NEEDS_OWNER: &str = "The consent group needs to have at least one owner";

impl ConsentGroup {
    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    pub fn member(&self, user_id: &str) -> Option<&ConsentGroupMember> {
        self.members.get(user_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &ConsentGroupMember> {
        self.members.values()
    }

    pub fn is_owner(&self, user: &UserIdentity) -> bool {
        self.members.get(&user.user_id).is_some_and(|m| m.owner)
    }

    fn owners_after(&self, user_id: &str, replacement: Option<&ConsentGroupMember>) -> usize {
        self.members
            .values()
            .filter(|m| m.user_id != user_id && m.owner)
            .count()
            + replacement.is_some_and(|m| m.owner) as usize
    }
}

#[async_trait]
impl Aggregate for ConsentGroup {
    type Command = ConsentGroupMessage;
    type Event = ConsentGroupEvent;
    type Error = CommandError;
    type Services = EngineServices;

    fn aggregate_type() -> String {
        ActorType::ConsentGroup.as_str().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let ModelCommand { metadata, command } = command;
        match command {
            ConsentGroupCommand::CreateConsentGroup { members } => {
                if !members.iter().any(|m| m.owner) {
                    return Err(CommandError::invalid(NEEDS_OWNER));
                }
                let mut events = vec![ConsentGroupEvent::ConsentGroupCreated {
                    tenant: metadata.tenant,
                }];
                events.extend(
                    members
                        .into_iter()
                        .map(|member| ConsentGroupEvent::ConsentGroupMemberAdded { member }),
                );
                Ok(events)
            }
            other => {
                if !self.is_owner(&metadata.user) {
                    return Err(CommandError::unauthorized(
                        "Only consent group owners can change the consent group",
                    ));
                }
                match other {
                    ConsentGroupCommand::SetConsentGroupMember { member } => {
                        let existing = self.members.get(&member.user_id);
                        if existing == Some(&member) {
                            return Ok(Vec::new());
                        }
                        if self.owners_after(&member.user_id, Some(&member)) == 0 {
                            return Err(CommandError::invalid(NEEDS_OWNER));
                        }
                        Ok(vec![match existing {
                            Some(_) => ConsentGroupEvent::ConsentGroupMemberChanged { member },
                            None => ConsentGroupEvent::ConsentGroupMemberAdded { member },
                        }])
                    }
                    ConsentGroupCommand::RemoveConsentGroupMember { user_id } => {
                        if !self.members.contains_key(&user_id) {
                            return Err(CommandError::invalid(format!(
                                "The consent group has no member '{}'",
                                user_id
                            )));
                        }
                        if self.owners_after(&user_id, None) == 0 {
                            return Err(CommandError::invalid(NEEDS_OWNER));
                        }
                        Ok(vec![ConsentGroupEvent::ConsentGroupMemberRemoved { user_id }])
                    }
                    ConsentGroupCommand::CreateConsentGroup { .. } => Ok(Vec::new()),
                }
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ConsentGroupEvent::ConsentGroupCreated { tenant } => {
                self.created = true;
                self.tenant = tenant;
            }
            ConsentGroupEvent::ConsentGroupMemberAdded { member }
            | ConsentGroupEvent::ConsentGroupMemberChanged { member } => {
                self.members.insert(member.user_id.clone(), member);
            }
            ConsentGroupEvent::ConsentGroupMemberRemoved { user_id } => {
                self.members.remove(&user_id);
            }
        }
    }
}

impl ModelAggregate for ConsentGroup {
    const ACTOR_TYPE: ActorType = ActorType::ConsentGroup;

    fn exists(&self) -> bool {
        self.created
    }

    fn registries(all: &EngineRegistries) -> &FamilyRegistries<Self> {
        &all.consent_group
    }
}

#[cfg(test)]
#[path = "tests/consentgroup_tests.rs"]
mod tests;
