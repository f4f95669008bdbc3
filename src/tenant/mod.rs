//! Tenant actors: the users of a tenant, their roles and who owns it.

use crate::actormodel::errors::CommandError;
use crate::actormodel::event::EventPayload;
use crate::actormodel::message::{CommandPayload, ModelCommand};
use crate::actormodel::registry::{EngineRegistries, FamilyRegistries};
use crate::actormodel::services::EngineServices;
use crate::actormodel::types::{ActorType, UserIdentity};
use crate::actormodel::ModelAggregate;
use crate::serialization::Manifested;
use async_trait::async_trait;
use cqrs_es::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type TenantMessage = ModelCommand<TenantCommand>;

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUser {
    pub user_id: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub owner: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl TenantUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: BTreeSet::new(),
            owner: false,
            enabled: true,
        }
    }

    pub fn owner(mut self) -> Self {
        self.owner = true;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    fn is_active_owner(&self) -> bool {
        self.owner && self.enabled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum TenantCommand {
    CreateTenant {
        name: String,
        users: Vec<TenantUser>,
    },
    SetTenantUser {
        user: TenantUser,
    },
    RemoveTenantUser {
        user_id: String,
    },
    DisableTenant,
    EnableTenant,
}

impl CommandPayload for TenantCommand {
    fn manifest(&self) -> &'static str {
        match self {
            Self::CreateTenant { .. } => "CreateTenant",
            Self::SetTenantUser { .. } => "SetTenantUser",
            Self::RemoveTenantUser { .. } => "RemoveTenantUser",
            Self::DisableTenant => "DisableTenant",
            Self::EnableTenant => "EnableTenant",
        }
    }

    fn manifests() -> &'static [&'static str] {
        &[
            "CreateTenant",
            "SetTenantUser",
            "RemoveTenantUser",
            "DisableTenant",
            "EnableTenant",
        ]
    }

    fn is_bootstrap(&self) -> bool {
        matches!(self, Self::CreateTenant { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "manifest")]
pub enum TenantEvent {
    TenantCreated { name: String },
    TenantUserSet { user: TenantUser },
    TenantUserRemoved { user_id: String },
    TenantDisabled,
    TenantEnabled,
}

impl Manifested for TenantEvent {
    fn manifest(&self) -> &'static str {
        match self {
            Self::TenantCreated { .. } => "TenantCreated",
            Self::TenantUserSet { .. } => "TenantUserSet",
            Self::TenantUserRemoved { .. } => "TenantUserRemoved",
            Self::TenantDisabled => "TenantDisabled",
            Self::TenantEnabled => "TenantEnabled",
        }
    }
}

impl DomainEvent for TenantEvent {
    fn event_type(&self) -> String {
        self.manifest().to_string()
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}

impl EventPayload for TenantEvent {
    fn manifests() -> &'static [&'static str] {
        &[
            "TenantCreated",
            "TenantUserSet",
            "TenantUserRemoved",
            "TenantDisabled",
            "TenantEnabled",
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    name: Option<String>,
    users: BTreeMap<String, TenantUser>,
    disabled: bool,
}

const NEEDS_OWNER: &str = "The tenant needs to have at least one owner";

impl Tenant {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn user(&self, user_id: &str) -> Option<&TenantUser> {
        self.users.get(user_id)
    }

    pub fn users(&self) -> impl Iterator<Item = &TenantUser> {
        self.users.values()
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn is_owner(&self, user: &UserIdentity) -> bool {
        self.users.get(&user.user_id).is_some_and(TenantUser::is_active_owner)
    }

    fn owners_after(&self, user_id: &str, replacement: Option<&TenantUser>) -> usize {
        self.users
            .values()
            .filter(|u| u.user_id != user_id && u.is_active_owner())
            .count()
            + replacement.is_some_and(TenantUser::is_active_owner) as usize
    }

    fn require_owner(&self, user: &UserIdentity) -> Result<(), CommandError> {
        if self.is_owner(user) {
            Ok(())
        } else {
            Err(CommandError::unauthorized(format!(
                "User '{}' is not an owner of tenant '{}'",
                user.user_id,
                self.name.as_deref().unwrap_or_default()
            )))
        }
    }
}

#[async_trait]
impl Aggregate for Tenant {
    type Command = TenantMessage;
    type Event = TenantEvent;
    type Error = CommandError;
    type Services = EngineServices;

    fn aggregate_type() -> String {
        ActorType::Tenant.as_str().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let ModelCommand { metadata, command } = command;
        if let TenantCommand::CreateTenant { name, users } = command {
            if name.trim().is_empty() {
                return Err(CommandError::invalid("A tenant needs a name"));
            }
            if !users.iter().any(TenantUser::is_active_owner) {
                return Err(CommandError::invalid(NEEDS_OWNER));
            }
            let mut events = vec![TenantEvent::TenantCreated { name }];
            events.extend(users.into_iter().map(|user| TenantEvent::TenantUserSet { user }));
            return Ok(events);
        }

        self.require_owner(&metadata.user)?;
        match command {
            TenantCommand::CreateTenant { .. } => Ok(Vec::new()),
            TenantCommand::SetTenantUser { user } => {
                if self.users.get(&user.user_id) == Some(&user) {
                    return Ok(Vec::new());
                }
                if self.owners_after(&user.user_id, Some(&user)) == 0 {
                    return Err(CommandError::invalid(NEEDS_OWNER));
                }
                Ok(vec![TenantEvent::TenantUserSet { user }])
            }
            TenantCommand::RemoveTenantUser { user_id } => {
                if !self.users.contains_key(&user_id) {
                    return Err(CommandError::invalid(format!(
                        "Tenant '{}' has no user '{}'",
                        self.name.as_deref().unwrap_or_default(),
                        user_id
                    )));
                }
                if self.owners_after(&user_id, None) == 0 {
                    return Err(CommandError::invalid(NEEDS_OWNER));
                }
                Ok(vec![TenantEvent::TenantUserRemoved { user_id }])
            }
            TenantCommand::DisableTenant if self.disabled => Ok(Vec::new()),
            TenantCommand::DisableTenant => Ok(vec![TenantEvent::TenantDisabled]),
            TenantCommand::EnableTenant if !self.disabled => Ok(Vec::new()),
            TenantCommand::EnableTenant => Ok(vec![TenantEvent::TenantEnabled]),
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            TenantEvent::TenantCreated { name } => self.name = Some(name),
            TenantEvent::TenantUserSet { user } => {
                self.users.insert(user.user_id.clone(), user);
            }
            TenantEvent::TenantUserRemoved { user_id } => {
                self.users.remove(&user_id);
            }
            TenantEvent::TenantDisabled => self.disabled = true,
            TenantEvent::TenantEnabled => self.disabled = false,
        }
    }
}

impl ModelAggregate for Tenant {
    const ACTOR_TYPE: ActorType = ActorType::Tenant;

    fn exists(&self) -> bool {
        self.name.is_some()
    }

    fn registries(all: &EngineRegistries) -> &FamilyRegistries<Self> {
        &all.tenant
    }
}

#[cfg(test)]
#[path = "tests/tenant_tests.rs"]
mod tests;
