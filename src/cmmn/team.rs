//! The case team: users, consent groups and tenant roles with case roles.

use crate::actormodel::errors::CommandError;
use crate::actormodel::types::UserIdentity;
use crate::cmmn::definition::CaseDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MemberKey {
    User(String),
    Group(String),
    TenantRole(String),
}

impl std::fmt::Display for MemberKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberKey::User(id) => write!(f, "user '{}'", id),
            MemberKey::Group(id) => write!(f, "group '{}'", id),
            MemberKey::TenantRole(id) => write!(f, "tenant role '{}'", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub key: MemberKey,
    #[serde(default)]
    pub case_roles: BTreeSet<String>,
    #[serde(default)]
    pub owner: bool,
}

impl Member {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            key: MemberKey::User(user_id.into()),
            case_roles: BTreeSet::new(),
            owner: false,
        }
    }

    pub fn owner(mut self) -> Self {
        self.owner = true;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.case_roles.insert(role.into());
        self
    }

    /// Whether this membership covers the user.
    pub fn covers(&self, user: &UserIdentity) -> bool {
        match &self.key {
            MemberKey::User(id) => *id == user.user_id,
            MemberKey::Group(id) => user.groups.contains(id),
            MemberKey::TenantRole(role) => user.tenant_roles.contains(role),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CaseTeam {
    users: BTreeMap<String, Member>,
    groups: BTreeMap<String, Member>,
    tenant_roles: BTreeMap<String, Member>,
}

impl CaseTeam {
    fn bucket(&self, key: &MemberKey) -> (&BTreeMap<String, Member>, String) {
        match key {
            MemberKey::User(id) => (&self.users, id.clone()),
            MemberKey::Group(id) => (&self.groups, id.clone()),
            MemberKey::TenantRole(id) => (&self.tenant_roles, id.clone()),
        }
    }

    fn bucket_mut(&mut self, key: &MemberKey) -> (&mut BTreeMap<String, Member>, String) {
        match key {
            MemberKey::User(id) => (&mut self.users, id.clone()),
            MemberKey::Group(id) => (&mut self.groups, id.clone()),
            MemberKey::TenantRole(id) => (&mut self.tenant_roles, id.clone()),
        }
    }

    pub fn get(&self, key: &MemberKey) -> Option<&Member> {
        let (bucket, id) = self.bucket(key);
        bucket.get(&id)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.users
            .values()
            .chain(self.groups.values())
            .chain(self.tenant_roles.values())
    }

    pub fn is_empty(&self) -> bool {
        self.members().next().is_none()
    }

    pub fn owner_count(&self) -> usize {
        self.members().filter(|m| m.owner).count()
    }

    pub fn is_member(&self, user: &UserIdentity) -> bool {
        self.members().any(|m| m.covers(user))
    }

    pub fn is_owner(&self, user: &UserIdentity) -> bool {
        self.members().any(|m| m.owner && m.covers(user))
    }

    /// Case roles the user holds through any of its memberships.
    pub fn roles_of(&self, user: &UserIdentity) -> BTreeSet<String> {
        self.members()
            .filter(|m| m.covers(user))
            .flat_map(|m| m.case_roles.iter().cloned())
            .collect()
    }

    pub fn has_any_role(&self, user: &UserIdentity, roles: &BTreeSet<String>) -> bool {
        roles.is_empty() || !self.roles_of(user).is_disjoint(roles)
    }

    pub(crate) fn put(&mut self, member: Member) {
        let (bucket, id) = self.bucket_mut(&member.key);
        bucket.insert(id, member);
    }

    pub(crate) fn remove(&mut self, key: &MemberKey) {
        let (bucket, id) = self.bucket_mut(key);
        bucket.remove(&id);
    }

    /// Owners left if `key` were replaced by `replacement`.
    fn owners_after(&self, key: &MemberKey, replacement: Option<&Member>) -> usize {
        let current = self.get(key).is_some_and(|m| m.owner) as usize;
        let next = replacement.is_some_and(|m| m.owner) as usize;
        self.owner_count() - current + next
    }

    /// Checks before `member` is added or changed.
    pub fn validate_set(&self, member: &Member, definition: &CaseDefinition) -> Result<(), CommandError> {
        if let Some(role) = member.case_roles.iter().find(|r| !definition.defines_role(r)) {
            return Err(CommandError::team(format!(
                "Role '{}' is not defined in the case definition",
                role
            )));
        }
        if self.owners_after(&member.key, Some(member)) == 0 {
            return Err(CommandError::team("The case team needs to have at least one owner"));
        }
        Ok(())
    }

    /// Checks before the member under `key` is removed.
    pub fn validate_remove(&self, key: &MemberKey) -> Result<(), CommandError> {
        if self.get(key).is_none() {
            return Err(CommandError::team(format!("The case team has no {}", key)));
        }
        if self.owners_after(key, None) == 0 {
            return Err(CommandError::team("The case team needs to have at least one owner"));
        }
        Ok(())
    }

    /// Checks a complete replacement team.
    pub fn validate_new_team(members: &[Member], definition: &CaseDefinition) -> Result<(), CommandError> {
        if members.is_empty() {
            return Err(CommandError::team("The new case team cannot be empty"));
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = members.iter().find(|m| !seen.insert(&m.key)) {
            return Err(CommandError::team(format!(
                "The new case team lists {} more than once",
                duplicate.key
            )));
        }
        if !members.iter().any(|m| m.owner) {
            return Err(CommandError::team("The new case team must have owners"));
        }
        for member in members {
            if let Some(role) = member.case_roles.iter().find(|r| !definition.defines_role(r)) {
                return Err(CommandError::team(format!(
                    "Role '{}' is not defined in the case definition",
                    role
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/team_tests.rs"]
mod tests;
