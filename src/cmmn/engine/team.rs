//! Case team changes inside a case transaction.

use super::CaseTransaction;
use crate::actormodel::errors::CommandError;
use crate::cmmn::events::CaseEvent;
use crate::cmmn::team::{CaseTeam, Member, MemberKey};
use std::collections::BTreeSet;

impl CaseTransaction<'_> {
    pub(super) fn set_member(&mut self, key: MemberKey, roles: BTreeSet<String>, owner: bool) -> Result<(), CommandError> {
        let definition = self.definition()?;
        let member = Member {
            key,
            case_roles: roles,
            owner,
        };
        self.case.team().validate_set(&member, &definition)?;
        self.put_member(member);
        Ok(())
    }

    pub(super) fn remove_member(&mut self, key: MemberKey) -> Result<(), CommandError> {
        self.case.team().validate_remove(&key)?;
        self.emit(CaseEvent::TeamMemberRemoved { key });
        Ok(())
    }

    /// Removes members missing from `members`, then sets the rest.
    pub(super) fn set_team(&mut self, members: Vec<Member>) -> Result<(), CommandError> {
        let definition = self.definition()?;
        CaseTeam::validate_new_team(&members, &definition)?;
        let keep: BTreeSet<&MemberKey> = members.iter().map(|m| &m.key).collect();
        let removed: Vec<MemberKey> = self
            .case
            .team()
            .members()
            .filter(|m| !keep.contains(&m.key))
            .map(|m| m.key.clone())
            .collect();
        for key in removed {
            self.emit(CaseEvent::TeamMemberRemoved { key });
        }
        for member in members {
            self.put_member(member);
        }
        Ok(())
    }

    pub(super) fn put_member(&mut self, member: Member) {
        let existing = self.case.team().get(&member.key).cloned();
        match existing {
            Some(existing) if existing == member => {}
            Some(_) => self.emit(CaseEvent::TeamMemberChanged { member }),
            None => self.emit(CaseEvent::TeamMemberAdded { member }),
        }
    }
}
