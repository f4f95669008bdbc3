//! Assignment of human tasks inside a case transaction.

use super::CaseTransaction;
use crate::actormodel::errors::CommandError;
use crate::cmmn::definition::PlanItemKind;
use crate::cmmn::events::CaseEvent;
use crate::cmmn::plan::PlanItem;
use crate::cmmn::state_machine::{PlanItemType, State};
use crate::cmmn::team::{Member, MemberKey};

impl CaseTransaction<'_> {
    /// Owners may assign to anyone and enroll the assignee with the
    /// performer role. Other members may only pick a team user that
    /// already holds the role.
    pub(super) fn assign_task(&mut self, task_id: &str, assignee: String) -> Result<(), CommandError> {
        let task = self.open_task(task_id)?;
        if task.assignee.as_deref() == Some(assignee.as_str()) {
            return Ok(());
        }
        let performer = self.performer(&task)?;
        let key = MemberKey::User(assignee.clone());
        let existing = self.case.team().get(&key).cloned();
        if self.case.team().is_owner(self.user()) {
            let mut member = existing.unwrap_or_else(|| Member::user(assignee.clone()));
            if let Some(role) = performer {
                member.case_roles.insert(role);
            }
            self.put_member(member);
        } else {
            let Some(member) = existing else {
                return Err(CommandError::invalid(format!(
                    "There is no case team member with id '{}'",
                    assignee
                )));
            };
            if let Some(role) = performer {
                if !member.owner && !member.case_roles.contains(&role) {
                    return Err(CommandError::unauthorized(format!(
                        "The case team member with id '{}' does not have the case role {}",
                        assignee, role
                    )));
                }
            }
        }
        self.emit(CaseEvent::HumanTaskAssigned {
            plan_item_id: task.id,
            assignee,
        });
        Ok(())
    }

    pub(super) fn claim_task(&mut self, task_id: &str) -> Result<(), CommandError> {
        let task = self.open_task(task_id)?;
        let user_id = self.user().user_id.clone();
        match task.assignee.as_deref() {
            Some(current) if current == user_id => return Ok(()),
            Some(current) => {
                return Err(CommandError::invalid(format!(
                    "Cannot claim task '{}' because it is assigned to '{}'",
                    task.name, current
                )))
            }
            None => {}
        }
        if let Some(role) = self.performer(&task)? {
            if !self.case.team().roles_of(self.user()).contains(&role) {
                return Err(CommandError::denied(format!(
                    "User '{}' needs the case role {} to claim task '{}'",
                    user_id, role, task.name
                )));
            }
        }
        self.emit(CaseEvent::HumanTaskClaimed {
            plan_item_id: task.id,
            assignee: user_id,
        });
        Ok(())
    }

    /// The assignee gives the task back, or an owner takes it away.
    pub(super) fn revoke_task(&mut self, task_id: &str) -> Result<(), CommandError> {
        let task = self.open_task(task_id)?;
        let Some(current) = task.assignee.as_deref() else {
            return Err(CommandError::invalid(format!("Task '{}' is not assigned", task.name)));
        };
        let user = self.user();
        if current != user.user_id && !self.case.team().is_owner(user) {
            return Err(CommandError::unauthorized(format!(
                "Only '{}' or a case owner can revoke task '{}'",
                current, task.name
            )));
        }
        self.emit(CaseEvent::HumanTaskRevoked { plan_item_id: task.id });
        Ok(())
    }

    /// An active human task.
    fn open_task(&self, task_id: &str) -> Result<PlanItem, CommandError> {
        let task = self.item(task_id)?;
        if task.item_type != PlanItemType::HumanTask {
            return Err(CommandError::invalid(format!("Plan item '{}' is not a human task", task.name)));
        }
        if task.state != State::Active {
            return Err(CommandError::invalid(format!(
                "Cannot change the assignment of task '{}' because it is in state {:?}",
                task.name, task.state
            )));
        }
        Ok(task)
    }

    fn performer(&self, task: &PlanItem) -> Result<Option<String>, CommandError> {
        let definition = self.definition()?;
        Ok(match definition.item(&task.definition_id).map(|d| &d.kind) {
            Some(PlanItemKind::HumanTask { performer }) => performer.clone(),
            _ => None,
        })
    }
}
