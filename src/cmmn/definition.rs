//! Case definitions.
//!
//! A definition is a serde model read from YAML or JSON. It is embedded in
//! the case's first event, so replay never depends on the repository.

use crate::actormodel::errors::CommandError;
use crate::cmmn::casefile::{CaseFilePath, CaseFileTransition};
use crate::cmmn::expression::parse_duration;
use crate::cmmn::state_machine::{PlanItemType, Transition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Role catalog; team members can only hold these roles.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub case_file: Vec<CaseFileItemDefinition>,
    /// The case plan. Its kind must be a stage.
    pub plan: PlanItemDefinition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    #[default]
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Multiplicity {
    pub fn is_many(self) -> bool {
        matches!(self, Multiplicity::ZeroOrMore | Multiplicity::OneOrMore)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFileItemDefinition {
    pub name: String,
    #[serde(default)]
    pub multiplicity: Multiplicity,
    #[serde(default)]
    pub children: Vec<CaseFileItemDefinition>,
}

impl CaseFileItemDefinition {
    pub fn child(&self, name: &str) -> Option<&CaseFileItemDefinition> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// A rule with an optional condition. A missing condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuleDefinition {
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    pub id: String,
    #[serde(default)]
    pub on_parts: Vec<OnPartDefinition>,
    #[serde(default)]
    pub if_part: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum OnPartDefinition {
    /// Fires on a transition of any plan item with this definition id.
    PlanItem { item: String, event: Transition },
    /// Fires on a transition of a case-file item, by definition path.
    CaseFile { path: String, event: CaseFileTransition },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlanItemKind {
    Stage {
        #[serde(default)]
        autocomplete: bool,
        #[serde(default)]
        items: Vec<PlanItemDefinition>,
    },
    HumanTask {
        #[serde(default)]
        performer: Option<String>,
    },
    CaseTask {
        /// Name of the sub-case definition.
        case: String,
    },
    ProcessTask {
        /// Name of the registered process implementation.
        process: String,
    },
    Milestone,
    UserEvent,
    TimerEvent {
        /// ISO 8601 duration after which the timer occurs.
        duration: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItemDefinition {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: PlanItemKind,
    #[serde(default)]
    pub entry_criteria: Vec<CriterionDefinition>,
    #[serde(default)]
    pub exit_criteria: Vec<CriterionDefinition>,
    #[serde(default)]
    pub required: Option<RuleDefinition>,
    #[serde(default)]
    pub repetition: Option<RuleDefinition>,
    #[serde(default)]
    pub manual_activation: Option<RuleDefinition>,
    /// Discretionary items are only planned on request.
    #[serde(default)]
    pub discretionary: bool,
    #[serde(default)]
    pub applicability: Option<String>,
    /// Roles that may plan a discretionary item or raise a user event.
    #[serde(default)]
    pub authorized_roles: BTreeSet<String>,
}

impl PlanItemDefinition {
    pub fn item_type(&self) -> PlanItemType {
        match &self.kind {
            PlanItemKind::Stage { .. } => PlanItemType::Stage,
            PlanItemKind::HumanTask { .. } => PlanItemType::HumanTask,
            PlanItemKind::CaseTask { .. } => PlanItemType::CaseTask,
            PlanItemKind::ProcessTask { .. } => PlanItemType::ProcessTask,
            PlanItemKind::Milestone => PlanItemType::Milestone,
            PlanItemKind::UserEvent => PlanItemType::UserEvent,
            PlanItemKind::TimerEvent { .. } => PlanItemType::TimerEvent,
        }
    }

    pub fn children(&self) -> &[PlanItemDefinition] {
        match &self.kind {
            PlanItemKind::Stage { items, .. } => items,
            _ => &[],
        }
    }

    pub fn autocomplete(&self) -> bool {
        matches!(self.kind, PlanItemKind::Stage { autocomplete: true, .. })
    }

    fn walk<'a>(&'a self, into: &mut Vec<&'a PlanItemDefinition>) {
        into.push(self);
        for child in self.children() {
            child.walk(into);
        }
    }
}

impl CaseDefinition {
    /// Every plan item definition, the case plan first.
    pub fn items(&self) -> Vec<&PlanItemDefinition> {
        let mut all = Vec::new();
        self.plan.walk(&mut all);
        all
    }

    pub fn item(&self, definition_id: &str) -> Option<&PlanItemDefinition> {
        self.items().into_iter().find(|d| d.id == definition_id)
    }

    /// The definition of the stage that declares `definition_id`.
    pub fn parent_of(&self, definition_id: &str) -> Option<&PlanItemDefinition> {
        self.items()
            .into_iter()
            .find(|d| d.children().iter().any(|c| c.id == definition_id))
    }

    /// Case-file definition for a concrete or definition path.
    pub fn case_file_item(&self, path: &CaseFilePath) -> Option<&CaseFileItemDefinition> {
        let mut names = path.segments().iter().map(|s| s.name.as_str());
        let first = names.next()?;
        let mut current = self.case_file.iter().find(|d| d.name == first)?;
        for name in names {
            current = current.child(name)?;
        }
        Some(current)
    }

    pub fn defines_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Structural checks before a definition is used.
    pub fn validate(&self) -> Result<(), CommandError> {
        let invalid = |message: String| {
            Err(CommandError::definition(format!(
                "Definition '{}' is invalid: {}",
                self.name, message
            )))
        };
        if self.name.trim().is_empty() {
            return Err(CommandError::definition("Definition has no name"));
        }
        if !matches!(self.plan.kind, PlanItemKind::Stage { .. }) {
            return invalid("the case plan must be a stage".to_string());
        }

        let items = self.items();
        let mut ids = BTreeSet::new();
        for item in &items {
            if !ids.insert(item.id.as_str()) {
                return invalid(format!("plan item id '{}' is used twice", item.id));
            }
        }
        for item in &items {
            for criterion in item.entry_criteria.iter().chain(&item.exit_criteria) {
                for on_part in &criterion.on_parts {
                    match on_part {
                        OnPartDefinition::PlanItem { item: source, .. } => {
                            if !ids.contains(source.as_str()) {
                                return invalid(format!(
                                    "criterion '{}' listens to unknown plan item '{}'",
                                    criterion.id, source
                                ));
                            }
                        }
                        OnPartDefinition::CaseFile { path, .. } => {
                            let parsed = CaseFilePath::parse(path).map_err(|e| {
                                CommandError::definition(format!("Definition '{}' is invalid: {}", self.name, e))
                            })?;
                            if self.case_file_item(&parsed).is_none() {
                                return invalid(format!(
                                    "criterion '{}' listens to unknown case file item '{}'",
                                    criterion.id, path
                                ));
                            }
                        }
                    }
                }
            }
            let mut roles: Vec<&String> = item.authorized_roles.iter().collect();
            match &item.kind {
                PlanItemKind::HumanTask {
                    performer: Some(performer),
                } => roles.push(performer),
                PlanItemKind::TimerEvent { duration } => {
                    if parse_duration(duration).is_err() {
                        return invalid(format!("timer '{}' has an invalid duration '{}'", item.id, duration));
                    }
                }
                _ => {}
            }
            if let Some(role) = roles.into_iter().find(|r| !self.defines_role(r)) {
                return invalid(format!("plan item '{}' refers to undefined role '{}'", item.id, role));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/definition_tests.rs"]
mod tests;
