//! Runtime criteria and the sentry network connecting them to their sources.
//!
//! On-parts are updated inside `apply`, for the online path and replay
//! alike. Criteria whose on-parts all became active are queued as
//! activations; the engine drains them and decides whether they fire.

use crate::cmmn::casefile::{CaseFile, CaseFilePath, CaseFileTransition};
use crate::cmmn::definition::{CriterionDefinition, OnPartDefinition};
use crate::cmmn::plan::Plan;
use crate::cmmn::state_machine::Transition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum OnPartSource {
    PlanItem { definition_id: String, event: Transition },
    CaseFile { path: String, event: CaseFileTransition },
}

impl OnPartSource {
    fn key(&self) -> String {
        match self {
            OnPartSource::PlanItem { definition_id, .. } => plan_item_key(definition_id),
            OnPartSource::CaseFile { path, .. } => case_file_key(path),
        }
    }
}

fn plan_item_key(definition_id: &str) -> String {
    format!("item:{}", definition_id)
}

fn case_file_key(definition_path: &str) -> String {
    format!("file:{}", definition_path)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnPart {
    pub source: OnPartSource,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub definition_id: String,
    pub kind: CriterionKind,
    /// Plan item the criterion guards.
    pub target: String,
    pub on_parts: Vec<OnPart>,
    pub if_part: Option<String>,
}

impl Criterion {
    pub fn new(target: &str, kind: CriterionKind, definition: &CriterionDefinition) -> Self {
        let on_parts = definition
            .on_parts
            .iter()
            .map(|on_part| OnPart {
                source: match on_part {
                    OnPartDefinition::PlanItem { item, event } => OnPartSource::PlanItem {
                        definition_id: item.clone(),
                        event: *event,
                    },
                    OnPartDefinition::CaseFile { path, event } => OnPartSource::CaseFile {
                        path: CaseFilePath::parse(path)
                            .map(|p| p.definition_path())
                            .unwrap_or_else(|_| path.clone()),
                        event: *event,
                    },
                },
                active: false,
            })
            .collect();
        Self {
            id: format!("{}/{}", target, definition.id),
            definition_id: definition.id.clone(),
            kind,
            target: target.to_string(),
            on_parts,
            if_part: definition.if_part.clone(),
        }
    }

    /// All on-parts active. The if-part is checked separately.
    pub fn on_parts_satisfied(&self) -> bool {
        self.on_parts.iter().all(|on_part| on_part.active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SentryNetwork {
    criteria: BTreeMap<String, Criterion>,
    /// Source key to the criteria listening to it.
    index: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    activations: Vec<String>,
}

impl SentryNetwork {
    pub fn get(&self, id: &str) -> Option<&Criterion> {
        self.criteria.get(id)
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn for_target(&self, target: &str, kind: CriterionKind) -> Vec<&Criterion> {
        self.criteria
            .values()
            .filter(|c| c.target == target && c.kind == kind)
            .collect()
    }

    pub fn add(&mut self, criterion: Criterion) {
        for on_part in &criterion.on_parts {
            let listeners = self.index.entry(on_part.source.key()).or_default();
            if !listeners.contains(&criterion.id) {
                listeners.push(criterion.id.clone());
            }
        }
        self.criteria.insert(criterion.id.clone(), criterion);
    }

    /// Sets on-parts from what their sources last did. Queues nothing:
    /// the target checks satisfied entry criteria when it becomes available.
    pub fn catch_up(&mut self, criterion_id: &str, plan: &Plan, case_file: &CaseFile) {
        let Some(criterion) = self.criteria.get_mut(criterion_id) else {
            return;
        };
        let target = criterion.target.clone();
        for on_part in criterion.on_parts.iter_mut() {
            on_part.active = match &on_part.source {
                OnPartSource::PlanItem { definition_id, event } => plan
                    .items()
                    .into_iter()
                    .filter(|item| &item.definition_id == definition_id && item.id != target)
                    .filter(|item| plan.in_scope(&item.id, &target))
                    .max_by_key(|item| item.created_order)
                    .is_some_and(|item| item.last_transition == Some(*event)),
                OnPartSource::CaseFile { path, event } => case_file.has_last_transition(path, *event),
            };
        }
    }

    /// A plan item went through `transition`.
    pub fn on_plan_item(&mut self, plan: &Plan, source_id: &str, transition: Transition) {
        let Some(source) = plan.get(source_id) else {
            return;
        };
        let key = plan_item_key(&source.definition_id);
        let Some(listeners) = self.index.get(&key) else {
            return;
        };
        for criterion_id in listeners {
            let Some(criterion) = self.criteria.get_mut(criterion_id) else {
                continue;
            };
            if !plan.in_scope(source_id, &criterion.target) {
                continue;
            }
            let mut triggered = false;
            for on_part in criterion.on_parts.iter_mut() {
                if let OnPartSource::PlanItem { definition_id, event } = &on_part.source {
                    if *definition_id == source.definition_id {
                        on_part.active = *event == transition;
                        triggered |= on_part.active;
                    }
                }
            }
            if triggered && criterion.on_parts_satisfied() {
                self.activations.push(criterion_id.clone());
            }
        }
    }

    /// A case-file item at a concrete path went through `transition`.
    pub fn on_case_file(&mut self, path: &str, transition: CaseFileTransition) {
        let definition_path = match CaseFilePath::parse(path) {
            Ok(parsed) => parsed.definition_path(),
            Err(_) => return,
        };
        let Some(listeners) = self.index.get(&case_file_key(&definition_path)) else {
            return;
        };
        for criterion_id in listeners {
            let Some(criterion) = self.criteria.get_mut(criterion_id) else {
                continue;
            };
            let mut triggered = false;
            for on_part in criterion.on_parts.iter_mut() {
                if let OnPartSource::CaseFile { path, event } = &on_part.source {
                    if *path == definition_path {
                        on_part.active = *event == transition;
                        triggered |= on_part.active;
                    }
                }
            }
            if triggered && criterion.on_parts_satisfied() {
                self.activations.push(criterion_id.clone());
            }
        }
    }

    /// Criteria that became satisfied since the last call.
    pub fn take_activations(&mut self) -> Vec<String> {
        std::mem::take(&mut self.activations)
    }
}

#[cfg(test)]
#[path = "tests/sentry_tests.rs"]
mod tests;
