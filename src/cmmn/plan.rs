//! Runtime plan items of a case.

use crate::cmmn::state_machine::{PlanItemType, State, StateMachine, Transition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    pub name: String,
    pub definition_id: String,
    pub item_type: PlanItemType,
    /// Repetition index, 0 for the first instance.
    pub index: u32,
    /// Id of the surrounding stage; `None` for the case plan.
    pub stage_id: Option<String>,
    pub state: State,
    pub history_state: State,
    pub last_transition: Option<Transition>,
    pub required: bool,
    pub repeats: bool,
    pub created_order: u64,
    /// User a human task is assigned to or claimed by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl PlanItem {
    pub fn state_machine(&self) -> StateMachine {
        self.item_type.state_machine()
    }

    pub fn target(&self, transition: Transition) -> Option<State> {
        self.state_machine()
            .target(self.state, transition, self.history_state)
    }
}

/// All plan items of a case, keyed by id. Items are never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Plan {
    items: BTreeMap<String, PlanItem>,
    next_order: u64,
}

impl Plan {
    pub fn get(&self, id: &str) -> Option<&PlanItem> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in creation order.
    pub fn items(&self) -> Vec<&PlanItem> {
        let mut items: Vec<&PlanItem> = self.items.values().collect();
        items.sort_by_key(|item| item.created_order);
        items
    }

    pub fn case_plan(&self) -> Option<&PlanItem> {
        self.items
            .values()
            .find(|item| item.item_type == PlanItemType::CasePlan)
    }

    /// Children of a stage, in creation order.
    pub fn children(&self, stage_id: &str) -> Vec<&PlanItem> {
        self.items()
            .into_iter()
            .filter(|item| item.stage_id.as_deref() == Some(stage_id))
            .collect()
    }

    /// Items carrying `name`, newest first.
    pub fn by_name(&self, name: &str) -> Vec<&PlanItem> {
        let mut items: Vec<&PlanItem> = self.items.values().filter(|item| item.name == name).collect();
        items.sort_by_key(|item| std::cmp::Reverse(item.created_order));
        items
    }

    /// Latest instance of a definition within `stage_id`.
    pub fn latest_instance(&self, definition_id: &str, stage_id: Option<&str>) -> Option<&PlanItem> {
        self.items
            .values()
            .filter(|item| item.definition_id == definition_id && item.stage_id.as_deref() == stage_id)
            .max_by_key(|item| item.created_order)
    }

    /// Surrounding stages, innermost first, up to the case plan.
    pub fn ancestors(&self, id: &str) -> Vec<&PlanItem> {
        let mut chain = Vec::new();
        let mut current = self.items.get(id).and_then(|item| item.stage_id.as_deref());
        while let Some(stage_id) = current {
            match self.items.get(stage_id) {
                Some(stage) => {
                    current = stage.stage_id.as_deref();
                    chain.push(stage);
                }
                None => break,
            }
        }
        chain
    }

    /// Whether `source` can inform criteria of `target`: no ancestor stage
    /// of the target may be a different instance of a stage the source
    /// lives in.
    pub fn in_scope(&self, source: &str, target: &str) -> bool {
        let source_chain = self.ancestors(source);
        self.ancestors(target).iter().all(|target_stage| {
            source_chain
                .iter()
                .filter(|s| s.definition_id == target_stage.definition_id)
                .all(|s| s.id == target_stage.id)
        })
    }

    /// Number of items currently active.
    pub fn active_count(&self) -> usize {
        self.items
            .values()
            .filter(|item| item.state == State::Active)
            .count()
    }

    pub(crate) fn insert(&mut self, mut item: PlanItem) {
        item.created_order = self.next_order;
        self.next_order += 1;
        self.items.insert(item.id.clone(), item);
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut PlanItem> {
        self.items.get_mut(id)
    }
}
