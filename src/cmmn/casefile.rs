//! The case file: one value document plus per-path item state.
//!
//! Commands never touch the document directly. A [`CaseFilePlanner`] works
//! out the item transitions an operation causes (parents, children, list
//! elements) on a scratch copy; the engine then emits them one by one.

use crate::actormodel::errors::CommandError;
use crate::cmmn::definition::{CaseDefinition, CaseFileItemDefinition};
use crate::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseFileTransition {
    Create,
    Update,
    Replace,
    Delete,
    AddChild,
    RemoveChild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CaseFileItemStatus {
    #[default]
    Null,
    Available,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CaseFileItemState {
    pub state: CaseFileItemStatus,
    pub last_transition: Option<CaseFileTransition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<usize>,
}

/// A path like `Order/Lines[1]/Amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaseFilePath {
    segments: Vec<PathSegment>,
}

impl CaseFilePath {
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let invalid = || CommandError::invalid(format!("'{}' is not a valid case file path", text));
        let mut segments = Vec::new();
        for part in text.trim().trim_matches('/').split('/') {
            let (name, index) = match part.split_once('[') {
                Some((name, rest)) => {
                    let digits = rest.strip_suffix(']').ok_or_else(invalid)?;
                    (name, Some(digits.parse::<usize>().map_err(|_| invalid())?))
                }
                None => (part, None),
            };
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
                return Err(invalid());
            }
            segments.push(PathSegment {
                name: name.to_string(),
                index,
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    pub fn parent(&self) -> Option<CaseFilePath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, name: &str, index: Option<usize>) -> CaseFilePath {
        let mut segments = self.segments.clone();
        segments.push(PathSegment {
            name: name.to_string(),
            index,
        });
        Self { segments }
    }

    pub fn with_index(&self, index: Option<usize>) -> CaseFilePath {
        let mut path = self.clone();
        if let Some(last) = path.segments.last_mut() {
            last.index = index;
        }
        path
    }

    /// The path without list indices, as definitions and on-parts use it.
    pub fn definition_path(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl std::fmt::Display for CaseFilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&segment.name)?;
            if let Some(index) = segment.index {
                write!(f, "[{}]", index)?;
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for CaseFilePath {
    type Error = CommandError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::parse(&text)
    }
}

impl From<CaseFilePath> for String {
    fn from(path: CaseFilePath) -> Self {
        path.to_string()
    }
}

/// One item transition, as recorded in `CaseFileItemTransitioned`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseFileChange {
    pub path: CaseFilePath,
    pub transition: CaseFileTransition,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    root: Value,
    items: BTreeMap<String, CaseFileItemState>,
    /// Latest created index per list path.
    current: BTreeMap<String, usize>,
    released: bool,
    /// Transitions held back until the bootstrap is released.
    #[serde(default)]
    buffer: Vec<(String, CaseFileTransition)>,
}

impl Default for CaseFile {
    fn default() -> Self {
        Self {
            root: Value::Map(ValueMap::new()),
            items: BTreeMap::new(),
            current: BTreeMap::new(),
            released: false,
            buffer: Vec::new(),
        }
    }
}

fn read<'v>(root: &'v Value, path: &CaseFilePath) -> Option<&'v Value> {
    let mut current = root;
    for segment in path.segments() {
        current = current.get(&segment.name)?;
        if let Some(index) = segment.index {
            current = current.as_list()?.get(index)?;
        }
    }
    Some(current)
}

fn write(root: &mut Value, path: &CaseFilePath, value: Value) {
    let mut current = root;
    let count = path.segments().len();
    for (i, segment) in path.segments().iter().enumerate() {
        let last = i + 1 == count;
        if current.as_map().is_none() {
            *current = Value::Map(ValueMap::new());
        }
        let Some(map) = current.as_map_mut() else {
            return;
        };
        if !map.contains_key(&segment.name) {
            let empty = match segment.index {
                Some(_) => Value::List(Vec::new()),
                None => Value::Map(ValueMap::new()),
            };
            map.insert(segment.name.clone(), empty);
        }
        let Some(slot) = map.get_mut(&segment.name) else {
            return;
        };
        current = match segment.index {
            Some(index) => {
                if slot.as_list().is_none() {
                    *slot = Value::List(Vec::new());
                }
                let Value::List(items) = slot else {
                    return;
                };
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                &mut items[index]
            }
            None => slot,
        };
        if last {
            *current = value;
            return;
        }
    }
}

fn remove(root: &mut Value, path: &CaseFilePath) {
    match (path.parent(), path.last()) {
        (_, Some(PathSegment { index: Some(_), .. })) => write(root, path, Value::Null),
        (Some(parent), Some(last)) => {
            let mut target = root;
            for segment in parent.segments() {
                let Some(next) = target.as_map_mut().and_then(|m| m.get_mut(&segment.name)) else {
                    return;
                };
                target = match segment.index {
                    Some(index) => match next {
                        Value::List(items) => match items.get_mut(index) {
                            Some(item) => item,
                            None => return,
                        },
                        _ => return,
                    },
                    None => next,
                };
            }
            if let Some(map) = target.as_map_mut() {
                map.remove(&last.name);
            }
        }
        (None, Some(last)) => {
            if let Some(map) = root.as_map_mut() {
                map.remove(&last.name);
            }
        }
        (_, None) => {}
    }
}

impl CaseFile {
    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn value(&self, path: &CaseFilePath) -> Option<&Value> {
        read(&self.root, path)
    }

    pub fn state(&self, path: &CaseFilePath) -> CaseFileItemState {
        self.items.get(&path.to_string()).cloned().unwrap_or_default()
    }

    pub fn is_available(&self, path: &CaseFilePath) -> bool {
        self.state(path).state == CaseFileItemStatus::Available
    }

    pub fn current_index(&self, list_path: &CaseFilePath) -> Option<usize> {
        self.current.get(&list_path.with_index(None).to_string()).copied()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether some item under a definition path last went through `transition`.
    pub fn has_last_transition(&self, definition_path: &str, transition: CaseFileTransition) -> bool {
        self.items.iter().any(|(path, state)| {
            state.last_transition == Some(transition)
                && CaseFilePath::parse(path).is_ok_and(|p| p.definition_path() == definition_path)
        })
    }

    /// Applies one transition. Returns it when it should be published to
    /// the sentry network right away.
    pub fn apply(
        &mut self,
        path: &CaseFilePath,
        transition: CaseFileTransition,
        value: Value,
    ) -> Option<(String, CaseFileTransition)> {
        let key = path.to_string();
        let state = self.items.entry(key.clone()).or_default();
        state.last_transition = Some(transition);
        match transition {
            CaseFileTransition::Delete => {
                state.state = CaseFileItemStatus::Discarded;
                remove(&mut self.root, path);
            }
            _ => {
                state.state = CaseFileItemStatus::Available;
                write(&mut self.root, path, value);
            }
        }
        if transition == CaseFileTransition::Create {
            if let Some(index) = path.last().and_then(|s| s.index) {
                self.current.insert(path.with_index(None).to_string(), index);
            }
        }
        if self.released {
            Some((key, transition))
        } else {
            self.buffer.push((key, transition));
            None
        }
    }

    /// Switches to live publishing and hands back the held transitions.
    pub fn release(&mut self) -> Vec<(String, CaseFileTransition)> {
        self.released = true;
        std::mem::take(&mut self.buffer)
    }

    fn list_len(&self, list_path: &CaseFilePath) -> usize {
        read(&self.root, &list_path.with_index(None))
            .and_then(Value::as_list)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Concrete paths of the available items a definition child maps to.
    fn available_children(&self, path: &CaseFilePath, child: &CaseFileItemDefinition) -> Vec<CaseFilePath> {
        let base = path.child(&child.name, None);
        if child.multiplicity.is_many() {
            (0..self.list_len(&base))
                .map(|i| base.with_index(Some(i)))
                .filter(|p| self.is_available(p))
                .collect()
        } else if self.is_available(&base) {
            vec![base]
        } else {
            Vec::new()
        }
    }
}

/// Works out the transitions of one case-file command.
pub struct CaseFilePlanner<'d> {
    definition: &'d CaseDefinition,
    scratch: CaseFile,
    changes: Vec<CaseFileChange>,
}

impl<'d> CaseFilePlanner<'d> {
    pub fn new(definition: &'d CaseDefinition, file: &CaseFile) -> Self {
        Self {
            definition,
            scratch: file.clone(),
            changes: Vec::new(),
        }
    }

    pub fn into_changes(self) -> Vec<CaseFileChange> {
        self.changes
    }

    fn emit(&mut self, path: CaseFilePath, transition: CaseFileTransition, value: Value) {
        self.scratch.apply(&path, transition, value.clone());
        self.changes.push(CaseFileChange {
            path,
            transition,
            value,
        });
    }

    fn item_definition(&self, path: &CaseFilePath) -> Result<&'d CaseFileItemDefinition, CommandError> {
        self.definition.case_file_item(path).ok_or_else(|| {
            CommandError::invalid(format!(
                "Case file item '{}' is not defined in the case definition",
                path.definition_path()
            ))
        })
    }

    fn touch_parent(&mut self, path: &CaseFilePath, transition: CaseFileTransition) {
        if let Some(parent) = path.parent() {
            if self.scratch.is_available(&parent) {
                let value = self.scratch.value(&parent).cloned().unwrap_or_default();
                self.emit(parent, transition, value);
            }
        }
    }

    pub fn create(&mut self, path: &CaseFilePath, value: &Value) -> Result<(), CommandError> {
        self.create_item(path, value, true)
    }

    fn create_item(&mut self, path: &CaseFilePath, value: &Value, top: bool) -> Result<(), CommandError> {
        let definition = self.item_definition(path)?;
        if let Some(parent) = path.parent() {
            if !self.scratch.is_available(&parent) {
                return Err(CommandError::invalid(format!(
                    "Cannot create case file item '{}' because its parent '{}' does not exist",
                    path, parent
                )));
            }
        }
        let indexed = path.last().and_then(|s| s.index).is_some();
        if definition.multiplicity.is_many() && !indexed {
            let elements = match value {
                Value::List(items) => items.clone(),
                other => vec![other.clone()],
            };
            for element in elements {
                let next = self.scratch.current_index(path).map_or(0, |i| i + 1);
                self.create_element(&path.with_index(Some(next)), definition, &element, top)?;
            }
            return Ok(());
        }
        if !definition.multiplicity.is_many() && indexed {
            return Err(CommandError::invalid(format!("Case file item '{}' is not a list", path)));
        }
        if let Some(index) = path.last().and_then(|s| s.index) {
            let len = self.scratch.list_len(path);
            if index > len {
                return Err(CommandError::invalid(format!(
                    "Cannot create case file item '{}' because the list has only {} elements",
                    path, len
                )));
            }
        }
        self.create_element(path, definition, value, top)
    }

    fn create_element(
        &mut self,
        path: &CaseFilePath,
        definition: &'d CaseFileItemDefinition,
        value: &Value,
        top: bool,
    ) -> Result<(), CommandError> {
        if self.scratch.is_available(path) {
            return Err(CommandError::invalid(format!(
                "Cannot create case file item '{}' because it already exists",
                path
            )));
        }
        self.emit(path.clone(), CaseFileTransition::Create, value.clone());
        if top {
            self.touch_parent(path, CaseFileTransition::AddChild);
        }
        for child in &definition.children {
            if let Some(child_value) = value.get(&child.name) {
                self.create_item(&path.child(&child.name, None), child_value, false)?;
            }
        }
        Ok(())
    }

    pub fn update(&mut self, path: &CaseFilePath, value: &Value) -> Result<(), CommandError> {
        let definition = self.item_definition(path)?;
        if definition.multiplicity.is_many() && path.last().and_then(|s| s.index).is_none() {
            return Err(CommandError::invalid(format!(
                "Case file item '{}' is a list, the path needs an index",
                path
            )));
        }
        if !self.scratch.is_available(path) {
            return self.create_item(path, value, true);
        }
        let before = self.scratch.value(path).cloned().unwrap_or_default();
        for child in &definition.children {
            let Some(child_value) = value.get(&child.name) else {
                continue;
            };
            let child_path = path.child(&child.name, None);
            if child.multiplicity.is_many() {
                if let Value::List(elements) = child_value {
                    for (i, element) in elements.iter().enumerate() {
                        self.update(&child_path.with_index(Some(i)), element)?;
                    }
                }
            } else {
                self.update(&child_path, child_value)?;
            }
        }
        let merged = before.merged_with(value);
        if merged != before {
            self.emit(path.clone(), CaseFileTransition::Update, merged);
        }
        Ok(())
    }

    pub fn replace(&mut self, path: &CaseFilePath, value: &Value) -> Result<(), CommandError> {
        let definition = self.item_definition(path)?;
        if !self.scratch.is_available(path) {
            return self.create_item(path, value, true);
        }
        if self.scratch.value(path) == Some(value) {
            return Ok(());
        }
        for child in &definition.children {
            let child_path = path.child(&child.name, None);
            match value.get(&child.name) {
                Some(child_value) if child.multiplicity.is_many() => {
                    let elements = match child_value {
                        Value::List(items) => items.clone(),
                        other => vec![other.clone()],
                    };
                    for existing in self.scratch.available_children(path, child) {
                        let index = existing.last().and_then(|s| s.index).unwrap_or(0);
                        if index >= elements.len() {
                            self.delete_item(&existing, false)?;
                        }
                    }
                    for (i, element) in elements.iter().enumerate() {
                        self.replace(&child_path.with_index(Some(i)), element)?;
                    }
                }
                Some(child_value) => self.replace(&child_path, child_value)?,
                None => {
                    for existing in self.scratch.available_children(path, child) {
                        self.delete_item(&existing, false)?;
                    }
                }
            }
        }
        self.emit(path.clone(), CaseFileTransition::Replace, value.clone());
        Ok(())
    }

    pub fn delete(&mut self, path: &CaseFilePath) -> Result<(), CommandError> {
        let definition = self.item_definition(path)?;
        if definition.multiplicity.is_many() && path.last().and_then(|s| s.index).is_none() {
            let elements: Vec<CaseFilePath> = (0..self.scratch.list_len(path))
                .map(|i| path.with_index(Some(i)))
                .filter(|p| self.scratch.is_available(p))
                .collect();
            if elements.is_empty() {
                return Err(CommandError::invalid(format!(
                    "Cannot delete case file item '{}' because it does not exist",
                    path
                )));
            }
            for element in elements {
                self.delete_item(&element, true)?;
            }
            return Ok(());
        }
        self.delete_item(path, true)
    }

    fn delete_item(&mut self, path: &CaseFilePath, top: bool) -> Result<(), CommandError> {
        if !self.scratch.is_available(path) {
            return Err(CommandError::invalid(format!(
                "Cannot delete case file item '{}' because it does not exist",
                path
            )));
        }
        let definition = self.item_definition(path)?;
        for child in &definition.children {
            for existing in self.scratch.available_children(path, child) {
                self.delete_item(&existing, false)?;
            }
        }
        self.emit(path.clone(), CaseFileTransition::Delete, Value::Null);
        if top {
            self.touch_parent(path, CaseFileTransition::RemoveChild);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/casefile_tests.rs"]
mod tests;
