//! Where case definitions come from.

use crate::actormodel::errors::CommandError;
use crate::actormodel::types::{TenantId, UserIdentity};
use crate::cmmn::definition::CaseDefinition;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Looks up case definitions by name.
pub trait DefinitionProvider: Send + Sync {
    fn read(
        &self,
        name: &str,
        user: &UserIdentity,
        tenant: Option<&TenantId>,
    ) -> Result<Arc<CaseDefinition>, CommandError>;

    /// Stores a definition under its own name, replacing an older one.
    fn write(
        &self,
        definition: CaseDefinition,
        user: &UserIdentity,
        tenant: Option<&TenantId>,
    ) -> Result<(), CommandError>;

    /// Names of the definitions the user can start.
    fn list(&self, user: &UserIdentity, tenant: Option<&TenantId>) -> Vec<String>;
}

fn not_found(name: &str) -> CommandError {
    CommandError::definition(format!("Cannot find a case definition named '{}'", name))
}

/// Definitions registered in code.
#[derive(Debug, Default)]
pub struct InMemoryDefinitions {
    definitions: RwLock<HashMap<String, Arc<CaseDefinition>>>,
}

impl InMemoryDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, definition: CaseDefinition) -> Self {
        self.insert(definition);
        self
    }

    fn insert(&self, definition: CaseDefinition) {
        if let Ok(mut definitions) = self.definitions.write() {
            definitions.insert(definition.name.clone(), Arc::new(definition));
        }
    }
}

impl DefinitionProvider for InMemoryDefinitions {
    fn read(
        &self,
        name: &str,
        _user: &UserIdentity,
        _tenant: Option<&TenantId>,
    ) -> Result<Arc<CaseDefinition>, CommandError> {
        self.definitions
            .read()
            .ok()
            .and_then(|definitions| definitions.get(name).cloned())
            .ok_or_else(|| not_found(name))
    }

    fn write(
        &self,
        definition: CaseDefinition,
        _user: &UserIdentity,
        _tenant: Option<&TenantId>,
    ) -> Result<(), CommandError> {
        definition.validate()?;
        self.insert(definition);
        Ok(())
    }

    fn list(&self, _user: &UserIdentity, _tenant: Option<&TenantId>) -> Vec<String> {
        let mut names: Vec<String> = self
            .definitions
            .read()
            .map(|definitions| definitions.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Definitions stored as `<name>.yaml`, `<name>.yml` or `<name>.json` files
/// in one directory. Files are parsed on every read.
#[derive(Debug, Clone)]
pub struct FileDefinitions {
    dir: PathBuf,
}

const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

fn unusable_name(name: &str) -> bool {
    name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.')
}

impl FileDefinitions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        if unusable_name(name) {
            return None;
        }
        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file())
    }

    /// Parses one definition file. JSON is a subset of YAML, so one parser
    /// handles both.
    pub fn load(path: &Path) -> Result<CaseDefinition> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read definition file: {}", path.display()))?;
        let definition: CaseDefinition = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse definition file: {}", path.display()))?;
        Ok(definition)
    }
}

impl DefinitionProvider for FileDefinitions {
    fn read(
        &self,
        name: &str,
        _user: &UserIdentity,
        _tenant: Option<&TenantId>,
    ) -> Result<Arc<CaseDefinition>, CommandError> {
        let path = self.locate(name).ok_or_else(|| not_found(name))?;
        let definition = Self::load(&path).map_err(|e| CommandError::definition(format!("{:#}", e)))?;
        if definition.name != name {
            tracing::warn!(
                "Definition file {} declares name '{}'",
                path.display(),
                definition.name
            );
        }
        definition.validate()?;
        Ok(Arc::new(definition))
    }

    fn write(
        &self,
        definition: CaseDefinition,
        _user: &UserIdentity,
        _tenant: Option<&TenantId>,
    ) -> Result<(), CommandError> {
        definition.validate()?;
        if unusable_name(&definition.name) {
            return Err(CommandError::definition(format!(
                "Definition name '{}' cannot be used as a file name",
                definition.name
            )));
        }
        let store = || -> Result<()> {
            std::fs::create_dir_all(&self.dir)
                .with_context(|| format!("Failed to create definition directory: {}", self.dir.display()))?;
            let path = self.dir.join(format!("{}.yaml", definition.name));
            let text = serde_yaml::to_string(&definition).context("Failed to encode definition")?;
            std::fs::write(&path, text)
                .with_context(|| format!("Failed to write definition file: {}", path.display()))?;
            Ok(())
        };
        store().map_err(|e| CommandError::definition(format!("{:#}", e)))
    }

    fn list(&self, _user: &UserIdentity, _tenant: Option<&TenantId>) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| EXTENSIONS.contains(&ext))
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
#[path = "tests/repository_tests.rs"]
mod tests;
