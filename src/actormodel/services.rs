//! Collaborators injected into every aggregate.
//!
//! Aggregates never reach for globals: time, definitions, expression
//! evaluation and process implementations all come through here.

use crate::actormodel::errors::CommandError;
use crate::actormodel::types::{EngineVersion, TimestampUtc};
use crate::cmmn::expression::{ExpressionEvaluator, SimpleExpressionEvaluator};
use crate::cmmn::repository::{DefinitionProvider, InMemoryDefinitions};
use crate::config::EngineConfig;
use crate::processtask::implementation::ProcessRegistry;
use crate::value::Value;
use std::sync::{Arc, Mutex};

/// Checks the output a user submits for a human task.
pub trait TaskOutputValidator: Send + Sync {
    fn validate(&self, task_name: &str, output: &Value) -> Result<(), CommandError>;
}

/// Accepts any map or null output.
#[derive(Debug, Default)]
pub struct MapOutputValidator;

impl TaskOutputValidator for MapOutputValidator {
    fn validate(&self, task_name: &str, output: &Value) -> Result<(), CommandError> {
        if output.is_null() || output.as_map().is_some() {
            Ok(())
        } else {
            Err(CommandError::invalid(format!(
                "Output of task '{}' must be an object, got {}",
                task_name,
                output.kind()
            )))
        }
    }
}

/// Time source. Tests pin it and move it forward by hand.
#[derive(Debug, Clone, Default)]
pub struct EngineClock {
    fixed: Option<Arc<Mutex<TimestampUtc>>>,
}

impl EngineClock {
    pub fn manual(start: TimestampUtc) -> Self {
        Self {
            fixed: Some(Arc::new(Mutex::new(start))),
        }
    }

    pub fn now(&self) -> TimestampUtc {
        match &self.fixed {
            Some(fixed) => fixed.lock().map(|t| *t).unwrap_or_else(|_| TimestampUtc::now()),
            None => TimestampUtc::now(),
        }
    }

    /// Moves a manual clock forward. No effect on the system clock.
    pub fn advance(&self, by: chrono::Duration) {
        if let Some(fixed) = &self.fixed {
            if let Ok(mut current) = fixed.lock() {
                *current = current.plus(by);
            }
        }
    }
}

#[derive(Clone)]
pub struct EngineServices {
    pub clock: EngineClock,
    pub engine_version: EngineVersion,
    pub config: Arc<EngineConfig>,
    pub definitions: Arc<dyn DefinitionProvider>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    pub processes: Arc<ProcessRegistry>,
    pub task_validator: Arc<dyn TaskOutputValidator>,
}

impl EngineServices {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            clock: EngineClock::default(),
            engine_version: EngineVersion::current(),
            config: Arc::new(config),
            definitions: Arc::new(InMemoryDefinitions::default()),
            evaluator: Arc::new(SimpleExpressionEvaluator),
            processes: Arc::new(ProcessRegistry::with_builtins()),
            task_validator: Arc::new(MapOutputValidator),
        }
    }

    pub fn with_clock(mut self, clock: EngineClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_engine_version(mut self, version: EngineVersion) -> Self {
        self.engine_version = version;
        self
    }

    pub fn with_definitions(mut self, definitions: Arc<dyn DefinitionProvider>) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_processes(mut self, processes: ProcessRegistry) -> Self {
        self.processes = Arc::new(processes);
        self
    }

    pub fn with_task_validator(mut self, validator: Arc<dyn TaskOutputValidator>) -> Self {
        self.task_validator = validator;
        self
    }
}

impl Default for EngineServices {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineServices")
            .field("clock", &self.clock)
            .field("engine_version", &self.engine_version)
            .field("processes", &self.processes.names())
            .finish_non_exhaustive()
    }
}
