//! Process implementations a `ProcessTask` can run.

use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Runs one process synchronously. The error string becomes the failure
/// reported back to the case.
pub trait ProcessImplementation: Send + Sync {
    fn run(&self, input: &Value) -> Result<Value, String>;
}

/// Returns its input.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoProcess;

impl ProcessImplementation for EchoProcess {
    fn run(&self, input: &Value) -> Result<Value, String> {
        Ok(input.clone())
    }
}

/// Always fails, with `reason` from the input when present.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingProcess;

impl ProcessImplementation for FailingProcess {
    fn run(&self, input: &Value) -> Result<Value, String> {
        Err(input
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("Process failed")
            .to_string())
    }
}

#[derive(Clone, Default)]
pub struct ProcessRegistry {
    implementations: BTreeMap<String, Arc<dyn ProcessImplementation>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `echo` and `fail`.
    pub fn with_builtins() -> Self {
        Self::new()
            .register("echo", EchoProcess)
            .register("fail", FailingProcess)
    }

    pub fn register(mut self, name: impl Into<String>, implementation: impl ProcessImplementation + 'static) -> Self {
        self.implementations.insert(name.into(), Arc::new(implementation));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProcessImplementation>> {
        self.implementations.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.implementations.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("implementations", &self.names())
            .finish()
    }
}
