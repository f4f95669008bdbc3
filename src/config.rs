//! Engine configuration.
//!
//! One explicit `EngineConfig` is loaded at startup and handed to the case
//! system, which threads it into every actor it spawns.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ENGINE_YAML: &str = include_str!("../engine.yaml");

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub actor: ActorConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub timer_service: TimerServiceConfig,
    #[serde(default)]
    pub case: CaseConfig,
    #[serde(default)]
    pub definitions: DefinitionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings shared by every model actor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ActorConfig {
    /// Start every actor in debug mode.
    #[serde(default)]
    pub debug: bool,
    /// Idle time after which an actor passivates. 0 disables passivation.
    #[serde(default = "default_idle_period_secs")]
    pub idle_period_secs: u64,
    /// Interval of the actor housekeeping tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            debug: false,
            idle_period_secs: default_idle_period_secs(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_idle_period_secs() -> u64 {
    600
}

fn default_tick_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JournalConfig {
    /// Journal directory. Defaults to `~/.case-engine/journal`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Events between snapshots. 0 disables snapshots.
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
    /// Quiet period before a scheduled snapshot is written.
    #[serde(default = "default_snapshot_delay_ms")]
    pub snapshot_delay_ms: u64,
    /// Snapshots with another schema version are discarded on recovery.
    #[serde(default = "default_snapshot_schema")]
    pub snapshot_schema: u32,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: None,
            snapshot_every: default_snapshot_every(),
            snapshot_delay_ms: default_snapshot_delay_ms(),
            snapshot_schema: default_snapshot_schema(),
        }
    }
}

fn default_snapshot_every() -> u64 {
    50
}

fn default_snapshot_delay_ms() -> u64 {
    2000
}

fn default_snapshot_schema() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TimerServiceConfig {
    #[serde(default = "default_timer_actor_id")]
    pub actor_id: String,
    #[serde(default = "default_timer_tenant")]
    pub tenant: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TimerServiceConfig {
    fn default() -> Self {
        Self {
            actor_id: default_timer_actor_id(),
            tenant: default_timer_tenant(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_timer_actor_id() -> String {
    "timer-service".to_string()
}

fn default_timer_tenant() -> String {
    "system".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CaseConfig {
    /// Upper bound on worklist steps in one case transaction.
    #[serde(default = "default_max_transition_iterations")]
    pub max_transition_iterations: usize,
}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            max_transition_iterations: default_max_transition_iterations(),
        }
    }
}

fn default_max_transition_iterations() -> usize {
    10_000
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct DefinitionsConfig {
    /// Directory with `.yaml`/`.json` case definitions.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Default tracing filter when `CASE_ENGINE_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Write the JSONL transaction audit log.
    #[serde(default)]
    pub audit_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            audit_log: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse config as YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// The configuration embedded in the binary.
    pub fn default_config() -> Self {
        serde_yaml::from_str(DEFAULT_ENGINE_YAML).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.actor.tick_interval_ms == 0 {
            anyhow::bail!("actor.tick_interval_ms must be greater than zero");
        }
        if self.timer_service.poll_interval_ms == 0 {
            anyhow::bail!("timer_service.poll_interval_ms must be greater than zero");
        }
        if self.timer_service.actor_id.trim().is_empty() {
            anyhow::bail!("timer_service.actor_id cannot be empty");
        }
        if self.case.max_transition_iterations == 0 {
            anyhow::bail!("case.max_transition_iterations must be greater than zero");
        }
        Ok(())
    }

    /// Journal directory, falling back to the engine home.
    pub fn journal_dir(&self) -> Result<PathBuf> {
        match &self.journal.directory {
            Some(dir) => Ok(dir.clone()),
            None => crate::engine_paths::journal_dir(),
        }
    }

    pub fn idle_period(&self) -> Option<Duration> {
        match self.actor.idle_period_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.actor.tick_interval_ms)
    }

    pub fn snapshot_delay(&self) -> Duration {
        Duration::from_millis(self.journal.snapshot_delay_ms)
    }

    pub fn timer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.timer_service.poll_interval_ms)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
