//! Event-sourced case management engine.
//!
//! Cases, tenants, consent groups, boards, process tasks and the timer
//! service are durable actors. Each persists its state changes as ordered
//! events in a [`journal::Journal`] and rebuilds itself by replay. Callers
//! talk to them through [`actormodel::CaseSystem`].

pub mod actormodel;
pub mod board;
pub mod cmmn;
pub mod config;
pub mod consentgroup;
pub mod engine_paths;
pub mod journal;
pub mod logging;
pub mod processtask;
pub mod serialization;
pub mod tenant;
pub mod timerservice;
pub mod value;

pub use actormodel::{CaseSystem, CommandError, ModelResponse};
pub use config::EngineConfig;
