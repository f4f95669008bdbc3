//! CMMN case plan engine.
//!
//! A [`Case`] owns its plan tree, case file and team. Commands are worked
//! out by [`engine`] on a staged copy; everything else here is the data
//! model those transactions manipulate.

pub mod case;
pub mod casefile;
pub mod commands;
pub mod definition;
pub(crate) mod engine;
pub mod events;
pub mod expression;
pub mod plan;
pub mod repository;
pub mod sentry;
pub mod state_machine;
pub mod team;

pub use case::{Case, DiscretionaryItem};
pub use commands::{CaseCommand, CaseMessage, ParentLink};
pub use definition::CaseDefinition;
pub use events::CaseEvent;
pub use state_machine::{PlanItemType, State, Transition};

#[cfg(test)]
#[path = "tests/case_tests.rs"]
mod tests;
