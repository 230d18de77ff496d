//! Build model
//!
//! The immutable declarations the engine runs: [`Task`]s, the [`Dependencies`]
//! edge store that links them, and the [`Directive`]s attached to them.

pub mod dependencies;
pub mod directive;
pub mod task;

pub use dependencies::Dependencies;
pub use directive::{Directive, DirectiveError, EnvAdjustment, Hook, Outcome, Predicate};
pub use task::{Task, TaskBody};
