//! Dovetail Core Library
//!
//! This is the core library for the Dovetail task runner. It runs named tasks
//! with their dependencies depth first, each at most once per build, and
//! reports what happened to every execution.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`build_manager`] - High-level interface over a loaded build file
//! - [`model`] - Tasks, the dependency edge store and directives
//! - [`execution`] - The processor, execution records and the build context
//! - [`results`] - Build summaries and query results
//! - [`graph`] - Static dependency graph, cycle detection and planning
//! - [`configs`] - Build file parsing and JSON schema
//! - [`tasks`] - Task color management
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! Tasks can be declared in code and run directly with a [`Processor`]:
//!
//! ```rust,no_run
//! use dovetail_core::{Dependencies, Processor, ProcessorConfig, Task};
//!
//! # fn example() -> dovetail_core::DovetailResult<()> {
//! let dependencies = Dependencies::from_tasks([
//!     Task::new("test").depends_on(["compile"]),
//!     Task::new("compile").with_body(|_| Ok(())),
//! ])?;
//!
//! let result = Processor::new(&dependencies, ProcessorConfig::default())?
//!     .build_named(&["test"])?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

pub mod build_manager;
pub mod configs;
pub mod execution;
pub mod graph;
pub mod model;
pub mod results;
pub mod tasks;
pub mod types;

// Re-export the main types for easier usage
pub use build_manager::{BuildManager, BuildManagerConfig};
pub use execution::{
    BuildContext, DirectoryMode, Execution, ExecutionId, Processor, ProcessorConfig, TaskState,
};
pub use model::{Dependencies, Directive, Hook, Outcome, Predicate, Task};
pub use results::BuildResult;
pub use types::{DovetailError, DovetailResult};
