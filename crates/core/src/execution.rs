//! Task execution module
//!
//! This module runs tasks: the [`Processor`] drives the recursive execution
//! algorithm, [`Execution`] records one attempt to run one task, and the
//! [`BuildContext`] carries the working directory and environment overlay
//! down the call stack.

pub mod command;
pub mod context;
pub mod processor;
pub mod state;

pub use command::{CommandExecutor, CommandSpec};
pub use context::{BuildContext, DirectoryMode};
pub use processor::{Processor, ProcessorConfig};
pub use state::{Execution, ExecutionId, TaskError, TaskState};
