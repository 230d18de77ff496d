//! Execution records and the per-task state machine
//!
//! ```text
//!            .--> SKIPPED --------------------.
//!           /                                  v
//! RUNNING --+--> ABORTED                     FAILED
//!           \                                  ^
//!            '--> SUCCEEDED   (body error) ---'
//!
//! (memo hit) --> REPEATED
//! ```
//!
//! A task that has not been requested has no Execution at all.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::task::Task;

/// Index of an [`Execution`] within one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExecutionId(pub(crate) usize);

impl ExecutionId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Running,
    Succeeded,
    Repeated,
    Skipped,
    Failed,
    Aborted,
}

impl TaskState {
    pub fn is_complete(self) -> bool {
        self != TaskState::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Repeated => "REPEATED",
            TaskState::Skipped => "SKIPPED",
            TaskState::Failed => "FAILED",
            TaskState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task-level failure captured on an Execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskError {
    pub message: String,
    /// Underlying causes, outermost first
    pub causes: Vec<String>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            causes: error.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// One attempt to run one task within one build.
///
/// Executions form a tree through `parent`/`children`; the frames that are
/// still [`TaskState::Running`] make up the processor's call stack.
#[derive(Debug)]
pub struct Execution {
    id: ExecutionId,
    task: Arc<Task>,
    state: TaskState,
    parent: Option<ExecutionId>,
    children: Vec<ExecutionId>,
    depth: usize,
    error: Option<TaskError>,
    skip_reasons: Vec<String>,
    repeat_of: Option<ExecutionId>,
    repeated_ok: bool,
    failed_dependency: Option<ExecutionId>,
    started: Instant,
    finished: Option<Instant>,
    store: HashMap<String, serde_json::Value>,
    active_directive: Option<usize>,
}

impl Execution {
    pub(crate) fn new(task: Arc<Task>, parent: Option<ExecutionId>, index: usize) -> Self {
        Self {
            id: ExecutionId(index),
            task,
            state: TaskState::Running,
            parent,
            children: Vec::new(),
            depth: 0,
            error: None,
            skip_reasons: Vec::new(),
            repeat_of: None,
            repeated_ok: false,
            failed_dependency: None,
            started: Instant::now(),
            finished: None,
            store: HashMap::new(),
            active_directive: None,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn parent(&self) -> Option<ExecutionId> {
        self.parent
    }

    pub fn children(&self) -> &[ExecutionId] {
        &self.children
    }

    /// Depth in the call stack; top-level executions are at depth 0
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    pub fn skip_reasons(&self) -> &[String] {
        &self.skip_reasons
    }

    /// The completed execution a REPEATED record stands in for
    pub fn repeat_of(&self) -> Option<ExecutionId> {
        self.repeat_of
    }

    /// The dependency whose failure aborted this execution
    pub fn failed_dependency(&self) -> Option<ExecutionId> {
        self.failed_dependency
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// SUCCEEDED and SKIPPED are ok. REPEATED is ok when the execution it
    /// repeats was ok, so a second path to a failed task still aborts.
    pub fn is_ok(&self) -> bool {
        match self.state {
            TaskState::Succeeded | TaskState::Skipped => true,
            TaskState::Repeated => self.repeated_ok,
            TaskState::Running | TaskState::Failed | TaskState::Aborted => false,
        }
    }

    /// Wall time including dependencies; still ticking while running
    pub fn elapsed(&self) -> Duration {
        self.finished
            .unwrap_or_else(Instant::now)
            .duration_since(self.started)
    }

    /// Share data between directives, or between a directive's before and after
    pub fn store(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        debug!("Execution of {} storing {}={}", self.task.name(), key, value);
        self.store.insert(key, value);
    }

    pub fn retrieve(&self, key: &str) -> Option<&serde_json::Value> {
        self.store.get(key)
    }

    pub fn take(&mut self, key: &str) -> Option<serde_json::Value> {
        self.store.remove(key)
    }

    /// A store key private to the directive currently being called
    pub fn memento_key(&self, prefix: &str) -> String {
        match self.active_directive {
            Some(index) => format!("{prefix}#{index}"),
            None => prefix.to_string(),
        }
    }

    pub(crate) fn set_active_directive(&mut self, index: Option<usize>) {
        self.active_directive = index;
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub(crate) fn add_child(&mut self, child: ExecutionId) {
        self.children.push(child);
    }

    fn transition(&mut self, to: TaskState) {
        debug!(
            "State transition: {} {} -> {}",
            self.task.name(),
            self.state,
            to
        );
        self.state = to;
    }

    pub(crate) fn repeated(&mut self, original: ExecutionId, original_ok: bool) {
        self.transition(TaskState::Repeated);
        self.repeat_of = Some(original);
        self.repeated_ok = original_ok;
    }

    pub(crate) fn skip(&mut self, reason: impl Into<String>) {
        match self.state {
            TaskState::Running => self.transition(TaskState::Skipped),
            TaskState::Skipped => {}
            other => {
                warn!("Cannot skip {} in state {}; ignoring", self.task.name(), other);
                return;
            }
        }
        self.skip_reasons.push(reason.into());
    }

    pub(crate) fn fail(&mut self, error: TaskError) {
        match self.state {
            TaskState::Failed => warn!("{} has already failed; ignoring", self.task.name()),
            TaskState::Aborted => warn!("{} has already been aborted; ignoring", self.task.name()),
            _ => {
                self.transition(TaskState::Failed);
                self.error = Some(error);
            }
        }
    }

    pub(crate) fn abort(&mut self, dependency: ExecutionId, error: TaskError) {
        self.transition(TaskState::Aborted);
        self.failed_dependency = Some(dependency);
        self.error = Some(error);
    }

    pub(crate) fn succeed(&mut self) {
        self.transition(TaskState::Succeeded);
    }

    /// Record a framework-level failure on a frame that is being unwound
    pub(crate) fn system_failure(&mut self, message: impl Into<String>) {
        if !self.is_complete() {
            self.transition(TaskState::Failed);
            self.error = Some(TaskError::new(message));
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished = Some(Instant::now());
    }
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.task.name();
        match self.state {
            TaskState::Running => write!(f, "Running {name}"),
            TaskState::Succeeded => write!(f, "SUCCEEDED: {name}"),
            TaskState::Repeated => write!(f, "REPEATED: {name}"),
            TaskState::Skipped => {
                write!(f, "SKIPPED: {name} because {}", self.skip_reasons.join(" and "))
            }
            TaskState::Failed | TaskState::Aborted => match &self.error {
                Some(error) => write!(f, "{}: {name} raised {error}", self.state),
                None => write!(f, "{}: {name}", self.state),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(name: &str) -> Execution {
        Execution::new(Arc::new(Task::new(name)), None, 0)
    }

    #[test]
    fn test_is_ok_by_state() {
        let mut succeeded = execution("a");
        succeeded.succeed();
        assert!(succeeded.is_ok());

        let mut skipped = execution("b");
        skipped.skip("not needed");
        assert!(skipped.is_ok());

        let mut failed = execution("c");
        failed.fail(TaskError::new("boom"));
        assert!(!failed.is_ok());

        let mut aborted = execution("d");
        aborted.abort(ExecutionId(0), TaskError::new("dependency failed"));
        assert!(!aborted.is_ok());

        let running = execution("e");
        assert!(!running.is_ok());
        assert!(!running.is_complete());
    }

    #[test]
    fn test_repeated_mirrors_original_outcome() {
        let mut ok = execution("a");
        ok.repeated(ExecutionId(7), true);
        assert_eq!(ok.state(), TaskState::Repeated);
        assert_eq!(ok.repeat_of(), Some(ExecutionId(7)));
        assert!(ok.is_ok());

        let mut bad = execution("a");
        bad.repeated(ExecutionId(7), false);
        assert!(!bad.is_ok());
    }

    #[test]
    fn test_skip_reasons_accumulate() {
        let mut execution = execution("a");
        execution.skip("first");
        execution.skip("second");
        assert_eq!(execution.skip_reasons(), &["first", "second"]);
        assert_eq!(execution.to_string(), "SKIPPED: a because first and second");
    }

    #[test]
    fn test_skipped_task_can_be_failed_but_failure_is_final() {
        let mut execution = execution("a");
        execution.skip("optional");
        execution.fail(TaskError::new("required"));
        assert_eq!(execution.state(), TaskState::Failed);

        execution.fail(TaskError::new("again"));
        assert_eq!(execution.error().unwrap().message, "required");

        execution.skip("late");
        assert_eq!(execution.state(), TaskState::Failed);
    }

    #[test]
    fn test_system_failure_only_touches_running_frames() {
        let mut running = execution("a");
        running.system_failure("cycle");
        assert_eq!(running.state(), TaskState::Failed);

        let mut done = execution("b");
        done.succeed();
        done.system_failure("cycle");
        assert_eq!(done.state(), TaskState::Succeeded);
    }

    #[test]
    fn test_task_error_keeps_cause_chain() {
        let error = anyhow::anyhow!("disk full").context("writing artifact");
        let captured = TaskError::from_error(&error);
        assert_eq!(captured.message, "writing artifact");
        assert_eq!(captured.causes, vec!["disk full".to_string()]);
        assert_eq!(captured.to_string(), "writing artifact: disk full");
    }

    #[test]
    fn test_store_and_memento_keys() {
        let mut execution = execution("a");
        assert_eq!(execution.memento_key("env"), "env");
        execution.set_active_directive(Some(2));
        assert_eq!(execution.memento_key("env"), "env#2");

        execution.store("k", serde_json::json!(1));
        assert_eq!(execution.retrieve("k"), Some(&serde_json::json!(1)));
        assert_eq!(execution.take("k"), Some(serde_json::json!(1)));
        assert!(execution.retrieve("k").is_none());
    }
}
