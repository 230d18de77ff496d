//! The task processor
//!
//! Runs a task and its dependencies depth first, at most once per build, and
//! keeps the call stack of in-progress executions used to detect cycles.
//! Framework-level failures come back as `Err` and unwind every frame; each
//! frame still gives its directives their `after` pass and restores the
//! working directory it observed on entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::execution::context::{BuildContext, DirectoryMode};
use crate::execution::state::{Execution, ExecutionId, TaskError, TaskState};
use crate::model::dependencies::Dependencies;
use crate::model::directive::{Directive, Outcome};
use crate::model::task::Task;
use crate::results::BuildResult;
use crate::types::{DovetailError, DovetailResult};

/// Configuration for the processor
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    pub directory_mode: DirectoryMode,
    /// Starting directory of the build context. Ignored in
    /// [`DirectoryMode::Process`], which always starts from the process directory.
    pub initial_directory: Option<PathBuf>,
}

/// Single-use engine for one build
pub struct Processor<'a> {
    dependencies: &'a Dependencies,
    context: BuildContext,
    executions: Vec<Execution>,
    completed: HashMap<String, ExecutionId>,
    call_stack: Vec<ExecutionId>,
    roots: Vec<ExecutionId>,
    started: Instant,
}

impl<'a> Processor<'a> {
    pub fn new(dependencies: &'a Dependencies, config: ProcessorConfig) -> DovetailResult<Self> {
        let initial = match (config.directory_mode, config.initial_directory) {
            (DirectoryMode::Context, Some(dir)) => dir,
            _ => std::env::current_dir()?,
        };

        Ok(Self {
            dependencies,
            context: BuildContext::with_mode(initial, config.directory_mode),
            executions: Vec::new(),
            completed: HashMap::new(),
            call_stack: Vec::new(),
            roots: Vec::new(),
            started: Instant::now(),
        })
    }

    /// Run every root in order and summarize the build.
    ///
    /// Roots are independent: a failed root never aborts the next one, but
    /// they share the memo table so common dependencies still run once.
    pub fn build(mut self, roots: &[Arc<Task>]) -> DovetailResult<BuildResult> {
        for root in roots {
            self.execute(root)?;
        }
        Ok(self.result())
    }

    /// Like [`build`](Self::build), looking roots up by name
    pub fn build_named<S: AsRef<str>>(self, names: &[S]) -> DovetailResult<BuildResult> {
        let roots = names
            .iter()
            .map(|name| self.dependencies.find(name.as_ref()))
            .collect::<DovetailResult<Vec<_>>>()?;
        self.build(&roots)
    }

    /// Summary of everything executed so far
    pub fn result(&self) -> BuildResult {
        BuildResult::from_executions(&self.executions, &self.roots, self.started.elapsed())
    }

    pub fn execution(&self, id: ExecutionId) -> &Execution {
        &self.executions[id.0]
    }

    pub fn executions(&self) -> &[Execution] {
        &self.executions
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Wall time of `id` minus the time spent in its dependencies
    pub fn internal_elapsed(&self, id: ExecutionId) -> Duration {
        crate::results::internal_elapsed(&self.executions, id)
    }

    /// The FAILED execution responsible for `id` not succeeding, if any
    pub fn find_failed(&self, id: ExecutionId) -> Option<ExecutionId> {
        crate::results::find_failed(&self.executions, id)
    }

    /// Execute `task` and, first, its dependencies.
    ///
    /// Returns the id of the new Execution. Task failures are recorded on it;
    /// `Err` means the build itself cannot continue.
    pub fn execute(&mut self, task: &Arc<Task>) -> DovetailResult<ExecutionId> {
        debug!("Entering execute({})", task.name());

        if let Some(&original) = self.completed.get(task.name()) {
            let id = self.push_frame(task);
            let original_ok = self.executions[original.0].is_ok();
            self.executions[id.0].repeated(original, original_ok);
            info!("{}", self.executions[id.0]);
            self.pop_frame(id);
            return Ok(id);
        }

        let circular = self
            .call_stack
            .iter()
            .any(|frame| self.executions[frame.0].task().name() == task.name());

        let id = self.push_frame(task);

        if circular {
            let stack = self.call_stack_names();
            error!(
                "Detected a circular dependency on {} in the call stack: {}",
                task.name(),
                stack.join(" => ")
            );
            let err = DovetailError::CircularDependency {
                task: task.name().to_string(),
                stack,
            };
            self.executions[id.0].system_failure(err.to_string());
            self.pop_frame(id);
            return Err(err);
        }

        info!("{}", self.executions[id.0]);
        let previous_dir = self.context.observe_dir();
        let outcome = self.run_frame(id, task);

        if !self.context.is_in(&previous_dir) {
            self.context.restore_dir(&previous_dir);
        }

        if let Err(err) = &outcome {
            self.executions[id.0].system_failure(err.to_string());
        }

        self.pop_frame(id);
        info!(
            "{} Time: elapsed={:.3}s",
            self.executions[id.0],
            self.executions[id.0].elapsed().as_secs_f64()
        );

        outcome.map(|()| {
            self.completed.insert(task.name().to_string(), id);
            id
        })
    }

    fn run_frame(&mut self, id: ExecutionId, task: &Arc<Task>) -> DovetailResult<()> {
        let directives = task.directives();
        let target_dir = task
            .working_directory()
            .map(|dir| self.context.resolve(dir));

        if let Some(dir) = &target_dir {
            self.enter_dir(id, dir);
        }

        let mut entered = 0;
        if self.state(id) == TaskState::Running {
            for (index, directive) in directives.iter().enumerate() {
                match self.call_before(id, index, directive, task) {
                    Ok(outcome) => {
                        entered += 1;
                        if self.apply_before(id, outcome) {
                            break;
                        }
                    }
                    Err(err) => {
                        self.unwind_after_pass(id, &directives[..entered]);
                        return Err(err);
                    }
                }
            }
        }

        if self.state(id) == TaskState::Running {
            let dependencies: &'a Dependencies = self.dependencies;
            let task_dependencies = dependencies.get(task);
            if !task_dependencies.is_empty() {
                info!(
                    "Running dependencies of {}: {}",
                    task.name(),
                    task_dependencies
                        .iter()
                        .map(|d| d.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }

            for dependency in task_dependencies {
                debug!("{} needs {}", task.name(), dependency.name());
                match self.execute(dependency) {
                    Ok(child) => {
                        if !self.executions[child.0].is_ok() {
                            info!("Dependency failed: {}", self.executions[child.0]);
                            let cause = TaskError::new(format!(
                                "Dependency '{}' did not succeed",
                                dependency.name()
                            ));
                            self.executions[id.0].abort(child, cause);
                            break;
                        }
                    }
                    Err(err) => {
                        self.unwind_after_pass(id, &directives[..entered]);
                        return Err(err);
                    }
                }
            }

            // Dependencies may have left the context elsewhere
            if let Some(dir) = &target_dir {
                if self.state(id) == TaskState::Running {
                    self.enter_dir(id, dir);
                }
            }
        }

        if self.state(id) == TaskState::Running {
            info!("Running body of {}", task.name());
            if let Err(e) = task.run_body(&self.context) {
                error!("{} failed: {:#}", task.name(), e);
                self.executions[id.0].fail(TaskError::from_error(&e));
            }
        }

        self.after_pass(id, directives, task)?;

        if self.state(id) == TaskState::Running {
            self.executions[id.0].succeed();
        }

        Ok(())
    }

    fn state(&self, id: ExecutionId) -> TaskState {
        self.executions[id.0].state()
    }

    fn enter_dir(&mut self, id: ExecutionId, dir: &Path) {
        if self.context.is_in(dir) {
            return;
        }
        if let Err(e) = self.context.change_dir(dir) {
            error!("{}", e);
            self.executions[id.0].fail(TaskError::new(e.to_string()));
        }
    }

    fn call_before(
        &mut self,
        id: ExecutionId,
        index: usize,
        directive: &Directive,
        task: &Task,
    ) -> DovetailResult<Outcome> {
        let execution = &mut self.executions[id.0];
        execution.set_active_directive(Some(index));
        let outcome = directive.before(execution, &mut self.context);
        execution.set_active_directive(None);
        outcome.map_err(|e| DovetailError::Directive {
            task: task.name().to_string(),
            directive: directive.name().to_string(),
            message: e.message,
        })
    }

    /// Apply a `before` outcome; true ends the pass
    fn apply_before(&mut self, id: ExecutionId, outcome: Outcome) -> bool {
        let execution = &mut self.executions[id.0];
        match outcome {
            Outcome::Continue => false,
            Outcome::Skip(reason) => {
                info!("Skipping {}: {}", execution.task().name(), reason);
                execution.skip(reason);
                true
            }
            Outcome::Fail(message) => {
                execution.fail(TaskError::new(message));
                true
            }
        }
    }

    /// Reverse-order `after` pass over every directive. All hooks run even
    /// when one breaks; the first framework error is returned.
    fn after_pass(
        &mut self,
        id: ExecutionId,
        directives: &[Directive],
        task: &Task,
    ) -> DovetailResult<()> {
        let mut first_error = None;
        for (index, directive) in directives.iter().enumerate().rev() {
            let execution = &mut self.executions[id.0];
            execution.set_active_directive(Some(index));
            let outcome = directive.after(execution, &mut self.context);
            execution.set_active_directive(None);

            match outcome {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Fail(message)) => execution.fail(TaskError::new(message)),
                Ok(Outcome::Skip(reason)) => {
                    if execution.state() == TaskState::Skipped {
                        execution.skip(reason);
                    } else {
                        warn!(
                            "Directive {} asked to skip {} after it ran; ignoring",
                            directive.name(),
                            task.name()
                        );
                    }
                }
                Err(e) => {
                    error!(
                        "Directive {} on {} failed in after(): {}",
                        directive.name(),
                        task.name(),
                        e
                    );
                    first_error.get_or_insert(DovetailError::Directive {
                        task: task.name().to_string(),
                        directive: directive.name().to_string(),
                        message: e.message,
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// `after` pass while a framework error unwinds this frame. Only the
    /// directives whose `before` completed take part; their own errors are
    /// logged and dropped in favour of the one already unwinding.
    fn unwind_after_pass(&mut self, id: ExecutionId, entered: &[Directive]) {
        let task = Arc::clone(self.executions[id.0].task());
        if let Err(e) = self.after_pass(id, entered, &task) {
            warn!("Ignoring error while unwinding {}: {}", task.name(), e);
        }
    }

    fn push_frame(&mut self, task: &Arc<Task>) -> ExecutionId {
        let parent = self.call_stack.last().copied();
        let index = self.executions.len();
        let mut execution = Execution::new(Arc::clone(task), parent, index);
        let id = execution.id();

        match parent {
            Some(parent) => {
                let parent = &mut self.executions[parent.0];
                execution.set_depth(parent.depth() + 1);
                parent.add_child(id);
            }
            None => self.roots.push(id),
        }

        self.executions.push(execution);
        self.call_stack.push(id);
        id
    }

    fn pop_frame(&mut self, id: ExecutionId) {
        let popped = self.call_stack.pop();
        debug_assert_eq!(popped, Some(id));
        self.executions[id.0].finish();
        debug!("Leaving execute({})", self.executions[id.0].task().name());
    }

    fn call_stack_names(&self) -> Vec<String> {
        self.call_stack
            .iter()
            .map(|frame| self.executions[frame.0].task().name().to_string())
            .collect()
    }
}
