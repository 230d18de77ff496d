//! Result types for build operations
//!
//! [`BuildResult`] is the summary of one build, assembled from the Execution
//! tree once every root has completed. The remaining types are returned by
//! [`BuildManager`](crate::build_manager::BuildManager) queries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use colored::Color;
use serde::Serialize;

use crate::execution::state::{Execution, ExecutionId, TaskError, TaskState};

/// Per-execution line of a build report
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub state: TaskState,
    /// Depth in the call stack; roots are at depth 0
    pub depth: usize,
    /// Wall time including dependencies, in seconds
    pub elapsed_secs: f64,
    /// Wall time excluding dependencies, in seconds
    pub internal_secs: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

/// Summary of a completed build
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub success: bool,
    /// FAILED and ABORTED tasks in completion order
    pub failed: Vec<String>,
    /// Every execution, depth first in execution order
    pub reports: Vec<TaskReport>,
    /// Names of the requested root tasks
    pub tasks: Vec<String>,
    pub elapsed_secs: f64,
    #[serde(skip)]
    root_cause: Option<usize>,
}

impl BuildResult {
    pub(crate) fn from_executions(
        executions: &[Execution],
        roots: &[ExecutionId],
        elapsed: Duration,
    ) -> Self {
        let mut reports = Vec::with_capacity(executions.len());
        let mut report_index = HashMap::new();
        let mut failed = Vec::new();
        let mut success = true;

        for &root in roots {
            walk(
                executions,
                root,
                &mut reports,
                &mut report_index,
                &mut failed,
                &mut success,
            );
        }

        let root_cause = roots
            .iter()
            .find_map(|&root| find_failed(executions, root))
            .and_then(|id| report_index.get(&id).copied());

        Self {
            success,
            failed,
            reports,
            tasks: roots
                .iter()
                .map(|root| executions[root.0].task().name().to_string())
                .collect(),
            elapsed_secs: elapsed.as_secs_f64(),
            root_cause,
        }
    }

    /// First report for `name` that is not a repeat
    pub fn report(&self, name: &str) -> Option<&TaskReport> {
        self.reports
            .iter()
            .find(|r| r.name == name && r.state != TaskState::Repeated)
    }

    /// The FAILED execution behind the first failing root
    pub fn root_cause(&self) -> Option<&TaskReport> {
        self.root_cause.map(|index| &self.reports[index])
    }

    pub fn total_elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs)
    }

    /// Number of executions, repeats included
    pub fn count(&self) -> usize {
        self.reports.len()
    }

    /// The slowest tasks by internal time, covering `fraction` of the build
    /// time, ignoring tasks faster than `min_secs`
    pub fn slowest(&self, fraction: f64, min_secs: f64) -> Vec<&TaskReport> {
        let mut by_time: Vec<&TaskReport> = self
            .reports
            .iter()
            .filter(|r| r.state != TaskState::Repeated)
            .collect();
        by_time.sort_by(|a, b| b.internal_secs.total_cmp(&a.internal_secs));

        let upto = self.elapsed_secs * fraction;
        let mut total = 0.0;
        let mut slowest = Vec::new();
        for report in by_time {
            if report.internal_secs < min_secs {
                break;
            }
            total += report.internal_secs;
            slowest.push(report);
            if total >= upto {
                break;
            }
        }
        slowest
    }
}

fn walk(
    executions: &[Execution],
    id: ExecutionId,
    reports: &mut Vec<TaskReport>,
    report_index: &mut HashMap<ExecutionId, usize>,
    failed: &mut Vec<String>,
    success: &mut bool,
) {
    let execution = &executions[id.0];
    let elapsed = execution.elapsed();

    report_index.insert(id, reports.len());
    reports.push(TaskReport {
        name: execution.task().name().to_string(),
        state: execution.state(),
        depth: execution.depth(),
        elapsed_secs: elapsed.as_secs_f64(),
        internal_secs: internal_elapsed(executions, id).as_secs_f64(),
        skip_reasons: execution.skip_reasons().to_vec(),
        error: execution.error().cloned(),
    });

    *success &= execution.is_ok();

    for &child in execution.children() {
        walk(executions, child, reports, report_index, failed, success);
    }

    if matches!(execution.state(), TaskState::Failed | TaskState::Aborted) {
        let name = execution.task().name();
        if !failed.iter().any(|f| f == name) {
            failed.push(name.to_string());
        }
    }
}

pub(crate) fn internal_elapsed(executions: &[Execution], id: ExecutionId) -> Duration {
    let execution = &executions[id.0];
    let children: Duration = execution
        .children()
        .iter()
        .map(|child| executions[child.0].elapsed())
        .sum();
    execution.elapsed().saturating_sub(children)
}

/// Follow ABORTED (and REPEATED) links down to the execution that failed
pub(crate) fn find_failed(executions: &[Execution], id: ExecutionId) -> Option<ExecutionId> {
    let execution = &executions[id.0];
    match execution.state() {
        TaskState::Failed => Some(id),
        TaskState::Aborted => execution
            .failed_dependency()
            .and_then(|dependency| find_failed(executions, dependency)),
        TaskState::Repeated if !execution.is_ok() => execution
            .repeat_of()
            .and_then(|original| find_failed(executions, original)),
        _ => None,
    }
}

/// Information about a declared task
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    pub directives: Vec<String>,
    pub working_directory: Option<PathBuf>,
}

/// Result of listing the tasks of a build file
#[derive(Debug)]
pub struct TaskListResult {
    pub build_file: PathBuf,
    pub tasks: Vec<TaskInfo>,
    pub task_colors: HashMap<String, Color>,
}

/// Result of getting the task dependency graph
#[derive(Debug)]
pub struct DependencyGraphResult {
    pub graph: petgraph::Graph<String, ()>,
    pub cycles: Vec<Vec<String>>,
}

/// Result of planning a build without running it
#[derive(Debug)]
pub struct TaskPlanResult {
    pub targets: Vec<String>,
    /// Task names in the order their bodies would run if nothing fails
    pub order: Vec<String>,
    pub task_colors: HashMap<String, Color>,
}
