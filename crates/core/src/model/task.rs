//! Task declarations

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::execution::context::BuildContext;
use crate::model::directive::Directive;

/// The body of a task. It reports failure solely by returning an error.
pub type TaskBody = Arc<dyn Fn(&BuildContext) -> anyhow::Result<()> + Send + Sync>;

/// A named unit of build work.
///
/// A task's identity is its name: two `Task` values with the same name are
/// the same build unit as far as the engine is concerned.
#[derive(Clone)]
pub struct Task {
    name: String,
    description: Option<String>,
    body: Option<TaskBody>,
    dependencies: Vec<String>,
    directives: Vec<Directive>,
    working_directory: Option<PathBuf>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            body: None,
            dependencies: Vec::new(),
            directives: Vec::new(),
            working_directory: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the body run once all dependencies have succeeded
    pub fn with_body<F>(mut self, body: F) -> Self
    where
        F: Fn(&BuildContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn with_body_arc(mut self, body: TaskBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Declare dependencies by name. Declaration order is execution order.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Run the task from `dir` instead of the caller's directory.
    /// Relative paths resolve against the caller's directory at run time.
    pub fn in_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Dependency names as declared, possibly with duplicates
    pub fn declared_dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Run the body. Tasks without a body only group their dependencies.
    pub fn run_body(&self, context: &BuildContext) -> anyhow::Result<()> {
        match &self.body {
            Some(body) => body(context),
            None => Ok(()),
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("directives", &self.directives)
            .field("working_directory", &self.working_directory)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task {}", self.name)
    }
}
