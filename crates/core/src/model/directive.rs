//! Directives: before/after hooks attached to tasks
//!
//! Directives are a closed set of variants behind one interface. `before`
//! hooks run in declaration order and the first SKIP or FAIL short-circuits the
//! rest of the pass along with the task body. `after` hooks run in reverse
//! declaration order once the task has finished, whatever its outcome.
//!
//! A hook that returns `Err` is not a task failure: it aborts the whole build.
//! Directives keep no state of their own; anything they need to carry from
//! `before` to `after` is stored on the [`Execution`].

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use globset::Glob;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::execution::context::BuildContext;
use crate::execution::state::{Execution, TaskState};

/// What a hook asks the engine to do with the task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Skip(String),
    Fail(String),
}

/// A directive broke outside the SKIP/FAIL contract
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DirectiveError {
    pub message: String,
}

impl DirectiveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type HookFn =
    Arc<dyn Fn(&mut Execution, &mut BuildContext) -> Result<Outcome, DirectiveError> + Send + Sync>;

/// A user-supplied directive with optional before and after callbacks
#[derive(Clone)]
pub struct Hook {
    name: String,
    before: Option<HookFn>,
    after: Option<HookFn>,
}

impl Hook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: None,
            after: None,
        }
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Execution, &mut BuildContext) -> Result<Outcome, DirectiveError>
            + Send
            + Sync
            + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Execution, &mut BuildContext) -> Result<Outcome, DirectiveError>
            + Send
            + Sync
            + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// Conditions evaluated against the build context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// The variable is set in the context overlay or the process environment
    EnvSet(String),
    EnvEquals { name: String, value: String },
    /// At least one path under the context directory matches the glob
    Exists(String),
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

const EXISTS_EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules"];

impl Predicate {
    pub fn evaluate(&self, context: &BuildContext) -> Result<bool, DirectiveError> {
        match self {
            Predicate::EnvSet(name) => Ok(context.var(name).is_some()),
            Predicate::EnvEquals { name, value } => {
                Ok(context.var(name).as_deref() == Some(value.as_str()))
            }
            Predicate::Exists(pattern) => path_matches(context, pattern),
            Predicate::Not(inner) => Ok(!inner.evaluate(context)?),
            Predicate::All(all) => {
                for predicate in all {
                    if !predicate.evaluate(context)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Any(any) => {
                for predicate in any {
                    if predicate.evaluate(context)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::EnvSet(name) => write!(f, "${name} is set"),
            Predicate::EnvEquals { name, value } => write!(f, "${name} == '{value}'"),
            Predicate::Exists(pattern) => write!(f, "'{pattern}' exists"),
            Predicate::Not(inner) => write!(f, "not ({inner})"),
            Predicate::All(all) => write!(f, "all of [{}]", join_predicates(all)),
            Predicate::Any(any) => write!(f, "any of [{}]", join_predicates(any)),
        }
    }
}

fn join_predicates(predicates: &[Predicate]) -> String {
    predicates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

fn path_matches(context: &BuildContext, pattern: &str) -> Result<bool, DirectiveError> {
    if !is_glob(pattern) {
        return Ok(context.resolve(Path::new(pattern)).exists());
    }

    let matcher = Glob::new(pattern)
        .map_err(|e| DirectiveError::new(format!("Invalid glob '{pattern}': {e}")))?
        .compile_matcher();

    let root = context.current_dir().to_path_buf();
    let mut queue = VecDeque::new();
    queue.push_back(root.clone());

    while let Some(current_dir) = queue.pop_front() {
        let Ok(entries) = std::fs::read_dir(&current_dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let relative_path = path.strip_prefix(&root).unwrap_or(&path);

            if matcher.is_match(relative_path) {
                return Ok(true);
            }

            let excluded = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| EXISTS_EXCLUDED_DIRS.contains(&n));
            // Symlinked directories are never followed
            let is_dir = entry.file_type().is_ok_and(|file_type| file_type.is_dir());
            if is_dir && !excluded {
                queue.push_back(path);
            }
        }
    }

    Ok(false)
}

/// Environment overrides applied to the build context for the task's duration.
/// A `None` value unsets the variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvAdjustment {
    vars: Vec<(String, Option<String>)>,
}

impl EnvAdjustment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((name.into(), Some(value.into())));
        self
    }

    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.vars.push((name.into(), None));
        self
    }

    pub fn vars(&self) -> &[(String, Option<String>)] {
        &self.vars
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Previous overlay entry for one variable, kept on the Execution between
/// `before` and `after`
#[derive(Debug, Serialize, Deserialize)]
struct EnvMemento {
    name: String,
    /// Whether the overlay had an entry; a JSON null cannot tell `Some(None)` from `None`
    overridden: bool,
    value: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Directive {
    /// Skip the task when the predicate holds
    SkipIf(Predicate),
    /// Skip the task unless the predicate holds
    DoIf(Predicate),
    /// Turn a skipped task into a failure
    FailIfSkipped,
    Env(EnvAdjustment),
    Hook(Hook),
}

impl Directive {
    pub fn name(&self) -> &str {
        match self {
            Directive::SkipIf(_) => "skip_if",
            Directive::DoIf(_) => "do_if",
            Directive::FailIfSkipped => "fail_if_skipped",
            Directive::Env(_) => "env",
            Directive::Hook(hook) => &hook.name,
        }
    }

    pub fn before(
        &self,
        execution: &mut Execution,
        context: &mut BuildContext,
    ) -> Result<Outcome, DirectiveError> {
        debug!("Directive {} on {}: before()", self.name(), execution.task().name());
        match self {
            Directive::SkipIf(predicate) => {
                if predicate.evaluate(context)? {
                    Ok(Outcome::Skip(format!("skip_if: {predicate}")))
                } else {
                    Ok(Outcome::Continue)
                }
            }
            Directive::DoIf(predicate) => {
                if predicate.evaluate(context)? {
                    Ok(Outcome::Continue)
                } else {
                    Ok(Outcome::Skip(format!("do_if: not {predicate}")))
                }
            }
            Directive::FailIfSkipped => Ok(Outcome::Continue),
            Directive::Env(adjustment) => {
                let mut mementos = Vec::with_capacity(adjustment.vars.len());
                for (name, value) in &adjustment.vars {
                    let previous = context.set_var(name, value.clone());
                    mementos.push(EnvMemento {
                        name: name.clone(),
                        overridden: previous.is_some(),
                        value: previous.flatten(),
                    });
                }
                let value = serde_json::to_value(&mementos)
                    .map_err(|e| DirectiveError::new(format!("Cannot record environment: {e}")))?;
                let key = execution.memento_key("env");
                execution.store(key, value);
                Ok(Outcome::Continue)
            }
            Directive::Hook(hook) => match &hook.before {
                Some(before) => before(execution, context),
                None => Ok(Outcome::Continue),
            },
        }
    }

    pub fn after(
        &self,
        execution: &mut Execution,
        context: &mut BuildContext,
    ) -> Result<Outcome, DirectiveError> {
        debug!("Directive {} on {}: after()", self.name(), execution.task().name());
        match self {
            Directive::SkipIf(_) | Directive::DoIf(_) => Ok(Outcome::Continue),
            Directive::FailIfSkipped => {
                if execution.state() == TaskState::Skipped {
                    Ok(Outcome::Fail(format!(
                        "{} was skipped: {}",
                        execution.task().name(),
                        execution.skip_reasons().join(" and ")
                    )))
                } else {
                    Ok(Outcome::Continue)
                }
            }
            Directive::Env(_) => {
                let key = execution.memento_key("env");
                // before() never ran for this directive
                let Some(value) = execution.take(&key) else {
                    return Ok(Outcome::Continue);
                };
                let mementos: Vec<EnvMemento> = serde_json::from_value(value)
                    .map_err(|e| DirectiveError::new(format!("Corrupt environment memento: {e}")))?;
                for memento in mementos.into_iter().rev() {
                    let previous = memento.overridden.then_some(memento.value);
                    context.restore_var(&memento.name, previous);
                }
                Ok(Outcome::Continue)
            }
            Directive::Hook(hook) => match &hook.after {
                Some(after) => after(execution, context),
                None => Ok(Outcome::Continue),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::Task;

    fn context_in(dir: &Path) -> BuildContext {
        BuildContext::new(dir.to_path_buf())
    }

    fn execution_for(name: &str) -> Execution {
        Execution::new(Arc::new(Task::new(name)), None, 0)
    }

    #[test]
    fn test_env_predicates_read_overlay() {
        let mut context = context_in(&std::env::temp_dir());
        context.set_var("DOVETAIL_TEST_PREDICATE", Some("yes".to_string()));

        assert!(Predicate::EnvSet("DOVETAIL_TEST_PREDICATE".into())
            .evaluate(&context)
            .unwrap());
        assert!(Predicate::EnvEquals {
            name: "DOVETAIL_TEST_PREDICATE".into(),
            value: "yes".into()
        }
        .evaluate(&context)
        .unwrap());

        context.set_var("DOVETAIL_TEST_PREDICATE", None);
        assert!(!Predicate::EnvSet("DOVETAIL_TEST_PREDICATE".into())
            .evaluate(&context)
            .unwrap());
    }

    #[test]
    fn test_exists_predicate_with_plain_path_and_glob() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("main.c"), "int main;").unwrap();
        let context = context_in(temp_dir.path());

        assert!(Predicate::Exists("src".into()).evaluate(&context).unwrap());
        assert!(!Predicate::Exists("missing.txt".into()).evaluate(&context).unwrap());
        assert!(Predicate::Exists("**/*.c".into()).evaluate(&context).unwrap());
        assert!(!Predicate::Exists("**/*.rs".into()).evaluate(&context).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_exists_walk_ignores_symlink_to_ancestor() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("a");
        std::fs::create_dir(&nested).unwrap();
        std::os::unix::fs::symlink(temp_dir.path(), nested.join("loop")).unwrap();
        let context = context_in(temp_dir.path());

        assert!(!Predicate::Exists("**/*.missing".into()).evaluate(&context).unwrap());
        assert!(Predicate::Exists("a/loop".into()).evaluate(&context).unwrap());
    }

    #[test]
    fn test_invalid_glob_is_a_directive_error() {
        let context = context_in(&std::env::temp_dir());
        let err = Predicate::Exists("a[".into()).evaluate(&context).unwrap_err();
        assert!(err.message.contains("Invalid glob"));
    }

    #[test]
    fn test_combinators() {
        let context = context_in(&std::env::temp_dir());
        let never = Predicate::EnvSet("DOVETAIL_SURELY_UNSET_VARIABLE".into());
        let always = Predicate::Not(Box::new(never.clone()));

        assert!(always.evaluate(&context).unwrap());
        assert!(!Predicate::All(vec![always.clone(), never.clone()])
            .evaluate(&context)
            .unwrap());
        assert!(Predicate::Any(vec![never.clone(), always.clone()])
            .evaluate(&context)
            .unwrap());
        assert!(Predicate::All(vec![]).evaluate(&context).unwrap());
        assert!(!Predicate::Any(vec![]).evaluate(&context).unwrap());
    }

    #[test]
    fn test_skip_if_and_do_if_outcomes() {
        let mut context = context_in(&std::env::temp_dir());
        context.set_var("DOVETAIL_TEST_CI", Some("1".to_string()));
        let mut execution = execution_for("deploy");
        let ci = Predicate::EnvSet("DOVETAIL_TEST_CI".into());

        let skip = Directive::SkipIf(ci.clone())
            .before(&mut execution, &mut context)
            .unwrap();
        assert!(matches!(skip, Outcome::Skip(reason) if reason.contains("DOVETAIL_TEST_CI")));

        let run = Directive::DoIf(ci).before(&mut execution, &mut context).unwrap();
        assert_eq!(run, Outcome::Continue);
    }

    #[test]
    fn test_env_directive_restores_previous_values() {
        let mut context = context_in(&std::env::temp_dir());
        context.set_var("DOVETAIL_TEST_KEEP", Some("outer".to_string()));
        let mut execution = execution_for("env");
        execution.set_active_directive(Some(0));

        let directive = Directive::Env(
            EnvAdjustment::new()
                .set("DOVETAIL_TEST_KEEP", "inner")
                .set("DOVETAIL_TEST_NEW", "fresh")
                .unset("DOVETAIL_TEST_OTHER"),
        );

        directive.before(&mut execution, &mut context).unwrap();
        assert_eq!(context.var("DOVETAIL_TEST_KEEP").as_deref(), Some("inner"));
        assert_eq!(context.var("DOVETAIL_TEST_NEW").as_deref(), Some("fresh"));

        directive.after(&mut execution, &mut context).unwrap();
        assert_eq!(context.var("DOVETAIL_TEST_KEEP").as_deref(), Some("outer"));
        assert_eq!(context.var("DOVETAIL_TEST_NEW"), None);
        assert_eq!(context.overrides().count(), 1);
    }

    #[test]
    fn test_env_directive_keeps_outer_unset() {
        let mut context = context_in(&std::env::temp_dir());
        context.set_var("DOVETAIL_TEST_HIDDEN", None);
        let mut execution = execution_for("env");
        execution.set_active_directive(Some(0));

        let directive = Directive::Env(EnvAdjustment::new().set("DOVETAIL_TEST_HIDDEN", "shown"));
        directive.before(&mut execution, &mut context).unwrap();
        directive.after(&mut execution, &mut context).unwrap();

        let overrides: Vec<_> = context.overrides().collect();
        assert_eq!(overrides, vec![("DOVETAIL_TEST_HIDDEN", None)]);
    }

    #[test]
    fn test_env_after_without_before_is_noop() {
        let mut context = context_in(&std::env::temp_dir());
        let mut execution = execution_for("env");
        execution.set_active_directive(Some(3));
        let directive = Directive::Env(EnvAdjustment::new().set("DOVETAIL_TEST_X", "1"));

        assert_eq!(
            directive.after(&mut execution, &mut context).unwrap(),
            Outcome::Continue
        );
        assert_eq!(context.overrides().count(), 0);
    }

    #[test]
    fn test_fail_if_skipped_only_fails_skipped_tasks() {
        let mut context = context_in(&std::env::temp_dir());
        let mut execution = execution_for("optional");

        let outcome = Directive::FailIfSkipped
            .after(&mut execution, &mut context)
            .unwrap();
        assert_eq!(outcome, Outcome::Continue);

        execution.skip("nothing to do");
        let outcome = Directive::FailIfSkipped
            .after(&mut execution, &mut context)
            .unwrap();
        assert!(matches!(outcome, Outcome::Fail(msg) if msg.contains("nothing to do")));
    }

    #[test]
    fn test_hook_names_and_defaults() {
        let mut context = context_in(&std::env::temp_dir());
        let mut execution = execution_for("t");
        let directive = Directive::Hook(Hook::new("audit"));

        assert_eq!(directive.name(), "audit");
        assert_eq!(
            directive.before(&mut execution, &mut context).unwrap(),
            Outcome::Continue
        );
        assert_eq!(Directive::FailIfSkipped.name(), "fail_if_skipped");
    }
}
