use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::execution::command::{command_body, CommandSpec};
use crate::model::{Dependencies, Directive, EnvAdjustment, Predicate, Task};
use crate::types::{DovetailError, DovetailResult};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Command {
    /// Run through `sh -c`
    Single(String),
    /// Program followed by its arguments
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvEqualsConfig {
    pub name: String,
    pub value: String,
}

/// A condition used by `skipIf` and `doIf`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub enum PredicateConfig {
    EnvSet(String),
    EnvEquals(EnvEqualsConfig),
    /// Glob matched under the task's working directory
    Exists(String),
    Not(Box<PredicateConfig>),
    All(Vec<PredicateConfig>),
    Any(Vec<PredicateConfig>),
}

impl From<PredicateConfig> for Predicate {
    fn from(config: PredicateConfig) -> Self {
        match config {
            PredicateConfig::EnvSet(name) => Predicate::EnvSet(name),
            PredicateConfig::EnvEquals(EnvEqualsConfig { name, value }) => {
                Predicate::EnvEquals { name, value }
            }
            PredicateConfig::Exists(pattern) => Predicate::Exists(pattern),
            PredicateConfig::Not(inner) => Predicate::Not(Box::new((*inner).into())),
            PredicateConfig::All(items) => Predicate::All(items.into_iter().map(Into::into).collect()),
            PredicateConfig::Any(items) => Predicate::Any(items.into_iter().map(Into::into).collect()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskConfig {
    pub name: String,
    pub description: Option<String>,
    pub script: Option<String>,
    pub command: Option<Command>,
    pub dependencies: Option<Vec<String>>,
    /// Relative paths resolve against the build file's directory
    pub working_directory: Option<String>,
    /// A null value removes the variable for the duration of the task
    pub env: Option<BTreeMap<String, Option<String>>>,
    pub skip_if: Option<PredicateConfig>,
    pub do_if: Option<PredicateConfig>,
    pub fail_if_skipped: Option<bool>,
}

impl TaskConfig {
    /// Build the task, resolving relative paths against `base_dir`.
    ///
    /// Directives are attached in a fixed order: `env`, `doIf`, `skipIf`,
    /// then `failIfSkipped`, so the environment is in place before any
    /// predicate is evaluated and the skip check sees every skip reason.
    pub fn into_task(self, base_dir: &Path) -> DovetailResult<Task> {
        if self.name.trim().is_empty() {
            return Err(DovetailError::Config("Task name must not be empty".to_string()));
        }

        let spec = match (self.command, self.script) {
            (Some(_), Some(_)) => {
                return Err(DovetailError::Config(format!(
                    "Task '{}' declares both 'command' and 'script'",
                    self.name
                )))
            }
            (Some(Command::Single(cmd)), None) => Some(CommandSpec::Shell(cmd)),
            (Some(Command::Multiple(argv)), None) => {
                if argv.is_empty() {
                    return Err(DovetailError::Config(format!(
                        "Task '{}' has an empty command list",
                        self.name
                    )));
                }
                Some(CommandSpec::Args(argv))
            }
            (None, Some(script)) => Some(CommandSpec::Script(base_dir.join(script))),
            (None, None) => None,
        };

        let mut task = Task::new(self.name.clone());
        if let Some(description) = self.description {
            task = task.with_description(description);
        }
        if let Some(spec) = spec {
            task = task.with_body_arc(command_body(self.name.clone(), spec));
        }
        if let Some(dependencies) = self.dependencies {
            task = task.depends_on(dependencies);
        }
        if let Some(dir) = self.working_directory {
            task = task.in_directory(base_dir.join(dir));
        }

        if let Some(env) = self.env {
            let adjustment = env.into_iter().fold(EnvAdjustment::new(), |acc, (name, value)| {
                match value {
                    Some(value) => acc.set(name, value),
                    None => acc.unset(name),
                }
            });
            if !adjustment.is_empty() {
                task = task.with_directive(Directive::Env(adjustment));
            }
        }
        if let Some(predicate) = self.do_if {
            task = task.with_directive(Directive::DoIf(predicate.into()));
        }
        if let Some(predicate) = self.skip_if {
            task = task.with_directive(Directive::SkipIf(predicate.into()));
        }
        if self.fail_if_skipped.unwrap_or(false) {
            task = task.with_directive(Directive::FailIfSkipped);
        }

        Ok(task)
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildFileConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tasks: Vec<TaskConfig>,
}

impl BuildFileConfig {
    /// Convert every task and wire up the dependency edges
    pub fn into_dependencies(self, base_dir: &Path) -> DovetailResult<Dependencies> {
        let tasks = self
            .tasks
            .into_iter()
            .map(|config| config.into_task(base_dir))
            .collect::<DovetailResult<Vec<_>>>()?;
        Dependencies::from_tasks(tasks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFileFormat {
    Yaml,
    Toml,
}

impl BuildFileFormat {
    pub fn from_path(path: &Path) -> DovetailResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml") | Some("yaml") => Ok(BuildFileFormat::Yaml),
            Some("toml") => Ok(BuildFileFormat::Toml),
            _ => Err(DovetailError::Config(format!(
                "Unsupported build file '{}': expected .yml, .yaml or .toml",
                path.display()
            ))),
        }
    }
}

pub fn parse_build_config(source: &str, format: BuildFileFormat) -> DovetailResult<BuildFileConfig> {
    let config: BuildFileConfig = match format {
        BuildFileFormat::Yaml => serde_yaml::from_str(source)?,
        BuildFileFormat::Toml => toml::from_str(source)?,
    };
    Ok(config)
}

/// JSON schema for the build file, pretty printed
pub fn schema_json() -> DovetailResult<String> {
    let schema = schemars::schema_for!(BuildFileConfig);
    serde_json::to_string_pretty(&schema)
        .map_err(|e| DovetailError::Config(format!("Failed to render schema: {}", e)))
}

/// Directory a build file's relative paths resolve against
pub fn base_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
