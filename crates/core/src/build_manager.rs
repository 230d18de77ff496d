//! High-level build interface
//!
//! [`BuildManager`] loads a build file, turns it into the task model and runs
//! queries and builds against it. It is what the `dovetail` binary drives.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dovetail_core::build_manager::{BuildManager, BuildManagerConfig};
//! use std::path::PathBuf;
//!
//! # fn example() -> dovetail_core::types::DovetailResult<()> {
//! let manager = BuildManager::new(BuildManagerConfig {
//!     search_dir: PathBuf::from("."),
//!     ..Default::default()
//! })?;
//!
//! let plan = manager.get_execution_plan(&["test"])?;
//! let result = manager.run(&["test"])?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::configs::build::{base_dir_of, parse_build_config, BuildFileConfig, BuildFileFormat};
use crate::execution::context::DirectoryMode;
use crate::execution::processor::{Processor, ProcessorConfig};
use crate::graph::{build_dependency_graph, describe_cycles, plan_execution};
use crate::model::Dependencies;
use crate::results::{BuildResult, DependencyGraphResult, TaskInfo, TaskListResult, TaskPlanResult};
use crate::tasks::get_task_color;
use crate::types::{DovetailError, DovetailResult};

/// Build file names tried, in order, when none is given
pub const DEFAULT_BUILD_FILES: &[&str] = &["dovetail.yml", "dovetail.yaml", "dovetail.toml"];

/// Configuration for initializing a build manager
#[derive(Debug, Clone, Default)]
pub struct BuildManagerConfig {
    /// Explicit build file; relative paths resolve against `search_dir`
    pub build_file: Option<PathBuf>,
    /// Directory searched for a default build file
    pub search_dir: PathBuf,
    pub directory_mode: DirectoryMode,
}

pub struct BuildManager {
    pub build_file: PathBuf,
    pub config_name: Option<String>,
    pub config_description: Option<String>,
    dependencies: Dependencies,
    directory_mode: DirectoryMode,
}

impl BuildManager {
    /// Locate and load the build file
    pub fn new(config: BuildManagerConfig) -> DovetailResult<Self> {
        let build_file = Self::locate_build_file(&config)?;
        let build_config = Self::load_build_config(&build_file)?;

        let name = build_config.name.clone();
        let description = build_config.description.clone();
        let dependencies = build_config.into_dependencies(&base_dir_of(&build_file))?;
        debug!(
            "Loaded {} tasks from {}",
            dependencies.len(),
            build_file.display()
        );

        let manager = Self {
            build_file,
            config_name: name,
            config_description: description,
            dependencies,
            directory_mode: config.directory_mode,
        };

        let cycles = build_dependency_graph(&manager.dependencies).cycles;
        if !cycles.is_empty() {
            warn!(
                "Build file {} declares circular dependencies: {}",
                manager.build_file.display(),
                describe_cycles(&cycles)
            );
        }

        Ok(manager)
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Directory the build file's relative paths resolve against
    pub fn base_dir(&self) -> PathBuf {
        base_dir_of(&self.build_file)
    }

    /// List all declared tasks, sorted by name
    pub fn list_tasks(&self) -> DovetailResult<TaskListResult> {
        let mut tasks: Vec<TaskInfo> = self
            .dependencies
            .tasks()
            .map(|task| TaskInfo {
                name: task.name().to_string(),
                description: task.description().map(str::to_string),
                dependencies: task.declared_dependencies().to_vec(),
                directives: task
                    .directives()
                    .iter()
                    .map(|d| d.name().to_string())
                    .collect(),
                working_directory: task.working_directory().map(Path::to_path_buf),
            })
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));

        let task_colors = self.get_task_colors(tasks.iter().map(|t| t.name.as_str()));

        Ok(TaskListResult {
            build_file: self.build_file.clone(),
            tasks,
            task_colors,
        })
    }

    /// Order in which task bodies would run for `targets`
    pub fn get_execution_plan<S: AsRef<str>>(&self, targets: &[S]) -> DovetailResult<TaskPlanResult> {
        let roots = self.resolve_targets(targets)?;
        let order = plan_execution(&self.dependencies, &roots)?;
        let task_colors = self.get_task_colors(order.iter().map(String::as_str));

        Ok(TaskPlanResult {
            targets: roots.iter().map(|t| t.name().to_string()).collect(),
            order,
            task_colors,
        })
    }

    /// Build `targets` in order
    pub fn run<S: AsRef<str>>(&self, targets: &[S]) -> DovetailResult<BuildResult> {
        let roots = self.resolve_targets(targets)?;

        let initial_directory = match self.directory_mode {
            DirectoryMode::Context => Some(absolute(&self.base_dir())?),
            DirectoryMode::Process => None,
        };
        let processor = Processor::new(
            &self.dependencies,
            ProcessorConfig {
                directory_mode: self.directory_mode,
                initial_directory,
            },
        )?;
        processor.build(&roots)
    }

    /// Get dependency graph information
    pub fn get_dependency_graph(&self) -> DovetailResult<DependencyGraphResult> {
        Ok(build_dependency_graph(&self.dependencies))
    }

    fn resolve_targets<S: AsRef<str>>(
        &self,
        targets: &[S],
    ) -> DovetailResult<Vec<std::sync::Arc<crate::model::Task>>> {
        if targets.is_empty() {
            return Err(DovetailError::Task("No tasks given".to_string()));
        }
        targets
            .iter()
            .map(|name| self.dependencies.find(name.as_ref()))
            .collect()
    }

    fn locate_build_file(config: &BuildManagerConfig) -> DovetailResult<PathBuf> {
        if let Some(file) = &config.build_file {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                config.search_dir.join(file)
            };
            if !path.is_file() {
                return Err(DovetailError::Config(format!(
                    "Build file {} does not exist",
                    path.display()
                )));
            }
            return Ok(path);
        }

        DEFAULT_BUILD_FILES
            .iter()
            .map(|name| config.search_dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                DovetailError::Config(format!(
                    "No build file found in {} (looked for {})",
                    config.search_dir.display(),
                    DEFAULT_BUILD_FILES.join(", ")
                ))
            })
    }

    fn load_build_config(path: &Path) -> DovetailResult<BuildFileConfig> {
        let format = BuildFileFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            DovetailError::Config(format!("Failed to read build file {}: {}", path.display(), e))
        })?;

        parse_build_config(&content, format).map_err(|e| {
            DovetailError::Config(format!("Failed to parse build file {}: {}", path.display(), e))
        })
    }

    fn get_task_colors<'n>(
        &self,
        names: impl Iterator<Item = &'n str>,
    ) -> HashMap<String, colored::Color> {
        names
            .map(|name| (name.to_string(), get_task_color(name)))
            .collect()
    }
}

fn absolute(path: &Path) -> DovetailResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
