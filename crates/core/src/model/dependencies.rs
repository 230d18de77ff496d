//! Dependency edge store
//!
//! Maps each task to its ordered, de-duplicated dependency list. The store is
//! assembled once by the loader and only queried while a build runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::model::task::Task;
use crate::types::{DovetailError, DovetailResult};

#[derive(Debug, Default, Clone)]
pub struct Dependencies {
    tasks: Vec<Arc<Task>>,
    by_name: HashMap<String, Arc<Task>>,
    edges: HashMap<String, Vec<Arc<Task>>>,
}

impl Dependencies {
    /// Register every task and resolve the dependency names each declares.
    ///
    /// Forward references are allowed; unknown names and duplicate task names
    /// are rejected. Cycles are not rejected here, they are caught while
    /// executing.
    pub fn from_tasks<I>(tasks: I) -> DovetailResult<Self>
    where
        I: IntoIterator<Item = Task>,
    {
        let mut dependencies = Self::default();
        for task in tasks {
            dependencies.register(task)?;
        }

        for task in dependencies.tasks.clone() {
            let names = task.declared_dependencies().to_vec();
            dependencies.add(task.name(), names)?;
        }

        Ok(dependencies)
    }

    fn register(&mut self, task: Task) -> DovetailResult<Arc<Task>> {
        if self.by_name.contains_key(task.name()) {
            return Err(DovetailError::DuplicateTask(task.name().to_string()));
        }
        let task = Arc::new(task);
        self.by_name.insert(task.name().to_string(), Arc::clone(&task));
        self.tasks.push(Arc::clone(&task));
        Ok(task)
    }

    /// Append dependencies to a registered task, keeping first occurrences only
    pub fn add<I, S>(&mut self, task_name: &str, dependencies: I) -> DovetailResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.by_name.contains_key(task_name) {
            return Err(DovetailError::NoSuchTask(task_name.to_string()));
        }

        let mut resolved = Vec::new();
        for name in dependencies {
            let name = name.as_ref();
            let dependency = self.by_name.get(name).ok_or_else(|| {
                DovetailError::MissingDependency {
                    task: task_name.to_string(),
                    dependency: name.to_string(),
                }
            })?;
            resolved.push(Arc::clone(dependency));
        }

        let entry = self.edges.entry(task_name.to_string()).or_default();
        let mut seen: HashSet<String> = entry.iter().map(|t| t.name().to_string()).collect();
        for dependency in resolved {
            if seen.insert(dependency.name().to_string()) {
                entry.push(dependency);
            } else {
                debug!(
                    "Ignoring duplicate dependency '{}' of '{}'",
                    dependency.name(),
                    task_name
                );
            }
        }

        Ok(())
    }

    /// Ordered dependencies of `task`, empty when it has none
    pub fn get(&self, task: &Task) -> &[Arc<Task>] {
        self.edges
            .get(task.name())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn task(&self, name: &str) -> Option<&Arc<Task>> {
        self.by_name.get(name)
    }

    pub fn find(&self, name: &str) -> DovetailResult<Arc<Task>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| DovetailError::NoSuchTask(name.to_string()))
    }

    /// All tasks in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tasks: &[Arc<Task>]) -> Vec<&str> {
        tasks.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn test_dependencies_keep_declaration_order() {
        let deps = Dependencies::from_tasks([
            Task::new("all").depends_on(["lint", "test", "build"]),
            Task::new("build"),
            Task::new("test"),
            Task::new("lint"),
        ])
        .unwrap();

        let all = deps.find("all").unwrap();
        assert_eq!(names(deps.get(&all)), vec!["lint", "test", "build"]);
        assert_eq!(
            deps.tasks().map(|t| t.name()).collect::<Vec<_>>(),
            vec!["all", "build", "test", "lint"]
        );
    }

    #[test]
    fn test_duplicate_dependencies_are_collapsed() {
        let deps = Dependencies::from_tasks([
            Task::new("a").depends_on(["b", "c", "b"]),
            Task::new("b"),
            Task::new("c"),
        ])
        .unwrap();

        let a = deps.find("a").unwrap();
        assert_eq!(names(deps.get(&a)), vec!["b", "c"]);
    }

    #[test]
    fn test_missing_dependency_is_reported() {
        let err = Dependencies::from_tasks([Task::new("a").depends_on(["ghost"])]).unwrap_err();
        match err {
            DovetailError::MissingDependency { task, dependency } => {
                assert_eq!(task, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_task_is_rejected() {
        let err = Dependencies::from_tasks([Task::new("a"), Task::new("a")]).unwrap_err();
        assert!(matches!(err, DovetailError::DuplicateTask(name) if name == "a"));
    }

    #[test]
    fn test_add_appends_without_duplicates() {
        let mut deps =
            Dependencies::from_tasks([Task::new("a").depends_on(["b"]), Task::new("b"), Task::new("c")])
                .unwrap();

        deps.add("a", ["c", "b"]).unwrap();

        let a = deps.find("a").unwrap();
        assert_eq!(names(deps.get(&a)), vec!["b", "c"]);
        assert!(deps.add("nope", ["a"]).is_err());
    }

    #[test]
    fn test_task_without_edges_has_no_dependencies() {
        let deps = Dependencies::from_tasks([Task::new("solo")]).unwrap();
        let solo = deps.find("solo").unwrap();
        assert!(deps.get(&solo).is_empty());
        assert!(matches!(deps.find("other"), Err(DovetailError::NoSuchTask(_))));
    }
}
