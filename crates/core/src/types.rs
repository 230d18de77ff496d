use thiserror::Error;

/// The main error type for Dovetail operations.
///
/// Task-level failures (a body returning an error, a failed dependency) are
/// recorded on the [`Execution`](crate::execution::Execution) and never show up
/// here. Everything in this enum is either a loading problem or a
/// framework-level failure that aborts the whole build.
#[derive(Debug, Error)]
pub enum DovetailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task error: {0}")]
    Task(String),

    #[error("Task '{0}' is declared more than once")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on '{dependency}' which was not found")]
    MissingDependency { task: String, dependency: String },

    #[error("No such task: {0}")]
    NoSuchTask(String),

    #[error("Circular dependency on '{task}' in: {}", .stack.join(" => "))]
    CircularDependency { task: String, stack: Vec<String> },

    #[error("Directive '{directive}' on task '{task}' failed: {message}")]
    Directive {
        task: String,
        directive: String,
        message: String,
    },
}

impl DovetailError {
    /// True for errors that abort a running build rather than a single task
    pub fn is_framework_failure(&self) -> bool {
        matches!(
            self,
            DovetailError::CircularDependency { .. } | DovetailError::Directive { .. }
        )
    }
}

/// Result type alias for Dovetail operations
pub type DovetailResult<T> = Result<T, DovetailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_message_shows_stack() {
        let err = DovetailError::CircularDependency {
            task: "a".to_string(),
            stack: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Circular dependency on 'a' in: a => b => a");
        assert!(err.is_framework_failure());
    }

    #[test]
    fn test_loading_errors_are_not_framework_failures() {
        let err = DovetailError::MissingDependency {
            task: "build".to_string(),
            dependency: "fetch".to_string(),
        };
        assert!(!err.is_framework_failure());
        assert!(err.to_string().contains("'fetch'"));
    }
}
