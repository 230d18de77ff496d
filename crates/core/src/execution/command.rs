//! Command execution utilities
//!
//! Bodies for tasks loaded from build files: a shell command, an executable
//! with arguments, or a script. Commands run in the build context's working
//! directory with its environment overlay applied.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{debug, info};

use crate::execution::context::BuildContext;
use crate::model::task::TaskBody;

/// What a loaded task runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    Shell(String),
    Args(Vec<String>),
    Script(PathBuf),
}

/// Runs commands on behalf of one task
pub struct CommandExecutor<'a> {
    context: &'a BuildContext,
    task_name: &'a str,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(context: &'a BuildContext, task_name: &'a str) -> Self {
        Self { context, task_name }
    }

    /// Execute a command with common setup and error handling
    pub fn execute_command(
        &self,
        command: &mut Command,
        execution_error_message: &str,
        failure_error_message: &str,
    ) -> anyhow::Result<()> {
        command.current_dir(self.context.current_dir());
        command.env("DOVETAIL_TASK", self.task_name);

        for (name, value) in self.context.overrides() {
            match value {
                Some(value) => command.env(name, value),
                None => command.env_remove(name),
            };
        }

        debug!("{}: spawning {:?}", self.task_name, command);
        let status = command
            .status()
            .with_context(|| execution_error_message.to_string())?;

        if !status.success() {
            bail!("{}: {}", failure_error_message, status.code().unwrap_or(-1));
        }

        info!("{} completed", self.task_name);
        Ok(())
    }

    /// Execute a script file
    pub fn execute_script(&self, script_path: &std::path::Path) -> anyhow::Result<()> {
        let full_script_path = self.context.resolve(script_path);

        if !full_script_path.exists() {
            bail!("Script file '{}' not found", full_script_path.display());
        }

        let mut command = Command::new(&full_script_path);
        self.execute_command(
            &mut command,
            &format!("Failed to execute script: {}", full_script_path.display()),
            "Script execution failed with exit code",
        )
    }

    /// Execute a command with arguments
    pub fn execute_command_with_args(&self, command_path: &str, args: &[String]) -> anyhow::Result<()> {
        let mut command = Command::new(command_path);
        command.args(args);
        self.execute_command(
            &mut command,
            &format!("Failed to execute command '{}'", command_path),
            &format!("Command '{}' failed with exit code", command_path),
        )
    }

    /// Execute a single shell command
    pub fn execute_shell_command(&self, cmd: &str) -> anyhow::Result<()> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        self.execute_command(
            &mut command,
            &format!("Failed to execute command '{}'", cmd),
            &format!("Command '{}' failed with exit code", cmd),
        )
    }

    pub fn execute_spec(&self, spec: &CommandSpec) -> anyhow::Result<()> {
        match spec {
            CommandSpec::Shell(cmd) => self.execute_shell_command(cmd),
            CommandSpec::Args(argv) => match argv.split_first() {
                Some((program, args)) => self.execute_command_with_args(program, args),
                None => Ok(()),
            },
            CommandSpec::Script(path) => self.execute_script(path),
        }
    }
}

/// Wrap a command as a task body
pub fn command_body(task_name: impl Into<String>, spec: CommandSpec) -> TaskBody {
    let task_name = task_name.into();
    Arc::new(move |context: &BuildContext| {
        CommandExecutor::new(context, &task_name).execute_spec(&spec)
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_shell_command_runs_in_context_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let context = BuildContext::new(temp_dir.path().to_path_buf());

        let body = command_body("touch", CommandSpec::Shell("touch marker".to_string()));
        body(&context).unwrap();

        assert!(temp_dir.path().join("marker").exists());
    }

    #[test]
    fn test_environment_overlay_is_applied() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut context = BuildContext::new(temp_dir.path().to_path_buf());
        context.set_var("DOVETAIL_TEST_GREETING", Some("hello".to_string()));

        let executor = CommandExecutor::new(&context, "env");
        executor
            .execute_shell_command("printf '%s %s' \"$DOVETAIL_TEST_GREETING\" \"$DOVETAIL_TASK\" > out.txt")
            .unwrap();

        let written = std::fs::read_to_string(temp_dir.path().join("out.txt")).unwrap();
        assert_eq!(written, "hello env");
    }

    #[test]
    fn test_non_zero_exit_is_an_error() {
        let context = BuildContext::new(std::env::temp_dir());
        let executor = CommandExecutor::new(&context, "fail");

        let err = executor.execute_shell_command("exit 3").unwrap_err();
        assert_eq!(err.to_string(), "Command 'exit 3' failed with exit code: 3");
    }

    #[test]
    fn test_args_and_missing_script() {
        let temp_dir = tempfile::tempdir().unwrap();
        let context = BuildContext::new(temp_dir.path().to_path_buf());
        let executor = CommandExecutor::new(&context, "args");

        executor
            .execute_spec(&CommandSpec::Args(vec![
                "mkdir".to_string(),
                "made".to_string(),
            ]))
            .unwrap();
        assert!(temp_dir.path().join("made").is_dir());

        let err = executor
            .execute_spec(&CommandSpec::Script(PathBuf::from("missing.sh")))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        assert!(executor.execute_spec(&CommandSpec::Args(Vec::new())).is_ok());
    }
}
