//! Build context
//!
//! The working directory and environment overrides seen by task bodies and
//! directives. The engine changes the directory through this value only; in
//! [`DirectoryMode::Process`] every change is mirrored to the process working
//! directory as well.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Where working-directory changes are applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectoryMode {
    /// Tracked on the [`BuildContext`] only
    #[default]
    Context,
    /// Also applied with `std::env::set_current_dir`
    Process,
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    current_dir: PathBuf,
    env: BTreeMap<String, Option<String>>,
    mode: DirectoryMode,
}

impl BuildContext {
    pub fn new(current_dir: PathBuf) -> Self {
        Self::with_mode(current_dir, DirectoryMode::Context)
    }

    pub fn with_mode(current_dir: PathBuf, mode: DirectoryMode) -> Self {
        Self {
            current_dir,
            env: BTreeMap::new(),
            mode,
        }
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn directory_mode(&self) -> DirectoryMode {
        self.mode
    }

    /// Resolve a path against the current directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }

    /// The directory in effect right now. In process mode this is the process
    /// directory, which task bodies can change without going through the context.
    pub(crate) fn observe_dir(&self) -> PathBuf {
        match self.directory_mode() {
            DirectoryMode::Context => self.current_dir.clone(),
            DirectoryMode::Process => {
                std::env::current_dir().unwrap_or_else(|_| self.current_dir.clone())
            }
        }
    }

    /// True when both the context and, in process mode, the process are in `dir`
    pub(crate) fn is_in(&self, dir: &Path) -> bool {
        if self.current_dir != dir {
            return false;
        }
        match self.directory_mode() {
            DirectoryMode::Context => true,
            DirectoryMode::Process => std::env::current_dir().is_ok_and(|cwd| cwd == dir),
        }
    }

    /// Change into `dir`, which must be an existing, readable directory
    pub(crate) fn change_dir(&mut self, dir: &Path) -> io::Result<()> {
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "Cannot change directory to {} - it does not exist or is not readable",
                    dir.display()
                ),
            ));
        }
        std::fs::read_dir(dir)?;

        if self.mode == DirectoryMode::Process {
            std::env::set_current_dir(dir)?;
        }
        info!("Changing working directory to {}", dir.display());
        self.current_dir = dir.to_path_buf();
        Ok(())
    }

    /// Return to a directory observed earlier. Failure is not fatal: the
    /// context still records `dir` so the caller's view stays consistent.
    pub(crate) fn restore_dir(&mut self, dir: &Path) {
        if self.mode == DirectoryMode::Process {
            if let Err(e) = std::env::set_current_dir(dir) {
                warn!(
                    "Cannot change directory back to {}: {}",
                    dir.display(),
                    e
                );
            }
        }
        info!("Reverting working directory back to {}", dir.display());
        self.current_dir = dir.to_path_buf();
    }

    /// Look a variable up in the overlay, falling back to the process environment
    pub fn var(&self, name: &str) -> Option<String> {
        match self.env.get(name) {
            Some(value) => value.clone(),
            None => std::env::var(name).ok(),
        }
    }

    /// Override a variable (`None` unsets it) and return the previous overlay entry
    pub fn set_var(&mut self, name: &str, value: Option<String>) -> Option<Option<String>> {
        self.env.insert(name.to_string(), value)
    }

    /// Put back an overlay entry returned by [`set_var`](Self::set_var)
    pub fn restore_var(&mut self, name: &str, previous: Option<Option<String>>) {
        match previous {
            Some(value) => {
                self.env.insert(name.to_string(), value);
            }
            None => {
                self.env.remove(name);
            }
        }
    }

    /// Overlay entries in name order; `None` means the variable is unset
    pub fn overrides(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.env
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_dir_updates_context_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let process_dir = std::env::current_dir().unwrap();
        let mut context = BuildContext::new(process_dir.clone());

        context.change_dir(temp_dir.path()).unwrap();

        assert_eq!(context.current_dir(), temp_dir.path());
        assert_eq!(std::env::current_dir().unwrap(), process_dir);
    }

    #[test]
    fn test_context_mode_observes_recorded_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut context = BuildContext::new(std::env::temp_dir());
        assert_eq!(context.directory_mode(), DirectoryMode::Context);

        context.change_dir(temp_dir.path()).unwrap();

        assert!(context.is_in(temp_dir.path()));
        assert!(!context.is_in(&std::env::temp_dir()));
        assert_eq!(context.observe_dir(), temp_dir.path());
    }

    #[test]
    fn test_change_dir_rejects_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut context = BuildContext::new(temp_dir.path().to_path_buf());

        let err = context
            .change_dir(&temp_dir.path().join("missing"))
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(context.current_dir(), temp_dir.path());
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let temp_dir = tempfile::tempdir().unwrap();
        let context = BuildContext::new(temp_dir.path().to_path_buf());

        assert_eq!(context.resolve(Path::new("sub")), temp_dir.path().join("sub"));
        assert_eq!(context.resolve(temp_dir.path()), temp_dir.path());
    }

    #[test]
    fn test_overlay_shadows_process_environment() {
        let mut context = BuildContext::new(std::env::temp_dir());
        assert!(context.var("PATH").is_some());

        let previous = context.set_var("PATH", None);
        assert_eq!(previous, None);
        assert_eq!(context.var("PATH"), None);

        context.restore_var("PATH", previous);
        assert!(context.var("PATH").is_some());
        assert_eq!(context.overrides().count(), 0);
    }
}
