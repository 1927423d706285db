//! Project context resolution for latch.
//!
//! This module finds the project root (the directory holding `.latch/`) from
//! any working directory and derives every state path from it. Commands build
//! one `ProjectContext` and hand it to the stores they use; nothing in latch
//! keeps a process-wide default instance.

use crate::error::{LatchError, Result};
use std::env;
use std::path::{Path, PathBuf};

/// State directory name under the project root.
pub const STATE_DIR: &str = ".latch";

/// Environment variable that pins the project root.
pub const ROOT_ENV: &str = "LATCH_ROOT";

/// Resolved paths for a latch project. All paths are absolute.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// The project root. Lock resources are confined to this directory.
    pub root: PathBuf,

    /// `{root}/.latch/`
    pub state_dir: PathBuf,

    /// `{root}/.latch/locks/`
    pub locks_dir: PathBuf,
}

impl ProjectContext {
    /// Build a context rooted at `root` without touching the filesystem.
    pub fn at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let state_dir = root.join(STATE_DIR);
        let locks_dir = state_dir.join("locks");
        Self {
            root,
            state_dir,
            locks_dir,
        }
    }

    /// Resolve the project context.
    ///
    /// Resolution order: the explicit `root` argument, `LATCH_ROOT`, then the
    /// nearest ancestor of the working directory that contains `.latch/`.
    pub fn resolve(root: Option<&Path>) -> Result<Self> {
        if let Some(root) = root {
            return Ok(Self::at(absolutize(root)?));
        }

        if let Ok(root) = env::var(ROOT_ENV)
            && !root.is_empty()
        {
            return Ok(Self::at(absolutize(Path::new(&root))?));
        }

        let cwd = env::current_dir().map_err(|e| {
            LatchError::Io(format!("failed to get current working directory: {}", e))
        })?;

        Ok(Self::discover_from(&cwd).unwrap_or_else(|| Self::at(cwd)))
    }

    /// Walk upward from `start` looking for a `.latch/` directory.
    pub fn discover_from(start: &Path) -> Option<Self> {
        start
            .ancestors()
            .find(|dir| dir.join(STATE_DIR).is_dir())
            .map(Self::at)
    }

    /// Check if the state directory exists.
    pub fn is_initialized(&self) -> bool {
        self.state_dir.is_dir()
    }

    /// Ensure the project has been initialized.
    ///
    /// Called by every command except `init`.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(LatchError::NotFound(format!(
                "latch is not initialized.\n\
                 Expected state directory at: {}\n\n\
                 Run `latch init` in the project root, or pass --root.",
                self.state_dir.display()
            )));
        }
        Ok(())
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join("config.yaml")
    }

    /// Get the path to the acknowledgment ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("acks.json")
    }

    /// Get the path to the events directory.
    pub fn events_dir(&self) -> PathBuf {
        self.state_dir.join("events")
    }

    /// Get the path to the main events log file.
    pub fn events_file(&self) -> PathBuf {
        self.events_dir().join("events.ndjson")
    }
}

/// Convenience function to resolve the context and ensure it is initialized.
pub fn require_initialized(root: Option<&Path>) -> Result<ProjectContext> {
    let ctx = ProjectContext::resolve(root)?;
    ctx.ensure_initialized()?;
    Ok(ctx)
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().map_err(|e| {
        LatchError::Io(format!("failed to get current working directory: {}", e))
    })?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_paths_derive_from_root() {
        let ctx = ProjectContext::at("/work/project");

        assert_eq!(ctx.state_dir, Path::new("/work/project/.latch"));
        assert_eq!(ctx.locks_dir, Path::new("/work/project/.latch/locks"));
        assert_eq!(ctx.config_path(), Path::new("/work/project/.latch/config.yaml"));
        assert_eq!(ctx.ledger_path(), Path::new("/work/project/.latch/acks.json"));
        assert_eq!(
            ctx.events_file(),
            Path::new("/work/project/.latch/events/events.ndjson")
        );
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join(STATE_DIR)).unwrap();
        let nested = temp_dir.path().join("src").join("nested");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = ProjectContext::discover_from(&nested).unwrap();

        assert_eq!(ctx.root, temp_dir.path());
        assert!(ctx.is_initialized());
    }

    #[test]
    fn test_discover_without_state_dir_is_none() {
        let temp_dir = TempDir::new().unwrap();
        // Only meaningful when no ancestor of the temp dir has .latch/.
        if temp_dir.path().ancestors().any(|d| d.join(STATE_DIR).is_dir()) {
            return;
        }
        assert!(ProjectContext::discover_from(temp_dir.path()).is_none());
    }

    #[test]
    fn test_explicit_root_wins() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = ProjectContext::resolve(Some(temp_dir.path())).unwrap();
        assert_eq!(ctx.root, temp_dir.path());
    }

    #[test]
    #[serial]
    fn test_env_root_used_when_no_flag() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: serialized with other env-mutating tests.
        unsafe { env::set_var(ROOT_ENV, temp_dir.path()) };
        let resolved = ProjectContext::resolve(None);
        unsafe { env::remove_var(ROOT_ENV) };

        assert_eq!(resolved.unwrap().root, temp_dir.path());
    }

    #[test]
    fn test_uninitialized_project_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let err = require_initialized(Some(temp_dir.path())).unwrap_err();

        assert!(matches!(err, LatchError::NotFound(_)));
        assert!(err.to_string().contains("latch init"));
    }
}
