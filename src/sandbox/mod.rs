//! Sandbox root bootstrap and the per-parse working-directory state.
//!
//! Every generated command runs somewhere under the sandbox root. The root is
//! created on demand (idempotently) before a parse starts, and each parse owns
//! a [`SandboxState`] that starts at the root and only moves when a script
//! line changes directory. The state is passed to every subprocess as its
//! working directory; the process-wide current directory is never touched.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

const DEFAULT_PARENT: &str = "Desktop";
const DEFAULT_DIR_NAME: &str = "sandbox";

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("could not determine the home directory for the default sandbox location")]
    NoHomeDir,

    #[error("sandbox path exists but is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to create sandbox directory {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("directory change to `{target}` escapes the sandbox root {}", root.display())]
    Escape { target: String, root: PathBuf },

    #[error("directory change target is not a directory: {}", .0.display())]
    MissingDirectory(PathBuf),
}

/// Default sandbox location: `<home>/Desktop/sandbox`.
pub fn default_root() -> Result<PathBuf, SandboxError> {
    let home = dirs::home_dir().ok_or(SandboxError::NoHomeDir)?;
    Ok(home.join(DEFAULT_PARENT).join(DEFAULT_DIR_NAME))
}

/// Resolve the sandbox root: an explicit configured path wins, otherwise the
/// default location under the home directory.
pub fn resolve_root(configured: Option<&Path>) -> Result<PathBuf, SandboxError> {
    match configured {
        Some(path) => Ok(path.to_path_buf()),
        None => default_root(),
    }
}

/// Create the sandbox root if it is absent. Safe to call before every parse.
pub fn ensure_sandbox(root: &Path) -> Result<PathBuf, SandboxError> {
    if root.exists() {
        if !root.is_dir() {
            return Err(SandboxError::NotADirectory(root.to_path_buf()));
        }
        return Ok(root.to_path_buf());
    }

    std::fs::create_dir_all(root).map_err(|source| SandboxError::Create {
        path: root.to_path_buf(),
        source,
    })?;
    debug!(root = %root.display(), "created sandbox directory");
    Ok(root.to_path_buf())
}

/// Logical current directory of one parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxState {
    root: PathBuf,
    current: PathBuf,
}

impl SandboxState {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            current: root.to_path_buf(),
        }
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    /// Move to `target`, resolved against the current directory.
    ///
    /// Absolute targets replace the current directory. The joined path is
    /// stored as-is; `..` segments are left for the file system to resolve.
    /// With `confine` set, a target whose lexical resolution lands outside the
    /// root is refused. A target that is not an existing directory is refused
    /// too. Refusals leave the state unchanged.
    pub fn change_dir(&mut self, target: &str, confine: bool) -> Result<&Path, SandboxError> {
        let next = self.current.join(target);
        if confine && !lexically_normalize(&next).starts_with(lexically_normalize(&self.root)) {
            return Err(SandboxError::Escape {
                target: target.to_string(),
                root: self.root.clone(),
            });
        }
        if !next.is_dir() {
            return Err(SandboxError::MissingDirectory(next));
        }
        self.current = next;
        Ok(&self.current)
    }
}

/// Collapse `.` and `..` without touching the file system.
fn lexically_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn ensure_sandbox_creates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Desktop").join("sandbox");

        let created = ensure_sandbox(&root).unwrap();
        assert_eq!(created, root);
        assert!(root.is_dir());
    }

    #[test]
    fn ensure_sandbox_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("sandbox");
        std::fs::create_dir_all(root.join("keep")).unwrap();

        ensure_sandbox(&root).unwrap();
        ensure_sandbox(&root).unwrap();
        assert!(root.join("keep").is_dir(), "existing contents must survive");
    }

    #[test]
    fn ensure_sandbox_rejects_regular_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("sandbox");
        std::fs::write(&root, "not a dir").unwrap();

        let err = ensure_sandbox(&root).unwrap_err();
        assert!(matches!(err, SandboxError::NotADirectory(_)));
    }

    #[test]
    #[serial]
    fn default_root_lives_under_home_desktop() {
        let tmp = tempfile::tempdir().unwrap();
        let previous = std::env::var_os("HOME");
        unsafe { std::env::set_var("HOME", tmp.path()) };

        let root = default_root();

        match previous {
            Some(value) => unsafe { std::env::set_var("HOME", value) },
            None => unsafe { std::env::remove_var("HOME") },
        }
        assert_eq!(root.unwrap(), tmp.path().join("Desktop").join("sandbox"));
    }

    #[test]
    fn resolve_root_prefers_configured_path() {
        let root = resolve_root(Some(Path::new("/srv/sandbox"))).unwrap();
        assert_eq!(root, PathBuf::from("/srv/sandbox"));
    }

    #[test]
    fn change_dir_compounds_relative_targets() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("a").join("b")).unwrap();

        let mut state = SandboxState::new(tmp.path());
        state.change_dir("a", true).unwrap();
        state.change_dir("b", true).unwrap();
        assert_eq!(state.current(), tmp.path().join("a").join("b"));
        assert_eq!(state.root, tmp.path());
    }

    #[test]
    fn change_dir_keeps_parent_segments_unnormalized() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        std::fs::create_dir(tmp.path().join("b")).unwrap();

        let mut state = SandboxState::new(tmp.path());
        state.change_dir("a", true).unwrap();
        state.change_dir("../b", true).unwrap();
        assert_eq!(state.current(), tmp.path().join("a").join("..").join("b"));
    }

    #[test]
    fn change_dir_refuses_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("file.txt"), "x").unwrap();

        let mut state = SandboxState::new(tmp.path());
        let err = state.change_dir("github-project", true).unwrap_err();
        assert!(matches!(err, SandboxError::MissingDirectory(_)));
        assert!(state.change_dir("file.txt", true).is_err());
        assert_eq!(state.current(), tmp.path(), "state must not move");
    }

    #[test]
    fn confined_change_dir_refuses_escape() {
        let mut state = SandboxState::new(Path::new("/sb"));
        let err = state.change_dir("../etc", true).unwrap_err();
        assert!(matches!(err, SandboxError::Escape { .. }));
        assert_eq!(state.current(), Path::new("/sb"), "state must not move");

        let err = state.change_dir("/etc", true).unwrap_err();
        assert!(err.to_string().contains("escapes the sandbox"));
    }

    #[test]
    fn unconfined_change_dir_accepts_absolute_target() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();

        let mut state = SandboxState::new(tmp.path());
        state.change_dir(&outside.path().display().to_string(), false).unwrap();
        assert_eq!(state.current(), outside.path());
    }

    #[test]
    fn sibling_with_shared_prefix_is_an_escape() {
        let mut state = SandboxState::new(Path::new("/sb"));
        let err = state.change_dir("../sb-other", true).unwrap_err();
        assert!(matches!(err, SandboxError::Escape { .. }));
    }
}
