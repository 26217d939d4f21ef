//! Mapping of `(owner, name)` pairs onto repository directories.
//!
//! Repositories live at `<root>/<owner>/<name>` in native git layout. Every
//! resolved path is canonicalized and must stay under the canonical root, so
//! neither `..` segments nor symlinks can lead a request outside of it.

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors raised while resolving a repository path.
#[derive(Debug, Error)]
pub enum PathError {
    /// A path segment that cannot name a single directory entry.
    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),

    /// The resolved path lies outside the repository root.
    #[error("path escapes repository root: {}", .0.display())]
    OutsideRoot(PathBuf),

    /// The path could not be resolved on disk.
    #[error("cannot resolve {}: {source}", .path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The directory all repositories are stored under.
#[derive(Debug, Clone)]
pub struct RepoRoot {
    root: PathBuf,
}

impl RepoRoot {
    /// Opens an existing root directory.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// Returns the canonical root path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves the directory of a repository.
    pub fn repo_dir(&self, owner: &str, name: &str) -> Result<PathBuf, PathError> {
        let joined = self.join(owner, name)?;
        self.contain(&joined)
    }

    /// Resolves a file inside a repository.
    ///
    /// `relative` is a fixed layout path such as `objects/info/packs`; any
    /// request-supplied part of it must already have passed [`check_segment`].
    pub fn artifact(
        &self,
        owner: &str,
        name: &str,
        relative: impl AsRef<Path>,
    ) -> Result<PathBuf, PathError> {
        let relative = relative.as_ref();
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(PathError::InvalidSegment(
                relative.to_string_lossy().into_owned(),
            ));
        }

        let joined = self.join(owner, name)?.join(relative);
        self.contain(&joined)
    }

    fn join(&self, owner: &str, name: &str) -> Result<PathBuf, PathError> {
        check_segment(owner)?;
        check_segment(name)?;
        Ok(self.root.join(owner).join(name))
    }

    fn contain(&self, path: &Path) -> Result<PathBuf, PathError> {
        let resolved = path.canonicalize().map_err(|source| PathError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;

        if !resolved.starts_with(&self.root) {
            return Err(PathError::OutsideRoot(resolved));
        }

        Ok(resolved)
    }
}

/// Checks that `segment` names exactly one directory entry.
pub fn check_segment(segment: &str) -> Result<(), PathError> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);

    if invalid {
        return Err(PathError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RepoRoot) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("alice/project/objects/info")).unwrap();
        fs::write(dir.path().join("alice/project/HEAD"), "ref: refs/heads/main\n").unwrap();
        let root = RepoRoot::open(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_repo_dir_resolves_under_root() {
        let (_dir, root) = setup();
        let repo = root.repo_dir("alice", "project").unwrap();
        assert!(repo.starts_with(root.path()));
        assert!(repo.ends_with("alice/project"));
    }

    #[test]
    fn test_artifact_resolves_file() {
        let (_dir, root) = setup();
        let head = root.artifact("alice", "project", "HEAD").unwrap();
        assert_eq!(fs::read_to_string(head).unwrap(), "ref: refs/heads/main\n");
    }

    #[test]
    fn test_missing_repository_is_resolve_error() {
        let (_dir, root) = setup();
        let err = root.repo_dir("alice", "missing").unwrap_err();
        assert!(matches!(err, PathError::Resolve { .. }));
    }

    #[test]
    fn test_rejects_traversal_segments() {
        let (_dir, root) = setup();
        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            let err = root.repo_dir(bad, "project").unwrap_err();
            assert!(matches!(err, PathError::InvalidSegment(_)), "{bad:?}");
        }
        assert!(matches!(
            root.artifact("alice", "project", "../../etc/passwd"),
            Err(PathError::InvalidSegment(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_out_of_root() {
        let (dir, root) = setup();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("alice/escape")).unwrap();

        let err = root.repo_dir("alice", "escape").unwrap_err();
        assert!(matches!(err, PathError::OutsideRoot(_)));
    }

    proptest! {
        #[test]
        fn prop_plain_segments_are_accepted(segment in "[A-Za-z0-9_.-]{1,32}") {
            prop_assume!(segment != "." && segment != "..");
            prop_assert!(check_segment(&segment).is_ok());
        }

        #[test]
        fn prop_separators_are_rejected(
            head in "[a-z]{0,8}",
            sep in prop::sample::select(vec!['/', '\\', '\0']),
            tail in "[a-z]{0,8}",
        ) {
            let segment = format!("{head}{sep}{tail}");
            prop_assert!(check_segment(&segment).is_err());
        }
    }

    #[test]
    fn test_open_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, "x").unwrap();
        assert!(RepoRoot::open(&file).is_err());
    }
}
