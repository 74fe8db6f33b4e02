use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::{Workspace, WorkspaceError, WriteOutcome};

const MAX_LINK_HOPS: usize = 8;

/// Callback fired by [`Workspace::notify_changed`].
pub type ChangeListener = Box<dyn Fn() + Send + Sync>;

/// Workspace backed by a directory on disk.
pub struct LocalWorkspace {
    root: PathBuf,
    listener: Option<ChangeListener>,
}

impl fmt::Debug for LocalWorkspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWorkspace")
            .field("root", &self.root)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl LocalWorkspace {
    /// Open an existing directory. The root is canonicalized once here.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let canonical_root = root
            .canonicalize()
            .map_err(|source| WorkspaceError::io("resolving workspace root", &root, source))?;

        if !canonical_root.is_dir() {
            return Err(WorkspaceError::RootNotDirectory {
                path: canonical_root,
            });
        }

        Ok(Self {
            root: canonical_root,
            listener: None,
        })
    }

    #[must_use]
    pub fn with_change_listener(mut self, listener: impl Fn() + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    fn candidate(&self, relative: &Path) -> Result<PathBuf, WorkspaceError> {
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !plain || relative.as_os_str().is_empty() {
            return Err(WorkspaceError::InvalidRelativePath {
                path: relative.to_path_buf(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn ensure_inside_root(&self, canonical_path: &Path) -> Result<(), WorkspaceError> {
        if canonical_path.starts_with(&self.root) {
            Ok(())
        } else {
            Err(WorkspaceError::OutsideRoot {
                path: canonical_path.to_path_buf(),
            })
        }
    }

    // Symlinked ancestors can still point elsewhere, so confinement is checked
    // on the canonical form of the nearest existing ancestor.
    fn ensure_anchor_inside_root(&self, path: &Path) -> Result<(), WorkspaceError> {
        let anchor = canonicalize_existing_ancestor(path)?;
        self.ensure_inside_root(&anchor)
    }

    // `exists()` reports a dangling link as missing, but writing through it
    // still creates the link target. Follow the chain by hand and confine each hop.
    fn ensure_link_target_inside_root(&self, path: &Path) -> Result<(), WorkspaceError> {
        let mut current = path.to_path_buf();
        for _ in 0..MAX_LINK_HOPS {
            let is_link = fs::symlink_metadata(&current)
                .is_ok_and(|metadata| metadata.file_type().is_symlink());
            if !is_link {
                return Ok(());
            }

            let link = fs::read_link(&current)
                .map_err(|source| WorkspaceError::io("reading symlink", &current, source))?;
            current = match current.parent() {
                Some(parent) => parent.join(link),
                None => link,
            };
            self.ensure_anchor_inside_root(&current)?;
        }

        Err(WorkspaceError::OutsideRoot { path: current })
    }
}

impl Workspace for LocalWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn file_exists(&self, relative: &Path) -> bool {
        self.candidate(relative)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    fn create_directory(&self, relative: &Path, recursive: bool) -> Result<(), WorkspaceError> {
        let target = self.candidate(relative)?;
        self.ensure_anchor_inside_root(&target)?;

        let created = if recursive {
            fs::create_dir_all(&target)
        } else {
            fs::create_dir(&target)
        };
        created.map_err(|source| WorkspaceError::io("creating directory", &target, source))?;

        let canonical = target
            .canonicalize()
            .map_err(|source| WorkspaceError::io("resolving directory", &target, source))?;
        self.ensure_inside_root(&canonical)?;

        tracing::debug!(path = %relative.display(), recursive, "created workspace directory");
        Ok(())
    }

    fn write(
        &self,
        relative: &Path,
        contents: &[u8],
        overwrite: bool,
    ) -> Result<WriteOutcome, WorkspaceError> {
        let target = self.candidate(relative)?;
        self.ensure_anchor_inside_root(&target)?;
        self.ensure_link_target_inside_root(&target)?;

        let outcome = if target.exists() {
            WriteOutcome::Overwritten
        } else {
            WriteOutcome::Created
        };

        let written = if overwrite {
            fs::write(&target, contents)
        } else {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .and_then(|mut file| file.write_all(contents))
        };
        written.map_err(|source| WorkspaceError::io("writing file", &target, source))?;

        tracing::debug!(
            path = %relative.display(),
            bytes = contents.len(),
            ?outcome,
            "wrote workspace file"
        );
        Ok(outcome)
    }

    fn notify_changed(&self) {
        if let Some(listener) = &self.listener {
            listener();
        }
    }
}

fn canonicalize_existing_ancestor(path: &Path) -> Result<PathBuf, WorkspaceError> {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor
                .canonicalize()
                .map_err(|source| WorkspaceError::io("resolving path", ancestor, source));
        }
    }

    Err(WorkspaceError::NoExistingAncestor {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn open_rejects_file_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").expect("seed file");

        assert!(matches!(
            LocalWorkspace::open(&file),
            Err(WorkspaceError::RootNotDirectory { .. })
        ));
    }

    #[test]
    fn parent_and_absolute_paths_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = LocalWorkspace::open(dir.path()).expect("workspace");

        for path in ["../escape.txt", "a/../../b.txt"] {
            assert!(matches!(
                workspace.write(Path::new(path), b"x", true),
                Err(WorkspaceError::InvalidRelativePath { .. })
            ));
        }
        assert!(matches!(
            workspace.write(&dir.path().join("abs.txt"), b"x", true),
            Err(WorkspaceError::InvalidRelativePath { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_outside_root_is_refused() {
        let outside = tempfile::tempdir().expect("outside");
        let dir = tempfile::tempdir().expect("tempdir");
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).expect("symlink");
        let workspace = LocalWorkspace::open(dir.path()).expect("workspace");

        assert!(matches!(
            workspace.write(Path::new("link/owned.txt"), b"x", true),
            Err(WorkspaceError::OutsideRoot { .. })
        ));
        assert!(!outside.path().join("owned.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_to_outside_file_is_refused() {
        let outside = tempfile::tempdir().expect("outside");
        let dir = tempfile::tempdir().expect("tempdir");
        let escaped = outside.path().join("escaped.txt");
        std::os::unix::fs::symlink(&escaped, dir.path().join("out.txt")).expect("symlink");
        let workspace = LocalWorkspace::open(dir.path()).expect("workspace");

        assert!(matches!(
            workspace.write(Path::new("out.txt"), b"x", true),
            Err(WorkspaceError::OutsideRoot { .. })
        ));
        assert!(!escaped.exists());
    }

    #[cfg(unix)]
    #[test]
    fn relative_symlink_climbing_out_of_root_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("root");
        fs::create_dir(&root).expect("root");
        std::os::unix::fs::symlink("../sibling.txt", root.join("note.txt")).expect("symlink");
        let workspace = LocalWorkspace::open(&root).expect("workspace");

        assert!(matches!(
            workspace.write(Path::new("note.txt"), b"x", true),
            Err(WorkspaceError::OutsideRoot { .. })
        ));
        assert!(!dir.path().join("sibling.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_to_file_inside_root_is_followed() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("real.txt"), "old").expect("seed");
        std::os::unix::fs::symlink("real.txt", dir.path().join("alias.txt")).expect("symlink");
        let workspace = LocalWorkspace::open(dir.path()).expect("workspace");

        let outcome = workspace
            .write(Path::new("alias.txt"), b"new", true)
            .expect("write");
        assert_eq!(outcome, WriteOutcome::Overwritten);
        assert_eq!(
            fs::read_to_string(dir.path().join("real.txt")).expect("read"),
            "new"
        );
    }

    #[test]
    fn listener_fires_on_notify() {
        let dir = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(AtomicUsize::new(0));
        let workspace = LocalWorkspace::open(dir.path())
            .expect("workspace")
            .with_change_listener({
                let calls = Arc::clone(&calls);
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            });

        workspace.notify_changed();
        workspace.notify_changed();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
