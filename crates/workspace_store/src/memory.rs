use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{Workspace, WorkspaceError, WriteOutcome};

const DEFAULT_ROOT: &str = "/workspace";

/// Mutation recorded by [`MemoryWorkspace`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceOp {
    CreateDirectory(PathBuf),
    Write(PathBuf),
    Notify,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    directories: BTreeSet<PathBuf>,
    failing_writes: BTreeSet<PathBuf>,
    operations: Vec<WorkspaceOp>,
}

/// In-memory workspace for tests and dry runs.
///
/// Mirrors a real filesystem closely enough to catch ordering mistakes: a
/// write fails when its parent directory was never created.
#[derive(Debug)]
pub struct MemoryWorkspace {
    root: PathBuf,
    state: Mutex<MemoryState>,
}

impl Default for MemoryWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Make every later write to `relative` fail with a permission error.
    pub fn fail_writes_to(&self, relative: impl Into<PathBuf>) {
        self.lock().failing_writes.insert(relative.into());
    }

    /// Seed an existing directory without recording an operation.
    pub fn seed_directory(&self, relative: impl AsRef<Path>) {
        let mut state = self.lock();
        insert_with_ancestors(&mut state.directories, relative.as_ref());
    }

    pub fn file(&self, relative: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(relative.as_ref()).cloned()
    }

    pub fn file_string(&self, relative: impl AsRef<Path>) -> Option<String> {
        self.file(relative)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.lock().files.keys().cloned().collect()
    }

    pub fn operations(&self) -> Vec<WorkspaceOp> {
        self.lock().operations.clone()
    }

    pub fn notification_count(&self) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| **op == WorkspaceOp::Notify)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Workspace for MemoryWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn file_exists(&self, relative: &Path) -> bool {
        let state = self.lock();
        state.files.contains_key(relative) || state.directories.contains(relative)
    }

    fn create_directory(&self, relative: &Path, recursive: bool) -> Result<(), WorkspaceError> {
        ensure_plain_relative(relative)?;
        let mut state = self.lock();
        if state.files.contains_key(relative) {
            return Err(io_error(
                "creating directory",
                relative,
                io::ErrorKind::AlreadyExists,
                "a file exists at this path",
            ));
        }
        if !recursive {
            if state.directories.contains(relative) {
                return Err(io_error(
                    "creating directory",
                    relative,
                    io::ErrorKind::AlreadyExists,
                    "directory already exists",
                ));
            }
            if !parent_present(&state, relative) {
                return Err(io_error(
                    "creating directory",
                    relative,
                    io::ErrorKind::NotFound,
                    "parent directory missing",
                ));
            }
        }

        insert_with_ancestors(&mut state.directories, relative);
        state
            .operations
            .push(WorkspaceOp::CreateDirectory(relative.to_path_buf()));
        Ok(())
    }

    fn write(
        &self,
        relative: &Path,
        contents: &[u8],
        overwrite: bool,
    ) -> Result<WriteOutcome, WorkspaceError> {
        ensure_plain_relative(relative)?;
        let mut state = self.lock();

        if state.failing_writes.contains(relative) {
            return Err(io_error(
                "writing file",
                relative,
                io::ErrorKind::PermissionDenied,
                "write refused",
            ));
        }
        if !parent_present(&state, relative) || state.directories.contains(relative) {
            return Err(io_error(
                "writing file",
                relative,
                io::ErrorKind::NotFound,
                "parent directory missing",
            ));
        }
        if !overwrite && state.files.contains_key(relative) {
            return Err(io_error(
                "writing file",
                relative,
                io::ErrorKind::AlreadyExists,
                "file already exists",
            ));
        }

        let outcome = match state.files.insert(relative.to_path_buf(), contents.to_vec()) {
            Some(_) => WriteOutcome::Overwritten,
            None => WriteOutcome::Created,
        };
        state.operations.push(WorkspaceOp::Write(relative.to_path_buf()));
        Ok(outcome)
    }

    fn notify_changed(&self) {
        self.lock().operations.push(WorkspaceOp::Notify);
    }
}

fn io_error(
    operation: &'static str,
    path: &Path,
    kind: io::ErrorKind,
    message: &'static str,
) -> WorkspaceError {
    WorkspaceError::io(operation, path, io::Error::new(kind, message))
}

fn parent_present(state: &MemoryState, relative: &Path) -> bool {
    match relative.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => state.directories.contains(parent),
        _ => true,
    }
}

fn ensure_plain_relative(relative: &Path) -> Result<(), WorkspaceError> {
    let plain = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if plain && !relative.as_os_str().is_empty() {
        Ok(())
    } else {
        Err(WorkspaceError::InvalidRelativePath {
            path: relative.to_path_buf(),
        })
    }
}

fn insert_with_ancestors(directories: &mut BTreeSet<PathBuf>, relative: &Path) {
    for ancestor in relative.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        directories.insert(ancestor.to_path_buf());
    }
}
