//! Filesystem collaborator used to persist artifacts.
//!
//! [`Workspace`] is the seam: [`LocalWorkspace`] writes under a real
//! directory, [`MemoryWorkspace`] records everything in memory for tests.

mod error;
mod local;
mod memory;

use std::path::Path;

pub use error::WorkspaceError;
pub use local::{ChangeListener, LocalWorkspace};
pub use memory::{MemoryWorkspace, WorkspaceOp};

/// Whether a write created a new file or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Overwritten,
}

/// Directory tree that artifacts are written into.
///
/// All paths are relative to [`Workspace::root`]. Implementations must refuse
/// paths that resolve outside the root.
pub trait Workspace: Send + Sync {
    fn root(&self) -> &Path;

    fn file_exists(&self, relative: &Path) -> bool;

    /// Create `relative`. With `recursive`, missing ancestors are created too
    /// and an existing directory is not an error.
    fn create_directory(&self, relative: &Path, recursive: bool) -> Result<(), WorkspaceError>;

    /// Write `contents` to `relative`. Without `overwrite`, an existing file
    /// is left untouched and the call fails.
    fn write(
        &self,
        relative: &Path,
        contents: &[u8],
        overwrite: bool,
    ) -> Result<WriteOutcome, WorkspaceError>;

    /// Signal observers that the tree changed.
    fn notify_changed(&self);
}
