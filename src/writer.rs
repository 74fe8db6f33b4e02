//! Persists resolved artifacts through a [`Workspace`].

use std::sync::Arc;

use artifact_extract::{
    plan_artifacts, sanitize_path, BlockPlan, PathSource, SanitizeError, SanitizedPath,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use workspace_store::{Workspace, WorkspaceError, WriteOutcome};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    InvalidPath(#[from] SanitizeError),

    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: SanitizedPath,
        #[source]
        source: WorkspaceError,
    },

    #[error("no assistant reply to save")]
    NoReply,
}

impl ArtifactError {
    #[must_use]
    pub fn persistence(path: &SanitizedPath, source: WorkspaceError) -> Self {
        Self::Persistence {
            path: path.clone(),
            source,
        }
    }
}

/// Where a written artifact's path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    Block(PathSource),
    ManualOverride,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    pub path: SanitizedPath,
    pub bytes: usize,
    pub outcome: WriteOutcome,
    pub origin: ArtifactOrigin,
}

/// Result of persisting one fenced block.
#[derive(Debug)]
pub enum BlockOutcome {
    Written(WrittenArtifact),
    /// No path could be inferred.
    Skipped,
    Failed(ArtifactError),
}

#[derive(Clone)]
pub struct ArtifactWriter {
    workspace: Arc<dyn Workspace>,
}

impl std::fmt::Debug for ArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWriter")
            .field("root", &self.workspace.root())
            .finish()
    }
}

impl ArtifactWriter {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    /// Create missing parent directories, overwrite the file, then notify.
    pub fn write(
        &self,
        path: &SanitizedPath,
        content: &str,
        origin: ArtifactOrigin,
    ) -> Result<WrittenArtifact, ArtifactError> {
        let relative = path.to_relative_path();

        if let Some(parent) = relative.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if !self.workspace.file_exists(parent) {
                self.workspace
                    .create_directory(parent, true)
                    .map_err(|source| ArtifactError::persistence(path, source))?;
            }
        }

        let outcome = self
            .workspace
            .write(&relative, content.as_bytes(), true)
            .map_err(|source| ArtifactError::persistence(path, source))?;
        self.workspace.notify_changed();

        info!(path = %path, bytes = content.len(), ?outcome, "artifact written");
        Ok(WrittenArtifact {
            path: path.clone(),
            bytes: content.len(),
            outcome,
            origin,
        })
    }

    /// Sanitize a user-supplied path and write `content` to it verbatim.
    pub fn write_override(
        &self,
        raw_path: &str,
        content: &str,
    ) -> Result<WrittenArtifact, ArtifactError> {
        let path = sanitize_path(raw_path).inspect_err(|error| {
            warn!(%error, "rejected manual save path");
        })?;
        self.write(&path, content, ArtifactOrigin::ManualOverride)
    }

    /// Extract every fenced block from `text` and persist each independently.
    pub fn persist_blocks(&self, text: &str) -> Vec<BlockOutcome> {
        plan_artifacts(text)
            .into_iter()
            .map(|plan| self.persist_plan(plan))
            .collect()
    }

    fn persist_plan(&self, plan: BlockPlan) -> BlockOutcome {
        match plan {
            BlockPlan::Write(artifact) => {
                match self.write(
                    &artifact.path,
                    &artifact.content,
                    ArtifactOrigin::Block(artifact.source),
                ) {
                    Ok(written) => BlockOutcome::Written(written),
                    Err(error) => {
                        warn!(%error, "artifact write failed");
                        BlockOutcome::Failed(error)
                    }
                }
            }
            BlockPlan::Unresolved(block) => {
                debug!(
                    info = %block.info,
                    bytes = block.content.len(),
                    "no path inferred; block skipped"
                );
                BlockOutcome::Skipped
            }
            BlockPlan::Rejected { error, .. } => {
                warn!(%error, "rejected artifact path");
                BlockOutcome::Failed(ArtifactError::InvalidPath(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use workspace_store::{MemoryWorkspace, WorkspaceOp};

    use super::*;

    fn writer() -> (Arc<MemoryWorkspace>, ArtifactWriter) {
        let workspace = Arc::new(MemoryWorkspace::new());
        let writer = ArtifactWriter::new(workspace.clone());
        (workspace, writer)
    }

    #[test]
    fn missing_parents_are_created_then_notified() {
        let (workspace, writer) = writer();
        let path = sanitize_path("a/b/c.txt").expect("valid");

        let written = writer
            .write(&path, "body", ArtifactOrigin::ManualOverride)
            .expect("write");

        assert_eq!(written.outcome, WriteOutcome::Created);
        assert_eq!(written.bytes, 4);
        assert_eq!(
            workspace.operations(),
            vec![
                WorkspaceOp::CreateDirectory(PathBuf::from("a/b")),
                WorkspaceOp::Write(PathBuf::from("a/b/c.txt")),
                WorkspaceOp::Notify,
            ]
        );
    }

    #[test]
    fn existing_parent_skips_directory_creation_and_second_write_overwrites() {
        let (workspace, writer) = writer();
        workspace.seed_directory("src");
        let path = sanitize_path("src/lib.rs").expect("valid");

        writer
            .write(&path, "one", ArtifactOrigin::ManualOverride)
            .expect("first");
        let second = writer
            .write(&path, "two", ArtifactOrigin::ManualOverride)
            .expect("second");

        assert_eq!(second.outcome, WriteOutcome::Overwritten);
        assert_eq!(workspace.file_string("src/lib.rs").as_deref(), Some("two"));
        assert!(!workspace
            .operations()
            .iter()
            .any(|op| matches!(op, WorkspaceOp::CreateDirectory(_))));
        assert_eq!(workspace.notification_count(), 2);
    }

    #[test]
    fn failed_write_does_not_notify() {
        let (workspace, writer) = writer();
        workspace.fail_writes_to("locked.txt");
        let path = sanitize_path("locked.txt").expect("valid");

        let error = writer
            .write(&path, "x", ArtifactOrigin::ManualOverride)
            .expect_err("write should fail");

        assert!(matches!(error, ArtifactError::Persistence { .. }));
        assert_eq!(workspace.notification_count(), 0);
        assert!(workspace.file(Path::new("locked.txt")).is_none());
    }

    #[test]
    fn override_path_is_sanitized() {
        let (workspace, writer) = writer();

        assert!(matches!(
            writer.write_override("../outside.md", "x"),
            Err(ArtifactError::InvalidPath(SanitizeError::ParentSegment { .. }))
        ));
        let written = writer
            .write_override("\\notes\\reply.md", "x")
            .expect("write");
        assert_eq!(written.path.as_str(), "notes/reply.md");
        assert_eq!(written.origin, ArtifactOrigin::ManualOverride);
        assert!(workspace.file("notes/reply.md").is_some());
    }
}
