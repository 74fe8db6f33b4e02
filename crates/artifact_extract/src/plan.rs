use crate::fence::{extract_blocks, ContentBlock};
use crate::resolver::{resolve_path, PathSource};
use crate::sanitize::{sanitize_path, SanitizeError, SanitizedPath};

/// A block whose path resolved and sanitized cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub path: SanitizedPath,
    pub source: PathSource,
    pub content: String,
}

/// What to do with one fenced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockPlan {
    Write(ResolvedArtifact),
    /// No rule produced a path.
    Unresolved(ContentBlock),
    /// A path was found but failed sanitization.
    Rejected {
        block: ContentBlock,
        error: SanitizeError,
    },
}

impl BlockPlan {
    pub fn artifact(&self) -> Option<&ResolvedArtifact> {
        match self {
            Self::Write(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Run extraction, resolution and sanitization over a full reply.
///
/// Output order follows block order; each block is planned independently.
pub fn plan_artifacts(text: &str) -> Vec<BlockPlan> {
    extract_blocks(text).into_iter().map(plan_block).collect()
}

fn plan_block(block: ContentBlock) -> BlockPlan {
    let Some(candidate) = resolve_path(&block) else {
        return BlockPlan::Unresolved(block);
    };

    match sanitize_path(&candidate.path) {
        Ok(path) => BlockPlan::Write(ResolvedArtifact {
            path,
            source: candidate.source,
            content: block.content,
        }),
        Err(error) => BlockPlan::Rejected { block, error },
    }
}
