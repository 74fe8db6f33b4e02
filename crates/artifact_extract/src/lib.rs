//! Pure text logic that turns an assistant reply into file artifacts.
//!
//! The pipeline is fence extraction ([`extract_blocks`]), path inference
//! ([`resolve_path`]) and path sanitization ([`sanitize_path`]). Nothing here
//! touches the filesystem; [`plan_artifacts`] returns one [`BlockPlan`] per
//! fenced block and the caller decides what to persist.

mod fence;
mod plan;
mod resolver;
mod sanitize;

pub use fence::{extract_blocks, ContentBlock, FENCE_MARKER};
pub use plan::{plan_artifacts, BlockPlan, ResolvedArtifact};
pub use resolver::{
    resolve_path, PathCandidate, PathSource, COMMENT_PREFIXES, HEADER_KEYS, HEADER_SCAN_LINES,
    INFO_KEYS,
};
pub use sanitize::{normalize_path, sanitize_path, SanitizeError, SanitizedPath};
