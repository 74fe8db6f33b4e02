use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Relative, slash-separated path that contains no `..` segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SanitizedPath(String);

impl SanitizedPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory portion, if the path has more than one segment.
    pub fn parent(&self) -> Option<&str> {
        self.0.rsplit_once('/').map(|(parent, _)| parent)
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map_or(&self.0, |(_, name)| name)
    }

    /// Platform path built from the non-empty segments, for joining onto a root.
    pub fn to_relative_path(&self) -> PathBuf {
        self.0
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SanitizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SanitizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("invalid path `{raw}`: does not name a file after normalization")]
    Empty { raw: String },
    #[error("invalid path `{raw}`: parent directory segments are not allowed")]
    ParentSegment { raw: String },
}

impl SanitizeError {
    pub fn raw(&self) -> &str {
        match self {
            Self::Empty { raw } | Self::ParentSegment { raw } => raw,
        }
    }
}

/// Convert backslashes to `/` and trim surrounding whitespace and slashes.
pub fn normalize_path(raw: &str) -> String {
    raw.replace('\\', "/")
        .trim_matches(|c: char| c == '/' || c.is_whitespace())
        .to_owned()
}

/// Normalize `raw` and reject it if any segment is exactly `..`.
///
/// The path must also end in a file name: empty and `.` segments are ignored
/// when joining, so `./` or `src/.` would name the root or a directory.
pub fn sanitize_path(raw: &str) -> Result<SanitizedPath, SanitizeError> {
    let normalized = normalize_path(raw);
    let names_file = normalized
        .rsplit('/')
        .next()
        .is_some_and(|last| !last.is_empty() && last != ".");
    if !names_file {
        return Err(SanitizeError::Empty { raw: raw.to_owned() });
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return Err(SanitizeError::ParentSegment { raw: raw.to_owned() });
    }
    Ok(SanitizedPath(normalized))
}
