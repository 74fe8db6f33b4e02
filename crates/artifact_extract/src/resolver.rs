use crate::fence::ContentBlock;

/// Info-string markers whose following token names the target file.
pub const INFO_KEYS: [&str; 3] = ["path=", "file=", "filename="];

/// Markers recognized on the leading lines of a block body.
pub const HEADER_KEYS: [&str; 3] = ["file:", "path:", "filename:"];

/// Comment openers stripped before looking for a header marker.
pub const COMMENT_PREFIXES: [&str; 7] = ["//", "#", ";", "*", "--", "<!--", "/*"];

/// Number of body lines scanned for a header marker.
pub const HEADER_SCAN_LINES: usize = 6;

const TOKEN_QUOTES: [char; 3] = ['"', '\'', '`'];
const COMMENT_CLOSERS: [&str; 2] = ["-->", "*/"];

/// Which rule produced a path candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    /// `path=`, `file=` or `filename=` in the info string.
    InfoKey,
    /// The whole info string looks like a path.
    InfoPath,
    /// A `file:`-style marker on one of the first body lines.
    ContentHeader,
}

impl PathSource {
    /// Resolution order. The first rule that yields a candidate wins.
    pub const CHAIN: [PathSource; 3] = [
        PathSource::InfoKey,
        PathSource::InfoPath,
        PathSource::ContentHeader,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InfoKey => "info_key",
            Self::InfoPath => "info_path",
            Self::ContentHeader => "content_header",
        }
    }

    fn try_resolve(self, block: &ContentBlock) -> Option<String> {
        match self {
            Self::InfoKey => value_after_marker(&block.info, &INFO_KEYS),
            Self::InfoPath => info_as_path(&block.info),
            Self::ContentHeader => header_path(&block.content),
        }
    }
}

/// Unsanitized path proposed for a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCandidate {
    pub path: String,
    pub source: PathSource,
}

/// Infer the target path for `block`, or `None` when no rule applies.
///
/// Marker matching ignores ASCII case; the returned token keeps the case it
/// was written in.
pub fn resolve_path(block: &ContentBlock) -> Option<PathCandidate> {
    PathSource::CHAIN.into_iter().find_map(|source| {
        source
            .try_resolve(block)
            .map(|path| PathCandidate { path, source })
    })
}

fn value_after_marker(text: &str, markers: &[&str]) -> Option<String> {
    // ASCII lowering keeps byte offsets aligned with `text`.
    let lowered = text.to_ascii_lowercase();
    markers.iter().find_map(|marker| {
        let start = lowered.find(marker)? + marker.len();
        first_token(&text[start..])
    })
}

fn first_token(rest: &str) -> Option<String> {
    let token = rest.split_whitespace().next()?;
    let token = COMMENT_CLOSERS
        .iter()
        .fold(token, |token, closer| token.trim_end_matches(*closer));
    let token = token.trim_matches(&TOKEN_QUOTES[..]);
    (!token.is_empty()).then(|| token.to_owned())
}

fn info_as_path(info: &str) -> Option<String> {
    let info = info.trim();
    let looks_like_path = !info.is_empty()
        && !info.contains(char::is_whitespace)
        && info.contains('/')
        && info.contains('.');
    looks_like_path.then(|| info.to_owned())
}

fn header_path(content: &str) -> Option<String> {
    content
        .lines()
        .take(HEADER_SCAN_LINES)
        .find_map(|line| value_after_marker(strip_comment_prefix(line.trim()), &HEADER_KEYS))
}

fn strip_comment_prefix(line: &str) -> &str {
    COMMENT_PREFIXES
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))
        .map_or(line, str::trim_start)
}
