use std::sync::OnceLock;

use regex::Regex;

/// Delimiter that opens and closes a fenced block.
pub const FENCE_MARKER: &str = "```";

/// One fenced block lifted out of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    /// Free-form text after the opening marker, trimmed. May be empty.
    pub info: String,
    /// Body between the opening line and the closing marker line.
    pub content: String,
}

impl ContentBlock {
    pub fn new(info: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            content: content.into(),
        }
    }
}

// Opening marker at line start, info without backticks, lazily-matched body
// (optional so an empty block closes on the very next line), closing marker
// alone on its line.
fn fence_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?ms)^```([^`\n]*)\n(?:(.*?)\n)??```[ \t\r]*$")
            .expect("fence regex must compile")
    })
}

/// Extract every closed fenced block, in document order.
pub fn extract_blocks(text: &str) -> Vec<ContentBlock> {
    fence_regex()
        .captures_iter(text)
        .map(|captures| ContentBlock {
            info: captures
                .get(1)
                .map_or("", |info| info.as_str())
                .trim()
                .to_owned(),
            content: captures
                .get(2)
                .map_or("", |content| content.as_str())
                .to_owned(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{extract_blocks, ContentBlock};

    #[test]
    fn text_without_fences_yields_no_blocks() {
        assert!(extract_blocks("just prose, `inline` code and ``double`` ticks").is_empty());
    }

    #[test]
    fn unclosed_fence_yields_no_blocks() {
        assert!(extract_blocks("```rust\nfn main() {}\n").is_empty());
    }

    #[test]
    fn empty_block_closes_on_next_line() {
        assert_eq!(
            extract_blocks("```txt\n```\nafter"),
            vec![ContentBlock::new("txt", "")]
        );
    }

    #[test]
    fn closing_marker_must_stand_alone() {
        let text = "```md\nuse ```inline``` here\n```python\nstill body\n```";
        assert_eq!(
            extract_blocks(text),
            vec![ContentBlock::new(
                "md",
                "use ```inline``` here\n```python\nstill body"
            )]
        );
    }

    #[test]
    fn crlf_closing_line_is_accepted() {
        let blocks = extract_blocks("```sh\r\necho hi\r\n```\r\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].info, "sh");
        assert_eq!(blocks[0].content, "echo hi\r");
    }
}
