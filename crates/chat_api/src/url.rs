/// Default base URL for chat-completion requests.
pub const DEFAULT_CHAT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

const COMPLETIONS_SUFFIX: &str = "/chat/completions";

/// Normalize a base URL to a chat-completions endpoint.
///
/// Normalization rules:
/// 1) keep `/chat/completions` unchanged
/// 2) append `/completions` when path ends in `/chat`
/// 3) append `/chat/completions` otherwise
pub fn normalize_chat_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_CHAT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(COMPLETIONS_SUFFIX) {
        return trimmed.to_string();
    }
    if trimmed.ends_with("/chat") {
        return format!("{trimmed}/completions");
    }
    format!("{trimmed}{COMPLETIONS_SUFFIX}")
}
