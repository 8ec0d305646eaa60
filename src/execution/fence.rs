//! Markdown fence stripping for submitted code.

const FENCE: &str = "```";

/// Remove one surrounding triple-backtick fence, with or without a language
/// tag. Code without an opening fence is returned unchanged; inner fences are
/// left alone.
pub fn strip_fence(code: &str) -> String {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix(FENCE) else {
        return code.to_string();
    };

    // The rest of the opening line is the info string.
    let body = match rest.split_once('\n') {
        Some((info, body)) if !info.contains(FENCE) => body,
        _ => rest,
    };

    let body = body.trim_end();
    let body = body.strip_suffix(FENCE).unwrap_or(body);
    body.trim_matches('\n').trim_end().to_string()
}
