//! Tool name sanitization.

/// Longest tool name model providers accept.
pub const MAX_TOOL_NAME_LEN: usize = 63;

const HEAD_LEN: usize = 28;
const TAIL_LEN: usize = 32;
const ELISION: &str = "___";

/// Map an arbitrary tool identifier onto `[A-Za-z0-9_.-]{1,63}`.
///
/// Disallowed characters become `_`. Over-long names keep their first 28
/// and last 32 characters around `___`. Two long names sharing both ends
/// collide.
pub fn valid_tool_name(name: &str) -> String {
    let sanitized: Vec<char> = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if sanitized.len() <= MAX_TOOL_NAME_LEN {
        return sanitized.into_iter().collect();
    }

    let head = sanitized.iter().take(HEAD_LEN);
    let tail = sanitized.iter().skip(sanitized.len() - TAIL_LEN);
    let mut truncated: String = head.collect();
    truncated.push_str(ELISION);
    truncated.extend(tail);
    truncated
}
