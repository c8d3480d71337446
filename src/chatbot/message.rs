//! Outgoing text helpers.

/// Telegram rejects messages longer than this many characters.
pub const TELEGRAM_MAX_CHARS: usize = 4096;

/// Max chars of user text to put in a log line.
const LOG_PREVIEW_CHARS: usize = 100;

/// Split text into chunks of at most `limit` chars.
///
/// Prefers breaking after the last newline inside the limit. Concatenating
/// the chunks gives back the input.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    assert!(limit > 0, "split limit must be positive");

    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        // Byte offset of the first char past the limit
        let hard_end = rest
            .char_indices()
            .nth(limit)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());

        let end = match rest[..hard_end].rfind('\n') {
            Some(nl) if nl > 0 => nl + 1,
            _ => hard_end,
        };

        chunks.push(rest[..end].to_string());
        rest = &rest[end..];
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Single-line preview of user text for logs.
pub fn preview(text: &str) -> String {
    let mut out: String = text
        .chars()
        .take(LOG_PREVIEW_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    if text.chars().count() > LOG_PREVIEW_CHARS {
        out.push('…');
    }
    out
}
