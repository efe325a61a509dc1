//! Text helpers for log previews and display formatting

/// Collapse whitespace and cut `text` to `max_length` characters for log lines.
///
/// Newlines and runs of spaces become a single space so a prompt preview stays
/// on one log line. An ellipsis is appended when anything was cut.
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let clean = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&clean, max_length)
}

/// Cut `text` to at most `max_chars` characters (not bytes), appending `...`
/// when it was longer.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
