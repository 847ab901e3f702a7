//! MarkdownV2 escaping and message chunking.

/// Telegram message size limit.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Escape `text` so Telegram renders it verbatim under MarkdownV2.
#[must_use]
pub fn escape_markdown_v2(text: &str) -> String {
    teloxide::utils::markdown::escape(text)
}

/// Split plain text into chunks that fit within Telegram's message limit.
/// Tries to split at newlines or spaces to avoid breaking words.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut split_window_end = remaining.floor_char_boundary(max_len);
        if split_window_end == 0 {
            split_window_end = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }

        let split_at = preferred_split(&remaining[..split_window_end]).unwrap_or(split_window_end);
        chunks.push(remaining[..split_at].to_string());
        remaining = trim_split_prefix(&remaining[split_at..]);
    }

    chunks
}

/// Raw pieces of `text` whose escaped form fits `max_len` each.
///
/// The source is cut before escaping, so an escape sequence never straddles
/// two messages.
pub fn split_for_escaping(text: &str, max_len: usize) -> Vec<&str> {
    if max_len == 0 || text.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if escape_markdown_v2(remaining).len() <= max_len {
            pieces.push(remaining);
            break;
        }

        let split_at = best_escaped_split(remaining, max_len);
        pieces.push(&remaining[..split_at]);
        remaining = trim_split_prefix(&remaining[split_at..]);
    }

    pieces
}

fn preferred_split(slice: &str) -> Option<usize> {
    slice
        .rfind('\n')
        .or_else(|| slice.rfind(' '))
        .filter(|pos| *pos > 0)
}

fn trim_split_prefix(rest: &str) -> &str {
    let rest = rest.trim_start_matches('\n');
    rest.strip_prefix(' ').unwrap_or(rest)
}

/// Largest char boundary whose escaped prefix fits, nudged back to a line
/// or word break when one exists.
fn best_escaped_split(text: &str, max_len: usize) -> usize {
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());

    let mut lo = 1usize;
    let mut hi = boundaries.len().saturating_sub(1);
    let mut best = 0usize;

    while lo <= hi {
        let mid = (lo + hi) / 2;
        let split = boundaries[mid];
        if escape_markdown_v2(&text[..split]).len() <= max_len {
            best = split;
            lo = mid + 1;
        } else {
            hi = mid - 1;
        }
    }

    if best == 0 {
        return boundaries.get(1).copied().unwrap_or(text.len());
    }

    // Escaping only grows text, so any shorter prefix fits as well.
    preferred_split(&text[..best]).unwrap_or(best)
}
