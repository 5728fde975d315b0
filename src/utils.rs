use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Pack text into chunks of at most `max_chars` characters, preferring
/// sentence and clause boundaries, then word boundaries, then hard cuts.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    static CLAUSES: OnceLock<Regex> = OnceLock::new();
    let re = CLAUSES.get_or_init(|| {
        Regex::new(r"(?s)([^.!?,;:]+[.!?,;:]+)|([^.!?,;:]+$)").expect("valid regex")
    });

    let mut pieces = Vec::new();
    for m in re.find_iter(text) {
        let s = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        if !s.is_empty() {
            pieces.push(s);
        }
    }
    if pieces.is_empty() {
        let s = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if s.is_empty() {
            return Vec::new();
        }
        warn!("No clause breaks found; chunking on words only");
        pieces.push(s);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for piece in pieces.iter().flat_map(|p| split_long(p, max_chars)) {
        if current.is_empty() {
            current = piece;
        } else if char_len(&current) + 1 + char_len(&piece) <= max_chars {
            current.push(' ');
            current.push_str(&piece);
        } else {
            chunks.push(std::mem::replace(&mut current, piece));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Break a piece longer than `max_chars` on words; words that are still
/// too long are cut by characters.
fn split_long(piece: &str, max_chars: usize) -> Vec<String> {
    if char_len(piece) <= max_chars {
        return vec![piece.to_string()];
    }
    let mut out = Vec::new();
    let mut current = String::new();
    for word in piece.split_whitespace() {
        let mut word = word.to_string();
        while char_len(&word) > max_chars {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            out.push(head);
        }
        if word.is_empty() {
            continue;
        }
        if current.is_empty() {
            current = word;
        } else if char_len(&current) + 1 + char_len(&word) <= max_chars {
            current.push(' ');
            current.push_str(&word);
        } else {
            out.push(std::mem::replace(&mut current, word));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
