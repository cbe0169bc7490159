use once_cell::sync::Lazy;
use regex::Regex;

static WORD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w']+").unwrap());

pub fn word_count(text: &str) -> usize {
    WORD_REGEX.find_iter(text).count()
}

/// Text inserted in `current` with respect to `previous`.
///
/// The common prefix and suffix are trimmed and the remaining span is widened
/// to whole words, so a single edit yields the words it touched.
pub fn inserted_text(previous: &str, current: &str) -> String {
    let prefix: usize = previous
        .chars()
        .zip(current.chars())
        .take_while(|(a, b)| a == b)
        .map(|(_, b)| b.len_utf8())
        .sum();

    // Both tails start after the prefix, so prefix and suffix never overlap.
    let suffix: usize = previous[prefix..]
        .chars()
        .rev()
        .zip(current[prefix..].chars().rev())
        .take_while(|(a, b)| a == b)
        .map(|(_, b)| b.len_utf8())
        .sum();

    let mut start = prefix;
    let mut end = current.len() - suffix;
    if start >= end {
        return String::new();
    }

    if cuts_word(current, start) {
        start = current[..start]
            .rfind(char::is_whitespace)
            .map(|i| i + current[i..].chars().next().map_or(1, char::len_utf8))
            .unwrap_or(0);
    }
    if cuts_word(current, end) {
        end = current[end..]
            .find(char::is_whitespace)
            .map(|i| end + i)
            .unwrap_or(current.len());
    }

    current[start..end].trim().to_string()
}

/// Whether byte offset `at` falls strictly inside a word of `text`.
fn cuts_word(text: &str, at: usize) -> bool {
    let before = text[..at].chars().next_back();
    let after = text[at..].chars().next();
    matches!((before, after), (Some(b), Some(a)) if !b.is_whitespace() && !a.is_whitespace())
}
