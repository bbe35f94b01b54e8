//! Small text helpers shared by captions, status messages and downloads.

use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"<[^>]*>").expect("HTML tag regex is valid")
});

/// Escapes text for Telegram's HTML parse mode.
///
/// Only `&`, `<` and `>` need escaping there; quotes are left alone.
///
/// # Example
///
/// ```
/// use mediarelay::core::utils::escape_html;
///
/// assert_eq!(escape_html("Tom & <Jerry>"), "Tom &amp; &lt;Jerry&gt;");
/// ```
pub fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

/// Wraps text in `<b>` tags without escaping it.
pub fn html_bold(text: &str) -> String {
    format!("<b>{}</b>", text)
}

/// Removes anything that looks like an HTML tag.
///
/// Used for keyboard button labels, which Telegram renders as plain text.
pub fn strip_html_tags(text: &str) -> String {
    HTML_TAG_REGEX.replace_all(text, "").into_owned()
}

/// Truncates to at most `max_chars` characters, appending `...` when cut.
///
/// Counts `char`s, not bytes, so multi-byte scripts are never split.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

/// Replaces characters that are unsafe in file names.
///
/// Path separators, Windows-reserved characters and control characters
/// become `_`; double quotes become single quotes. Returns `unnamed` if
/// nothing usable is left.
pub fn escape_filename(filename: &str) -> String {
    let mut result = String::with_capacity(filename.len());

    for c in filename.chars() {
        match c {
            '/' | '\\' => result.push('_'),
            ':' | '*' | '?' | '<' | '>' | '|' => result.push('_'),
            '"' => result.push('\''),
            c if c.is_control() => result.push('_'),
            _ => result.push(c),
        }
    }

    let result = result.trim_matches(|c: char| c.is_whitespace() || c == '.');

    if result.is_empty() {
        "unnamed".to_string()
    } else {
        result.to_string()
    }
}
