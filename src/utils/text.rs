//! Text normalization for legacy content.

use std::sync::OnceLock;

use regex::Regex;

/// Longest slug produced by [`slugify`], before any collision suffix.
pub const SLUG_MAX_LEN: usize = 80;

fn non_slug_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// URL slug: lowercase ASCII alphanumerics separated by single hyphens.
///
/// Returns an empty string when nothing sluggable remains.
pub fn slugify(input: &str) -> String {
    let lowered = html_unescape(input).to_lowercase();
    let slug = non_slug_chars().replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    truncate_chars(slug, SLUG_MAX_LEN)
        .trim_end_matches('-')
        .to_string()
}

/// Trim and collapse internal whitespace. Blank input becomes `None`.
pub fn clean_text(input: &str) -> Option<String> {
    let cleaned = whitespace_runs()
        .replace_all(html_unescape(input).trim(), " ")
        .into_owned();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(input: &str, max: usize) -> String {
    match input.char_indices().nth(max) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}

/// Undo the entity escaping the legacy platform applied to stored titles.
pub fn html_unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
