/// Characters stripped from the end of a description.
const TRAILING_PUNCTUATION: &[char] = &['.', '!', '?', ';', ':', ','];

/// Normalize free-text move descriptions: trim, strip trailing punctuation, lowercase.
///
/// Whitespace uncovered by the strip is removed as well so that the result is a
/// fixed point (`normalize(normalize(x)) == normalize(x)`).
pub fn normalize_description(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed
        .trim_end_matches(|c: char| TRAILING_PUNCTUATION.contains(&c) || c.is_whitespace())
        .to_lowercase()
}

/// Split a tags line into labels.
///
/// Accepts `[a] [b]`, `a, b` and `a b` interchangeably. Order is kept,
/// duplicates are not removed.
pub fn parse_tags(line: &str) -> Vec<String> {
    line.replace(['[', ']'], "")
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Inverse of [`parse_tags`] for display and storage.
pub fn join_tags(tags: &[String]) -> String {
    tags.join(", ")
}
