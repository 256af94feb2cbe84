//! Path normalization shared by hit ingestion and step definitions

/// Reduces a URL or path to a canonical path.
///
/// - drops `scheme://host[:port]` from absolute URLs
/// - drops query string and fragment
/// - collapses repeated slashes and removes the trailing slash
/// - always starts with `/`; empty input becomes `/`
///
/// The function is idempotent. A `*` in the input is kept as-is so step
/// patterns go through the same normalization as hit paths.
pub fn normalize_path(input: &str) -> String {
    let trimmed = input.trim();
    let without_origin = strip_origin(trimmed);

    let end = without_origin
        .find(['?', '#'])
        .unwrap_or(without_origin.len());

    let segments: Vec<&str> = without_origin[..end]
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn strip_origin(value: &str) -> &str {
    let Some(pos) = value.find("://") else {
        return value;
    };

    let scheme = &value[..pos];
    let is_scheme = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !is_scheme {
        return value;
    }

    let rest = &value[pos + 3..];
    match rest.find(['/', '?', '#']) {
        Some(idx) => &rest[idx..],
        None => "",
    }
}
