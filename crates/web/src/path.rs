//! Path normalization shared by route registration and request matching.

/// Normalizes a request path or route template.
///
/// - the query string and fragment are stripped
/// - runs of `/` collapse to one
/// - trailing `/` are removed, except for the root which stays `/`
/// - a leading `/` is always present
///
/// ```
/// use micro_api::path::normalize;
///
/// assert_eq!(normalize("//users///42/?page=2"), "/users/42");
/// assert_eq!(normalize(""), "/");
/// ```
pub fn normalize(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();

    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        normalized.push('/');
        normalized.push_str(segment);
    }

    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}
