//! Shared key handling for storage backends.
//!
//! Keys are backend-relative paths joined with `/`. All backends use the same
//! layout so the orphanage can strip staging prefixes uniformly.

/// Join an optional path with a name into an effective key.
pub fn join_key(path: Option<&str>, name: &str) -> String {
    match path {
        Some(p) if !p.is_empty() => format!("{}/{}", p.trim_end_matches('/'), name),
        _ => name.to_string(),
    }
}

/// Strip `prefix` (and any leading separator left behind) from `key`.
///
/// Keys that do not start with the prefix are returned unchanged.
pub fn strip_prefix<'a>(key: &'a str, prefix: &str) -> &'a str {
    key.strip_prefix(prefix)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(key)
}

/// Reject keys that could escape a backend root.
pub fn validate_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.split('/').any(|segment| segment == "..")
}
