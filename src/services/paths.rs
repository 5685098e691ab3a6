//! Key and path helpers shared by the filesystem layer and browse sessions.
//!
//! Folder keys always end in `/`; user-facing paths never do.

pub const SEPARATOR: char = '/';

/// Append the separator to a non-empty path that lacks one.
/// The empty string (bucket root) stays empty.
pub fn normalize_prefix(path: &str) -> String {
    if path.is_empty() || path.ends_with(SEPARATOR) {
        path.to_string()
    } else {
        format!("{path}{SEPARATOR}")
    }
}

/// Like [`normalize_prefix`] but always yields a folder key.
pub fn folder_key(path: &str) -> String {
    if path.ends_with(SEPARATOR) {
        path.to_string()
    } else {
        format!("{path}{SEPARATOR}")
    }
}

/// Strip a single trailing separator.
pub fn trim_folder(path: &str) -> &str {
    path.strip_suffix(SEPARATOR).unwrap_or(path)
}

/// Parent folder path of a key, without trailing separator; `""` at the root.
pub fn parent_of(key: &str) -> &str {
    let trimmed = trim_folder(key);
    match trimmed.rfind(SEPARATOR) {
        Some(pos) => &trimmed[..pos],
        None => "",
    }
}

/// Last path segment of a key, ignoring a trailing separator.
pub fn last_segment(key: &str) -> &str {
    let trimmed = trim_folder(key);
    match trimmed.rfind(SEPARATOR) {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Join a folder path and a child name.
pub fn join(folder: &str, name: &str) -> String {
    format!("{}{}", normalize_prefix(folder), name.trim_start_matches(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_appends_once() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("docs"), "docs/");
        assert_eq!(normalize_prefix("docs/"), "docs/");
        assert_eq!(folder_key(""), "/");
    }

    #[test]
    fn parent_and_segment() {
        assert_eq!(parent_of("docs/img/logo.png"), "docs/img");
        assert_eq!(parent_of("docs/img/"), "docs");
        assert_eq!(parent_of("top.txt"), "");
        assert_eq!(last_segment("docs/img/"), "img");
        assert_eq!(last_segment("docs/img/logo.png"), "logo.png");
        assert_eq!(last_segment("empty"), "empty");
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("", "a.txt"), "a.txt");
        assert_eq!(join("docs", "a.txt"), "docs/a.txt");
        assert_eq!(join("docs/", "/a.txt"), "docs/a.txt");
    }
}
