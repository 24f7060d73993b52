//! Helpers for the slash-separated node paths of the coordination tree.

/// Joins a child name onto a parent path.
#[must_use]
pub fn join(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Returns the parent of `path`, or `None` for the root.
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of `path`.
#[must_use]
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Whether `name` can be used as a single path segment.
#[must_use]
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.chars().any(char::is_control)
}

/// Whether `path` is absolute, has no empty segments and no trailing slash.
#[must_use]
pub fn is_valid_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    path.strip_prefix('/')
        .is_some_and(|rest| rest.split('/').all(is_valid_segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join("/", "qdb"), "/qdb");
        assert_eq!(join("/qdb/c1", "users"), "/qdb/c1/users");
        assert_eq!(parent("/qdb/c1/users"), Some("/qdb/c1"));
        assert_eq!(parent("/qdb"), Some("/"));
        assert_eq!(parent("/"), None);
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("/qdb/c1/users/admin"), "admin");
        assert_eq!(last_segment("admin"), "admin");
    }

    #[test]
    fn test_validation() {
        assert!(is_valid_path("/qdb/c1"));
        assert!(is_valid_path("/"));
        assert!(!is_valid_path("qdb"));
        assert!(!is_valid_path("/qdb//c1"));
        assert!(!is_valid_path("/qdb/"));
        assert!(!is_valid_segment("a/b"));
        assert!(!is_valid_segment(".."));
        assert!(is_valid_segment("admin"));
    }
}
