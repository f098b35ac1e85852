//! Slash-based path decomposition helpers.
//!
//! Paths handled here are UTF-8 byte sequences split on `/`. The core
//! backends never touch OS-native path types; only the local backend
//! converts at its boundary.

/// Iterates over the non-empty components of `path`.
///
/// `"/foo/bar"` yields `foo`, `bar`. `"/"` yields nothing.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Splits `path` into its parent path and basename.
///
/// `"/foo/bar"` becomes `("/foo", "bar")` and `"/foo"` becomes
/// `("/", "foo")`. Returns `None` for the root, which has no parent.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    if path == "/" {
        return None;
    }

    match path.rfind('/') {
        Some(0) => Some(("/", &path[1..])),
        Some(pos) => Some((&path[..pos], &path[pos + 1..])),
        // Scheme-style mounts can hand backends a residual without a
        // leading slash; treat it as a child of the root.
        None => Some(("/", path)),
    }
}

/// Returns the ancestor of `path` at the given `level`.
///
/// For `/foo/bar`: level 0 is `/`, level 1 is `/foo`, level 2 is
/// `/foo/bar`. Levels past the path depth return `None`.
pub fn layer(path: &str, level: usize) -> Option<&str> {
    if level == 0 {
        return Some("/");
    }

    let mut cnt = 0usize;
    for (i, ch) in path.char_indices() {
        if ch == '/' {
            if cnt == level {
                return Some(&path[..i]);
            }
            cnt += 1;
        }
    }

    if cnt == level {
        return Some(path);
    }
    None
}

/// Joins a directory path and a child name.
pub fn join(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}
