//! Directory helpers over any backend, including the visitor.

use std::ops::ControlFlow;

use crate::vfs::path::{join, split_parent};
use crate::vfs::{Error, Result, Vfs};

/// Finds the closest existing ancestor of `path`, trying `path` itself
/// first.
fn search_existing_ancestor(fs: &dyn Vfs, path: &str) -> Result<String> {
    let mut current = path;
    loop {
        match fs.stat(current) {
            Ok(_) => return Ok(current.to_string()),
            Err(Error::NotSupported) => return Err(Error::NotSupported),
            Err(_) => {}
        }
        match split_parent(current) {
            Some((parent, _)) => current = parent,
            None => return Err(Error::NoEntry),
        }
    }
}

/// Creates every missing directory from `root` (which exists) down to
/// `path`.
fn mkdir_chain(fs: &dyn Vfs, root: &str, path: &str) -> Result<()> {
    if root.len() == path.len() {
        return Ok(());
    }

    // Scan for separators strictly below the root boundary; the byte
    // right after the root is its own separator (or the root's trailing
    // slash) and is skipped.
    let start = if root.ends_with('/') { root.len() } else { root.len() + 1 };
    let bytes = path.as_bytes();
    for pos in start..bytes.len() {
        if bytes[pos] == b'/' {
            fs.mkdir(&path[..pos])?;
        }
    }

    fs.mkdir(path)
}

/// Ensures the directory `path` exists, creating missing ancestors.
pub fn ensure_dir_exist(fs: &dyn Vfs, path: &str) -> Result<()> {
    let root = search_existing_ancestor(fs, path)?;
    mkdir_chain(fs, &root, path)
}

/// Ensures the parent directory of `path` exists.
pub fn ensure_parent_exist(fs: &dyn Vfs, path: &str) -> Result<()> {
    match split_parent(path) {
        Some((parent, _)) => ensure_dir_exist(fs, parent),
        None => Err(Error::Io),
    }
}

/// Creates the directory at `path` together with any missing ancestors.
pub fn make_dirs(fs: &dyn Vfs, path: &str) -> Result<()> {
    if let Some((parent, _)) = split_parent(path) {
        ensure_dir_exist(fs, parent)?;
    }
    fs.mkdir(path)
}

/// Recursively removes the directory at `path` and everything below it.
///
/// Regular files are unlinked and subdirectories recurse before the
/// enclosing directory is removed; the first failure stops the walk.
pub fn remove_all(fs: &dyn Vfs, path: &str) -> Result<()> {
    let mut entries = Vec::new();
    fs.ls(path, &mut |name, stat| {
        entries.push((name.to_string(), *stat));
        ControlFlow::Continue(())
    })?;

    for (name, stat) in entries {
        let full = join(path, &name);
        if stat.is_reg() {
            fs.unlink(&full)?;
        } else {
            remove_all(fs, &full)?;
        }
    }

    fs.rmdir(path)
}
