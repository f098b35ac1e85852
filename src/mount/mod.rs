//! Mount registry and path routing.
//!
//! A [`VfsContext`] owns an ordered prefix table of mounted backends and the
//! [`Visitor`] that routes client paths to them. The module also exposes the
//! classic process-wide singleton (`init`/`shutdown`/`mount`/`unmount`/
//! `visitor`) as a convenience wrapper over an implicitly owned context.

mod visitor;

#[cfg(test)]
mod tests;

pub use visitor::Visitor;

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::vfs::{Error, Result, Vfs, MAX_PATH_LEN};

/// A backend bound to an absolute path prefix.
///
/// The record is shared between the registry and every in-flight operation
/// or open session that resolved through it; the backend is destroyed when
/// the last holder lets go.
pub(crate) struct Mount {
    /// Normalized mount prefix.
    pub(crate) prefix: String,
    /// The mounted backend.
    pub(crate) backend: Box<dyn Vfs>,
}

impl Mount {
    /// The part of `path` below this mount, `/` when `path` is the mount
    /// point itself.
    pub(crate) fn residual<'a>(&self, path: &'a str) -> &'a str {
        if self.prefix.len() == path.len() {
            "/"
        } else {
            &path[self.prefix.len()..]
        }
    }
}

/// Ordered prefix table of mount records.
pub(crate) struct MountRegistry {
    table: RwLock<BTreeMap<String, Arc<Mount>>>,
}

/// Normalizes a mount prefix.
///
/// A single trailing `/` is stripped unless the last two characters are both
/// `/`, which preserves scheme-style prefixes:
///
/// * `/` stays `/`
/// * `/foo` stays `/foo`
/// * `/foo/` becomes `/foo`
/// * `file:///` stays `file:///`
/// * `file:///foo/` becomes `file:///foo`
fn normalize_prefix(prefix: &str) -> &str {
    let bytes = prefix.as_bytes();
    if bytes.len() >= 2 && bytes[bytes.len() - 1] == b'/' && bytes[bytes.len() - 2] != b'/' {
        &prefix[..prefix.len() - 1]
    } else {
        prefix
    }
}

impl MountRegistry {
    pub(crate) fn new() -> Self {
        MountRegistry { table: RwLock::new(BTreeMap::new()) }
    }

    /// Inserts a mount record, failing with [`Error::Already`] on a
    /// duplicate prefix.
    pub(crate) fn insert(&self, prefix: &str, backend: Box<dyn Vfs>) -> Result<()> {
        if prefix.is_empty() || prefix.len() > MAX_PATH_LEN {
            return Err(Error::InvalidArgument);
        }

        let prefix = normalize_prefix(prefix);
        let mount = Arc::new(Mount { prefix: prefix.to_string(), backend });

        let mut table = self.table.write().unwrap();
        if table.contains_key(prefix) {
            return Err(Error::Already);
        }
        table.insert(prefix.to_string(), mount);
        debug!(prefix, "mounted backend");
        Ok(())
    }

    /// Removes the record with the exact `prefix`.
    ///
    /// In-flight operations that resolved the mount before removal keep the
    /// backend alive until they release it.
    pub(crate) fn remove(&self, prefix: &str) -> Result<()> {
        let prefix = normalize_prefix(prefix);
        let removed = self.table.write().unwrap().remove(prefix);
        match removed {
            Some(_) => {
                debug!(prefix, "unmounted backend");
                Ok(())
            }
            None => Err(Error::NoEntry),
        }
    }

    /// Finds the mount whose prefix is the longest prefix of `path`.
    ///
    /// Walks predecessors from the greatest key not above `path`: matching
    /// prefixes of `path` form a chain in key order, so the first hit is the
    /// longest one.
    pub(crate) fn lookup(&self, path: &str) -> Option<Arc<Mount>> {
        let table = self.table.read().unwrap();

        let mut cursor =
            table.range::<str, _>((Bound::Unbounded, Bound::Included(path))).next_back();
        while let Some((prefix, mount)) = cursor {
            if path.starts_with(prefix.as_str()) {
                return Some(mount.clone());
            }
            cursor = table
                .range::<str, _>((Bound::Unbounded, Bound::Excluded(prefix.as_str())))
                .next_back();
        }
        None
    }

    /// Drains the table, releasing the registry's reference on each record.
    pub(crate) fn clear(&self) {
        loop {
            let record = { self.table.write().unwrap().pop_first() };
            if record.is_none() {
                break;
            }
            // Dropped outside the lock: releasing the last reference runs
            // the backend's destruction.
        }
    }
}

/// An owned virtual file system: a mount registry plus its visitor.
///
/// Dropping the context drains the visitor's sessions and then the mount
/// table; each backend is destroyed when its last reference disappears.
pub struct VfsContext {
    registry: Arc<MountRegistry>,
    visitor: Arc<Visitor>,
}

impl VfsContext {
    pub fn new() -> Self {
        let registry = Arc::new(MountRegistry::new());
        let visitor = Arc::new(Visitor::new(registry.clone()));
        VfsContext { registry, visitor }
    }

    /// Mounts `backend` at the absolute `prefix`.
    ///
    /// The prefix must be slash-separated UTF-8 without consecutive slashes
    /// (except as part of a URL scheme such as `file:///`); a single
    /// trailing slash is stripped.
    pub fn mount(&self, prefix: &str, backend: Box<dyn Vfs>) -> Result<()> {
        self.registry.insert(prefix, backend)
    }

    /// Unmounts the backend at the exact `prefix`.
    pub fn unmount(&self, prefix: &str) -> Result<()> {
        self.registry.remove(prefix)
    }

    /// The visitor routing operations through this context's mounts.
    pub fn visitor(&self) -> Arc<Visitor> {
        self.visitor.clone()
    }
}

impl Default for VfsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VfsContext {
    fn drop(&mut self) {
        // Sessions first: each holds a mount reference of its own.
        self.visitor.drain_sessions();
        self.registry.clear();
    }
}

static GLOBAL: Mutex<Option<VfsContext>> = Mutex::new(None);

/// Installs the process-wide context.
///
/// Returns [`Error::Already`] if it is already installed.
pub fn init() -> Result<()> {
    let mut global = GLOBAL.lock().unwrap();
    if global.is_some() {
        return Err(Error::Already);
    }
    *global = Some(VfsContext::new());
    Ok(())
}

/// Tears the process-wide context down.
///
/// The caller must ensure no other library calls are in progress or will be
/// issued. A no-op when [`init`] has not run.
pub fn shutdown() {
    GLOBAL.lock().unwrap().take();
}

fn with_global<T>(f: impl FnOnce(&VfsContext) -> T) -> T {
    let global = GLOBAL.lock().unwrap();
    let ctx = global.as_ref().expect("vfs not initialized: call init() first");
    f(ctx)
}

/// Mounts `backend` at `prefix` in the process-wide context.
///
/// Panics if [`init`] has not run.
pub fn mount(prefix: &str, backend: Box<dyn Vfs>) -> Result<()> {
    with_global(|ctx| ctx.mount(prefix, backend))
}

/// Unmounts `prefix` from the process-wide context.
///
/// Panics if [`init`] has not run.
pub fn unmount(prefix: &str) -> Result<()> {
    with_global(|ctx| ctx.unmount(prefix))
}

/// The process-wide visitor. Never destroyed by the caller.
///
/// Panics if [`init`] has not run.
pub fn visitor() -> Arc<Visitor> {
    with_global(|ctx| ctx.visitor())
}
