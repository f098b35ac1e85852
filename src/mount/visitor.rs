//! The visitor facade: routes path-addressed operations to the matching
//! mount and multiplexes handle-addressed operations over its own session
//! table.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{Mount, MountRegistry};
use crate::vfs::{Error, FileHandle, LsCallback, OpenFlags, ReadOutcome, Result, Stat, Vfs, Whence};

/// Per-open state: the opaque handle the client sees, the real handle the
/// backend returned, and the mount that produced it.
///
/// Holding the mount keeps the backend alive across an unmount; the backend
/// handle is closed when the last reference to the session disappears.
struct Session {
    fake: FileHandle,
    real: FileHandle,
    mount: Arc<Mount>,
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.mount.backend.close(self.real);
    }
}

/// The uniform facade over every mounted backend.
///
/// Obtained from [`crate::mount::VfsContext::visitor`] or the singleton
/// [`crate::mount::visitor`]; never destroyed by the caller.
pub struct Visitor {
    registry: Arc<MountRegistry>,
    handle_gen: AtomicU64,
    sessions: RwLock<BTreeMap<FileHandle, Arc<Session>>>,
}

impl Visitor {
    pub(crate) fn new(registry: Arc<MountRegistry>) -> Self {
        Visitor {
            registry,
            handle_gen: AtomicU64::new(1),
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Resolves the longest-prefix mount for `path` and runs `op` with the
    /// record and the residual path. The mount reference taken by the
    /// lookup is held for the duration of the call.
    fn access_mount<T>(&self, path: &str, op: impl FnOnce(&Arc<Mount>, &str) -> Result<T>) -> Result<T> {
        let mount = self.registry.lookup(path).ok_or(Error::NoEntry)?;
        let residual = mount.residual(path);
        op(&mount, residual)
    }

    /// Looks a session up by fake handle and runs `op` on it. The session
    /// reference taken under the read lock is held for the duration.
    fn access_session<T>(&self, fh: FileHandle, op: impl FnOnce(&Session) -> Result<T>) -> Result<T> {
        let session = { self.sessions.read().unwrap().get(&fh).cloned() };
        match session {
            Some(session) => op(&session),
            None => Err(Error::BadHandle),
        }
    }

    /// Releases every open session. Used on context shutdown.
    pub(crate) fn drain_sessions(&self) {
        loop {
            let session = { self.sessions.write().unwrap().pop_first() };
            if session.is_none() {
                break;
            }
            // Dropped outside the lock so the backend close never runs
            // under the session table lock.
        }
    }
}

impl Vfs for Visitor {
    fn ls(&self, path: &str, cb: &mut LsCallback) -> Result<()> {
        self.access_mount(path, |mount, residual| mount.backend.ls(residual, cb))
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        self.access_mount(path, |mount, residual| mount.backend.stat(residual))
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        flags.validate()?;

        self.access_mount(path, |mount, residual| {
            let real = mount.backend.open(residual, flags)?;
            let fake = FileHandle(self.handle_gen.fetch_add(1, Ordering::Relaxed));
            let session = Arc::new(Session { fake, real, mount: mount.clone() });

            let prev = self.sessions.write().unwrap().insert(fake, session);
            if prev.is_some() {
                panic!("duplicate fake handle {fake}");
            }

            debug!(path, %fake, "opened session");
            Ok(fake)
        })
    }

    fn close(&self, fh: FileHandle) -> Result<()> {
        let session = self.sessions.write().unwrap().remove(&fh);
        match session {
            Some(session) => {
                debug!(%fh, "closed session");
                drop(session);
                Ok(())
            }
            None => Err(Error::BadHandle),
        }
    }

    fn seek(&self, fh: FileHandle, offset: i64, whence: Whence) -> Result<u64> {
        self.access_session(fh, |s| s.mount.backend.seek(s.real, offset, whence))
    }

    fn read(&self, fh: FileHandle, buf: &mut [u8]) -> Result<ReadOutcome> {
        self.access_session(fh, |s| s.mount.backend.read(s.real, buf))
    }

    fn write(&self, fh: FileHandle, buf: &[u8]) -> Result<usize> {
        self.access_session(fh, |s| s.mount.backend.write(s.real, buf))
    }

    fn truncate(&self, fh: FileHandle, size: u64) -> Result<()> {
        self.access_session(fh, |s| s.mount.backend.truncate(s.real, size))
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        self.access_mount(path, |mount, residual| mount.backend.mkdir(residual))
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.access_mount(path, |mount, residual| mount.backend.rmdir(residual))
    }

    fn unlink(&self, path: &str) -> Result<()> {
        self.access_mount(path, |mount, residual| mount.backend.unlink(residual))
    }
}
