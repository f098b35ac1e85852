//! Randomness backend.
//!
//! The root directory holds exactly one regular file, `/random`. Reads
//! return host cryptographic randomness, writes are discarded whole, the
//! stream has no position.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::vfs::{
    Error, FileHandle, FileMode, LsCallback, OpenFlags, ReadOutcome, Result, Stat, Vfs, Whence,
};

const RANDOM_PATH: &str = "/random";

struct Session {
    #[allow(dead_code)]
    flags: OpenFlags,
}

/// Backend exposing the host's random source as a file.
pub struct RandFs {
    sessions: Mutex<BTreeMap<FileHandle, Arc<Session>>>,
    handle_gen: AtomicU64,
}

/// Creates a randomness backend.
pub fn make_random() -> Box<dyn Vfs> {
    Box::new(RandFs::new())
}

impl RandFs {
    pub fn new() -> Self {
        RandFs { sessions: Mutex::new(BTreeMap::new()), handle_gen: AtomicU64::new(1) }
    }

    fn find_session(&self, fh: FileHandle) -> Result<Arc<Session>> {
        self.sessions.lock().unwrap().get(&fh).cloned().ok_or(Error::BadHandle)
    }
}

impl Default for RandFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for RandFs {
    fn ls(&self, path: &str, cb: &mut LsCallback) -> Result<()> {
        if path != "/" {
            return Err(Error::NoEntry);
        }
        let stat = self.stat(RANDOM_PATH)?;
        let _ = cb("random", &stat);
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        match path {
            "/" => Ok(Stat { mode: FileMode::DIR, size: 0, mtime: 0 }),
            RANDOM_PATH => Ok(Stat { mode: FileMode::REG, size: 1, mtime: 0 }),
            _ => Err(Error::NoEntry),
        }
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        if path != RANDOM_PATH {
            return Err(Error::NoEntry);
        }

        let fake = FileHandle(self.handle_gen.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session { flags });
        if self.sessions.lock().unwrap().insert(fake, session).is_some() {
            panic!("duplicate session handle {fake}");
        }
        Ok(fake)
    }

    fn close(&self, fh: FileHandle) -> Result<()> {
        match self.sessions.lock().unwrap().remove(&fh) {
            Some(_) => Ok(()),
            None => Err(Error::BadHandle),
        }
    }

    fn seek(&self, fh: FileHandle, _offset: i64, _whence: Whence) -> Result<u64> {
        self.find_session(fh)?;
        Err(Error::IllegalSeek)
    }

    fn read(&self, fh: FileHandle, buf: &mut [u8]) -> Result<ReadOutcome> {
        let _session = self.find_session(fh)?;
        OsRng.fill_bytes(buf);
        Ok(ReadOutcome::Data(buf.len()))
    }

    fn write(&self, fh: FileHandle, buf: &[u8]) -> Result<usize> {
        let _session = self.find_session(fh)?;
        Ok(buf.len())
    }

    fn truncate(&self, fh: FileHandle, _size: u64) -> Result<()> {
        self.find_session(fh)?;
        Err(Error::InvalidArgument)
    }

    // mkdir/rmdir/unlink are left unimplemented: the tree is immutable.
}
