//! Host filesystem backend.
//!
//! Bridges the contract onto `std::fs` below a root directory. Virtual
//! paths stay UTF-8 and slash-separated; conversion to host-native paths
//! happens only here, component by component. Every host error runs through
//! the errno translation layer.

use std::collections::BTreeMap;
use std::fs::{File, Metadata, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use crate::vfs::errno::from_io_error;
use crate::vfs::path::components;
use crate::vfs::{
    Error, FileHandle, FileMode, LsCallback, OpenFlags, ReadOutcome, Result, Stat, Vfs, Whence,
};

struct Session {
    file: Mutex<File>,
}

/// Backend serving a subtree of the host filesystem.
pub struct LocalFs {
    root: PathBuf,
    sessions: Mutex<BTreeMap<FileHandle, Arc<Session>>>,
    handle_gen: AtomicU64,
}

/// Creates a host filesystem backend rooted at `root`, which must be an
/// existing directory.
pub fn make_local(root: impl Into<PathBuf>) -> Result<Box<dyn Vfs>> {
    Ok(Box::new(LocalFs::new(root)?))
}

fn stat_from_metadata(meta: &Metadata) -> Stat {
    let mode = if meta.is_dir() { FileMode::DIR } else { FileMode::REG };
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Stat { mode, size: meta.len(), mtime }
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta = std::fs::metadata(&root).map_err(|e| from_io_error(&e))?;
        if !meta.is_dir() {
            return Err(Error::NotDir);
        }
        Ok(LocalFs {
            root,
            sessions: Mutex::new(BTreeMap::new()),
            handle_gen: AtomicU64::new(1),
        })
    }

    /// Converts a virtual path into a host path below the root.
    fn resolve(&self, path: &str) -> PathBuf {
        let mut host = self.root.clone();
        for name in components(path) {
            host.push(name);
        }
        host
    }

    fn find_session(&self, fh: FileHandle) -> Result<Arc<Session>> {
        self.sessions.lock().unwrap().get(&fh).cloned().ok_or(Error::BadHandle)
    }
}

impl Vfs for LocalFs {
    fn ls(&self, path: &str, cb: &mut LsCallback) -> Result<()> {
        let host = self.resolve(path);
        let entries = std::fs::read_dir(&host).map_err(|e| from_io_error(&e))?;

        for entry in entries {
            let entry = entry.map_err(|e| from_io_error(&e))?;
            let meta = entry.metadata().map_err(|e| from_io_error(&e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if cb(&name, &stat_from_metadata(&meta)).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        let meta = std::fs::metadata(self.resolve(path)).map_err(|e| from_io_error(&e))?;
        Ok(stat_from_metadata(&meta))
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        let host = self.resolve(path);

        if let Ok(meta) = std::fs::metadata(&host) {
            if meta.is_dir() {
                return Err(Error::IsDir);
            }
        }

        let mut options = OpenOptions::new();
        options
            .read(flags.contains(OpenFlags::RDONLY))
            .write(flags.contains(OpenFlags::WRONLY))
            .append(flags.contains(OpenFlags::APPEND))
            .truncate(flags.contains(OpenFlags::TRUNCATE))
            .create(flags.contains(OpenFlags::CREATE));

        let file = options.open(&host).map_err(|e| from_io_error(&e))?;
        let fake = FileHandle(self.handle_gen.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session { file: Mutex::new(file) });

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

    fn seek(&self, fh: FileHandle, offset: i64, whence: Whence) -> Result<u64> {
        let session = self.find_session(fh)?;
        let pos = match whence {
            Whence::Set => {
                if offset < 0 {
                    return Err(Error::InvalidArgument);
                }
                SeekFrom::Start(offset as u64)
            }
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };

        let mut file = session.file.lock().unwrap();
        file.seek(pos).map_err(|e| from_io_error(&e))
    }

    fn read(&self, fh: FileHandle, buf: &mut [u8]) -> Result<ReadOutcome> {
        let session = self.find_session(fh)?;
        let mut file = session.file.lock().unwrap();
        let n = file.read(buf).map_err(|e| from_io_error(&e))?;

        // A zero-byte host read at the cursor means end of file, unless the
        // caller handed in an empty buffer.
        if n == 0 && !buf.is_empty() {
            return Ok(ReadOutcome::Eof);
        }
        Ok(ReadOutcome::Data(n))
    }

    fn write(&self, fh: FileHandle, buf: &[u8]) -> Result<usize> {
        let session = self.find_session(fh)?;
        let mut file = session.file.lock().unwrap();
        file.write(buf).map_err(|e| from_io_error(&e))
    }

    fn truncate(&self, fh: FileHandle, size: u64) -> Result<()> {
        let session = self.find_session(fh)?;
        let file = session.file.lock().unwrap();
        file.set_len(size).map_err(|e| from_io_error(&e))
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        std::fs::create_dir(self.resolve(path)).map_err(|e| from_io_error(&e))
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        let host = self.resolve(path);
        let meta = std::fs::metadata(&host).map_err(|e| from_io_error(&e))?;
        if !meta.is_dir() {
            return Err(Error::NotDir);
        }
        std::fs::remove_dir(&host).map_err(|e| from_io_error(&e))
    }

    fn unlink(&self, path: &str) -> Result<()> {
        let host = self.resolve(path);
        let meta = std::fs::metadata(&host).map_err(|e| from_io_error(&e))?;
        if meta.is_dir() {
            return Err(Error::IsDir);
        }
        std::fs::remove_file(&host).map_err(|e| from_io_error(&e))
    }
}
