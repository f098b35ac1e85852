//! Two-layer union filesystem backend.
//!
//! The lower layer is never written; every modification lands in the upper
//! layer. A deletion of a lower entry is recorded as a whiteout: an upper
//! entry named `<name>.whiteout` in the same directory. An entry whose name
//! also has a whiteout in the upper layer may not itself exist there.
//!
//! A path exists in the logical view when it exists in either layer and no
//! whiteout covers it or any of its ancestors.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::utils::dir;
use crate::vfs::path::{join, layer, split_parent};
use crate::vfs::{
    Error, FileHandle, LsCallback, OpenFlags, ReadOutcome, Result, Stat, Vfs, Whence,
};

/// Suffix marking the same-named lower entry as deleted. The type and
/// contents of the whiteout entry are ignored.
const WHITEOUT_SUFFIX: &str = ".whiteout";

/// Chunk size for streaming a lower file into the upper layer.
const COPY_UP_CHUNK: usize = 64 * 1024;

/// Where a path lives in the union.
enum Placement {
    /// Present in the upper layer.
    Upper(Stat),
    /// Present in the lower layer only.
    Lower(Stat),
    /// Deleted: a whiteout at the captured upper path covers it.
    Whiteout(String),
    /// Present in neither layer.
    Absent,
}

/// Listing-merge tag for one name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ItemTag {
    /// Only in the lower layer.
    Lower,
    /// Only in the upper layer.
    Upper,
    /// In both layers; the upper stat wins.
    Both,
    /// In the lower layer but whiteouted.
    Whiteout,
}

/// A session is pinned to the layer that opened it for its whole life.
struct Session {
    fs: Arc<dyn Vfs>,
    real: FileHandle,
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.fs.close(self.real);
    }
}

/// Union of a read-only lower backend and a writable upper backend.
pub struct OverlayFs {
    lower: Arc<dyn Vfs>,
    upper: Arc<dyn Vfs>,
    sessions: Mutex<BTreeMap<FileHandle, Arc<Session>>>,
    handle_gen: AtomicU64,
}

/// Creates an overlay over `lower` and `upper`, taking ownership of both;
/// they are destroyed together with the overlay.
pub fn make_overlay(lower: Box<dyn Vfs>, upper: Box<dyn Vfs>) -> Box<dyn Vfs> {
    Box::new(OverlayFs::new(lower, upper))
}

/// Stats `path` on one layer, falling back to scanning the parent listing
/// when the layer does not implement `stat`.
fn stat_wrap(fs: &dyn Vfs, path: &str) -> Result<Stat> {
    match fs.stat(path) {
        Err(Error::NotSupported) => {}
        other => return other,
    }

    let (parent, name) = split_parent(path).unwrap_or((path, ""));
    let mut found = None;
    fs.ls(parent, &mut |entry, stat| {
        if entry == name {
            found = Some(*stat);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    found.ok_or(Error::NoEntry)
}

impl OverlayFs {
    pub fn new(lower: Box<dyn Vfs>, upper: Box<dyn Vfs>) -> Self {
        OverlayFs {
            lower: Arc::from(lower),
            upper: Arc::from(upper),
            sessions: Mutex::new(BTreeMap::new()),
            handle_gen: AtomicU64::new(1),
        }
    }

    /// Classifies `path` against both layers.
    ///
    /// The whiteout scan covers every ancestor of `path` down to `path`
    /// itself: `/foo/bar` is deleted when either `/foo.whiteout` or
    /// `/foo/bar.whiteout` exists in the upper layer.
    fn stat_ex(&self, path: &str) -> Placement {
        if let Ok(stat) = stat_wrap(&self.upper, path) {
            return Placement::Upper(stat);
        }

        let mut level = 1;
        while let Some(prefix) = layer(path, level) {
            let whiteout = format!("{prefix}{WHITEOUT_SUFFIX}");
            if stat_wrap(&self.upper, &whiteout).is_ok() {
                return Placement::Whiteout(whiteout);
            }
            if prefix.len() == path.len() {
                break;
            }
            level += 1;
        }

        if let Ok(stat) = stat_wrap(&self.lower, path) {
            return Placement::Lower(stat);
        }

        Placement::Absent
    }

    fn find_session(&self, fh: FileHandle) -> Result<Arc<Session>> {
        self.sessions.lock().unwrap().get(&fh).cloned().ok_or(Error::BadHandle)
    }

    /// Opens `path` on the given layer and registers the session.
    fn open_in(&self, fs: &Arc<dyn Vfs>, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        let real = fs.open(path, flags)?;
        let fake = FileHandle(self.handle_gen.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session { fs: fs.clone(), real });

        if self.sessions.lock().unwrap().insert(fake, session).is_some() {
            panic!("duplicate session handle {fake}");
        }
        Ok(fake)
    }

    /// Removes the whiteout entry at `whiteout_path`, whatever its type.
    /// Tolerates an entry that is already gone.
    fn remove_whiteout_entry(&self, whiteout_path: &str) -> Result<()> {
        match self.upper.unlink(whiteout_path) {
            Ok(()) | Err(Error::NoEntry) => Ok(()),
            Err(Error::IsDir) => match self.upper.rmdir(whiteout_path) {
                Ok(()) | Err(Error::NoEntry) => Ok(()),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Removes the whiteout covering `path`, if any.
    fn remove_whiteout(&self, path: &str) -> Result<()> {
        self.remove_whiteout_entry(&format!("{path}{WHITEOUT_SUFFIX}"))
    }

    /// Migrates the lower file at `path` into the upper layer through a
    /// bounded buffer. A short write surfaces as an I/O error. Both handles
    /// are closed on every path out.
    fn copy_up(&self, path: &str) -> Result<()> {
        debug!(path, "copy-up to upper layer");

        dir::ensure_parent_exist(&self.upper, path)?;

        let src = self.lower.open(path, OpenFlags::RDONLY)?;
        let dst = match self
            .upper
            .open(path, OpenFlags::WRONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE)
        {
            Ok(handle) => handle,
            Err(err) => {
                let _ = self.lower.close(src);
                return Err(err);
            }
        };

        let mut buf = vec![0u8; COPY_UP_CHUNK];
        let mut result = Ok(());
        loop {
            match self.lower.read(src, &mut buf) {
                Ok(ReadOutcome::Eof) => break,
                Ok(ReadOutcome::Data(n)) => match self.upper.write(dst, &buf[..n]) {
                    Ok(written) if written == n => {}
                    Ok(_) => {
                        result = Err(Error::Io);
                        break;
                    }
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                },
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        let _ = self.lower.close(src);
        let _ = self.upper.close(dst);
        result
    }

    /// Deletes the whole upper tree below `path`: files are unlinked,
    /// subdirectories recurse, then the enclosing directory is removed.
    /// Children are best-effort; the enclosing rmdir's result is reported.
    fn remove_upper_tree(&self, path: &str) -> Result<()> {
        let mut entries = Vec::new();
        self.upper.ls(path, &mut |name, stat| {
            entries.push((name.to_string(), *stat));
            ControlFlow::Continue(())
        })?;

        for (name, stat) in entries {
            let full = join(path, &name);
            if stat.is_reg() {
                let _ = self.upper.unlink(&full);
            } else {
                let _ = self.remove_upper_tree(&full);
            }
        }

        self.upper.rmdir(path)
    }
}

impl Vfs for OverlayFs {
    fn ls(&self, path: &str, cb: &mut LsCallback) -> Result<()> {
        let stat = self.stat(path)?;
        if stat.is_reg() {
            return Err(Error::NotDir);
        }

        let mut items: BTreeMap<String, (Stat, ItemTag)> = BTreeMap::new();

        match self.lower.ls(path, &mut |name, stat| {
            items.insert(name.to_string(), (*stat, ItemTag::Lower));
            ControlFlow::Continue(())
        }) {
            Ok(()) | Err(Error::NoEntry) => {}
            Err(err) => return Err(err),
        }

        match self.upper.ls(path, &mut |name, stat| {
            if let Some(base) = name.strip_suffix(WHITEOUT_SUFFIX) {
                // A whiteout must shadow an entry the lower pass inserted.
                let Some(item) = items.get_mut(base) else {
                    panic!("whiteout entry {name} without a lower counterpart");
                };
                item.1 = ItemTag::Whiteout;
            } else {
                items
                    .entry(name.to_string())
                    .and_modify(|item| {
                        item.0 = *stat;
                        if item.1 == ItemTag::Lower {
                            item.1 = ItemTag::Both;
                        }
                    })
                    .or_insert((*stat, ItemTag::Upper));
            }
            ControlFlow::Continue(())
        }) {
            Ok(()) | Err(Error::NoEntry) => {}
            Err(err) => return Err(err),
        }

        for (name, (stat, tag)) in &items {
            if *tag == ItemTag::Whiteout {
                continue;
            }
            if cb(name, stat).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        match self.stat_ex(path) {
            Placement::Upper(stat) | Placement::Lower(stat) => Ok(stat),
            Placement::Whiteout(_) | Placement::Absent => Err(Error::NoEntry),
        }
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        let placement = self.stat_ex(path);

        if !flags.contains(OpenFlags::CREATE)
            && matches!(placement, Placement::Whiteout(_) | Placement::Absent)
        {
            return Err(Error::NoEntry);
        }

        match placement {
            Placement::Upper(_) => self.open_in(&self.upper, path, flags),
            Placement::Lower(_) => {
                if flags.intersects(OpenFlags::WRONLY) {
                    self.copy_up(path)?;
                    self.open_in(&self.upper, path, flags)
                } else {
                    self.open_in(&self.lower, path, flags)
                }
            }
            Placement::Whiteout(whiteout_path) => {
                self.remove_whiteout_entry(&whiteout_path)?;
                dir::ensure_parent_exist(&self.upper, path)?;
                self.open_in(&self.upper, path, flags)
            }
            Placement::Absent => {
                dir::ensure_parent_exist(&self.upper, path)?;
                self.open_in(&self.upper, path, flags)
            }
        }
    }

    fn close(&self, fh: FileHandle) -> Result<()> {
        match self.sessions.lock().unwrap().remove(&fh) {
            Some(_) => Ok(()),
            None => Err(Error::BadHandle),
        }
    }

    fn seek(&self, fh: FileHandle, offset: i64, whence: Whence) -> Result<u64> {
        let session = self.find_session(fh)?;
        session.fs.seek(session.real, offset, whence)
    }

    fn read(&self, fh: FileHandle, buf: &mut [u8]) -> Result<ReadOutcome> {
        let session = self.find_session(fh)?;
        session.fs.read(session.real, buf)
    }

    fn write(&self, fh: FileHandle, buf: &[u8]) -> Result<usize> {
        let session = self.find_session(fh)?;
        session.fs.write(session.real, buf)
    }

    fn truncate(&self, fh: FileHandle, size: u64) -> Result<()> {
        let session = self.find_session(fh)?;
        session.fs.truncate(session.real, size)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        // The logical entry must not exist yet.
        if self.stat(path).is_ok() {
            return Err(Error::Exist);
        }

        let parent = match split_parent(path) {
            Some((parent, _)) => parent,
            None => return Err(Error::Exist),
        };
        let parent_stat = self.stat(parent)?;
        if !parent_stat.is_dir() {
            return Err(Error::NotDir);
        }

        self.remove_whiteout(path)?;
        self.upper.mkdir(path)
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        // The logical view must be empty.
        let mut occupied = false;
        self.ls(path, &mut |_, _| {
            occupied = true;
            ControlFlow::Break(())
        })?;
        if occupied {
            return Err(Error::NotEmpty);
        }

        match stat_wrap(&self.upper, path) {
            Ok(_) => self.remove_upper_tree(path)?,
            Err(Error::NoEntry) => {}
            Err(err) => return Err(err),
        }

        // The lower copy survives; mask it.
        if stat_wrap(&self.lower, path).is_ok() {
            return dir::ensure_dir_exist(&self.upper, &format!("{path}{WHITEOUT_SUFFIX}"));
        }
        Ok(())
    }

    fn unlink(&self, path: &str) -> Result<()> {
        let stat = self.stat(path)?;
        if !stat.is_reg() {
            return Err(Error::IsDir);
        }

        match self.upper.unlink(path) {
            Ok(()) | Err(Error::NoEntry) => {}
            Err(err) => return Err(err),
        }

        match stat_wrap(&self.lower, path) {
            Err(Error::NoEntry) => Ok(()),
            Err(err) => Err(err),
            Ok(stat) if stat.is_dir() => Err(Error::IsDir),
            Ok(_) => {
                // Mask the lower copy with an empty whiteout file.
                let whiteout = format!("{path}{WHITEOUT_SUFFIX}");
                dir::ensure_parent_exist(&self.upper, &whiteout)?;
                let fh = self.upper.open(&whiteout, OpenFlags::WRONLY | OpenFlags::CREATE)?;
                let _ = self.upper.close(fh);
                Ok(())
            }
        }
    }
}
