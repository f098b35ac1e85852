//! In-memory filesystem backend.
//!
//! The tree is a set of reference-counted nodes. A node is co-owned by its
//! parent and by every open session; the parent link is a weak back
//! reference used only for unlink, so ownership never cycles. Everything in
//! a node except its identity is guarded by the node's read/write lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::vfs::path::{components, split_parent};
use crate::vfs::{
    unix_timestamp, Error, FileHandle, FileMode, LsCallback, OpenFlags, ReadOutcome, Result, Stat,
    Vfs, Whence,
};

/// Cursor value meaning "always append to end".
pub(crate) const APPEND_CURSOR: u64 = u64::MAX;

pub(crate) enum NodeKind {
    /// Directory payload: the children, unordered.
    Dir(Vec<Arc<MemNode>>),
    /// Regular-file payload: the content bytes.
    Reg(Vec<u8>),
}

pub(crate) struct NodeBody {
    pub(crate) stat: Stat,
    pub(crate) kind: NodeKind,
}

/// A node of the in-memory tree.
pub(crate) struct MemNode {
    /// Basename of this node. Empty for the root.
    name: String,
    /// Back reference for unlink-from-parent; never contributes ownership.
    parent: Weak<MemNode>,
    /// Everything mutable, guarded as one unit.
    pub(crate) body: RwLock<NodeBody>,
}

impl MemNode {
    fn new(name: &str, parent: Weak<MemNode>, mode: FileMode, kind: NodeKind) -> Arc<MemNode> {
        Arc::new(MemNode {
            name: name.to_string(),
            parent,
            body: RwLock::new(NodeBody {
                stat: Stat { mode, size: 0, mtime: unix_timestamp() },
                kind,
            }),
        })
    }

    fn new_dir(name: &str, parent: Weak<MemNode>) -> Arc<MemNode> {
        Self::new(name, parent, FileMode::DIR, NodeKind::Dir(Vec::new()))
    }

    fn new_reg(name: &str, parent: Weak<MemNode>) -> Arc<MemNode> {
        Self::new(name, parent, FileMode::REG, NodeKind::Reg(Vec::new()))
    }

    fn is_dir(&self) -> bool {
        self.body.read().unwrap().stat.is_dir()
    }

    /// Looks `name` up among the children, taking a reference on the hit.
    pub(crate) fn find_child(&self, name: &str) -> Option<Arc<MemNode>> {
        let body = self.body.read().unwrap();
        match &body.kind {
            NodeKind::Dir(children) => {
                children.iter().find(|child| child.name == name).cloned()
            }
            NodeKind::Reg(_) => None,
        }
    }

    /// Removes this node from its parent's children, shifting the trailing
    /// elements left by one. A no-op if the node is already detached.
    fn unlink_from_parent(self: &Arc<Self>) {
        let Some(parent) = self.parent.upgrade() else {
            return;
        };

        let mut body = parent.body.write().unwrap();
        if let NodeKind::Dir(children) = &mut body.kind {
            if let Some(pos) = children.iter().position(|child| Arc::ptr_eq(child, self)) {
                children.remove(pos);
            }
        }
    }
}

/// Per-open session state.
pub(crate) struct MemSession {
    flags: OpenFlags,
    /// File position. [`APPEND_CURSOR`] means always append to end.
    /// The mutex serializes cursor movement between threads sharing the
    /// handle.
    pub(crate) cursor: Mutex<u64>,
    /// The node, with a reference of the session's own.
    pub(crate) node: Arc<MemNode>,
}

/// The I/O layer of the in-memory filesystem.
///
/// `read`/`write` acquire the session cursor mutex and the node lock
/// themselves, in that order. The default layer moves bytes through the
/// node payload; derived backends substitute both callbacks while reusing
/// every other concern.
pub(crate) trait MemIo: Send + Sync {
    fn read(&self, session: &MemSession, buf: &mut [u8]) -> Result<ReadOutcome>;
    fn write(&self, session: &MemSession, buf: &[u8]) -> Result<usize>;
}

/// Default I/O layer: bytes live in the node payload.
struct PayloadIo;

impl MemIo for PayloadIo {
    fn read(&self, session: &MemSession, buf: &mut [u8]) -> Result<ReadOutcome> {
        let mut cursor = session.cursor.lock().unwrap();
        let body = session.node.body.read().unwrap();
        let NodeKind::Reg(data) = &body.kind else {
            return Err(Error::BadHandle);
        };

        if *cursor >= data.len() as u64 {
            return Ok(ReadOutcome::Eof);
        }

        let pos = *cursor as usize;
        let n = buf.len().min(data.len() - pos);
        buf[..n].copy_from_slice(&data[pos..pos + n]);
        *cursor += n as u64;

        Ok(ReadOutcome::Data(n))
    }

    fn write(&self, session: &MemSession, buf: &[u8]) -> Result<usize> {
        let mut cursor = session.cursor.lock().unwrap();
        let mut body = session.node.body.write().unwrap();
        let NodeBody { stat, kind } = &mut *body;
        let NodeKind::Reg(data) = kind else {
            return Err(Error::BadHandle);
        };

        if *cursor == APPEND_CURSOR {
            data.extend_from_slice(buf);
        } else {
            let pos = *cursor as usize;
            if pos + buf.len() < data.len() {
                // Fits inside the current payload: overwrite in place.
                data[pos..pos + buf.len()].copy_from_slice(buf);
            } else {
                // Grow to cover the write; any gap past the old end is
                // zero-filled.
                data.resize(pos + buf.len(), 0);
                data[pos..pos + buf.len()].copy_from_slice(buf);
            }
            *cursor += buf.len() as u64;
        }

        stat.size = data.len() as u64;
        stat.mtime = unix_timestamp();
        Ok(buf.len())
    }
}

/// In-memory filesystem.
pub struct MemFs {
    sessions: Mutex<BTreeMap<FileHandle, Arc<MemSession>>>,
    handle_gen: AtomicU64,
    io: Box<dyn MemIo>,
    root: Arc<MemNode>,
}

/// Creates an in-memory filesystem backend.
pub fn make_memory() -> Box<dyn Vfs> {
    Box::new(MemFs::new())
}

impl MemFs {
    pub fn new() -> Self {
        Self::with_io(Box::new(PayloadIo))
    }

    pub(crate) fn with_io(io: Box<dyn MemIo>) -> Self {
        MemFs {
            sessions: Mutex::new(BTreeMap::new()),
            handle_gen: AtomicU64::new(1),
            io,
            root: MemNode::new_dir("", Weak::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> &Arc<MemNode> {
        &self.root
    }

    /// Walks `path` from the root, one reference per step; any missing
    /// component is [`Error::NoEntry`]. Returns a reference on the target.
    fn walk(&self, path: &str) -> Result<Arc<MemNode>> {
        let mut node = self.root.clone();
        for name in components(path) {
            node = node.find_child(name).ok_or(Error::NoEntry)?;
        }
        Ok(node)
    }

    fn find_session(&self, fh: FileHandle) -> Result<Arc<MemSession>> {
        self.sessions.lock().unwrap().get(&fh).cloned().ok_or(Error::BadHandle)
    }

    /// Looks the open target up in `parent`, creating it when `CREATE` is
    /// set, all under one parent write lock.
    fn open_target(
        &self,
        parent: &Arc<MemNode>,
        name: &str,
        flags: OpenFlags,
    ) -> Result<Arc<MemNode>> {
        let mut body = parent.body.write().unwrap();
        match &mut body.kind {
            NodeKind::Dir(children) => {
                if let Some(child) = children.iter().find(|child| child.name == name) {
                    return Ok(child.clone());
                }
                if !flags.contains(OpenFlags::CREATE) {
                    return Err(Error::NoEntry);
                }
                let node = MemNode::new_reg(name, Arc::downgrade(parent));
                children.push(node.clone());
                Ok(node)
            }
            NodeKind::Reg(_) => Err(Error::NotDir),
        }
    }

    /// Shared removal path for rmdir/unlink.
    fn remove_entry(&self, path: &str, want_dir: bool) -> Result<()> {
        if path == "/" {
            return Err(Error::NoEntry);
        }
        let (parent_path, name) = split_parent(path).ok_or(Error::NoEntry)?;
        let parent = self.walk(parent_path)?;
        let child = parent.find_child(name).ok_or(Error::NoEntry)?;

        {
            let body = child.body.read().unwrap();
            match (&body.kind, want_dir) {
                (NodeKind::Reg(_), true) => return Err(Error::NotDir),
                (NodeKind::Dir(_), false) => return Err(Error::IsDir),
                (NodeKind::Dir(children), true) => {
                    if !children.is_empty() {
                        return Err(Error::NotEmpty);
                    }
                }
                (NodeKind::Reg(_), false) => {}
            }
        }

        // Drops the parent-owns-child reference; the walk reference above
        // goes when `child` leaves scope.
        child.unlink_from_parent();
        Ok(())
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for MemFs {
    fn ls(&self, path: &str, cb: &mut LsCallback) -> Result<()> {
        let node = self.walk(path)?;

        // Snapshot under the read lock so the callback may re-enter the
        // filesystem.
        let entries: Vec<(String, Stat)> = {
            let body = node.body.read().unwrap();
            match &body.kind {
                NodeKind::Dir(children) => children
                    .iter()
                    .map(|child| (child.name.clone(), child.body.read().unwrap().stat))
                    .collect(),
                NodeKind::Reg(_) => return Err(Error::NotDir),
            }
        };

        for (name, stat) in &entries {
            if cb(name, stat).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<Stat> {
        let node = self.walk(path)?;
        let stat = node.body.read().unwrap().stat;
        Ok(stat)
    }

    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        let Some((parent_path, name)) = split_parent(path) else {
            return Err(Error::IsDir);
        };
        let parent = self.walk(parent_path)?;
        let node = self.open_target(&parent, name, flags)?;

        if node.is_dir() {
            return Err(Error::IsDir);
        }

        if flags.contains(OpenFlags::TRUNCATE) {
            let mut body = node.body.write().unwrap();
            if let NodeKind::Reg(data) = &mut body.kind {
                data.clear();
            }
            body.stat.size = 0;
            body.stat.mtime = unix_timestamp();
        }

        let cursor = if flags.contains(OpenFlags::APPEND) { APPEND_CURSOR } else { 0 };
        let fake = FileHandle(self.handle_gen.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(MemSession { flags, cursor: Mutex::new(cursor), node });

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

        match whence {
            Whence::Set => {
                if offset < 0 {
                    return Err(Error::InvalidArgument);
                }
                let mut cursor = session.cursor.lock().unwrap();
                *cursor = offset as u64;
                Ok(*cursor)
            }
            Whence::Current => {
                let mut cursor = session.cursor.lock().unwrap();
                if *cursor == APPEND_CURSOR {
                    // Sticky append has no fixed position: resolve against
                    // the end of file.
                    return seek_from_end(&session, &mut cursor, offset);
                }
                let target =
                    cursor.checked_add_signed(offset).ok_or(Error::InvalidArgument)?;
                *cursor = target;
                Ok(*cursor)
            }
            Whence::End => {
                let mut cursor = session.cursor.lock().unwrap();
                if offset == 0 {
                    // Enter sticky-append mode and report the current size.
                    let size = session.node.body.read().unwrap().stat.size;
                    *cursor = APPEND_CURSOR;
                    return Ok(size);
                }
                seek_from_end(&session, &mut cursor, offset)
            }
        }
    }

    fn read(&self, fh: FileHandle, buf: &mut [u8]) -> Result<ReadOutcome> {
        let session = self.find_session(fh)?;
        if !session.flags.contains(OpenFlags::RDONLY) {
            return Err(Error::BadHandle);
        }
        self.io.read(&session, buf)
    }

    fn write(&self, fh: FileHandle, buf: &[u8]) -> Result<usize> {
        let session = self.find_session(fh)?;
        if !session.flags.contains(OpenFlags::WRONLY) {
            return Err(Error::BadHandle);
        }
        self.io.write(&session, buf)
    }

    fn truncate(&self, fh: FileHandle, size: u64) -> Result<()> {
        let session = self.find_session(fh)?;

        let mut body = session.node.body.write().unwrap();
        let NodeBody { stat, kind } = &mut *body;
        let NodeKind::Reg(data) = kind else {
            return Err(Error::BadHandle);
        };

        data.resize(size as usize, 0);
        stat.size = size;
        stat.mtime = unix_timestamp();
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let Some((parent_path, name)) = split_parent(path) else {
            return Err(Error::Already);
        };
        let parent = self.walk(parent_path)?;

        let mut body = parent.body.write().unwrap();
        match &mut body.kind {
            NodeKind::Dir(children) => {
                if children.iter().any(|child| child.name == name) {
                    return Err(Error::Already);
                }
                children.push(MemNode::new_dir(name, Arc::downgrade(&parent)));
                Ok(())
            }
            NodeKind::Reg(_) => Err(Error::NotDir),
        }
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.remove_entry(path, true)
    }

    fn unlink(&self, path: &str) -> Result<()> {
        self.remove_entry(path, false)
    }
}

/// Positions the cursor relative to the end of file. Lock order is session
/// cursor, then node.
fn seek_from_end(
    session: &MemSession,
    cursor: &mut u64,
    offset: i64,
) -> Result<u64> {
    let size = session.node.body.read().unwrap().stat.size;
    let target = size.checked_add_signed(offset).ok_or(Error::InvalidArgument)?;
    *cursor = target;
    Ok(target)
}
