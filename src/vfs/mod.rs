//! Defines the virtual file system operation surface --- [`Vfs`] --- and the
//! types shared by every backend.

pub mod errno;
pub mod path;


use std::ops::ControlFlow;

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};

/// Result of [`Vfs`] operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum length of file paths passed into [`Vfs`] methods.
pub const MAX_PATH_LEN: usize = 1024;

/// Maximum length of a single name component.
pub const MAX_NAME_LEN: usize = 255;

/// End-of-file sentinel used by the numeric encoding of read results.
///
/// Kept outside both the error space (negated POSIX codes) and the valid
/// byte-count space. Rust callers see [`ReadOutcome::Eof`] instead.
pub const EOF: i32 = -4096;

/// [`Vfs`] errors.
///
/// The numeric value of each variant is the host's negated POSIX code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error, FromPrimitive, ToPrimitive)]
#[repr(i32)]
pub enum Error {
    /// No such file or directory. The file or directory name
    /// specified does not exist.
    #[error("no such file or directory")]
    NoEntry = -libc::ENOENT,
    /// File exists. The file specified already exists.
    #[error("file exists")]
    Exist = -libc::EEXIST,
    /// Operation already done, or the record is already present.
    #[error("already in progress")]
    Already = -libc::EALREADY,
    /// I/O error. A hard error occurred while processing the
    /// requested operation.
    #[error("input/output error")]
    Io = -libc::EIO,
    /// Invalid file handle. The handle given in the arguments does
    /// not refer to an open session.
    #[error("bad file handle")]
    BadHandle = -libc::EBADF,
    /// Out of memory.
    #[error("out of memory")]
    NoMemory = -libc::ENOMEM,
    /// Permission denied.
    #[error("permission denied")]
    Access = -libc::EACCES,
    /// Not a directory. The caller specified a non-directory in
    /// a directory operation.
    #[error("not a directory")]
    NotDir = -libc::ENOTDIR,
    /// Is a directory. The caller specified a directory in a
    /// non-directory operation.
    #[error("is a directory")]
    IsDir = -libc::EISDIR,
    /// Invalid argument or unsupported argument for an operation.
    #[error("invalid argument")]
    InvalidArgument = -libc::EINVAL,
    /// Illegal seek. The handle is not seekable.
    #[error("illegal seek")]
    IllegalSeek = -libc::ESPIPE,
    /// The backend does not implement the operation.
    #[error("operation not supported")]
    NotSupported = -libc::ENOSYS,
    /// An attempt was made to remove a directory that was not empty.
    #[error("directory not empty")]
    NotEmpty = -libc::ENOTEMPTY,
}

impl Error {
    /// Numeric encoding of this error (the host's negated POSIX code).
    pub fn code(self) -> i32 {
        self.to_i32().unwrap_or(-libc::EIO)
    }

    /// Decodes a numeric error produced by [`Error::code`].
    pub fn from_code(code: i32) -> Option<Error> {
        Error::from_i32(code)
    }
}

bitflags! {
    /// File open flags.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct OpenFlags: u64 {
        /// Read only.
        const RDONLY = 0x0001;
        /// Write only.
        const WRONLY = 0x0002;
        /// Read and write.
        const RDWR = Self::RDONLY.bits() | Self::WRONLY.bits();
        /// Append to file. Conflicts with `TRUNCATE`.
        const APPEND = 0x0004;
        /// Truncate file to zero. Conflicts with `APPEND`.
        const TRUNCATE = 0x0008;
        /// Create file if it does not exist.
        const CREATE = 0x0010;
    }
}

impl OpenFlags {
    /// Rejects conflicting flag combinations before any state mutation.
    pub fn validate(self) -> Result<()> {
        if self.contains(OpenFlags::APPEND | OpenFlags::TRUNCATE) {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}

bitflags! {
    /// File mode bits carried by [`Stat`]. `DIR` and `REG` are disjoint.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FileMode: u64 {
        /// Directory.
        const DIR = 0x4000;
        /// Regular file.
        const REG = 0x8000;
    }
}

/// File stat record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Stat {
    /// File mode. See [`FileMode`].
    pub mode: FileMode,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time in seconds since the Unix epoch.
    pub mtime: u64,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.mode.contains(FileMode::DIR)
    }

    pub fn is_reg(&self) -> bool {
        self.mode.contains(FileMode::REG)
    }
}

/// Whence values for [`Vfs::seek`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Whence {
    /// Start of file.
    Set,
    /// Current position.
    Current,
    /// End of file.
    End,
}

/// Outcome of a successful [`Vfs::read`].
///
/// `Data(0)` does not indicate end of file; only [`ReadOutcome::Eof`] does.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Number of bytes read.
    Data(usize),
    /// End of file.
    Eof,
}

impl ReadOutcome {
    pub fn is_eof(self) -> bool {
        matches!(self, ReadOutcome::Eof)
    }

    /// Numeric encoding: the byte count, or the [`EOF`] sentinel.
    pub fn code(self) -> i64 {
        match self {
            ReadOutcome::Data(n) => n as i64,
            ReadOutcome::Eof => EOF as i64,
        }
    }
}

/// Opaque token a client passes back into handle-addressed operations.
///
/// The value has no meaning outside the backend that produced it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(pub u64);

impl std::fmt::Display for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback invoked by [`Vfs::ls`] for each immediate child of a directory.
///
/// Return [`ControlFlow::Break`] to stop the listing, [`ControlFlow::Continue`]
/// to keep going.
pub type LsCallback<'a> = dyn FnMut(&str, &Stat) -> ControlFlow<()> + 'a;

/// The uniform operation surface every filesystem backend implements.
///
/// Every operation is optional: the default bodies report
/// [`Error::NotSupported`]. Destruction is `Drop`; by the time a backend is
/// dropped it is guaranteed no concurrent or subsequent calls will be made.
///
/// Paths are UTF-8, slash-separated, absolute within the backend, and never
/// end with a slash except for the root `/` itself.
pub trait Vfs: Send + Sync {
    /// Lists the immediate children of the directory at `path`.
    fn ls(&self, path: &str, cb: &mut LsCallback) -> Result<()> {
        let _ = (path, cb);
        Err(Error::NotSupported)
    }

    /// Returns the stat record for `path`.
    fn stat(&self, path: &str) -> Result<Stat> {
        let _ = path;
        Err(Error::NotSupported)
    }

    /// Opens the file at `path` and returns a handle for it.
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        let _ = (path, flags);
        Err(Error::NotSupported)
    }

    /// Closes a handle. Always succeeds on a valid handle.
    fn close(&self, fh: FileHandle) -> Result<()> {
        let _ = fh;
        Err(Error::NotSupported)
    }

    /// Repositions the cursor of `fh`, returning the resulting absolute
    /// offset measured from the beginning of the file.
    fn seek(&self, fh: FileHandle, offset: i64, whence: Whence) -> Result<u64> {
        let _ = (fh, offset, whence);
        Err(Error::NotSupported)
    }

    /// Reads up to `buf.len()` bytes at the cursor.
    fn read(&self, fh: FileHandle, buf: &mut [u8]) -> Result<ReadOutcome> {
        let _ = (fh, buf);
        Err(Error::NotSupported)
    }

    /// Writes `buf` at the cursor, returning the number of bytes written.
    fn write(&self, fh: FileHandle, buf: &[u8]) -> Result<usize> {
        let _ = (fh, buf);
        Err(Error::NotSupported)
    }

    /// Resizes the file behind `fh`; growth is zero-filled.
    fn truncate(&self, fh: FileHandle, size: u64) -> Result<()> {
        let _ = (fh, size);
        Err(Error::NotSupported)
    }

    /// Creates the directory at `path`. The parent must exist.
    fn mkdir(&self, path: &str) -> Result<()> {
        let _ = path;
        Err(Error::NotSupported)
    }

    /// Removes the empty directory at `path`.
    fn rmdir(&self, path: &str) -> Result<()> {
        let _ = path;
        Err(Error::NotSupported)
    }

    /// Removes the regular file at `path`.
    fn unlink(&self, path: &str) -> Result<()> {
        let _ = path;
        Err(Error::NotSupported)
    }
}

macro_rules! forward_vfs_impl {
    () => {
        fn ls(&self, path: &str, cb: &mut LsCallback) -> Result<()> {
            (**self).ls(path, cb)
        }
        fn stat(&self, path: &str) -> Result<Stat> {
            (**self).stat(path)
        }
        fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
            (**self).open(path, flags)
        }
        fn close(&self, fh: FileHandle) -> Result<()> {
            (**self).close(fh)
        }
        fn seek(&self, fh: FileHandle, offset: i64, whence: Whence) -> Result<u64> {
            (**self).seek(fh, offset, whence)
        }
        fn read(&self, fh: FileHandle, buf: &mut [u8]) -> Result<ReadOutcome> {
            (**self).read(fh, buf)
        }
        fn write(&self, fh: FileHandle, buf: &[u8]) -> Result<usize> {
            (**self).write(fh, buf)
        }
        fn truncate(&self, fh: FileHandle, size: u64) -> Result<()> {
            (**self).truncate(fh, size)
        }
        fn mkdir(&self, path: &str) -> Result<()> {
            (**self).mkdir(path)
        }
        fn rmdir(&self, path: &str) -> Result<()> {
            (**self).rmdir(path)
        }
        fn unlink(&self, path: &str) -> Result<()> {
            (**self).unlink(path)
        }
    };
}

/// Shared backends stay usable while also mounted: an `Arc<impl Vfs>` is
/// itself a backend that forwards every operation.
impl<T: Vfs + ?Sized> Vfs for std::sync::Arc<T> {
    forward_vfs_impl!();
}

impl<T: Vfs + ?Sized> Vfs for Box<T> {
    forward_vfs_impl!();
}

/// Seconds since the Unix epoch, zero for pre-epoch clocks.
pub(crate) fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}
