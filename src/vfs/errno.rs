//! Translation of host operating system errors into the [`Error`] taxonomy.

use crate::vfs::Error;

/// Maps a raw host errno value to a taxonomy error.
///
/// Panics on values without a mapping. This is intentional: every host error
/// the backends can produce must be enumerated here, and a missing entry is a
/// bug in this table, not a runtime condition to paper over.
pub fn from_raw_os_error(errcode: i32) -> Error {
    match errcode {
        libc::ENOENT => Error::NoEntry,
        libc::EEXIST => Error::Exist,
        libc::EALREADY => Error::Already,
        libc::EIO => Error::Io,
        libc::EBADF => Error::BadHandle,
        libc::ENOMEM => Error::NoMemory,
        libc::EACCES => Error::Access,
        libc::ENOTDIR => Error::NotDir,
        libc::EISDIR => Error::IsDir,
        libc::EINVAL => Error::InvalidArgument,
        libc::ESPIPE => Error::IllegalSeek,
        libc::ENOSYS => Error::NotSupported,
        libc::ENOTEMPTY => Error::NotEmpty,
        other => {
            tracing::error!(errno = other, "host error without a mapping");
            panic!("unmapped host errno {other}");
        }
    }
}

/// Maps an [`std::io::Error`] raised by the host bindings.
///
/// Errors synthesized by the standard library without an OS code are mapped
/// through their [`std::io::ErrorKind`].
pub fn from_io_error(err: &std::io::Error) -> Error {
    if let Some(code) = err.raw_os_error() {
        return from_raw_os_error(code);
    }

    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => Error::NoEntry,
        ErrorKind::AlreadyExists => Error::Exist,
        ErrorKind::PermissionDenied => Error::Access,
        ErrorKind::InvalidInput => Error::InvalidArgument,
        ErrorKind::OutOfMemory => Error::NoMemory,
        ErrorKind::Unsupported => Error::NotSupported,
        kind => {
            tracing::error!(?kind, "host io error without a mapping");
            panic!("unmapped host io error kind {kind:?}");
        }
    }
}
