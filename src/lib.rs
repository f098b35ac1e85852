//! VFS Mamont - a virtual file system library with pluggable backends.
//!
//! Backends implement the [`vfs::Vfs`] operation surface and are mounted at
//! absolute path prefixes in a [`mount::VfsContext`]; the context's
//! [`mount::Visitor`] routes each client path to the longest-matching mount
//! and multiplexes open handles across backends.

pub mod fs;
pub mod mount;
pub mod utils;
pub mod vfs;

pub use fs::{make_local, make_memory, make_null, make_overlay, make_random};
pub use mount::{init, mount, shutdown, unmount, visitor, VfsContext, Visitor};
pub use vfs::{
    Error, FileHandle, FileMode, OpenFlags, ReadOutcome, Result, Stat, Vfs, Whence,
};
