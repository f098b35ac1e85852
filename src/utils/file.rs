//! Whole-file convenience helpers over any backend.

use crate::utils::dir::ensure_dir_exist;
use crate::vfs::path::split_parent;
use crate::vfs::{Error, FileHandle, OpenFlags, ReadOutcome, Result, Vfs};

/// Opens `path` like [`Vfs::open`], except that with `CREATE` the parent
/// directory chain is created as well.
pub fn open(fs: &dyn Vfs, path: &str, flags: OpenFlags) -> Result<FileHandle> {
    if flags.contains(OpenFlags::CREATE) {
        let (parent, _) = split_parent(path).ok_or(Error::InvalidArgument)?;
        ensure_dir_exist(fs, parent)?;
    }
    fs.open(path, flags)
}

/// Opens `path`, writes the whole of `data`, and closes the handle.
pub fn write(fs: &dyn Vfs, path: &str, flags: OpenFlags, data: &[u8]) -> Result<usize> {
    let fh = open(fs, path, flags)?;
    let result = write_all(fs, fh, data);
    let _ = fs.close(fh);
    result
}

/// Reads the whole file at `path`.
pub fn read(fs: &dyn Vfs, path: &str) -> Result<Vec<u8>> {
    let fh = fs.open(path, OpenFlags::RDONLY)?;
    let result = read_to_end(fs, fh);
    let _ = fs.close(fh);
    result
}

fn write_all(fs: &dyn Vfs, fh: FileHandle, mut data: &[u8]) -> Result<usize> {
    let total = data.len();
    while !data.is_empty() {
        let n = fs.write(fh, data)?;
        if n == 0 {
            return Err(Error::Io);
        }
        data = &data[n.min(data.len())..];
    }
    Ok(total)
}

fn read_to_end(fs: &dyn Vfs, fh: FileHandle) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match fs.read(fh, &mut buf)? {
            ReadOutcome::Data(n) => out.extend_from_slice(&buf[..n]),
            ReadOutcome::Eof => return Ok(out),
        }
    }
}
