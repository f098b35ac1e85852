//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::ops::ControlFlow;

use vfs_mamont::{OpenFlags, ReadOutcome, Vfs};

/// Creates `path` with the given content, creating it if needed.
pub fn put_file(fs: &dyn Vfs, path: &str, data: &[u8]) {
    let fh = fs.open(path, OpenFlags::WRONLY | OpenFlags::CREATE).unwrap();
    assert_eq!(fs.write(fh, data).unwrap(), data.len());
    fs.close(fh).unwrap();
}

/// Reads the whole file at `path`.
pub fn read_all(fs: &dyn Vfs, path: &str) -> Vec<u8> {
    let fh = fs.open(path, OpenFlags::RDONLY).unwrap();
    let bytes = read_to_end(fs, fh);
    fs.close(fh).unwrap();
    bytes
}

/// Drains an open handle from its current cursor to end of file.
pub fn read_to_end(fs: &dyn Vfs, fh: vfs_mamont::FileHandle) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 48];
    loop {
        match fs.read(fh, &mut buf).unwrap() {
            ReadOutcome::Data(n) => out.extend_from_slice(&buf[..n]),
            ReadOutcome::Eof => break,
        }
    }
    out
}

/// Collects the names listed under `path`.
pub fn list_names(fs: &dyn Vfs, path: &str) -> Vec<String> {
    let mut names = Vec::new();
    fs.ls(path, &mut |name, _| {
        names.push(name.to_string());
        ControlFlow::Continue(())
    })
    .unwrap();
    names.sort();
    names
}
