//! Routing and lifecycle scenarios across several mounted backends.

mod common;

use std::sync::Arc;

use common::{list_names, put_file, read_all};
use vfs_mamont::fs::MemFs;
use vfs_mamont::utils::dir;
use vfs_mamont::{
    make_memory, make_null, make_random, Error, OpenFlags, ReadOutcome, Vfs, VfsContext, Whence,
};

#[test]
fn test_longest_prefix_wins() {
    let ctx = VfsContext::new();
    let fs1 = Arc::new(MemFs::new());
    let fs2 = Arc::new(MemFs::new());
    ctx.mount("/a", Box::new(fs1.clone())).unwrap();
    ctx.mount("/a/b", Box::new(fs2.clone())).unwrap();
    let visitor = ctx.visitor();

    visitor.mkdir("/a/b/c").unwrap();

    assert!(fs2.stat("/c").unwrap().is_dir());
    assert_eq!(fs1.stat("/b/c"), Err(Error::NoEntry));
}

#[test]
fn test_operations_on_distinct_mounts_are_independent() {
    let ctx = VfsContext::new();
    ctx.mount("/one", make_memory()).unwrap();
    ctx.mount("/two", make_memory()).unwrap();
    let visitor = ctx.visitor();

    put_file(&*visitor, "/one/f", b"first");
    put_file(&*visitor, "/two/f", b"second");

    assert_eq!(read_all(&*visitor, "/one/f"), b"first");
    assert_eq!(read_all(&*visitor, "/two/f"), b"second");

    visitor.unlink("/one/f").unwrap();
    assert_eq!(read_all(&*visitor, "/two/f"), b"second");
}

#[test]
fn test_random_backend_through_visitor() {
    let ctx = VfsContext::new();
    ctx.mount("/dev", make_random()).unwrap();
    let visitor = ctx.visitor();

    assert_eq!(list_names(&*visitor, "/dev"), vec!["random"]);

    let fh = visitor.open("/dev/random", OpenFlags::RDONLY).unwrap();
    let mut buf = [0u8; 64];
    assert_eq!(visitor.read(fh, &mut buf), Ok(ReadOutcome::Data(64)));
    assert_eq!(visitor.seek(fh, 0, Whence::Set).unwrap_err(), Error::IllegalSeek);
    assert_eq!(visitor.truncate(fh, 0).unwrap_err(), Error::InvalidArgument);
    visitor.close(fh).unwrap();
}

#[test]
fn test_null_backend_through_visitor() {
    let ctx = VfsContext::new();
    ctx.mount("/null", make_null()).unwrap();
    let visitor = ctx.visitor();

    let fh = visitor.open("/null/sink", OpenFlags::RDWR | OpenFlags::CREATE).unwrap();
    assert_eq!(visitor.write(fh, b"vanishes").unwrap(), 8);

    let mut buf = [0xaau8; 16];
    assert_eq!(visitor.read(fh, &mut buf), Ok(ReadOutcome::Data(16)));
    assert!(buf.iter().all(|b| *b == 0));
    visitor.close(fh).unwrap();
}

#[test]
fn test_recursive_remove_through_visitor() {
    let ctx = VfsContext::new();
    ctx.mount("/", make_memory()).unwrap();
    let visitor = ctx.visitor();

    dir::make_dirs(&*visitor, "/tree/a/b").unwrap();
    put_file(&*visitor, "/tree/top", b"1");
    put_file(&*visitor, "/tree/a/mid", b"2");
    put_file(&*visitor, "/tree/a/b/leaf", b"3");

    dir::remove_all(&*visitor, "/tree").unwrap();
    assert_eq!(visitor.stat("/tree"), Err(Error::NoEntry));
}

#[test]
fn test_scheme_style_mount_routes() {
    let ctx = VfsContext::new();
    ctx.mount("file:///", make_memory()).unwrap();
    let visitor = ctx.visitor();

    assert!(visitor.stat("file:///").unwrap().is_dir());
    visitor.mkdir("file:///data").unwrap();
    assert!(visitor.stat("file:///data").unwrap().is_dir());
}

#[test]
fn test_mounting_under_an_open_handle_does_not_move_it() {
    let ctx = VfsContext::new();
    ctx.mount("/", make_memory()).unwrap();
    let visitor = ctx.visitor();

    put_file(&*visitor, "/f", b"root fs");
    let fh = visitor.open("/f", OpenFlags::RDONLY).unwrap();

    // A more specific mount appears; the open handle still reads from the
    // backend that produced it.
    ctx.mount("/f", make_memory()).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(visitor.read(fh, &mut buf), Ok(ReadOutcome::Data(7)));
    assert_eq!(&buf[..7], b"root fs");
    visitor.close(fh).unwrap();
}
