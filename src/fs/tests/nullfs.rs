#![cfg(test)]

use crate::fs::nullfs::make_null;
use crate::vfs::{Error, OpenFlags, ReadOutcome};

#[test]
fn test_reads_return_zeroes_and_never_eof() {
    let fs = make_null();
    let fh = fs.open("/zero", OpenFlags::RDWR | OpenFlags::CREATE).unwrap();

    let mut buf = [0xffu8; 32];
    for _ in 0..3 {
        assert_eq!(fs.read(fh, &mut buf), Ok(ReadOutcome::Data(32)));
        assert!(buf.iter().all(|b| *b == 0));
        buf.fill(0xff);
    }
    fs.close(fh).unwrap();
}

#[test]
fn test_writes_are_discarded() {
    let fs = make_null();
    let fh = fs.open("/sink", OpenFlags::RDWR | OpenFlags::CREATE).unwrap();

    assert_eq!(fs.write(fh, b"thrown away"), Ok(11));
    // The payload never grew: reads still come from the zero stream and the
    // stat size is untouched.
    assert_eq!(fs.stat("/sink").unwrap().size, 0);
    fs.close(fh).unwrap();
}

#[test]
fn test_tree_concerns_are_inherited_from_memfs() {
    let fs = make_null();
    fs.mkdir("/d").unwrap();
    assert!(fs.stat("/d").unwrap().is_dir());
    assert_eq!(fs.mkdir("/d"), Err(Error::Already));

    assert_eq!(fs.open("/missing", OpenFlags::RDONLY).unwrap_err(), Error::NoEntry);

    let fh = fs.open("/d/f", OpenFlags::WRONLY | OpenFlags::CREATE).unwrap();
    fs.close(fh).unwrap();
    fs.unlink("/d/f").unwrap();
    fs.rmdir("/d").unwrap();
}
