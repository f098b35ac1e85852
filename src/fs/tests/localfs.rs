#![cfg(test)]

use std::ops::ControlFlow;

use crate::fs::localfs::LocalFs;
use crate::vfs::{Error, OpenFlags, ReadOutcome, Vfs, Whence};

fn fixture() -> (tempfile::TempDir, LocalFs) {
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFs::new(dir.path()).unwrap();
    (dir, fs)
}

#[test]
fn test_root_must_be_an_existing_directory() {
    assert_eq!(LocalFs::new("/definitely/not/there").err(), Some(Error::NoEntry));

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain");
    std::fs::write(&file, b"x").unwrap();
    assert_eq!(LocalFs::new(&file).err(), Some(Error::NotDir));
}

#[test]
fn test_create_write_read_round() {
    let (_dir, fs) = fixture();

    let fh = fs.open("/f", OpenFlags::WRONLY | OpenFlags::CREATE).unwrap();
    assert_eq!(fs.write(fh, b"hello"), Ok(5));
    fs.close(fh).unwrap();

    let fh = fs.open("/f", OpenFlags::RDONLY).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(fs.read(fh, &mut buf), Ok(ReadOutcome::Data(5)));
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(fs.read(fh, &mut buf), Ok(ReadOutcome::Eof));
    fs.close(fh).unwrap();

    let stat = fs.stat("/f").unwrap();
    assert!(stat.is_reg());
    assert_eq!(stat.size, 5);
}

#[test]
fn test_stat_and_ls() {
    let (dir, fs) = fixture();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("file"), b"abc").unwrap();

    assert!(fs.stat("/").unwrap().is_dir());
    assert!(fs.stat("/sub").unwrap().is_dir());
    assert_eq!(fs.stat("/file").unwrap().size, 3);
    assert_eq!(fs.stat("/nope"), Err(Error::NoEntry));

    let mut names = Vec::new();
    fs.ls("/", &mut |name, _| {
        names.push(name.to_string());
        ControlFlow::Continue(())
    })
    .unwrap();
    names.sort();
    assert_eq!(names, vec!["file", "sub"]);
}

#[test]
fn test_seek_and_truncate() {
    let (_dir, fs) = fixture();

    let fh = fs.open("/f", OpenFlags::RDWR | OpenFlags::CREATE).unwrap();
    assert_eq!(fs.write(fh, b"0123456789"), Ok(10));

    assert_eq!(fs.seek(fh, 2, Whence::Set), Ok(2));
    assert_eq!(fs.seek(fh, 3, Whence::Current), Ok(5));
    assert_eq!(fs.seek(fh, -4, Whence::End), Ok(6));
    assert_eq!(fs.seek(fh, -1, Whence::Set).unwrap_err(), Error::InvalidArgument);

    fs.truncate(fh, 4).unwrap();
    assert_eq!(fs.stat("/f").unwrap().size, 4);

    fs.truncate(fh, 8).unwrap();
    assert_eq!(fs.stat("/f").unwrap().size, 8);
    assert_eq!(fs.seek(fh, 0, Whence::Set), Ok(0));
    let mut buf = [0u8; 8];
    assert_eq!(fs.read(fh, &mut buf), Ok(ReadOutcome::Data(8)));
    assert_eq!(&buf, b"0123\0\0\0\0");
    fs.close(fh).unwrap();
}

#[test]
fn test_append_positions_writes_at_end() {
    let (_dir, fs) = fixture();

    let fh = fs.open("/f", OpenFlags::WRONLY | OpenFlags::CREATE).unwrap();
    assert_eq!(fs.write(fh, b"abc"), Ok(3));
    fs.close(fh).unwrap();

    let fh = fs.open("/f", OpenFlags::WRONLY | OpenFlags::APPEND).unwrap();
    assert_eq!(fs.write(fh, b"def"), Ok(3));
    fs.close(fh).unwrap();

    assert_eq!(fs.stat("/f").unwrap().size, 6);
}

#[test]
fn test_open_errors() {
    let (dir, fs) = fixture();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    assert_eq!(fs.open("/missing", OpenFlags::RDONLY).unwrap_err(), Error::NoEntry);
    assert_eq!(fs.open("/sub", OpenFlags::RDONLY).unwrap_err(), Error::IsDir);
    assert_eq!(
        fs.open("/missing", OpenFlags::WRONLY | OpenFlags::APPEND).unwrap_err(),
        Error::NoEntry
    );
}

#[test]
fn test_mkdir_rmdir_unlink() {
    let (dir, fs) = fixture();

    fs.mkdir("/d").unwrap();
    assert!(dir.path().join("d").is_dir());
    assert_eq!(fs.mkdir("/d").unwrap_err(), Error::Exist);
    assert_eq!(fs.mkdir("/no/parent").unwrap_err(), Error::NoEntry);

    std::fs::write(dir.path().join("d/f"), b"x").unwrap();
    assert_eq!(fs.rmdir("/d").unwrap_err(), Error::NotEmpty);
    assert_eq!(fs.rmdir("/d/f").unwrap_err(), Error::NotDir);
    assert_eq!(fs.unlink("/d").unwrap_err(), Error::IsDir);

    fs.unlink("/d/f").unwrap();
    fs.rmdir("/d").unwrap();
    assert!(!dir.path().join("d").exists());
}
