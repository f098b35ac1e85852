//! Multi-threaded scenarios: shared handles, independent mounts, and
//! unmount racing in-flight operations.

mod common;

use std::sync::Arc;
use std::thread;

use common::put_file;
use vfs_mamont::fs::MemFs;
use vfs_mamont::{make_memory, Error, OpenFlags, ReadOutcome, Vfs, VfsContext, Whence};

#[test]
fn test_parallel_writers_on_distinct_mounts() {
    let ctx = VfsContext::new();
    for i in 0..4 {
        ctx.mount(&format!("/m{i}"), make_memory()).unwrap();
    }
    let visitor = ctx.visitor();

    let mut workers = Vec::new();
    for i in 0..4 {
        let visitor = visitor.clone();
        workers.push(thread::spawn(move || {
            let path = format!("/m{i}/data");
            let fh = visitor.open(&path, OpenFlags::RDWR | OpenFlags::CREATE).unwrap();
            for round in 0..64u8 {
                assert_eq!(visitor.write(fh, &[round; 32]).unwrap(), 32);
            }
            assert_eq!(visitor.seek(fh, 0, Whence::Set), Ok(0));
            let mut buf = [0u8; 32];
            assert_eq!(visitor.read(fh, &mut buf), Ok(ReadOutcome::Data(32)));
            assert_eq!(buf, [0u8; 32]);
            visitor.close(fh).unwrap();
            assert_eq!(visitor.stat(&path).unwrap().size, 64 * 32);
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_shared_handle_cursor_is_consistent() {
    let ctx = VfsContext::new();
    ctx.mount("/", make_memory()).unwrap();
    let visitor = ctx.visitor();

    put_file(&*visitor, "/f", &[1u8; 8192]);
    let fh = visitor.open("/f", OpenFlags::RDONLY).unwrap();

    let mut workers = Vec::new();
    for _ in 0..4 {
        let visitor = visitor.clone();
        workers.push(thread::spawn(move || {
            let mut total = 0usize;
            let mut buf = [0u8; 128];
            loop {
                match visitor.read(fh, &mut buf).unwrap() {
                    ReadOutcome::Data(n) => total += n,
                    ReadOutcome::Eof => break,
                }
            }
            total
        }));
    }

    // Cursor movement is serialized: the threads' ranges tile the file.
    let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(total, 8192);
    visitor.close(fh).unwrap();
}

#[test]
fn test_unmount_races_in_flight_readers() {
    let ctx = Arc::new(VfsContext::new());
    let fs = Arc::new(MemFs::new());
    ctx.mount("/m", Box::new(fs.clone())).unwrap();
    let visitor = ctx.visitor();

    put_file(&*visitor, "/m/f", &[9u8; 4096]);

    let mut readers = Vec::new();
    for _ in 0..4 {
        let visitor = visitor.clone();
        readers.push(thread::spawn(move || {
            // Each open either resolves before the unmount or reports the
            // path as gone; an acquired handle always works to completion.
            match visitor.open("/m/f", OpenFlags::RDONLY) {
                Ok(fh) => {
                    let mut buf = [0u8; 512];
                    let mut total = 0usize;
                    loop {
                        match visitor.read(fh, &mut buf).unwrap() {
                            ReadOutcome::Data(n) => total += n,
                            ReadOutcome::Eof => break,
                        }
                    }
                    assert_eq!(total, 4096);
                    visitor.close(fh).unwrap();
                }
                Err(err) => assert_eq!(err, Error::NoEntry),
            }
        }));
    }

    ctx.unmount("/m").unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(visitor.stat("/m/f"), Err(Error::NoEntry));
    // The backend survived for the in-flight readers and is still usable
    // through the direct reference.
    assert_eq!(fs.stat("/f").unwrap().size, 4096);
}

#[test]
fn test_concurrent_tree_mutation_on_one_backend() {
    let ctx = VfsContext::new();
    ctx.mount("/", make_memory()).unwrap();
    let visitor = ctx.visitor();

    let mut workers = Vec::new();
    for i in 0..4 {
        let visitor = visitor.clone();
        workers.push(thread::spawn(move || {
            let dir = format!("/w{i}");
            visitor.mkdir(&dir).unwrap();
            for j in 0..16 {
                let path = format!("{dir}/f{j}");
                let fh = visitor.open(&path, OpenFlags::WRONLY | OpenFlags::CREATE).unwrap();
                assert_eq!(visitor.write(fh, b"x").unwrap(), 1);
                visitor.close(fh).unwrap();
            }
            for j in 0..16 {
                visitor.unlink(&format!("{dir}/f{j}")).unwrap();
            }
            visitor.rmdir(&dir).unwrap();
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    let mut count = 0;
    visitor
        .ls("/", &mut |_, _| {
            count += 1;
            std::ops::ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(count, 0);
}
