//! A guided tour of the library: mounts a handful of backends into one
//! context and walks the operation surface, printing what it finds.
//!
//! ```sh
//! cargo run --example vfs-shell -- --local-root /tmp
//! ```

use std::ops::ControlFlow;
use std::path::PathBuf;

use clap::Parser;

use vfs_mamont::fs::MemFs;
use vfs_mamont::utils::file;
use vfs_mamont::{
    make_local, make_memory, make_null, make_overlay, make_random, OpenFlags, ReadOutcome, Vfs,
    VfsContext, Whence,
};

#[derive(Parser)]
#[command(about = "Tour the VFS backends through one visitor")]
struct Args {
    /// Host directory to expose read-write at /host.
    #[arg(long)]
    local_root: Option<PathBuf>,

    /// Bytes of randomness to sample from /dev/random.
    #[arg(long, default_value_t = 16)]
    random_bytes: usize,
}

fn list(visitor: &dyn Vfs, path: &str) {
    print!("ls {path}:");
    let result = visitor.ls(path, &mut |name, stat| {
        let kind = if stat.is_dir() { "d" } else { "f" };
        print!(" {name}({kind},{})", stat.size);
        ControlFlow::Continue(())
    });
    match result {
        Ok(()) => println!(),
        Err(err) => println!(" error: {err}"),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let ctx = VfsContext::new();

    // A writable scratch tree at the root.
    ctx.mount("/", make_memory()).unwrap();

    // A lower layer with seed content, unioned under /union.
    let lower = MemFs::new();
    file::write(
        &lower,
        "/seed/greeting",
        OpenFlags::WRONLY | OpenFlags::CREATE,
        b"hello from the lower layer\n",
    )
    .unwrap();
    ctx.mount("/union", make_overlay(Box::new(lower), make_memory())).unwrap();

    ctx.mount("/dev", make_random()).unwrap();
    ctx.mount("/null", make_null()).unwrap();

    if let Some(root) = &args.local_root {
        match make_local(root) {
            Ok(backend) => ctx.mount("/host", backend).unwrap(),
            Err(err) => eprintln!("skipping /host mount: {err}"),
        }
    }

    let visitor = ctx.visitor();

    // Scratch tree.
    visitor.mkdir("/notes").unwrap();
    let fh = visitor.open("/notes/today", OpenFlags::RDWR | OpenFlags::CREATE).unwrap();
    visitor.write(fh, b"line one\n").unwrap();
    visitor.seek(fh, 0, Whence::End).unwrap();
    visitor.write(fh, b"line two\n").unwrap();
    visitor.seek(fh, 0, Whence::Set).unwrap();
    let mut buf = [0u8; 64];
    if let Ok(ReadOutcome::Data(n)) = visitor.read(fh, &mut buf) {
        print!("/notes/today -> {}", String::from_utf8_lossy(&buf[..n]));
    }
    visitor.close(fh).unwrap();
    list(&*visitor, "/notes");

    // Union: copy-up on write, whiteout on delete.
    let fh = visitor.open("/union/seed/greeting", OpenFlags::WRONLY).unwrap();
    visitor.write(fh, b"HELLO").unwrap();
    visitor.close(fh).unwrap();
    list(&*visitor, "/union/seed");
    visitor.unlink("/union/seed/greeting").unwrap();
    println!(
        "unlinked /union/seed/greeting; stat now: {:?}",
        visitor.stat("/union/seed/greeting")
    );

    // Randomness.
    let fh = visitor.open("/dev/random", OpenFlags::RDONLY).unwrap();
    let mut entropy = vec![0u8; args.random_bytes];
    visitor.read(fh, &mut entropy).unwrap();
    visitor.close(fh).unwrap();
    println!("{} random bytes: {entropy:02x?}", entropy.len());

    // The null sink.
    let fh = visitor.open("/null/sink", OpenFlags::RDWR | OpenFlags::CREATE).unwrap();
    let written = visitor.write(fh, b"discarded").unwrap();
    println!("/null/sink swallowed {written} bytes");
    visitor.close(fh).unwrap();

    if args.local_root.is_some() {
        list(&*visitor, "/host");
    }
}
