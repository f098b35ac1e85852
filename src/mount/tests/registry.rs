#![cfg(test)]

use crate::fs::memfs::make_memory;
use crate::mount::MountRegistry;
use crate::vfs::{Error, Vfs};

#[test]
fn test_mount_strips_single_trailing_slash() {
    let registry = MountRegistry::new();
    registry.insert("/foo/", make_memory()).unwrap();

    // The record is keyed by the normalized prefix.
    assert_eq!(registry.insert("/foo", make_memory()).unwrap_err(), Error::Already);
    registry.remove("/foo").unwrap();
}

#[test]
fn test_scheme_prefix_keeps_trailing_slashes() {
    let registry = MountRegistry::new();
    registry.insert("file:///", make_memory()).unwrap();

    assert_eq!(registry.insert("file:///", make_memory()).unwrap_err(), Error::Already);
    let mount = registry.lookup("file:///foo").unwrap();
    assert_eq!(mount.prefix, "file:///");
}

#[test]
fn test_duplicate_prefix_is_already() {
    let registry = MountRegistry::new();
    registry.insert("/a", make_memory()).unwrap();
    assert_eq!(registry.insert("/a", make_memory()).unwrap_err(), Error::Already);
}

#[test]
fn test_empty_prefix_is_invalid() {
    let registry = MountRegistry::new();
    assert_eq!(registry.insert("", make_memory()).unwrap_err(), Error::InvalidArgument);
}

#[test]
fn test_unmount_missing_is_noent() {
    let registry = MountRegistry::new();
    assert_eq!(registry.remove("/nope"), Err(Error::NoEntry));
}

#[test]
fn test_lookup_picks_longest_prefix() {
    let registry = MountRegistry::new();
    registry.insert("/", make_memory()).unwrap();
    registry.insert("/a", make_memory()).unwrap();
    registry.insert("/a/b", make_memory()).unwrap();

    assert_eq!(registry.lookup("/a/b/c").unwrap().prefix, "/a/b");
    assert_eq!(registry.lookup("/a/b").unwrap().prefix, "/a/b");
    assert_eq!(registry.lookup("/a/x").unwrap().prefix, "/a");
    assert_eq!(registry.lookup("/other").unwrap().prefix, "/");
}

#[test]
fn test_lookup_skips_non_matching_siblings() {
    let registry = MountRegistry::new();
    registry.insert("/a", make_memory()).unwrap();
    registry.insert("/a/b", make_memory()).unwrap();
    registry.insert("/a/m", make_memory()).unwrap();

    // "/a/m" sorts between "/a/b" and "/a/zz" but is not a prefix of the
    // path; the scan must continue down to "/a".
    assert_eq!(registry.lookup("/a/zz").unwrap().prefix, "/a");
}

#[test]
fn test_lookup_without_match_is_none() {
    let registry = MountRegistry::new();
    registry.insert("/mnt", make_memory()).unwrap();
    assert!(registry.lookup("/elsewhere").is_none());
}

#[test]
fn test_residual_path() {
    let registry = MountRegistry::new();
    registry.insert("/a", make_memory()).unwrap();

    let mount = registry.lookup("/a").unwrap();
    assert_eq!(mount.residual("/a"), "/");
    assert_eq!(mount.residual("/a/b/c"), "/b/c");
}

#[test]
fn test_unmounted_backend_stays_alive_for_holders() {
    let registry = MountRegistry::new();
    registry.insert("/a", make_memory()).unwrap();

    let held = registry.lookup("/a/file").unwrap();
    registry.remove("/a").unwrap();

    // The record left the table but the held reference still works.
    assert!(registry.lookup("/a/file").is_none());
    assert_eq!(held.prefix, "/a");
    assert!(held.backend.stat("/").unwrap().is_dir());
}
