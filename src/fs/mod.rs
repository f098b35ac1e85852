//! The filesystem backends shipped with the library.

pub mod localfs;
pub mod memfs;
pub mod nullfs;
pub mod overlayfs;
pub mod randfs;

#[cfg(test)]
mod tests;

pub use localfs::{make_local, LocalFs};
pub use memfs::{make_memory, MemFs};
pub use nullfs::make_null;
pub use overlayfs::{make_overlay, OverlayFs};
pub use randfs::{make_random, RandFs};
