//! Null filesystem backend.
//!
//! A memory filesystem with the I/O layer swapped out: reads hand back
//! zeroes and never report end of file, writes are discarded whole. The
//! tree, session, and locking concerns are the memory backend's, reused
//! unchanged.

use super::memfs::{MemFs, MemIo, MemSession};
use crate::vfs::{ReadOutcome, Result, Vfs};

struct NullIo;

impl MemIo for NullIo {
    fn read(&self, _session: &MemSession, buf: &mut [u8]) -> Result<ReadOutcome> {
        // Behaves like /dev/zero: the stream never ends and the cursor
        // never moves.
        buf.fill(0);
        Ok(ReadOutcome::Data(buf.len()))
    }

    fn write(&self, _session: &MemSession, buf: &[u8]) -> Result<usize> {
        Ok(buf.len())
    }
}

/// Creates a null filesystem backend.
pub fn make_null() -> Box<dyn Vfs> {
    Box::new(MemFs::with_io(Box::new(NullIo)))
}
