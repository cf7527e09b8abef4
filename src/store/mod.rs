//! Backing stores for servers that ignore range requests.
//!
//! When a server always answers with the full body, [`HttpReaderAt`](crate::HttpReaderAt)
//! downloads the resource once into a [`Store`] and serves every read from it.
//!
//! - [`MemoryStore`]: a growable in-memory buffer
//! - [`FileStore`]: an anonymous temporary file
//! - [`LimitedStore`]: caps a primary store and either fails or spills into a
//!   secondary store once the cap is crossed

mod file;
mod limited;
mod memory;

pub use file::FileStore;
pub use limited::{LimitedStore, OverflowPolicy};
pub use memory::MemoryStore;

use std::io::{ErrorKind, Read};

use crate::error::{Error, Result};

/// Bytes a [`default_store`] keeps in memory before spilling to disk.
pub const DEFAULT_MEMORY_LIMIT: u64 = 1024 * 1024;

const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Append-only byte container that supports random access reads.
///
/// Everything is written first, then read. Once [`release`](Store::release)d,
/// a store rejects all operations with [`Error::StoreReleased`].
pub trait Store: Send + Sync {
    /// Append `data` to the end of the store.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read from `offset` into `buf`.
    ///
    /// Fills `buf` unless the stored data ends first, in which case the
    /// count of bytes copied is returned. Offsets past the end yield `Ok(0)`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Number of bytes written so far.
    fn size(&self) -> u64;

    /// Free the underlying resources.
    fn release(&mut self) -> Result<()>;

    /// Drain `reader` into the store, returning the number of bytes copied.
    fn read_from(&mut self, reader: &mut dyn Read) -> Result<u64> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            self.write(&buf[..n])?;
            total += n as u64;
        }
    }
}

/// A store that keeps up to [`DEFAULT_MEMORY_LIMIT`] bytes in memory and
/// moves everything into a temporary file past that.
pub fn default_store() -> Box<dyn Store> {
    Box::new(LimitedStore::new(
        Box::new(MemoryStore::new()),
        DEFAULT_MEMORY_LIMIT,
        OverflowPolicy::Spill(Box::new(FileStore::new())),
    ))
}

/// Copy the full contents of `from` to the end of `to`.
fn copy_store(from: &dyn Store, to: &mut dyn Store) -> Result<u64> {
    let size = from.size();
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut offset = 0u64;

    while offset < size {
        let n = from.read_at(offset, &mut buf)?;
        if n == 0 {
            break;
        }
        to.write(&buf[..n])?;
        offset += n as u64;
    }

    Ok(offset)
}
