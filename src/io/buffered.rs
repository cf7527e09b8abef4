use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ReadAt;
use crate::error::{Error, Result};

/// Default block size of a [`BufReaderAt`] (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Coalesces small reads into block-sized reads of the inner source
///
/// Archive parsers issue many tiny reads close to each other. Each one would
/// cost a full HTTP round trip, so this keeps the most recently fetched block
/// and answers reads that fall inside it. Reads at least one block long go
/// straight to the inner source.
pub struct BufReaderAt<R> {
    inner: R,
    capacity: usize,
    block: Mutex<Block>,
}

#[derive(Default)]
struct Block {
    offset: u64,
    data: Vec<u8>,
}

impl Block {
    fn covers(&self, start: u64, end: u64) -> bool {
        !self.data.is_empty() && start >= self.offset && end <= self.offset + self.data.len() as u64
    }
}

impl<R: ReadAt> BufReaderAt<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, inner)
    }

    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            block: Mutex::new(Block::default()),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R: ReadAt> ReadAt for BufReaderAt<R> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.len() >= self.capacity {
            return self.inner.read_at(offset, buf).await;
        }

        let size = self.inner.size();
        if offset >= size {
            return Err(Error::EndOfData { transferred: 0 });
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64).min(size);
        let mut block = self.block.lock().await;

        if !block.covers(offset, end) {
            let len = (self.capacity as u64).min(size - offset) as usize;
            let mut data = vec![0u8; len];
            // Drop the old block first so a failed refill leaves nothing stale.
            block.data.clear();

            let n = match self.inner.read_at(offset, &mut data).await {
                Ok(n) => n,
                Err(Error::EndOfData { transferred }) => transferred,
                Err(e) => return Err(e),
            };
            data.truncate(n);
            *block = Block { offset, data };

            if n == 0 {
                return Err(Error::EndOfData { transferred: 0 });
            }
        }

        let start = (offset - block.offset) as usize;
        let n = buf.len().min(block.data.len() - start);
        buf[..n].copy_from_slice(&block.data[start..start + n]);

        if n < buf.len() {
            return Err(Error::EndOfData { transferred: n });
        }
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }
}
