mod buffered;
mod http;
mod probe;

pub use buffered::{BufReaderAt, DEFAULT_BUFFER_SIZE};
pub use http::HttpReaderAt;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Trait for random access reading from a data source
///
/// A read either fills `buf` completely and returns `Ok(buf.len())`, or stops
/// at the end of the source and returns [`Error::EndOfData`](crate::Error::EndOfData)
/// with the number of valid bytes placed at the start of `buf`.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

#[async_trait]
impl<R: ReadAt + ?Sized> ReadAt for Arc<R> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buf).await
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}
