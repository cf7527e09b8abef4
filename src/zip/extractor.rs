use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::Read;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use anyhow::{Result, bail, ensure};

use super::parser::{read_directory, read_exact};
use super::structures::{
    CompressionMethod, LOCAL_HEADER_SIZE, ZipEntry, local_header_trailer_len,
};
use crate::io::ReadAt;

/// Upper bound on the output buffer reserved from a declared entry size.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// ZIP archive opened over any random access source
pub struct ZipArchive<R: ReadAt> {
    reader: R,
    entries: Vec<ZipEntry>,
    comment: String,
}

impl<R: ReadAt> ZipArchive<R> {
    /// Read the central directory of the archive behind `reader`.
    pub async fn open(reader: R) -> Result<Self> {
        let (entries, comment) = read_directory(&reader).await?;
        tracing::debug!(entries = entries.len(), "read central directory");
        Ok(Self {
            reader,
            entries,
            comment,
        })
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn by_name(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Decompress an entry into memory, verifying its CRC-32.
    pub async fn read(&self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let header = read_exact(&self.reader, entry.header_offset, LOCAL_HEADER_SIZE).await?;
        let data_offset =
            entry.header_offset + LOCAL_HEADER_SIZE as u64 + local_header_trailer_len(&header)?;
        let in_bounds = data_offset
            .checked_add(entry.compressed_size)
            .is_some_and(|end| end <= self.reader.size());
        ensure!(
            in_bounds,
            "{}: entry data runs past the end of the archive",
            entry.name
        );
        let raw = read_exact(&self.reader, data_offset, entry.compressed_size as usize).await?;

        let data = match entry.method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                let capacity = entry.uncompressed_size.min(MAX_PREALLOC) as usize;
                let mut out = Vec::with_capacity(capacity);
                // one byte over the declared size is enough to fail the length check
                DeflateDecoder::new(raw.as_slice())
                    .take(entry.uncompressed_size.saturating_add(1))
                    .read_to_end(&mut out)?;
                out
            }
            CompressionMethod::Unknown(method) => {
                bail!("{}: unsupported compression method {}", entry.name, method)
            }
        };

        ensure!(
            data.len() as u64 == entry.uncompressed_size,
            "{}: expected {} bytes, got {}",
            entry.name,
            entry.uncompressed_size,
            data.len()
        );
        let mut crc = Crc::new();
        crc.update(&data);
        ensure!(
            crc.sum() == entry.crc32,
            "{}: CRC-32 mismatch (expected 0x{:08x}, got 0x{:08x})",
            entry.name,
            entry.crc32,
            crc.sum()
        );

        Ok(data)
    }

    /// Write an entry's content to `out`.
    pub async fn copy_to<W: AsyncWrite + Unpin>(&self, entry: &ZipEntry, out: &mut W) -> Result<()> {
        let data = self.read(entry).await?;
        out.write_all(&data).await?;
        out.flush().await?;
        Ok(())
    }
}
