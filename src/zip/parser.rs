//! Central directory reading.
//!
//! The archive is read from its tail: the end record names the central
//! directory, which is fetched with a single read. Only the tail and the
//! directory cross the wire when listing an archive.

use std::io::Cursor;

use anyhow::{Context, Result, bail, ensure};

use super::structures::{EndRecord, Zip64EndRecord, Zip64Locator, ZipEntry};
use crate::io::ReadAt;

/// Largest archive comment the format allows.
const MAX_COMMENT_LEN: u64 = u16::MAX as u64;

/// Read exactly `len` bytes at `offset`.
pub(crate) async fn read_exact<R: ReadAt + ?Sized>(
    reader: &R,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader
        .read_at(offset, &mut buf)
        .await
        .with_context(|| format!("reading {} bytes at offset {}", len, offset))?;
    Ok(buf)
}

/// Locate and decode the end of central directory record.
pub(crate) async fn find_end_record<R: ReadAt + ?Sized>(reader: &R) -> Result<(EndRecord, u64)> {
    let size = reader.size();
    ensure!(size >= EndRecord::SIZE as u64, "not a ZIP archive: too small");

    // Search the last 64 KiB + record for the signature, newest first.
    let window = (MAX_COMMENT_LEN + EndRecord::SIZE as u64).min(size);
    let start = size - window;
    let tail = read_exact(reader, start, window as usize).await?;

    for i in (0..=tail.len() - EndRecord::SIZE).rev() {
        if tail[i..i + 4] != EndRecord::SIGNATURE {
            continue;
        }
        let record = EndRecord::parse(&tail[i..])?;
        if i + EndRecord::SIZE + record.comment_len as usize == tail.len() {
            return Ok((record, start + i as u64));
        }
    }

    bail!("not a ZIP archive: end of central directory not found")
}

/// Read every entry of the central directory.
pub(crate) async fn read_directory<R: ReadAt + ?Sized>(reader: &R) -> Result<(Vec<ZipEntry>, String)> {
    let (mut record, record_offset) = find_end_record(reader).await?;

    let comment = if record.comment_len > 0 {
        let raw = read_exact(
            reader,
            record_offset + EndRecord::SIZE as u64,
            record.comment_len as usize,
        )
        .await?;
        String::from_utf8_lossy(&raw).into_owned()
    } else {
        String::new()
    };

    if record.needs_zip64() {
        ensure!(
            record_offset >= Zip64Locator::SIZE as u64,
            "ZIP64 locator missing"
        );
        let locator = read_exact(
            reader,
            record_offset - Zip64Locator::SIZE as u64,
            Zip64Locator::SIZE,
        )
        .await?;
        let zip64_offset = Zip64Locator::parse(&locator)?;
        let zip64 = read_exact(reader, zip64_offset, Zip64EndRecord::SIZE).await?;
        Zip64EndRecord::apply(&zip64, &mut record)?;
    }

    let directory_end = record
        .directory_offset
        .checked_add(record.directory_size)
        .context("central directory size overflows")?;
    ensure!(
        directory_end <= record_offset,
        "central directory overlaps its end record"
    );

    let directory = read_exact(
        reader,
        record.directory_offset,
        record.directory_size as usize,
    )
    .await?;

    let mut cursor = Cursor::new(directory.as_slice());
    let mut entries = Vec::with_capacity(record.entries.min(1 << 16) as usize);
    for index in 0..record.entries {
        let entry = ZipEntry::parse(&mut cursor)
            .with_context(|| format!("central directory entry {}", index))?;
        entries.push(entry);
    }

    Ok((entries, comment))
}
