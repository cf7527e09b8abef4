use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use anyhow::{Result, bail, ensure};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl From<u16> for CompressionMethod {
    fn from(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            other => CompressionMethod::Unknown(other),
        }
    }
}

/// End of central directory record, without the trailing comment
#[derive(Debug)]
pub struct EndRecord {
    pub entries: u64,
    pub directory_size: u64,
    pub directory_offset: u64,
    pub comment_len: u16,
}

impl EndRecord {
    pub const SIGNATURE: [u8; 4] = *b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() >= Self::SIZE && data[..4] == Self::SIGNATURE,
            "invalid end of central directory record"
        );

        let mut cursor = Cursor::new(&data[8..]);
        let _entries_on_disk = cursor.read_u16::<LittleEndian>()?;
        let entries = cursor.read_u16::<LittleEndian>()?;
        let directory_size = cursor.read_u32::<LittleEndian>()?;
        let directory_offset = cursor.read_u32::<LittleEndian>()?;
        let comment_len = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            entries: entries.into(),
            directory_size: directory_size.into(),
            directory_offset: directory_offset.into(),
            comment_len,
        })
    }

    /// Whether any field is saturated and the real value lives in the ZIP64 record.
    pub fn needs_zip64(&self) -> bool {
        self.entries == u16::MAX as u64
            || self.directory_size == u32::MAX as u64
            || self.directory_offset == u32::MAX as u64
    }
}

/// ZIP64 end of central directory locator
pub struct Zip64Locator;

impl Zip64Locator {
    pub const SIGNATURE: [u8; 4] = *b"PK\x06\x07";
    pub const SIZE: usize = 20;

    /// Offset of the ZIP64 end record.
    pub fn parse(data: &[u8]) -> Result<u64> {
        ensure!(
            data.len() >= Self::SIZE && data[..4] == Self::SIGNATURE,
            "invalid ZIP64 end of central directory locator"
        );
        Ok(Cursor::new(&data[8..]).read_u64::<LittleEndian>()?)
    }
}

/// ZIP64 end of central directory record
pub struct Zip64EndRecord;

impl Zip64EndRecord {
    pub const SIGNATURE: [u8; 4] = *b"PK\x06\x06";
    pub const SIZE: usize = 56;

    /// Fold the 64-bit fields into `record`.
    pub fn apply(data: &[u8], record: &mut EndRecord) -> Result<()> {
        ensure!(
            data.len() >= Self::SIZE && data[..4] == Self::SIGNATURE,
            "invalid ZIP64 end of central directory record"
        );

        let mut cursor = Cursor::new(&data[32..]);
        record.entries = cursor.read_u64::<LittleEndian>()?;
        record.directory_size = cursor.read_u64::<LittleEndian>()?;
        record.directory_offset = cursor.read_u64::<LittleEndian>()?;
        Ok(())
    }
}

pub const CENTRAL_HEADER_SIGNATURE: [u8; 4] = *b"PK\x01\x02";
pub const CENTRAL_HEADER_SIZE: usize = 46;

pub const LOCAL_HEADER_SIGNATURE: [u8; 4] = *b"PK\x03\x04";
pub const LOCAL_HEADER_SIZE: usize = 30;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const UNIX_HOST: u8 = 3;

/// One file or directory listed in the central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub comment: String,
    pub method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub header_offset: u64,
    pub dos_time: u16,
    pub dos_date: u16,
    host: u8,
    external_attrs: u32,
}

impl ZipEntry {
    /// Parse one central directory header, advancing `cursor` past it.
    pub fn parse(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let remaining = (cursor.get_ref().len() as u64).saturating_sub(cursor.position());
        ensure!(
            remaining >= CENTRAL_HEADER_SIZE as u64,
            "truncated central directory header ({} bytes left)",
            remaining
        );

        let mut signature = [0u8; 4];
        std::io::Read::read_exact(cursor, &mut signature)?;
        if signature != CENTRAL_HEADER_SIGNATURE {
            bail!("invalid central directory header");
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let _flags = cursor.read_u16::<LittleEndian>()?;
        let method = cursor.read_u16::<LittleEndian>()?;
        let dos_time = cursor.read_u16::<LittleEndian>()?;
        let dos_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = u64::from(cursor.read_u32::<LittleEndian>()?);
        let mut uncompressed_size = u64::from(cursor.read_u32::<LittleEndian>()?);
        let name_len = cursor.read_u16::<LittleEndian>()? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
        let comment_len = cursor.read_u16::<LittleEndian>()? as usize;
        let _disk_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut header_offset = u64::from(cursor.read_u32::<LittleEndian>()?);

        let name = take_string(cursor, name_len)?;
        let extra = take(cursor, extra_len)?;
        let comment = take_string(cursor, comment_len)?;

        // ZIP64 values appear only for saturated fields, in this order.
        let mut fields = Cursor::new(extra.as_slice());
        while fields.get_ref().len() as u64 - fields.position() >= 4 {
            let id = fields.read_u16::<LittleEndian>()?;
            let len = fields.read_u16::<LittleEndian>()? as usize;
            let body = take(&mut fields, len)?;
            if id != ZIP64_EXTRA_ID {
                continue;
            }

            let mut values = Cursor::new(body.as_slice());
            for field in [
                &mut uncompressed_size,
                &mut compressed_size,
                &mut header_offset,
            ] {
                if *field == u32::MAX as u64 {
                    *field = values.read_u64::<LittleEndian>()?;
                }
            }
        }

        Ok(Self {
            name,
            comment,
            method: method.into(),
            compressed_size,
            uncompressed_size,
            crc32,
            header_offset,
            dos_time,
            dos_date,
            host: (version_made_by >> 8) as u8,
            external_attrs,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Modification time as (year, month, day, hour, minute, second)
    pub fn modified(&self) -> (u16, u8, u8, u8, u8, u8) {
        let year = ((self.dos_date >> 9) & 0x7F) + 1980;
        let month = ((self.dos_date >> 5) & 0x0F) as u8;
        let day = (self.dos_date & 0x1F) as u8;
        let hour = ((self.dos_time >> 11) & 0x1F) as u8;
        let minute = ((self.dos_time >> 5) & 0x3F) as u8;
        let second = ((self.dos_time & 0x1F) * 2) as u8;
        (year, month, day, hour, minute, second)
    }

    /// Permission bits rendered like `ls -l`, e.g. `-rw-r--r--`.
    pub fn mode_string(&self) -> String {
        let (dir, perm) = if self.host == UNIX_HOST && self.external_attrs >> 16 != 0 {
            let mode = self.external_attrs >> 16;
            (mode & 0o170000 == 0o040000, mode & 0o777)
        } else {
            // MS-DOS attributes: 0x10 directory, 0x01 read-only
            let dir = self.external_attrs & 0x10 != 0 || self.is_dir();
            let base = if dir { 0o777 } else { 0o666 };
            let perm = if self.external_attrs & 0x01 != 0 { base & 0o555 } else { base };
            (dir, perm)
        };

        let mut out = String::with_capacity(10);
        out.push(if dir || self.is_dir() { 'd' } else { '-' });
        for shift in [6, 3, 0] {
            let bits = (perm >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

fn take(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    std::io::Read::read_exact(cursor, &mut buf)?;
    Ok(buf)
}

fn take_string(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<String> {
    Ok(String::from_utf8_lossy(&take(cursor, len)?).into_owned())
}

/// Length of the name and extra fields that follow a local file header.
pub fn local_header_trailer_len(header: &[u8]) -> Result<u64> {
    ensure!(
        header.len() >= LOCAL_HEADER_SIZE && header[..4] == LOCAL_HEADER_SIGNATURE,
        "invalid local file header"
    );
    let mut cursor = Cursor::new(&header[26..]);
    let name_len = cursor.read_u16::<LittleEndian>()?;
    let extra_len = cursor.read_u16::<LittleEndian>()?;
    Ok(u64::from(name_len) + u64::from(extra_len))
}
