use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use super::Store;
use crate::error::{Error, Result};

/// Disk-backed store using an anonymous temporary file
///
/// The file is created on the first write and removed by the OS once it is
/// closed, either by [`release`](Store::release) or on drop.
#[derive(Debug, Default)]
pub struct FileStore {
    dir: Option<PathBuf>,
    file: Option<File>,
    size: u64,
    released: bool,
}

impl FileStore {
    /// Create a store whose file lives in the system temp directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose file lives in `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.released {
            return Err(Error::StoreReleased);
        }
        Ok(())
    }

    fn file(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            let file = match &self.dir {
                Some(dir) => tempfile::tempfile_in(dir)?,
                None => tempfile::tempfile()?,
            };
            tracing::debug!(dir = ?self.dir, "created temporary store file");
            self.file = Some(file);
        }
        self.file.as_mut().ok_or(Error::StoreReleased)
    }

    fn discard(&mut self) {
        self.released = true;
        self.size = 0;
        // Dropping the handle deletes the anonymous file.
        self.file = None;
    }
}

impl Store for FileStore {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.check()?;
        if data.is_empty() {
            return Ok(());
        }
        let written = self
            .file()
            .and_then(|file| file.write_all(data).map_err(Error::from));
        if let Err(err) = written {
            // bytes past `size` may be on disk already
            tracing::warn!(size = self.size, error = %err, "store file write failed, releasing");
            self.discard();
            return Err(err);
        }
        self.size += data.len() as u64;
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.check()?;
        let Some(file) = &self.file else {
            return Ok(0);
        };
        if offset >= self.size {
            return Ok(0);
        }

        let want = buf.len().min((self.size - offset) as usize);
        let mut filled = 0;
        while filled < want {
            match read_at_position(file, offset + filled as u64, &mut buf[filled..want]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn release(&mut self) -> Result<()> {
        self.check()?;
        self.discard();
        Ok(())
    }
}

fn read_at_position(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileExt;
        file.read_at(buf, offset)
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::FileExt;
        file.seek_read(buf, offset)
    }

    #[cfg(not(any(unix, windows)))]
    {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}
