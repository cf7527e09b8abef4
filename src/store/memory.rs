use super::Store;
use crate::error::{Error, Result};

/// In-memory store backed by a growable buffer
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Vec<u8>,
    released: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<()> {
        if self.released {
            return Err(Error::StoreReleased);
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.check()?;
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.check()?;
        if offset >= self.data.len() as u64 {
            return Ok(0);
        }

        let tail = &self.data[offset as usize..];
        let n = tail.len().min(buf.len());
        buf[..n].copy_from_slice(&tail[..n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn release(&mut self) -> Result<()> {
        self.check()?;
        self.released = true;
        self.data = Vec::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_clamped_to_written_data() {
        let mut store = MemoryStore::new();
        store.write(b"0123").unwrap();
        store.write(b"456789").unwrap();
        assert_eq!(store.size(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(store.read_at(3, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"3456");

        assert_eq!(store.read_at(8, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");

        assert_eq!(store.read_at(10, &mut buf).unwrap(), 0);
        assert_eq!(store.read_at(u64::MAX, &mut buf).unwrap(), 0);
    }

    #[test]
    fn released_store_is_unusable() {
        let mut store = MemoryStore::new();
        store.write(b"data").unwrap();
        store.release().unwrap();

        assert_eq!(store.size(), 0);
        assert!(matches!(store.write(b"x"), Err(Error::StoreReleased)));
        assert!(matches!(
            store.read_at(0, &mut [0u8; 1]),
            Err(Error::StoreReleased)
        ));
        assert!(matches!(store.release(), Err(Error::StoreReleased)));
    }
}
