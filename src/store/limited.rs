use super::{Store, copy_store};
use crate::error::{Error, Result};

/// What a [`LimitedStore`] does once the primary store would exceed its limit.
pub enum OverflowPolicy {
    /// Reject the write and release the primary store.
    Fail,
    /// Move everything written so far into this store and keep writing there.
    Spill(Box<dyn Store>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Primary,
    Secondary,
    Exceeded,
    Released,
}

/// Store that holds at most `limit` bytes in its primary store
pub struct LimitedStore {
    primary: Box<dyn Store>,
    secondary: Option<Box<dyn Store>>,
    limit: u64,
    state: State,
}

impl LimitedStore {
    pub fn new(primary: Box<dyn Store>, limit: u64, policy: OverflowPolicy) -> Self {
        let secondary = match policy {
            OverflowPolicy::Fail => None,
            OverflowPolicy::Spill(store) => Some(store),
        };

        Self {
            primary,
            secondary,
            limit,
            state: State::Primary,
        }
    }

    /// Whether writes have moved to the secondary store.
    pub fn spilled(&self) -> bool {
        self.state == State::Secondary
    }

    fn secondary(&self) -> Result<&dyn Store> {
        self.secondary.as_deref().ok_or(Error::StoreReleased)
    }

    fn overflow(&mut self, data: &[u8]) -> Result<()> {
        let Some(secondary) = self.secondary.as_mut() else {
            self.state = State::Exceeded;
            self.primary.release()?;
            return Err(Error::StoreLimitExceeded { limit: self.limit });
        };

        let moved = copy_store(&*self.primary, &mut **secondary)?;
        secondary.write(data)?;
        tracing::debug!(
            limit = self.limit,
            moved,
            "store limit reached, spilled to secondary store"
        );
        self.state = State::Secondary;
        self.primary.release()
    }

    /// Drop everything after a failed write; a partial copy is never readable.
    fn abandon(&mut self) {
        let previous = std::mem::replace(&mut self.state, State::Released);
        if previous == State::Primary {
            let _ = self.primary.release();
        }
        if let Some(mut secondary) = self.secondary.take() {
            let _ = secondary.release();
        }
        tracing::warn!(limit = self.limit, "store write failed, content released");
    }
}

impl Store for LimitedStore {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let result = match self.state {
            State::Released => return Err(Error::StoreReleased),
            State::Exceeded => return Err(Error::StoreLimitExceeded { limit: self.limit }),
            State::Secondary => match self.secondary.as_mut() {
                Some(secondary) => secondary.write(data),
                None => Err(Error::StoreReleased),
            },
            State::Primary => {
                if self.primary.size() + data.len() as u64 <= self.limit {
                    self.primary.write(data)
                } else {
                    self.overflow(data)
                }
            }
        };

        if result.is_err() && matches!(self.state, State::Primary | State::Secondary) {
            self.abandon();
        }
        result
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        match self.state {
            State::Primary => self.primary.read_at(offset, buf),
            State::Secondary => self.secondary()?.read_at(offset, buf),
            State::Exceeded => Err(Error::StoreLimitExceeded { limit: self.limit }),
            State::Released => Err(Error::StoreReleased),
        }
    }

    fn size(&self) -> u64 {
        match self.state {
            State::Primary => self.primary.size(),
            State::Secondary => self.secondary.as_ref().map_or(0, |s| s.size()),
            State::Exceeded | State::Released => 0,
        }
    }

    fn release(&mut self) -> Result<()> {
        let previous = std::mem::replace(&mut self.state, State::Released);
        match previous {
            State::Released => return Err(Error::StoreReleased),
            State::Primary => self.primary.release()?,
            State::Secondary | State::Exceeded => {}
        }
        if let Some(mut secondary) = self.secondary.take() {
            secondary.release()?;
        }
        Ok(())
    }
}
