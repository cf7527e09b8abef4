//! Error types for httpreaderat.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The server ignored the `Range` header and no fallback store was given.
    #[error("server does not support range requests and no fallback store is configured")]
    UnsupportedRange,

    #[error("unexpected response code: {0}")]
    UnexpectedResponseCode(u16),

    #[error("store limit of {limit} bytes exceeded")]
    StoreLimitExceeded { limit: u64 },

    /// A read reached the end of the resource.
    ///
    /// The first `transferred` bytes of the buffer hold valid data. This is
    /// the only error that comes with usable output.
    #[error("end of data after {transferred} bytes")]
    EndOfData { transferred: usize },

    #[error("response body ended after {received} of {expected} bytes")]
    TruncatedBody { expected: usize, received: usize },

    #[error("invalid {name} header: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    #[error("store has been released")]
    StoreReleased,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this is the end-of-data signal rather than a failure.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Error::EndOfData { .. })
    }

    /// Number of valid bytes delivered alongside this error.
    ///
    /// Always zero except for [`Error::EndOfData`].
    pub fn transferred(&self) -> usize {
        match self {
            Error::EndOfData { transferred } => *transferred,
            _ => 0,
        }
    }

    /// The HTTP status carried by [`Error::UnexpectedResponseCode`].
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::UnexpectedResponseCode(code) => Some(*code),
            _ => None,
        }
    }
}
