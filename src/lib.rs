//! # httpreaderat
//!
//! Random access reads of remote HTTP resources, without downloading them.
//!
//! [`HttpReaderAt`] turns `(offset, length)` reads into HTTP Range requests.
//! When the server ignores ranges, the resource is downloaded once into a
//! [`Store`] and served locally from then on.
//!
//! ## Features
//!
//! - One probe request classifies the server and fetches size, `Last-Modified`
//!   and `Content-Type`
//! - Caller headers (e.g. authorization) are replayed on every request
//! - Memory, temporary file, and size-limited stores with spill-over
//! - [`BufReaderAt`] to coalesce small reads
//! - A ZIP reader to list and extract entries of remote archives
//!
//! ## Example
//!
//! ```no_run
//! use httpreaderat::{HttpReaderAt, ReadAt, default_store};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = reqwest::Client::new();
//!     let request = client.get("https://example.com/archive.zip").build()?;
//!
//!     let reader = HttpReaderAt::new(client, request, Some(default_store())).await?;
//!
//!     let mut header = [0u8; 4];
//!     reader.read_at(0, &mut header).await?;
//!     println!("{} bytes, starts with {:?}", reader.size(), header);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod store;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{BufReaderAt, HttpReaderAt, ReadAt};
pub use store::{FileStore, LimitedStore, MemoryStore, OverflowPolicy, Store, default_store};
pub use zip::{ZipArchive, ZipEntry};
