//! ZIP archive reading over random access sources.
//!
//! Listing needs only the archive's tail and central directory, so over
//! [`HttpReaderAt`](crate::HttpReaderAt) a large remote archive can be
//! browsed, and single entries pulled out, with a few range requests.
//!
//! - [`structures`]: record layouts (end record, ZIP64 records, directory entries)
//! - [`parser`]: locating and decoding the central directory
//! - [`extractor`]: [`ZipArchive`], the entry point for listing and extraction
//!
//! STORED and DEFLATE entries are supported, including ZIP64 archives.
//! Encryption and multi-disk archives are not.

mod extractor;
mod parser;
mod structures;

pub use extractor::ZipArchive;
pub use structures::{CompressionMethod, ZipEntry};
