//! Archive assembly -- the writer the pipeline streams downloaded files into.
//!
//! The pipeline decides *which* archive-relative path each file gets; the
//! writer owns storage and serialization. [`ZipArchiveWriter`] is the
//! production implementation. [`repack_subdirectory`] builds an archive from
//! a downloaded whole-repository ZIP instead.

mod repack;
mod zip_writer;

use crate::error::Result;

pub use repack::{EMPTY_DIRECTORY_NOTE, repack_subdirectory};
pub use zip_writer::ZipArchiveWriter;

/// A finished, serialized archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveBlob {
    /// Serialized archive bytes
    pub bytes: Vec<u8>,
    /// Number of file entries contained
    pub entries: usize,
}

impl ArchiveBlob {
    /// Size of the serialized archive in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the serialized archive has no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Accumulates named byte buffers and serializes them into one archive.
///
/// Writes are applied by a single writer at a time; the pipeline never calls
/// `put` from concurrent fetches.
pub trait ArchiveWriter: Send {
    /// Store `bytes` under `relative_path`. Writing the same path twice keeps the last write.
    fn put(&mut self, relative_path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Number of distinct entries stored so far
    fn entry_count(&self) -> usize;

    /// Serialize every stored entry, leaving the writer empty.
    ///
    /// `compression_level` ranges over 0 (store) to 9 (best).
    fn finalize(&mut self, compression_level: u32) -> Result<ArchiveBlob>;
}
