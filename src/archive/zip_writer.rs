use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use tracing::debug;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::{Error, Result};
use crate::utils::{format_bytes, sanitize_archive_path};

use super::{ArchiveBlob, ArchiveWriter};

/// In-memory ZIP builder
///
/// Entries are kept in a sorted map until [`finalize`](ArchiveWriter::finalize),
/// so the output is deterministic regardless of download order.
#[derive(Debug, Default)]
pub struct ZipArchiveWriter {
    entries: BTreeMap<String, Vec<u8>>,
}

impl ZipArchiveWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Total uncompressed size of the stored entries
    pub fn uncompressed_size(&self) -> u64 {
        self.entries.values().map(|b| b.len() as u64).sum()
    }

    fn file_options(compression_level: u32, size: usize) -> FileOptions {
        let options = FileOptions::default()
            .unix_permissions(0o644)
            .large_file(size as u64 >= u64::from(u32::MAX));
        if compression_level == 0 {
            options.compression_method(CompressionMethod::Stored)
        } else {
            options
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(compression_level as i32))
        }
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn put(&mut self, relative_path: &str, bytes: Vec<u8>) -> Result<()> {
        let name = sanitize_archive_path(relative_path)?;
        if self.entries.insert(name.clone(), bytes).is_some() {
            debug!(path = %name, "replacing existing archive entry");
        }
        Ok(())
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn finalize(&mut self, compression_level: u32) -> Result<ArchiveBlob> {
        if compression_level > 9 {
            return Err(Error::Archive(format!(
                "compression level must be 0-9, got {compression_level}"
            )));
        }

        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        let uncompressed: u64 = entries.values().map(|b| b.len() as u64).sum();

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            writer.start_file(name, Self::file_options(compression_level, bytes.len()))?;
            writer.write_all(&bytes)?;
        }
        let bytes = writer.finish()?.into_inner();

        debug!(
            entries = count,
            uncompressed = %format_bytes(uncompressed),
            compressed = %format_bytes(bytes.len() as u64),
            "ZIP archive finalized"
        );

        Ok(ArchiveBlob {
            bytes,
            entries: count,
        })
    }
}
