//! Repository archive repacking -- cut one subdirectory out of a
//! whole-repository ZIP and serialize it as its own archive.
//!
//! Repository archives put everything under a single top folder (for example
//! `hello-main/`). The folder name is taken from the first entry.

use std::io::{Cursor, Read};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::utils::{archive_relative_path, normalize_tree_path};

use super::{ArchiveBlob, ArchiveWriter, ZipArchiveWriter};

/// Placeholder entry written when the requested directory exists but holds no files
pub const EMPTY_DIRECTORY_NOTE: &str = "README.txt";

const EMPTY_DIRECTORY_TEXT: &[u8] = b"This directory was empty in the repository.";

/// Turn a downloaded repository archive into the archive for `subdir`.
///
/// An empty `subdir` keeps the repository archive as it is. Otherwise every
/// file below `{top}/{subdir}/` is stored under its path relative to
/// `subdir` (nested under the subdirectory's own name with
/// `include_root_folder`) and the result is compressed at `compression_level`.
///
/// A directory that exists but has no files yields an archive holding only
/// [`EMPTY_DIRECTORY_NOTE`]. Entries that cannot be read or carry unsafe
/// paths are skipped with a warning.
///
/// # Errors
///
/// - [`Error::Archive`] when the input is not a ZIP or has no entries
/// - [`Error::NotFound`] when `subdir` does not exist in the archive
pub fn repack_subdirectory(
    repository_zip: Vec<u8>,
    subdir: &str,
    include_root_folder: bool,
    compression_level: u32,
) -> Result<ArchiveBlob> {
    let subdir = normalize_tree_path(subdir);
    let mut source = zip::ZipArchive::new(Cursor::new(repository_zip))?;
    if source.len() == 0 {
        return Err(Error::Archive("repository archive is empty".to_string()));
    }

    let top = {
        let first = source.by_index(0)?;
        first.name().split('/').next().unwrap_or_default().to_string()
    };

    if subdir.is_empty() {
        let entries = (0..source.len())
            .filter(|&i| source.by_index(i).map(|f| !f.is_dir()).unwrap_or(false))
            .count();
        debug!(top = %top, entries, "Keeping repository archive as is");
        return Ok(ArchiveBlob {
            bytes: source.into_inner().into_inner(),
            entries,
        });
    }

    let prefix = format!("{top}/{subdir}/");
    let mut writer = ZipArchiveWriter::new();
    let mut found = false;

    for i in 0..source.len() {
        let mut entry = source.by_index(i)?;
        let name = entry.name().to_string();
        if !name.starts_with(&prefix) {
            continue;
        }
        found = true;
        if entry.is_dir() || name.len() == prefix.len() {
            continue;
        }

        let tree_path = &name[top.len() + 1..];
        let relative = match archive_relative_path(tree_path, subdir, include_root_folder) {
            Ok(relative) => relative,
            Err(e) => {
                warn!(entry = %name, error = %e, "Skipping repository archive entry");
                continue;
            }
        };

        let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        if let Err(e) = entry.read_to_end(&mut bytes) {
            warn!(entry = %name, error = %e, "Could not read repository archive entry");
            continue;
        }
        writer.put(&relative, bytes)?;
    }

    if writer.entry_count() == 0 {
        if !found {
            return Err(Error::NotFound(format!(
                "{subdir} (not in the repository archive)"
            )));
        }
        debug!(subdir = %subdir, "Directory is empty, adding a note");
        writer.put(EMPTY_DIRECTORY_NOTE, EMPTY_DIRECTORY_TEXT.to_vec())?;
    }

    debug!(subdir = %subdir, entries = writer.entry_count(), "Repacked repository subdirectory");
    writer.finalize(compression_level)
}
