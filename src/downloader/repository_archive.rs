//! Whole-repository archive fast path -- download the remote's own ZIP of the
//! branch and cut the requested directory out of it instead of walking the tree.

use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveBlob, repack_subdirectory};
use crate::error::{Error, Result};
use crate::provider::RepositoryArchiveSource;
use crate::types::{DirectoryTally, PipelineResult, RepositoryCoordinate};
use crate::utils::format_bytes;

use super::RepoDownloader;

impl RepoDownloader {
    /// Archive for `root_path` built from the repository archive, or `None`
    /// when the fast path is disabled, unavailable or failed.
    ///
    /// Failures are logged and never surface; the caller walks the tree instead.
    pub(super) async fn fetch_repository_archive(
        &self,
        root: &RepositoryCoordinate,
        root_path: &str,
        cancel_token: &CancellationToken,
    ) -> Option<ArchiveBlob> {
        if !self.config.archive.use_repository_archive || cancel_token.is_cancelled() {
            return None;
        }
        let source = self.archive_source.clone()?;

        match self.repack_repository_archive(source.as_ref(), root, root_path).await {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(
                    root = %root,
                    root_path = %root_path,
                    error = %e,
                    "Repository archive unavailable, walking the tree instead"
                );
                None
            }
        }
    }

    async fn repack_repository_archive(
        &self,
        source: &dyn RepositoryArchiveSource,
        root: &RepositoryCoordinate,
        root_path: &str,
    ) -> Result<ArchiveBlob> {
        let archive = &self.config.archive;
        let bytes = source
            .fetch_archive(root, archive.max_repository_archive_bytes)
            .await?;
        tracing::info!(
            root = %root,
            size = %format_bytes(bytes.len() as u64),
            "Downloaded repository archive"
        );

        let subdir = root_path.to_string();
        let include_root_folder = archive.include_root_folder;
        let compression_level = archive.compression_level;
        tokio::task::spawn_blocking(move || {
            repack_subdirectory(bytes, &subdir, include_root_folder, compression_level)
        })
        .await
        .map_err(|e| Error::Other(format!("repack task failed: {e}")))?
    }
}

/// Counts for an archive taken whole from the repository archive.
pub(super) fn repository_archive_result(blob: &ArchiveBlob) -> PipelineResult {
    let files = blob.entries as u64;
    let mut result = PipelineResult::default();
    result.absorb(DirectoryTally {
        total: files,
        completed: files,
        failed: 0,
    });
    result
}
