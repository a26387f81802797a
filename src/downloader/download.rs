//! The download operation -- run the pipeline, serialize the archive, hand it to the sink.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveBlob, ArchiveWriter, ZipArchiveWriter};
use crate::error::{Error, Result};
use crate::pipeline::RunParams;
use crate::types::{Event, PipelineResult, ProgressEvent, RepositoryCoordinate};
use crate::utils::{archive_file_name, format_bytes, normalize_tree_path};

use super::repository_archive::repository_archive_result;
use super::{DownloadSummary, RepoDownloader};

impl RepoDownloader {
    /// Download `root_path` of `root` ("" for the whole tree) into one archive.
    ///
    /// Phases:
    /// 1. Try the whole-repository archive when `archive.use_repository_archive`
    ///    is set, falling back to the tree walk on any failure
    /// 2. Walk and fetch the tree, broadcasting [`Event::Progress`]
    /// 3. Serialize the archive off the async runtime
    /// 4. Save it through the sink under the configured naming policy
    ///
    /// Individual file failures do not fail the download; they are listed in
    /// the summary. A cancelled run still saves the files collected so far.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] when no file could be downloaded
    /// - [`Error::Cancelled`] when cancelled before any file completed
    /// - archive or sink errors
    pub async fn download(
        &self,
        root: &RepositoryCoordinate,
        root_path: &str,
        cancel_token: CancellationToken,
    ) -> Result<DownloadSummary> {
        let root_path = normalize_tree_path(root_path);
        self.emit_event(Event::Started {
            root: root.clone(),
            root_path: root_path.to_string(),
        });

        let outcome = self.download_inner(root, root_path, cancel_token).await;
        if let Err(e) = &outcome {
            tracing::error!(root = %root, root_path = %root_path, error = %e, "Download failed");
            self.emit_event(Event::Failed {
                error: e.to_string(),
            });
        }
        outcome
    }

    async fn download_inner(
        &self,
        root: &RepositoryCoordinate,
        root_path: &str,
        cancel_token: CancellationToken,
    ) -> Result<DownloadSummary> {
        let started_at = Utc::now();

        let file_name = archive_file_name(root, root_path, self.config.archive.naming_policy);

        if let Some(blob) = self
            .fetch_repository_archive(root, root_path, &cancel_token)
            .await
        {
            self.emit_event(Event::Archiving {
                entries: blob.entries as u64,
            });
            let result = repository_archive_result(&blob);
            return self
                .save(root, root_path, blob, result, file_name, started_at)
                .await;
        }

        let mut archive = ZipArchiveWriter::new();
        let mut on_progress = self.progress_forwarder();

        let result = self
            .pipeline
            .run(RunParams {
                root,
                root_path,
                archive: &mut archive,
                on_progress: &mut on_progress,
                concurrency: self.config.fetch.concurrency,
                cancel_token,
            })
            .await?;

        ensure_any_completed(&result, || {
            format!("no files could be downloaded from {root} at '{root_path}'")
        })?;

        self.finish(root, root_path, archive, result, file_name, started_at)
            .await
    }

    /// Observer that rebroadcasts pipeline progress as [`Event::Progress`].
    pub(super) fn progress_forwarder(&self) -> impl FnMut(&ProgressEvent) + Send {
        let event_tx = self.event_tx.clone();
        move |event: &ProgressEvent| {
            event_tx.send(Event::Progress(event.clone())).ok();
        }
    }

    /// Serialize a filled archive off the async runtime, then save it.
    pub(super) async fn finish(
        &self,
        root: &RepositoryCoordinate,
        label: &str,
        mut archive: ZipArchiveWriter,
        result: PipelineResult,
        file_name: String,
        started_at: DateTime<Utc>,
    ) -> Result<DownloadSummary> {
        self.emit_event(Event::Archiving {
            entries: archive.entry_count() as u64,
        });

        let compression_level = self.config.archive.compression_level;
        let blob = tokio::task::spawn_blocking(move || archive.finalize(compression_level))
            .await
            .map_err(|e| Error::Other(format!("archive task failed: {e}")))??;

        self.save(root, label, blob, result, file_name, started_at)
            .await
    }

    /// Hand a serialized archive to the sink and report it.
    pub(super) async fn save(
        &self,
        root: &RepositoryCoordinate,
        label: &str,
        blob: ArchiveBlob,
        result: PipelineResult,
        file_name: String,
        started_at: DateTime<Utc>,
    ) -> Result<DownloadSummary> {
        let location = self.sink.save(&blob, &file_name).await?;
        let archive_size = blob.len() as u64;

        self.emit_event(Event::Saved {
            file_name: file_name.clone(),
            location: location.clone(),
            size_bytes: archive_size,
            failed_files: result.failed_files,
        });

        tracing::info!(
            root = %root,
            root_path = %label,
            files = result.completed_files,
            failed = result.failed_files,
            size = %format_bytes(archive_size),
            location = %location.display(),
            "Download saved"
        );

        Ok(DownloadSummary {
            result,
            file_name,
            location,
            archive_size,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Nothing is saved when no file made it into the archive.
pub(super) fn ensure_any_completed(
    result: &PipelineResult,
    describe: impl FnOnce() -> String,
) -> Result<()> {
    if result.completed_files > 0 {
        return Ok(());
    }
    Err(if result.cancelled {
        Error::Cancelled
    } else {
        Error::NotFound(describe())
    })
}
