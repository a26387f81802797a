//! Selection downloads -- several files and directories of one repository into one archive.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::archive::ZipArchiveWriter;
use crate::error::{Error, Result};
use crate::pipeline::SelectionParams;
use crate::types::{Event, RepositoryCoordinate, TreeEntry};
use crate::utils::selection_file_name;

use super::download::ensure_any_completed;
use super::{DownloadSummary, RepoDownloader};

impl RepoDownloader {
    /// Download the selected `items` of `root` into a single archive.
    ///
    /// Selected files are stored under their own name; selected directories
    /// are walked and keep their own name as top folder. Everything shares one
    /// archive and one [`PipelineResult`](crate::PipelineResult), whose
    /// `failed_items` lists the selections that contributed nothing.
    ///
    /// The archive is named `{name}.zip` for a single item and
    /// `selected_items_{unix_millis}.zip` for several.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPath`] when `items` is empty
    /// - [`Error::NotFound`] when no file could be downloaded
    /// - [`Error::Cancelled`] when cancelled before any file completed
    /// - archive or sink errors
    pub async fn download_selection(
        &self,
        root: &RepositoryCoordinate,
        items: &[TreeEntry],
        cancel_token: CancellationToken,
    ) -> Result<DownloadSummary> {
        self.emit_event(Event::SelectionStarted {
            root: root.clone(),
            paths: items.iter().map(|item| item.path.clone()).collect(),
        });

        let outcome = self.download_selection_inner(root, items, cancel_token).await;
        if let Err(e) = &outcome {
            tracing::error!(root = %root, items = items.len(), error = %e, "Selection download failed");
            self.emit_event(Event::Failed {
                error: e.to_string(),
            });
        }
        outcome
    }

    async fn download_selection_inner(
        &self,
        root: &RepositoryCoordinate,
        items: &[TreeEntry],
        cancel_token: CancellationToken,
    ) -> Result<DownloadSummary> {
        if items.is_empty() {
            return Err(Error::InvalidPath {
                path: String::new(),
                reason: "nothing selected".to_string(),
            });
        }

        let started_at = Utc::now();
        let mut archive = ZipArchiveWriter::new();
        let mut on_progress = self.progress_forwarder();

        let result = self
            .pipeline
            .run_selection(SelectionParams {
                root,
                items,
                archive: &mut archive,
                on_progress: &mut on_progress,
                concurrency: self.config.fetch.concurrency,
                cancel_token,
            })
            .await?;

        ensure_any_completed(&result, || {
            format!("none of the {} selected items of {root} could be downloaded", items.len())
        })?;
        if !result.failed_items.is_empty() {
            tracing::warn!(
                root = %root,
                failed_items = result.failed_items.len(),
                items = items.len(),
                "Some selected items could not be downloaded"
            );
        }

        let label = format!("{} selected items", items.len());
        let file_name = selection_file_name(items, started_at.timestamp_millis());
        self.finish(root, &label, archive, result, file_name, started_at)
            .await
    }
}
