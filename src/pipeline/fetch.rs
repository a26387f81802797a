//! Single-file fetch -- one bounded attempt per try, wrapped in the retry policy.

use crate::error::{Error, Result};
use crate::retry::download_with_retry;
use crate::types::RepositoryCoordinate;

use super::context::TreeDownloadPipeline;

/// A settled fetch, carried back to the orchestrator.
pub(super) struct FetchedFile {
    pub(super) path: String,
    pub(super) result: Result<Vec<u8>>,
}

impl TreeDownloadPipeline {
    /// Fetch one file, retrying per the policy. Never fails the batch: the
    /// final error is reported through [`FetchedFile::result`].
    pub(super) async fn fetch_file(&self, root: &RepositoryCoordinate, path: String) -> FetchedFile {
        let fetcher = &self.fetcher;
        let timeout = self.request_timeout;

        let result = {
            let path = path.as_str();
            download_with_retry(&self.retry, self.sleeper.as_ref(), || async move {
                match tokio::time::timeout(timeout, fetcher.fetch(root, path)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout {
                        path: path.to_string(),
                        after: timeout,
                    }),
                }
            })
            .await
        };

        match &result {
            Ok(bytes) => tracing::trace!(path = %path, size = bytes.len(), "File fetched"),
            Err(e) => tracing::warn!(path = %path, error = %e, "File fetch failed"),
        }

        FetchedFile { path, result }
    }
}
