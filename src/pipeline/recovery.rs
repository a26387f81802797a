//! Recovery passes -- another round of fetches for files whose retries ran out.
//!
//! Each pass walks the files still failing with less concurrency than the
//! previous one, so a remote that throttled the first attempt gets some room.

use crate::types::{DirectoryTally, ProgressKind, RepositoryCoordinate};

use super::batching::{run_batch, split_batches};
use super::context::{DeferredFile, RunScope, RunState, TreeDownloadPipeline};
use super::fetch::FetchedFile;

/// Concurrency for recovery pass `pass` (1-based): three fewer per pass,
/// never below 3 (or below `base` when `base` is smaller).
pub(super) fn recovery_concurrency(base: usize, pass: u32) -> usize {
    let step = usize::try_from(pass).unwrap_or(usize::MAX).saturating_mul(3);
    base.saturating_sub(step).max(base.min(3))
}

impl TreeDownloadPipeline {
    /// Re-fetch deferred files for up to `self.recovery_passes` passes.
    ///
    /// A recovered file moves from failed to completed in both `state` and
    /// `tally`, and its failure outcome is dropped.
    pub(super) async fn recover_deferred(
        &self,
        scope: &RunScope,
        state: &mut RunState<'_>,
        tally: &mut DirectoryTally,
    ) {
        for pass in 1..=self.recovery_passes {
            if state.deferred.is_empty() {
                break;
            }
            if scope.cancel_token.is_cancelled() {
                state.cancelled = true;
                break;
            }

            let pending = std::mem::take(&mut state.deferred);
            let concurrency = recovery_concurrency(scope.concurrency, pass);
            tracing::info!(pass, files = pending.len(), concurrency, "Retrying failed files");

            let mut recovered = 0u64;
            let mut batches = split_batches(pending, concurrency).into_iter();
            for batch in batches.by_ref() {
                if scope.cancel_token.is_cancelled() {
                    state.cancelled = true;
                    break;
                }
                let fetched = run_batch(batch, |file| self.fetch_deferred(&scope.root, file)).await;
                for (file, archive_path) in fetched {
                    if record_recovery(state, file, archive_path) {
                        tally.completed += 1;
                        tally.failed = tally.failed.saturating_sub(1);
                        recovered += 1;
                    }
                }
            }
            // Files never retried this pass stay deferred
            state.deferred.extend(batches.flatten());

            tracing::info!(
                pass,
                recovered,
                remaining = state.deferred.len(),
                "Recovery pass finished"
            );
            if state.cancelled {
                break;
            }
        }
    }

    async fn fetch_deferred(&self, root: &RepositoryCoordinate, file: DeferredFile) -> (FetchedFile, String) {
        let DeferredFile { path, archive_path } = file;
        (self.fetch_file(root, path).await, archive_path)
    }
}

/// Apply one recovery fetch; true when the file made it into the archive.
fn record_recovery(state: &mut RunState<'_>, file: FetchedFile, archive_path: String) -> bool {
    let FetchedFile { path, result } = file;

    match result.and_then(|bytes| state.archive.put(&archive_path, bytes)) {
        Ok(()) => {
            state.completed += 1;
            state.failed = state.failed.saturating_sub(1);
            state.failures.retain(|f| f.path != path);
            tracing::info!(path = %path, "Recovered failed file");
            state.emit(ProgressKind::FileCompleted, &path, None);
            true
        }
        Err(e) => {
            if let Some(outcome) = state.failures.iter_mut().find(|f| f.path == path) {
                outcome.error = Some(e.to_string());
            }
            state.deferred.push(DeferredFile { path, archive_path });
            false
        }
    }
}
