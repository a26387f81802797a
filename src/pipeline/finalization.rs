//! Run finalization -- fold the walk's tally and state into a [`PipelineResult`].

use crate::types::{DirectoryTally, PipelineResult, RepositoryCoordinate};

use super::context::RunState;

/// Assemble the run result and log a summary.
pub(super) fn build_result(
    root: &RepositoryCoordinate,
    root_path: &str,
    state: RunState<'_>,
    tally: DirectoryTally,
) -> PipelineResult {
    debug_assert_eq!(tally.completed, state.completed);
    debug_assert_eq!(tally.failed, state.failed);
    debug_assert_eq!(tally.total, tally.completed + tally.failed);

    let mut result = PipelineResult {
        failures: state.failures,
        skipped_directories: state.skipped_directories,
        cancelled: state.cancelled,
        ..PipelineResult::default()
    };
    result.absorb(tally);

    if result.cancelled {
        tracing::warn!(
            root = %root,
            root_path = %root_path,
            completed = result.completed_files,
            failed = result.failed_files,
            "Tree download cancelled, returning partial result"
        );
    } else if result.failed_files > 0 || !result.skipped_directories.is_empty() {
        tracing::warn!(
            root = %root,
            root_path = %root_path,
            total = result.total_files,
            completed = result.completed_files,
            failed = result.failed_files,
            skipped_directories = result.skipped_directories.len(),
            discovered = state.discovered,
            "Tree download finished with failures"
        );
    } else {
        tracing::info!(
            root = %root,
            root_path = %root_path,
            total = result.total_files,
            "Tree download finished"
        );
    }

    result
}

/// Selected entries that ended up contributing nothing to the archive.
///
/// A file fails when it is still listed among the failures. A directory fails
/// when its own listing failed, or when it had files and every one of them failed.
pub(super) fn failed_selection_items(
    state: &RunState<'_>,
    loose_files: &[String],
    dir_totals: &[(String, u64)],
) -> Vec<String> {
    let mut failed: Vec<String> = loose_files
        .iter()
        .filter(|path| state.failures.iter().any(|f| &f.path == *path))
        .cloned()
        .collect();

    for (dir, total) in dir_totals {
        let listing_failed = state.skipped_directories.iter().any(|d| d == dir);
        let prefix = format!("{dir}/");
        let failed_under = state
            .failures
            .iter()
            .filter(|f| dir.is_empty() || f.path.starts_with(&prefix))
            .filter(|f| !loose_files.contains(&f.path))
            .count() as u64;
        if listing_failed || (*total > 0 && failed_under == *total) {
            failed.push(dir.clone());
        }
    }

    failed
}
