//! Pipeline orchestration -- run entry points and depth-first directory walk.

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::types::{DirectoryTally, DownloadOutcome, PipelineResult, ProgressKind, TreeEntry};
use crate::utils::normalize_tree_path;

use super::batching::{run_batch, split_batches};
use super::context::{
    DeferredFile, Layout, RunParams, RunScope, RunState, SelectionParams, TreeDownloadPipeline,
};
use super::fetch::FetchedFile;
use super::finalization::{build_result, failed_selection_items};

impl TreeDownloadPipeline {
    /// Download every file under `params.root_path` into `params.archive`.
    ///
    /// Phases per directory:
    /// 1. List the directory (a failed listing skips the subtree)
    /// 2. Fetch its files in batches of `params.concurrency`, waiting for each
    ///    batch to settle before the next starts
    /// 3. Write successful fetches to the archive and report progress
    /// 4. Recurse into subdirectories one at a time
    ///
    /// Once the walk is done, files that exhausted their retries get the
    /// configured number of recovery passes.
    ///
    /// Per-file and per-directory failures are absorbed into the result.
    /// Cancellation stops scheduling and returns what was collected so far with
    /// [`PipelineResult::cancelled`] set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `params.concurrency` is 0, before any
    /// listing or fetch is issued.
    pub async fn run(&self, params: RunParams<'_>) -> Result<PipelineResult> {
        let RunParams {
            root,
            root_path,
            archive,
            on_progress,
            concurrency,
            cancel_token,
        } = params;

        if concurrency == 0 {
            return Err(Error::config("concurrency", "must be at least 1"));
        }

        let root_path = normalize_tree_path(root_path).to_string();
        let scope = RunScope {
            root: root.clone(),
            layout: Layout::Tree {
                root_path: root_path.clone(),
                include_root_folder: self.include_root_folder,
            },
            concurrency,
            cancel_token,
        };
        let mut state = RunState::new(archive, on_progress);
        state.claim(&root_path);

        tracing::info!(
            root = %scope.root,
            root_path = %root_path,
            concurrency,
            "Starting tree download"
        );

        let mut tally = self
            .process_directory(&scope, &mut state, root_path.clone())
            .await;
        self.recover_deferred(&scope, &mut state, &mut tally).await;

        Ok(build_result(&scope.root, &root_path, state, tally))
    }

    /// Download several selected entries of one repository into a single archive.
    ///
    /// Selected files are fetched first, in batches, and stored under their own
    /// name. Each selected directory is then walked like [`run`](Self::run)
    /// with its own name kept as the top folder. Counters accumulate into one
    /// [`PipelineResult`]; [`PipelineResult::failed_items`] lists the
    /// selections that contributed nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `params.concurrency` is 0.
    pub async fn run_selection(&self, params: SelectionParams<'_>) -> Result<PipelineResult> {
        let SelectionParams {
            root,
            items,
            archive,
            on_progress,
            concurrency,
            cancel_token,
        } = params;

        if concurrency == 0 {
            return Err(Error::config("concurrency", "must be at least 1"));
        }

        let scope = RunScope {
            root: root.clone(),
            layout: Layout::Flat,
            concurrency,
            cancel_token,
        };
        let mut state = RunState::new(archive, on_progress);

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for item in items {
            let path = normalize_tree_path(&item.path).to_string();
            if !state.claim(&path) {
                tracing::debug!(path = %path, "Skipping duplicate selection");
                continue;
            }
            let entry = TreeEntry {
                name: item.name.clone(),
                path,
                kind: item.kind,
            };
            if entry.is_file() {
                files.push(entry);
            } else {
                dirs.push(entry);
            }
        }
        let label = items
            .iter()
            .map(|item| item.path.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        tracing::info!(
            root = %scope.root,
            files = files.len(),
            directories = dirs.len(),
            concurrency,
            "Starting selection download"
        );

        let loose_files: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
        state.discovered += files.len() as u64;
        let mut tally = self.fetch_in_batches(&scope, &mut state, files).await;

        let mut dir_totals = Vec::with_capacity(dirs.len());
        for dir in dirs {
            if scope.cancel_token.is_cancelled() {
                state.cancelled = true;
                break;
            }
            let dir_scope = scope.with_layout(Layout::Tree {
                root_path: dir.path.clone(),
                include_root_folder: true,
            });
            let subtree = self
                .process_directory(&dir_scope, &mut state, dir.path.clone())
                .await;
            tally += subtree;
            dir_totals.push((dir.path, subtree.total));
        }

        self.recover_deferred(&scope, &mut state, &mut tally).await;

        let failed_items = failed_selection_items(&state, &loose_files, &dir_totals);
        for item in &failed_items {
            tracing::warn!(item = %item, "Selected item could not be downloaded");
        }

        let mut result = build_result(&scope.root, &label, state, tally);
        result.failed_items = failed_items;
        Ok(result)
    }

    /// Process one directory and its subtree, returning the subtree's file counts.
    fn process_directory<'s, 'a: 's>(
        &'s self,
        scope: &'s RunScope,
        state: &'s mut RunState<'a>,
        dir: String,
    ) -> BoxFuture<'s, DirectoryTally> {
        async move {
            let mut tally = DirectoryTally::default();

            if scope.cancel_token.is_cancelled() {
                state.cancelled = true;
                return tally;
            }

            state.emit(ProgressKind::EnteredDirectory, &dir, None);

            let entries = match self.provider.list(&scope.root, &dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(directory = %dir, error = %e, "Directory listing failed, skipping subtree");
                    state.skipped_directories.push(dir.clone());
                    state.emit(ProgressKind::DirectoryListFailed, &dir, Some(e.to_string()));
                    return tally;
                }
            };

            let (files, subdirs) = partition_entries(state, entries);
            state.discovered += files.len() as u64;
            tracing::info!(
                directory = %dir,
                files = files.len(),
                subdirectories = subdirs.len(),
                "Directory listed"
            );

            tally += self.fetch_in_batches(scope, state, files).await;

            for subdir in subdirs {
                if scope.cancel_token.is_cancelled() {
                    state.cancelled = true;
                    break;
                }
                tally += self.process_directory(scope, state, subdir.path).await;
            }

            tally
        }
        .boxed()
    }

    /// Fetch `files` in batches of `scope.concurrency`, recording each batch
    /// once it has settled. Stops before the next batch when cancelled.
    async fn fetch_in_batches(
        &self,
        scope: &RunScope,
        state: &mut RunState<'_>,
        files: Vec<TreeEntry>,
    ) -> DirectoryTally {
        let mut tally = DirectoryTally::default();
        for batch in split_batches(files, scope.concurrency) {
            if scope.cancel_token.is_cancelled() {
                state.cancelled = true;
                break;
            }

            let fetched = run_batch(batch, |entry| self.fetch_file(&scope.root, entry.path)).await;
            for file in fetched {
                tally += self.record_file(scope, state, file);
            }
        }
        tally
    }

    /// Apply one settled fetch: write it to the archive and report it.
    fn record_file(&self, scope: &RunScope, state: &mut RunState<'_>, file: FetchedFile) -> DirectoryTally {
        let FetchedFile { path, result } = file;

        let stored = match result {
            Ok(bytes) => scope
                .archive_path(&path)
                .and_then(|relative| state.archive.put(&relative, bytes)),
            Err(e) => {
                let deferrable = self
                    .retry
                    .should_retry(&e)
                    .then(|| scope.archive_path(&path).ok())
                    .flatten();
                if let Some(archive_path) = deferrable {
                    state.deferred.push(DeferredFile {
                        path: path.clone(),
                        archive_path,
                    });
                }
                Err(e)
            }
        };

        match stored {
            Ok(()) => {
                state.completed += 1;
                state.emit(ProgressKind::FileCompleted, &path, None);
                DirectoryTally {
                    total: 1,
                    completed: 1,
                    failed: 0,
                }
            }
            Err(e) => {
                let message = e.to_string();
                state.failed += 1;
                state.failures.push(DownloadOutcome::failure(path.clone(), &message));
                state.emit(ProgressKind::FileFailed, &path, Some(message));
                DirectoryTally {
                    total: 1,
                    completed: 0,
                    failed: 1,
                }
            }
        }
    }
}

/// Split a listing into files and subdirectories, dropping paths already seen this run.
fn partition_entries(state: &mut RunState<'_>, entries: Vec<TreeEntry>) -> (Vec<TreeEntry>, Vec<TreeEntry>) {
    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries {
        if !state.claim(&entry.path) {
            tracing::debug!(path = %entry.path, "Skipping duplicate listing entry");
            continue;
        }
        if entry.is_file() {
            files.push(entry);
        } else {
            subdirs.push(entry);
        }
    }
    (files, subdirs)
}
