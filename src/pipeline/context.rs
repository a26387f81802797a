//! Pipeline context -- collaborators shared by every run, the caller-supplied
//! run parameters, and the mutable per-run state owned by the orchestrator.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveWriter;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::provider::{FileFetcher, TreeProvider};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::types::{DownloadOutcome, ProgressEvent, ProgressKind, RepositoryCoordinate, TreeEntry};
use crate::utils::{archive_relative_path, sanitize_archive_path};

/// Default bound on a single fetch attempt.
pub(super) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Downloads a remote directory tree into an [`ArchiveWriter`].
///
/// Holds the listing and fetching capabilities plus the retry and timeout
/// settings; each [`run`](TreeDownloadPipeline::run) gets its own state, so one
/// pipeline can serve any number of sequential or concurrent runs.
#[derive(Clone)]
pub struct TreeDownloadPipeline {
    pub(super) provider: Arc<dyn TreeProvider>,
    pub(super) fetcher: Arc<dyn FileFetcher>,
    pub(super) sleeper: Arc<dyn Sleeper>,
    pub(super) retry: RetryPolicy,
    pub(super) request_timeout: Duration,
    pub(super) include_root_folder: bool,
    pub(super) recovery_passes: u32,
}

impl TreeDownloadPipeline {
    /// Create a pipeline with the default retry policy and a 20 second attempt timeout
    pub fn new(provider: Arc<dyn TreeProvider>, fetcher: Arc<dyn FileFetcher>) -> Self {
        Self {
            provider,
            fetcher,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            include_root_folder: false,
            recovery_passes: 0,
        }
    }

    /// Create a pipeline using the fetch, retry and archive sections of `config`
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn TreeProvider>,
        fetcher: Arc<dyn FileFetcher>,
    ) -> Self {
        Self::new(provider, fetcher)
            .with_retry_policy(RetryPolicy::from_config(&config.retry))
            .with_request_timeout(config.fetch.request_timeout)
            .with_root_folder(config.archive.include_root_folder)
            .with_recovery_passes(config.retry.recovery_passes)
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the backoff sleeper (tests use one that records instead of waiting)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Bound every individual fetch attempt by `timeout`
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Keep the root directory's own name as the top folder inside the archive
    pub fn with_root_folder(mut self, include: bool) -> Self {
        self.include_root_folder = include;
        self
    }

    /// Re-fetch files that exhausted their retries in up to `passes` extra
    /// passes at the end of a run, each with lower concurrency (default: 0)
    pub fn with_recovery_passes(mut self, passes: u32) -> Self {
        self.recovery_passes = passes;
        self
    }
}

/// Parameters for one pipeline run.
pub struct RunParams<'a> {
    /// Repository to download from
    pub root: &'a RepositoryCoordinate,
    /// Directory to download ("" for the whole tree)
    pub root_path: &'a str,
    /// Destination for fetched files
    pub archive: &'a mut dyn ArchiveWriter,
    /// Observer receiving progress events, one call at a time
    pub on_progress: &'a mut (dyn FnMut(&ProgressEvent) + Send),
    /// Maximum number of concurrent fetches (batch size), at least 1
    pub concurrency: usize,
    /// Stops scheduling new batches and directories once cancelled
    pub cancel_token: CancellationToken,
}

/// Parameters for downloading several selected entries into one archive.
pub struct SelectionParams<'a> {
    /// Repository to download from
    pub root: &'a RepositoryCoordinate,
    /// Selected files and directories; each lands under its own name
    pub items: &'a [TreeEntry],
    /// Destination for fetched files
    pub archive: &'a mut dyn ArchiveWriter,
    /// Observer receiving progress events, one call at a time
    pub on_progress: &'a mut (dyn FnMut(&ProgressEvent) + Send),
    /// Maximum number of concurrent fetches (batch size), at least 1
    pub concurrency: usize,
    /// Stops scheduling new batches and directories once cancelled
    pub cancel_token: CancellationToken,
}

/// How fetched file paths map to archive entry paths.
#[derive(Clone, Debug)]
pub(super) enum Layout {
    /// Relative to `root_path`, optionally nested under its last segment
    Tree {
        root_path: String,
        include_root_folder: bool,
    },
    /// Each file under its own name at the archive root
    Flat,
}

/// Immutable inputs of a run, shared by every recursion level.
pub(super) struct RunScope {
    pub(super) root: RepositoryCoordinate,
    pub(super) layout: Layout,
    pub(super) concurrency: usize,
    pub(super) cancel_token: CancellationToken,
}

impl RunScope {
    /// Archive entry path for the tree-relative `file_path`.
    pub(super) fn archive_path(&self, file_path: &str) -> Result<String> {
        match &self.layout {
            Layout::Tree {
                root_path,
                include_root_folder,
            } => archive_relative_path(file_path, root_path, *include_root_folder),
            Layout::Flat => match file_path.trim_matches('/').rsplit('/').next() {
                Some(name) if !name.is_empty() => sanitize_archive_path(name),
                _ => Err(Error::InvalidPath {
                    path: file_path.to_string(),
                    reason: "empty path".to_string(),
                }),
            },
        }
    }

    /// Same collaborators and limits with a different layout.
    pub(super) fn with_layout(&self, layout: Layout) -> Self {
        Self {
            root: self.root.clone(),
            layout,
            concurrency: self.concurrency,
            cancel_token: self.cancel_token.clone(),
        }
    }
}

/// A file that exhausted its retries, kept for the recovery passes.
pub(super) struct DeferredFile {
    pub(super) path: String,
    pub(super) archive_path: String,
}

/// Mutable state of a run.
///
/// Only the orchestrator touches it, between batches, so archive writes and
/// progress callbacks are serialized without locks.
pub(super) struct RunState<'a> {
    pub(super) archive: &'a mut dyn ArchiveWriter,
    on_progress: &'a mut (dyn FnMut(&ProgressEvent) + Send),
    pub(super) completed: u64,
    pub(super) failed: u64,
    pub(super) discovered: u64,
    pub(super) failures: Vec<DownloadOutcome>,
    pub(super) skipped_directories: Vec<String>,
    pub(super) cancelled: bool,
    /// Failed files eligible for another fetch once the walk is done
    pub(super) deferred: Vec<DeferredFile>,
    /// Paths already scheduled, so a repeated listing entry is attempted once
    visited: HashSet<String>,
}

impl<'a> RunState<'a> {
    pub(super) fn new(
        archive: &'a mut dyn ArchiveWriter,
        on_progress: &'a mut (dyn FnMut(&ProgressEvent) + Send),
    ) -> Self {
        Self {
            archive,
            on_progress,
            completed: 0,
            failed: 0,
            discovered: 0,
            failures: Vec::new(),
            skipped_directories: Vec::new(),
            cancelled: false,
            deferred: Vec::new(),
            visited: HashSet::new(),
        }
    }

    /// Files attempted so far
    pub(super) fn attempted(&self) -> u64 {
        self.completed + self.failed
    }

    /// Mark `path` as scheduled; false if it was already seen in this run.
    pub(super) fn claim(&mut self, path: &str) -> bool {
        self.visited.insert(path.to_string())
    }

    pub(super) fn emit(&mut self, kind: ProgressKind, path: &str, error: Option<String>) {
        let event = ProgressEvent {
            kind,
            path: path.to_string(),
            completed: self.completed,
            failed: self.failed,
            total: self.attempted(),
            discovered: self.discovered,
            error,
        };
        (self.on_progress)(&event);
    }
}
