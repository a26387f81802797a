//! High-level downloader: pipeline, archive serialization and sink behind one handle.
//!
//! - [`download`] - The download operation (run pipeline, finalize, save)
//! - [`selection`] - Several selected files and directories into one archive
//! - [`repository_archive`] - Whole-repository ZIP fast path

mod download;
mod repository_archive;
mod selection;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::TreeDownloadPipeline;
use crate::provider::{
    FileFetcher, GitHubArchiveSource, GitHubClient, GitHubFileFetcher, GitHubTreeProvider,
    RepositoryArchiveSource, TreeProvider,
};
use crate::sink::{DownloadSink, FileSink};
use crate::types::{Event, PipelineResult};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Outcome of a successful [`RepoDownloader::download`] or
/// [`RepoDownloader::download_selection`]
#[derive(Clone, Debug, Serialize)]
pub struct DownloadSummary {
    /// Pipeline counts, failures and skipped directories
    pub result: PipelineResult,
    /// File name suggested to the sink
    pub file_name: String,
    /// Where the sink stored the archive
    pub location: std::path::PathBuf,
    /// Serialized archive size in bytes
    pub archive_size: u64,
    /// When the download started
    pub started_at: DateTime<Utc>,
    /// When the archive was saved
    pub finished_at: DateTime<Utc>,
}

impl DownloadSummary {
    /// Wall-clock time the download took
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Downloads repository directories into ZIP archives.
///
/// Progress is published on a broadcast channel; call [`subscribe`](Self::subscribe)
/// before starting a download to receive every event. Cheap to clone.
#[derive(Clone)]
pub struct RepoDownloader {
    pub(crate) config: Arc<Config>,
    pub(crate) pipeline: TreeDownloadPipeline,
    pub(crate) sink: Arc<dyn DownloadSink>,
    pub(crate) archive_source: Option<Arc<dyn RepositoryArchiveSource>>,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl RepoDownloader {
    /// Create a downloader from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` fails validation.
    pub fn new(
        config: Config,
        provider: Arc<dyn TreeProvider>,
        fetcher: Arc<dyn FileFetcher>,
        sink: Arc<dyn DownloadSink>,
    ) -> Result<Self> {
        config.validate()?;

        let pipeline = TreeDownloadPipeline::from_config(&config, provider, fetcher);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            sink,
            archive_source: None,
            event_tx,
        })
    }

    /// Create a downloader backed by the GitHub contents API and raw host,
    /// saving archives into `config.output.output_dir`.
    ///
    /// The repository archive fast path is wired up as well; it only runs when
    /// `config.archive.use_repository_archive` is set.
    pub fn github(config: Config) -> Result<Self> {
        config.validate()?;

        let client = GitHubClient::new(&config.github, config.fetch.request_timeout)?;
        let provider = Arc::new(GitHubTreeProvider::new(client.clone()));
        let fetcher = Arc::new(GitHubFileFetcher::new(client.clone()));
        let archive_source = Arc::new(GitHubArchiveSource::new(client));
        let sink = Arc::new(FileSink::from_config(&config.output));

        Ok(Self::new(config, provider, fetcher, sink)?.with_archive_source(archive_source))
    }

    /// Source for the whole-repository archive fast path
    pub fn with_archive_source(mut self, source: Arc<dyn RepositoryArchiveSource>) -> Self {
        self.archive_source = Some(source);
        self
    }

    /// Replace the pipeline (for example to inject a custom retry sleeper)
    pub fn with_pipeline(mut self, pipeline: TreeDownloadPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Subscribe to download events
    ///
    /// Each subscriber receives every event sent after it subscribed. Slow
    /// subscribers may miss events once the channel buffer overflows.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Send an event to all subscribers; dropped silently when nobody listens.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
