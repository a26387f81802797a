//! # repo-dl
//!
//! Download a directory of a remote repository as a single ZIP archive.
//!
//! ## Design Philosophy
//!
//! repo-dl is designed to be:
//! - **Bounded** - At most `fetch.concurrency` file requests are in flight
//! - **Forgiving** - Failed files and unlistable directories are reported, not fatal
//! - **Library-first** - Listing, fetching and saving are traits you can replace
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use repo_dl::{Config, RepoDownloader, RepositoryCoordinate};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = RepoDownloader::github(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let root = RepositoryCoordinate::new("rust-lang", "rust", "master");
//!     let summary = downloader
//!         .download(&root, "src/tools/rustfmt", CancellationToken::new())
//!         .await?;
//!     println!("saved {}", summary.location.display());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive writers
pub mod archive;
/// Configuration types
pub mod config;
/// High-level downloader facade
pub mod downloader;
/// Error types
pub mod error;
/// Tree download pipeline
pub mod pipeline;
/// Directory listing and file fetching backends
pub mod provider;
/// Retry logic with exponential backoff
pub mod retry;
/// Destinations for finished archives
pub mod sink;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::{ArchiveBlob, ArchiveWriter, ZipArchiveWriter};
pub use config::{Config, FileCollisionAction, NamingPolicy};
pub use downloader::{DownloadSummary, RepoDownloader};
pub use error::{Error, Result};
pub use pipeline::{RunParams, SelectionParams, TreeDownloadPipeline};
pub use provider::{FileFetcher, RepositoryArchiveSource, TreeProvider};
pub use sink::{DownloadSink, FileSink};
pub use types::{
    DownloadOutcome, EntryKind, Event, PipelineResult, ProgressEvent, ProgressKind,
    RepositoryCoordinate, TreeEntry,
};

/// Run a download that cancels itself on SIGINT/SIGTERM.
///
/// On a signal the pipeline stops scheduling new work and the files fetched so
/// far are still archived and saved.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use repo_dl::{Config, RepoDownloader, RepositoryCoordinate, download_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = RepoDownloader::github(Config::default())?;
///     let root = RepositoryCoordinate::new("octocat", "Hello-World", "master");
///
///     // Run with automatic signal handling
///     download_with_shutdown(&downloader, &root, "").await?;
///
///     Ok(())
/// }
/// ```
pub async fn download_with_shutdown(
    downloader: &RepoDownloader,
    root: &RepositoryCoordinate,
    root_path: &str,
) -> Result<DownloadSummary> {
    let cancel_token = tokio_util::sync::CancellationToken::new();
    let watcher = {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => {
                    tracing::info!("Cancelling download after signal");
                    cancel_token.cancel();
                }
                _ = cancel_token.cancelled() => {}
            }
        })
    };

    let outcome = downloader.download(root, root_path, cancel_token.clone()).await;
    cancel_token.cancel();
    watcher.await.ok();
    outcome
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
