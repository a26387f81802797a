//! Download a repository directory as a ZIP archive
//!
//! This example demonstrates the core functionality of repo-dl:
//! - Configuring the GitHub backend and output directory
//! - Subscribing to progress events
//! - Downloading with Ctrl+C support (partial archives are still saved)
//!
//! Usage: `cargo run --example download_directory -- <owner> <repo> [path] [reference]`
//!
//! Set `GITHUB_TOKEN` to raise the API rate limit. Set `REPO_DL_REPOSITORY_ARCHIVE=1`
//! to try the branch ZIP before walking the tree.

use repo_dl::config::{ArchiveConfig, Config, FetchConfig, GitHubConfig, OutputConfig};
use repo_dl::utils::format_bytes;
use repo_dl::{Event, NamingPolicy, ProgressKind, RepoDownloader, download_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let owner = args.next().unwrap_or_else(|| "octocat".to_string());
    let repository = args.next().unwrap_or_else(|| "Hello-World".to_string());
    let path = args.next().unwrap_or_default();
    let reference = args.next();

    // Build configuration
    let config = Config {
        github: GitHubConfig {
            token: std::env::var("GITHUB_TOKEN").ok(),
            ..Default::default()
        },
        fetch: FetchConfig {
            concurrency: 8,
            ..Default::default()
        },
        archive: ArchiveConfig {
            naming_policy: NamingPolicy::SimpleName,
            use_repository_archive: std::env::var("REPO_DL_REPOSITORY_ARCHIVE").is_ok_and(|v| v == "1"),
            ..Default::default()
        },
        output: OutputConfig {
            output_dir: "downloads".into(),
            ..Default::default()
        },
        ..Default::default()
    };

    let root = config.github.coordinate(owner, repository, reference);
    let downloader = RepoDownloader::github(config)?;

    // Subscribe to events
    let mut events = downloader.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Started { root, root_path } => {
                    println!("Downloading {root} /{root_path}");
                }
                Event::SelectionStarted { root, paths } => {
                    println!("Downloading {} items from {root}", paths.len());
                }
                Event::Progress(progress) => match progress.kind {
                    ProgressKind::EnteredDirectory => println!("  dir  /{}", progress.path),
                    ProgressKind::FileCompleted => println!(
                        "  [{:>5.1}%] {} ({}/{})",
                        progress.percent(),
                        progress.path,
                        progress.completed,
                        progress.discovered
                    ),
                    ProgressKind::FileFailed | ProgressKind::DirectoryListFailed => println!(
                        "  FAILED {}: {}",
                        progress.path,
                        progress.error.unwrap_or_default()
                    ),
                },
                Event::Archiving { entries } => println!("Writing archive with {entries} files"),
                Event::Saved {
                    location,
                    size_bytes,
                    failed_files,
                    ..
                } => println!(
                    "Saved {} ({}, {failed_files} failed)",
                    location.display(),
                    format_bytes(size_bytes)
                ),
                Event::Failed { error } => eprintln!("Download failed: {error}"),
            }
        }
    });

    let summary = download_with_shutdown(&downloader, &root, &path).await?;

    if !summary.result.is_complete() {
        println!(
            "Archive is incomplete: {} failed files, {} skipped directories{}",
            summary.result.failed_files,
            summary.result.skipped_directories.len(),
            if summary.result.cancelled { ", cancelled" } else { "" }
        );
    }
    println!("Done in {}s", summary.elapsed().num_seconds());

    Ok(())
}
