//! Tests for the downloader facade.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::archive::ArchiveBlob;
use crate::config::{Config, NamingPolicy};
use crate::error::{Error, Result};
use crate::provider::{FileFetcher, RepositoryArchiveSource, TreeProvider};
use crate::sink::DownloadSink;
use crate::types::{EntryKind, Event, ProgressKind, RepositoryCoordinate, TreeEntry};

use super::RepoDownloader;

/// Flat in-memory tree: directory listings plus file contents.
#[derive(Default)]
struct StaticTree {
    dirs: HashMap<String, Vec<TreeEntry>>,
    files: HashMap<String, Vec<u8>>,
    /// path -> fetches left that fail with a 503
    flaky: Mutex<HashMap<String, u32>>,
}

impl StaticTree {
    fn with(mut self, dir: &str, entries: &[(&str, EntryKind)]) -> Self {
        let listing = entries
            .iter()
            .map(|(name, kind)| TreeEntry::child(dir, *name, *kind))
            .collect();
        self.dirs.insert(dir.to_string(), listing);
        self
    }

    fn content(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.insert(path.to_string(), bytes.to_vec());
        self
    }

    fn flaky(self, path: &str, failures: u32) -> Self {
        self.flaky.lock().unwrap().insert(path.to_string(), failures);
        self
    }
}

#[async_trait::async_trait]
impl TreeProvider for StaticTree {
    async fn list(&self, _root: &RepositoryCoordinate, path: &str) -> Result<Vec<TreeEntry>> {
        self.dirs
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}

#[async_trait::async_trait]
impl FileFetcher for StaticTree {
    async fn fetch(&self, _root: &RepositoryCoordinate, path: &str) -> Result<Vec<u8>> {
        if let Some(left) = self.flaky.lock().unwrap().get_mut(path).filter(|left| **left > 0) {
            *left -= 1;
            return Err(Error::Http {
                status: 503,
                url: format!("memory://{path}"),
            });
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}

/// Sink that keeps saved archives in memory.
#[derive(Default)]
struct MemorySink {
    saved: Mutex<Vec<(String, ArchiveBlob)>>,
}

#[async_trait::async_trait]
impl DownloadSink for MemorySink {
    async fn save(&self, blob: &ArchiveBlob, suggested_file_name: &str) -> Result<PathBuf> {
        self.saved
            .lock()
            .unwrap()
            .push((suggested_file_name.to_string(), blob.clone()));
        Ok(PathBuf::from("/memory").join(suggested_file_name))
    }
}

/// Repository archive source serving fixed bytes, or failing when it has none.
#[derive(Default)]
struct StaticArchive {
    bytes: Option<Vec<u8>>,
    calls: AtomicUsize,
}

impl StaticArchive {
    fn serving(entries: &[(&str, &str)]) -> Self {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_directory("hello-main/", zip::write::FileOptions::default())
            .unwrap();
        for (name, content) in entries {
            writer
                .start_file(format!("hello-main/{name}"), zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        Self {
            bytes: Some(writer.finish().unwrap().into_inner()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl RepositoryArchiveSource for StaticArchive {
    async fn fetch_archive(&self, _root: &RepositoryCoordinate, _max_bytes: u64) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bytes.clone().ok_or(Error::Http {
            status: 502,
            url: "memory://archive".to_string(),
        })
    }
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config
}

fn sample_tree() -> StaticTree {
    StaticTree::default()
        .with("", &[("README.md", EntryKind::File), ("src", EntryKind::Directory)])
        .with(
            "src",
            &[
                ("a.js", EntryKind::File),
                ("b.js", EntryKind::File),
                ("util", EntryKind::Directory),
            ],
        )
        .with("src/util", &[("c.js", EntryKind::File)])
        .with("empty", &[])
        .content("README.md", b"# readme")
        .content("src/a.js", b"a")
        .content("src/b.js", b"b")
        .content("src/util/c.js", b"c")
}

fn downloader(config: Config, tree: StaticTree, sink: &Arc<MemorySink>) -> RepoDownloader {
    let tree = Arc::new(tree);
    RepoDownloader::new(config, tree.clone(), tree, sink.clone()).unwrap()
}

fn coordinate() -> RepositoryCoordinate {
    RepositoryCoordinate::new("octo", "hello", "main")
}

fn zip_names(blob: &ArchiveBlob) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(Cursor::new(blob.bytes.clone())).unwrap();
    let mut names = Vec::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).unwrap();
        let mut sink = Vec::new();
        file.read_to_end(&mut sink).unwrap();
        names.push(file.name().to_string());
    }
    names.sort();
    names
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn download_saves_archive_with_full_path_name() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);

    let summary = downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.file_name, "octo_hello_src.zip");
    assert_eq!(summary.location, PathBuf::from("/memory/octo_hello_src.zip"));
    assert_eq!(summary.result.completed_files, 3);
    assert!(summary.archive_size > 0);
    assert!(summary.elapsed() >= chrono::Duration::zero());

    let saved = sink.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(zip_names(&saved[0].1), vec!["a.js", "b.js", "util/c.js"]);
}

#[tokio::test]
async fn simple_naming_policy_uses_last_segment() {
    let mut config = fast_config();
    config.archive.naming_policy = NamingPolicy::SimpleName;
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(config, sample_tree(), &sink);

    let summary = downloader
        .download(&coordinate(), "src/util", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.file_name, "util.zip");
}

#[tokio::test]
async fn whole_repository_archive_is_named_after_reference() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);

    let summary = downloader
        .download(&coordinate(), "/", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.file_name, "hello-main.zip");
    assert_eq!(summary.result.total_files, 4);
}

#[tokio::test]
async fn events_cover_the_whole_lifecycle() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);
    let mut rx = downloader.subscribe();

    downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert!(matches!(&events[0], Event::Started { root_path, .. } if root_path == "src"));
    assert!(matches!(events.last(), Some(Event::Saved { failed_files: 0, .. })));

    let completed = events
        .iter()
        .filter(|e| matches!(e, Event::Progress(p) if p.kind == ProgressKind::FileCompleted))
        .count();
    assert_eq!(completed, 3);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::Archiving { entries: 3 }))
    );
}

#[tokio::test]
async fn partial_failure_still_saves_archive() {
    let tree = sample_tree().with(
        "src",
        &[
            ("a.js", EntryKind::File),
            ("missing.js", EntryKind::File),
        ],
    );
    let mut config = fast_config();
    config.retry.max_retries = 1;
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(config, tree, &sink);

    let summary = downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.result.completed_files, 1);
    assert_eq!(summary.result.failed_files, 1);
    assert_eq!(summary.result.failures[0].path, "src/missing.js");
    assert_eq!(zip_names(&sink.saved.lock().unwrap()[0].1), vec!["a.js"]);
}

#[tokio::test]
async fn empty_directory_is_not_found_and_nothing_is_saved() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);
    let mut rx = downloader.subscribe();

    let err = downloader
        .download(&coordinate(), "empty", CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(sink.saved.lock().unwrap().is_empty());
    assert!(matches!(drain(&mut rx).last(), Some(Event::Failed { .. })));
}

#[tokio::test]
async fn missing_root_is_not_found() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);

    let err = downloader
        .download(&coordinate(), "nope", CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn cancelled_before_start_reports_cancelled() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);
    let token = CancellationToken::new();
    token.cancel();

    let err = downloader
        .download(&coordinate(), "src", token)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(sink.saved.lock().unwrap().is_empty());
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let mut config = fast_config();
    config.fetch.concurrency = 0;
    let tree = Arc::new(sample_tree());
    let sink = Arc::new(MemorySink::default());

    let result = RepoDownloader::new(config, tree.clone(), tree, sink);

    assert!(matches!(result, Err(Error::Config { .. })));
}

#[test]
fn github_constructor_validates_config() {
    let mut config = fast_config();
    config.archive.compression_level = 11;
    assert!(RepoDownloader::github(config).is_err());

    assert!(RepoDownloader::github(fast_config()).is_ok());
}

fn zip_file(blob: &ArchiveBlob, name: &str) -> Vec<u8> {
    let mut zip = zip::ZipArchive::new(Cursor::new(blob.bytes.clone())).unwrap();
    let mut file = zip.by_name(name).unwrap();
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).unwrap();
    bytes
}

// -----------------------------------------------------------------------
// Selections
// -----------------------------------------------------------------------

#[tokio::test]
async fn selection_of_several_items_shares_one_archive() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);
    let mut rx = downloader.subscribe();
    let items = [TreeEntry::file("README.md"), TreeEntry::directory("src/util")];

    let summary = downloader
        .download_selection(&coordinate(), &items, CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.file_name.starts_with("selected_items_"));
    assert!(summary.file_name.ends_with(".zip"));
    assert_eq!(summary.result.completed_files, 2);
    assert!(summary.result.failed_items.is_empty());

    let saved = sink.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(zip_names(&saved[0].1), vec!["README.md", "util/c.js"]);

    let events = drain(&mut rx);
    assert!(matches!(
        &events[0],
        Event::SelectionStarted { paths, .. } if paths == &["README.md".to_string(), "src/util".to_string()]
    ));
    assert!(matches!(events.last(), Some(Event::Saved { .. })));
}

#[tokio::test]
async fn single_selected_directory_is_named_after_itself() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);

    let summary = downloader
        .download_selection(&coordinate(), &[TreeEntry::directory("src")], CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.file_name, "src.zip");
    assert_eq!(
        zip_names(&sink.saved.lock().unwrap()[0].1),
        vec!["src/a.js", "src/b.js", "src/util/c.js"]
    );
}

#[tokio::test]
async fn selection_counts_failed_items() {
    let mut config = fast_config();
    config.retry.max_retries = 0;
    config.retry.recovery_passes = 0;
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(config, sample_tree(), &sink);
    let items = [
        TreeEntry::file("README.md"),
        TreeEntry::file("src/missing.js"),
        TreeEntry::directory("nope"),
    ];

    let summary = downloader
        .download_selection(&coordinate(), &items, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.result.completed_files, 1);
    assert_eq!(summary.result.failed_files, 1);
    assert_eq!(
        summary.result.failed_items,
        vec!["src/missing.js".to_string(), "nope".to_string()]
    );
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(fast_config(), sample_tree(), &sink);
    let mut rx = downloader.subscribe();

    let err = downloader
        .download_selection(&coordinate(), &[], CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidPath { .. }));
    assert!(sink.saved.lock().unwrap().is_empty());
    assert!(matches!(drain(&mut rx).last(), Some(Event::Failed { .. })));
}

// -----------------------------------------------------------------------
// Recovery passes
// -----------------------------------------------------------------------

#[tokio::test]
async fn recovery_passes_pick_up_files_that_ran_out_of_retries() {
    let mut config = fast_config();
    config.retry.max_retries = 1;
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(config, sample_tree().flaky("src/b.js", 2), &sink);

    let summary = downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.result.completed_files, 3);
    assert_eq!(summary.result.failed_files, 0);
    assert!(summary.result.failures.is_empty());
    assert_eq!(
        zip_names(&sink.saved.lock().unwrap()[0].1),
        vec!["a.js", "b.js", "util/c.js"]
    );
}

#[tokio::test]
async fn without_recovery_passes_the_failure_stays() {
    let mut config = fast_config();
    config.retry.max_retries = 1;
    config.retry.recovery_passes = 0;
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(config, sample_tree().flaky("src/b.js", 2), &sink);

    let summary = downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.result.failed_files, 1);
    assert_eq!(summary.result.failures[0].path, "src/b.js");
}

// -----------------------------------------------------------------------
// Repository archive fast path
// -----------------------------------------------------------------------

#[tokio::test]
async fn repository_archive_is_used_when_enabled() {
    let mut config = fast_config();
    config.archive.use_repository_archive = true;
    let archive = Arc::new(StaticArchive::serving(&[
        ("README.md", "# readme"),
        ("src/a.js", "from archive"),
        ("src/util/c.js", "c"),
    ]));
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(config, sample_tree(), &sink).with_archive_source(archive.clone());
    let mut rx = downloader.subscribe();

    let summary = downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(archive.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.file_name, "octo_hello_src.zip");
    assert_eq!(summary.result.completed_files, 2);

    let saved = sink.saved.lock().unwrap();
    assert_eq!(zip_names(&saved[0].1), vec!["a.js", "util/c.js"]);
    assert_eq!(zip_file(&saved[0].1, "a.js"), b"from archive");

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, Event::Progress(_))));
    assert!(matches!(events.last(), Some(Event::Saved { .. })));
}

#[tokio::test]
async fn failing_repository_archive_falls_back_to_the_tree_walk() {
    let mut config = fast_config();
    config.archive.use_repository_archive = true;
    let archive = Arc::new(StaticArchive::default());
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(config, sample_tree(), &sink).with_archive_source(archive.clone());

    let summary = downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(archive.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.result.completed_files, 3);
    assert_eq!(zip_file(&sink.saved.lock().unwrap()[0].1, "a.js"), b"a");
}

#[tokio::test]
async fn missing_directory_in_repository_archive_falls_back() {
    let mut config = fast_config();
    config.archive.use_repository_archive = true;
    let archive = Arc::new(StaticArchive::serving(&[("README.md", "# readme")]));
    let sink = Arc::new(MemorySink::default());
    let downloader = downloader(config, sample_tree(), &sink).with_archive_source(archive.clone());

    let summary = downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(archive.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.result.completed_files, 3);
}

#[tokio::test]
async fn repository_archive_is_ignored_when_disabled() {
    let archive = Arc::new(StaticArchive::serving(&[("src/a.js", "from archive")]));
    let sink = Arc::new(MemorySink::default());
    let downloader =
        downloader(fast_config(), sample_tree(), &sink).with_archive_source(archive.clone());

    let summary = downloader
        .download(&coordinate(), "src", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(archive.calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.result.completed_files, 3);
    assert_eq!(zip_file(&sink.saved.lock().unwrap()[0].1, "a.js"), b"a");
}
