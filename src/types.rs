//! Core types for repo-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies a remote versioned file tree
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryCoordinate {
    /// Account or organization owning the repository
    pub owner: String,
    /// Repository name
    pub repository: String,
    /// Branch, tag or commit
    pub reference: String,
}

impl RepositoryCoordinate {
    /// Create a new coordinate
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
            reference: reference.into(),
        }
    }
}

impl std::fmt::Display for RepositoryCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repository, self.reference)
    }
}

/// Kind of a tree entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// One file or directory record returned by a directory listing
///
/// `path` is relative to the tree root, forward-slash delimited and never
/// starts with a slash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Last path segment
    pub name: String,
    /// Path relative to the tree root
    pub path: String,
    /// File or directory
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Build an entry under `parent`, deriving its path from the parent path and name.
    pub fn child(parent: &str, name: impl Into<String>, kind: EntryKind) -> Self {
        let name = name.into();
        let path = crate::utils::join_tree_path(parent, &name);
        Self { name, path, kind }
    }

    /// A file entry at tree-relative `path`, named after its last segment.
    pub fn file(path: impl Into<String>) -> Self {
        Self::at(path.into(), EntryKind::File)
    }

    /// A directory entry at tree-relative `path`, named after its last segment.
    pub fn directory(path: impl Into<String>) -> Self {
        Self::at(path.into(), EntryKind::Directory)
    }

    fn at(path: String, kind: EntryKind) -> Self {
        let path = crate::utils::normalize_tree_path(&path).to_string();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self { name, path, kind }
    }

    /// Returns true for file entries
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Result of attempting one file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Tree-relative path of the file
    pub path: String,
    /// Whether the file ended up in the archive
    pub succeeded: bool,
    /// Last error message for failed files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadOutcome {
    /// Successful outcome
    pub fn success(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            succeeded: true,
            error: None,
        }
    }

    /// Failed outcome with the error that caused it
    pub fn failure(path: impl Into<String>, error: impl ToString) -> Self {
        Self {
            path: path.into(),
            succeeded: false,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate result of one pipeline run
///
/// `completed_files + failed_files == total_files` holds whenever a batch has settled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Files attempted
    pub total_files: u64,
    /// Files written to the archive
    pub completed_files: u64,
    /// Files that exhausted their retries or could not be archived
    pub failed_files: u64,
    /// One outcome per failed file
    pub failures: Vec<DownloadOutcome>,
    /// Directories whose listing failed (their subtree contributed nothing)
    pub skipped_directories: Vec<String>,
    /// True when the run stopped early because it was cancelled
    pub cancelled: bool,
    /// Selected entries that contributed no file (selection downloads only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<String>,
}

impl PipelineResult {
    /// Returns true when every attempted file succeeded and the run was not cut short
    pub fn is_complete(&self) -> bool {
        self.failed_files == 0 && self.skipped_directories.is_empty() && !self.cancelled
    }

    /// Fold a subtree's tally into this result.
    pub(crate) fn absorb(&mut self, tally: DirectoryTally) {
        self.total_files += tally.total;
        self.completed_files += tally.completed;
        self.failed_files += tally.failed;
    }
}

/// File counts for one directory subtree, summed bottom-up
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct DirectoryTally {
    pub(crate) total: u64,
    pub(crate) completed: u64,
    pub(crate) failed: u64,
}

impl std::ops::AddAssign for DirectoryTally {
    fn add_assign(&mut self, rhs: Self) {
        self.total += rhs.total;
        self.completed += rhs.completed;
        self.failed += rhs.failed;
    }
}

/// What a progress event reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Traversal entered a directory
    EnteredDirectory,
    /// A file was written to the archive
    FileCompleted,
    /// A file exhausted its retries or could not be archived
    FileFailed,
    /// A directory could not be listed; its subtree is skipped
    DirectoryListFailed,
}

/// Progress record delivered to the pipeline's observer
///
/// Counters are cumulative over the whole run. `total` counts files attempted
/// so far, so `completed + failed == total` after every file event. A file
/// recovered by a later pass moves from `failed` to `completed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Event kind
    pub kind: ProgressKind,
    /// Tree-relative path of the file or directory concerned
    pub path: String,
    /// Files completed so far
    pub completed: u64,
    /// Files failed so far
    pub failed: u64,
    /// Files attempted so far
    pub total: u64,
    /// Files discovered in listings so far (>= total)
    pub discovered: u64,
    /// Error message for failure kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Percentage of discovered files that have settled (0.0 to 100.0)
    pub fn percent(&self) -> f32 {
        if self.discovered == 0 {
            return 0.0;
        }
        ((self.completed + self.failed) as f32 / self.discovered as f32 * 100.0).min(100.0)
    }
}

/// Events broadcast by [`RepoDownloader`](crate::RepoDownloader)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A download run started
    Started {
        /// Repository being downloaded
        root: RepositoryCoordinate,
        /// Requested directory ("" for the whole tree)
        root_path: String,
    },

    /// A selection download started
    SelectionStarted {
        /// Repository being downloaded
        root: RepositoryCoordinate,
        /// Selected tree paths
        paths: Vec<String>,
    },

    /// Pipeline progress
    Progress(ProgressEvent),

    /// All files settled; the archive is being serialized
    Archiving {
        /// Number of entries going into the archive
        entries: u64,
    },

    /// The archive was handed to the sink
    Saved {
        /// Suggested file name
        file_name: String,
        /// Where the sink put it
        location: PathBuf,
        /// Archive size in bytes
        size_bytes: u64,
        /// Files that could not be included
        failed_files: u64,
    },

    /// The run failed before an archive could be saved
    Failed {
        /// Error message
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_entry_joins_paths() {
        let root = TreeEntry::child("", "README.md", EntryKind::File);
        assert_eq!(root.path, "README.md");

        let nested = TreeEntry::child("src", "a.js", EntryKind::File);
        assert_eq!(nested.path, "src/a.js");

        let dir = TreeEntry::child("src/", "util", EntryKind::Directory);
        assert_eq!(dir.path, "src/util");
        assert!(!dir.is_file());
    }

    #[test]
    fn selection_entries_take_their_last_segment_as_name() {
        let file = TreeEntry::file("/docs/guide.md");
        assert_eq!(file.path, "docs/guide.md");
        assert_eq!(file.name, "guide.md");
        assert!(file.is_file());

        let dir = TreeEntry::directory("src/util/");
        assert_eq!(dir.name, "util");
        assert_eq!(dir.kind, EntryKind::Directory);
    }

    #[test]
    fn coordinate_display() {
        let coord = RepositoryCoordinate::new("octo", "hello", "main");
        assert_eq!(coord.to_string(), "octo/hello@main");
    }

    #[test]
    fn result_completeness() {
        let mut result = PipelineResult::default();
        assert!(result.is_complete());

        result.absorb(DirectoryTally {
            total: 3,
            completed: 2,
            failed: 1,
        });
        assert_eq!(result.total_files, 3);
        assert!(!result.is_complete());
    }

    #[test]
    fn tally_add_assign_sums_fields() {
        let mut a = DirectoryTally {
            total: 2,
            completed: 2,
            failed: 0,
        };
        a += DirectoryTally {
            total: 3,
            completed: 1,
            failed: 2,
        };
        assert_eq!(
            a,
            DirectoryTally {
                total: 5,
                completed: 3,
                failed: 2
            }
        );
    }

    #[test]
    fn progress_percent_uses_discovered() {
        let event = ProgressEvent {
            kind: ProgressKind::FileCompleted,
            path: "a".to_string(),
            completed: 1,
            failed: 1,
            total: 2,
            discovered: 4,
            error: None,
        };
        assert!((event.percent() - 50.0).abs() < f32::EPSILON);

        let empty = ProgressEvent {
            discovered: 0,
            ..event
        };
        assert_eq!(empty.percent(), 0.0);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Archiving { entries: 3 };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["type"], "archiving");
        assert_eq!(json["entries"], 3);
    }
}
