//! Remote tree collaborators -- directory listing and file content retrieval.
//!
//! The pipeline only depends on the two traits defined here:
//! - [`TreeProvider`] lists the immediate entries of a directory
//! - [`FileFetcher`] returns the raw bytes of one file
//!
//! [`RepositoryArchiveSource`] is an optional third seam used by the
//! whole-repository archive fast path.
//!
//! [`github`] provides implementations backed by the GitHub contents API and
//! raw content host.

pub mod github;

use crate::error::Result;
use crate::types::{RepositoryCoordinate, TreeEntry};

pub use github::{GitHubArchiveSource, GitHubClient, GitHubFileFetcher, GitHubTreeProvider};

/// Abstraction over directory listing, enabling testability.
#[async_trait::async_trait]
pub trait TreeProvider: Send + Sync {
    /// List the immediate entries (files and subdirectories) at `path`.
    ///
    /// `path` is tree-relative; the empty string is the root. Every returned
    /// entry's path is `path + "/" + name` (or just `name` at the root).
    async fn list(&self, root: &RepositoryCoordinate, path: &str) -> Result<Vec<TreeEntry>>;
}

/// Abstraction over file content retrieval, enabling testability.
#[async_trait::async_trait]
pub trait FileFetcher: Send + Sync {
    /// Fetch the raw content of the file at tree-relative `path`.
    async fn fetch(&self, root: &RepositoryCoordinate, path: &str) -> Result<Vec<u8>>;
}

/// Abstraction over whole-repository archive downloads.
#[async_trait::async_trait]
pub trait RepositoryArchiveSource: Send + Sync {
    /// Fetch the ZIP archive of the whole tree at `root`.
    ///
    /// Fails with [`Error::TooLarge`](crate::Error::TooLarge) as soon as the
    /// archive is known to exceed `max_bytes`.
    async fn fetch_archive(&self, root: &RepositoryCoordinate, max_bytes: u64) -> Result<Vec<u8>>;
}
