//! GitHub-backed collaborators: contents API listing, raw file download and
//! whole-repository ZIP archives.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::types::{EntryKind, RepositoryCoordinate, TreeEntry};
use crate::utils::{encode_tree_path, normalize_tree_path};

use super::{FileFetcher, RepositoryArchiveSource, TreeProvider};

/// Media type recommended by the GitHub REST API
const GITHUB_JSON: &str = "application/vnd.github+json";

/// Shared HTTP client configured with the GitHub endpoints and credentials.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base_url: String,
    raw_base_url: String,
    archive_base_url: String,
}

impl GitHubClient {
    /// Build a client. `request_timeout` bounds every individual request.
    pub fn new(config: &GitHubConfig, request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::config("github.token", "token contains invalid characters"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            raw_base_url: config.raw_base_url.trim_end_matches('/').to_string(),
            archive_base_url: config.archive_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Contents API URL for a tree path (no trailing segment for the root).
    pub(crate) fn contents_url(&self, root: &RepositoryCoordinate, path: &str) -> String {
        let base = format!(
            "{}/repos/{}/{}/contents",
            self.api_base_url,
            urlencoding::encode(&root.owner),
            urlencoding::encode(&root.repository)
        );
        let encoded = encode_tree_path(path);
        if encoded.is_empty() {
            base
        } else {
            format!("{base}/{encoded}")
        }
    }

    /// Raw content URL for a file.
    ///
    /// The reference is encoded per segment so branch names such as
    /// `feature/x` keep their slash.
    pub(crate) fn raw_url(&self, root: &RepositoryCoordinate, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base_url,
            urlencoding::encode(&root.owner),
            urlencoding::encode(&root.repository),
            encode_tree_path(&root.reference),
            encode_tree_path(path)
        )
    }

    /// Whole-repository ZIP URL for the branch named by `root.reference`.
    pub(crate) fn archive_url(&self, root: &RepositoryCoordinate) -> String {
        format!(
            "{}/{}/{}/archive/refs/heads/{}.zip",
            self.archive_base_url,
            urlencoding::encode(&root.owner),
            urlencoding::encode(&root.repository),
            encode_tree_path(&root.reference)
        )
    }

    /// Query the contents API for `path`.
    async fn contents(&self, root: &RepositoryCoordinate, path: &str) -> Result<ContentsResponse> {
        let url = self.contents_url(root, path);
        tracing::debug!(url = %url, "Requesting contents listing");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, GITHUB_JSON)
            .query(&[("ref", root.reference.as_str())])
            .send()
            .await?;
        let response = check_status(response, &url, path)?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// GET a URL and return its body.
    async fn get_bytes(&self, url: &str, path: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let response = check_status(response, url, path)?;
        Ok(response.bytes().await?.to_vec())
    }

    /// GET a URL, giving up once the body is known to exceed `limit` bytes.
    async fn get_bytes_limited(&self, url: &str, path: &str, limit: u64) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let mut response = check_status(response, url, path)?;

        if let Some(size) = response.content_length().filter(|size| *size > limit) {
            return Err(Error::TooLarge { size, limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > limit {
                return Err(Error::TooLarge {
                    size: body.len() as u64,
                    limit,
                });
            }
        }
        Ok(body)
    }
}

/// Map 404 to [`Error::NotFound`] and other failures to [`Error::Http`].
fn check_status(response: reqwest::Response, url: &str, path: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        let shown = if path.is_empty() { "/" } else { path };
        return Err(Error::NotFound(shown.to_string()));
    }
    Err(Error::Http {
        status: status.as_u16(),
        url: url.to_string(),
    })
}

/// Contents API answers with an array for directories and an object for files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentItem>),
    Single(ContentItem),
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: ContentType,
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ContentType {
    File,
    Dir,
    #[serde(other)]
    Unsupported,
}

/// [`TreeProvider`] backed by the GitHub contents API.
#[derive(Clone, Debug)]
pub struct GitHubTreeProvider {
    client: GitHubClient,
}

impl GitHubTreeProvider {
    /// Create a provider using `client`
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl TreeProvider for GitHubTreeProvider {
    async fn list(&self, root: &RepositoryCoordinate, path: &str) -> Result<Vec<TreeEntry>> {
        let dir = normalize_tree_path(path);
        let items = match self.client.contents(root, dir).await? {
            ContentsResponse::Listing(items) => items,
            ContentsResponse::Single(item) => {
                return Err(Error::InvalidPath {
                    path: item.path,
                    reason: "is a file, not a directory".to_string(),
                });
            }
        };

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let kind = match item.kind {
                ContentType::File => EntryKind::File,
                ContentType::Dir => EntryKind::Directory,
                ContentType::Unsupported => {
                    tracing::debug!(path = %item.path, "Skipping symlink or submodule entry");
                    continue;
                }
            };
            entries.push(TreeEntry::child(dir, item.name, kind));
        }

        tracing::debug!(path = %dir, entries = entries.len(), "Listed directory");
        Ok(entries)
    }
}

/// [`FileFetcher`] that downloads from the raw content host, falling back to
/// the `download_url` reported by the contents API.
#[derive(Clone, Debug)]
pub struct GitHubFileFetcher {
    client: GitHubClient,
}

impl GitHubFileFetcher {
    /// Create a fetcher using `client`
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    async fn fetch_via_api(&self, root: &RepositoryCoordinate, path: &str) -> Result<Vec<u8>> {
        let item = match self.client.contents(root, path).await? {
            ContentsResponse::Single(item) => item,
            ContentsResponse::Listing(_) => {
                return Err(Error::InvalidPath {
                    path: path.to_string(),
                    reason: "is a directory, not a file".to_string(),
                });
            }
        };

        let download_url = item
            .download_url
            .ok_or_else(|| Error::Other(format!("no download URL for {path}")))?;
        tracing::debug!(path = %path, url = %download_url, "Downloading via API download_url");
        self.client.get_bytes(&download_url, path).await
    }
}

#[async_trait::async_trait]
impl FileFetcher for GitHubFileFetcher {
    async fn fetch(&self, root: &RepositoryCoordinate, path: &str) -> Result<Vec<u8>> {
        let path = normalize_tree_path(path);
        let raw_url = self.client.raw_url(root, path);

        match self.client.get_bytes(&raw_url, path).await {
            Ok(bytes) => {
                tracing::debug!(path = %path, size = bytes.len(), "Downloaded raw file");
                Ok(bytes)
            }
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "Raw download failed, trying contents API");
                self.fetch_via_api(root, path).await
            }
        }
    }
}

/// [`RepositoryArchiveSource`] backed by GitHub's `archive/refs/heads` ZIP downloads.
#[derive(Clone, Debug)]
pub struct GitHubArchiveSource {
    client: GitHubClient,
}

impl GitHubArchiveSource {
    /// Create an archive source using `client`
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl RepositoryArchiveSource for GitHubArchiveSource {
    async fn fetch_archive(&self, root: &RepositoryCoordinate, max_bytes: u64) -> Result<Vec<u8>> {
        let url = self.client.archive_url(root);
        tracing::debug!(url = %url, "Requesting repository archive");

        let bytes = self.client.get_bytes_limited(&url, "", max_bytes).await?;
        tracing::debug!(root = %root, size = bytes.len(), "Downloaded repository archive");
        Ok(bytes)
    }
}
