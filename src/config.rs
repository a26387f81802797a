//! Configuration types for repo-dl

use crate::error::{Error, Result};
use crate::types::RepositoryCoordinate;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Remote endpoints and credentials for the GitHub collaborators
///
/// `Debug` output redacts the token.
#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Base URL of the REST API (default: "https://api.github.com")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL for raw file contents (default: "https://raw.githubusercontent.com")
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,

    /// Base URL serving whole-repository ZIP archives (default: "https://github.com")
    #[serde(default = "default_archive_base_url")]
    pub archive_base_url: String,

    /// Personal access token sent as a bearer token (raises API rate limits)
    #[serde(default)]
    pub token: Option<String>,

    /// User-Agent header (the GitHub API rejects requests without one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Reference used when the caller does not supply one (default: "main")
    #[serde(default = "default_reference")]
    pub default_reference: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            raw_base_url: default_raw_base_url(),
            archive_base_url: default_archive_base_url(),
            token: None,
            user_agent: default_user_agent(),
            default_reference: default_reference(),
        }
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_base_url", &self.api_base_url)
            .field("raw_base_url", &self.raw_base_url)
            .field("archive_base_url", &self.archive_base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("user_agent", &self.user_agent)
            .field("default_reference", &self.default_reference)
            .finish()
    }
}

impl GitHubConfig {
    /// Build a coordinate, falling back to `default_reference` when `reference` is `None`
    pub fn coordinate(
        &self,
        owner: impl Into<String>,
        repository: impl Into<String>,
        reference: Option<String>,
    ) -> RepositoryCoordinate {
        let reference = reference
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| self.default_reference.clone());
        RepositoryCoordinate::new(owner, repository, reference)
    }
}

/// File fetching behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Upper bound on simultaneous in-flight file fetches (default: 10)
    ///
    /// Files of one directory are fetched in batches of at most this many;
    /// a batch must fully settle before the next one starts.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for a single fetch attempt (default: 20 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Retry configuration for failed file fetches
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first failure (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay; the wait before retry `k` is `initial_delay * multiplier^k` (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    ///
    /// Jittered delays are no longer monotonic, so this is off unless the
    /// remote is shared by many concurrent clients.
    #[serde(default)]
    pub jitter: bool,

    /// Keep retrying when the remote reports the file as missing (default: true)
    ///
    /// Set to false to retry only transient errors (timeouts, 5xx, throttling),
    /// so definitive not-found responses fail immediately instead of spending
    /// the retry budget.
    #[serde(default = "default_true")]
    pub retry_not_found: bool,

    /// Extra passes over files that exhausted their retries (default: 2)
    ///
    /// Runs after the whole tree has been walked. Each pass uses three fewer
    /// concurrent fetches than the previous one, never fewer than 3.
    #[serde(default = "default_recovery_passes")]
    pub recovery_passes: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
            retry_not_found: true,
            recovery_passes: default_recovery_passes(),
        }
    }
}

/// How the output archive file is named
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    /// `{owner}_{repository}_{path_with_underscores}.zip` (default)
    #[default]
    FullPath,
    /// `{last_path_segment}.zip`
    SimpleName,
}

/// Archive construction settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// DEFLATE level 0-9, where 0 stores entries uncompressed (default: 6)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Output file naming policy
    #[serde(default)]
    pub naming_policy: NamingPolicy,

    /// Nest entries under the requested directory's own name (default: false)
    #[serde(default)]
    pub include_root_folder: bool,

    /// Try the remote's whole-repository ZIP before walking the tree (default: false)
    ///
    /// A subdirectory is cut out of the repository archive. Any failure,
    /// including an archive above `max_repository_archive_bytes`, falls back
    /// to the file-by-file walk.
    #[serde(default)]
    pub use_repository_archive: bool,

    /// Largest repository archive accepted by the fast path (default: 200 MiB)
    #[serde(default = "default_max_repository_archive_bytes")]
    pub max_repository_archive_bytes: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            naming_policy: NamingPolicy::default(),
            include_root_folder: false,
            use_repository_archive: false,
            max_repository_archive_bytes: default_max_repository_archive_bytes(),
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Skip the file, keep existing
    Skip,
}

/// Where finished archives are saved
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File collision handling
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// Main configuration for [`RepoDownloader`](crate::RepoDownloader)
///
/// Every section has defaults, so `Config::default()` is a working
/// configuration for anonymous access to public repositories.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote endpoints and credentials
    #[serde(default)]
    pub github: GitHubConfig,

    /// Concurrency and per-request deadline
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry and backoff policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Archive compression and naming
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Output location
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Check invariants that serde defaults cannot express.
    ///
    /// Runs before any I/O so that a bad value never produces partial work.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            return Err(Error::config(
                "fetch.concurrency",
                "concurrency must be at least 1",
            ));
        }
        if self.archive.compression_level > 9 {
            return Err(Error::config(
                "archive.compression_level",
                format!(
                    "compression level must be 0-9, got {}",
                    self.archive.compression_level
                ),
            ));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(Error::config(
                "retry.max_delay",
                "max_delay must not be shorter than initial_delay",
            ));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff multiplier must be >= 1.0",
            ));
        }
        validate_base_url("github.api_base_url", &self.github.api_base_url)?;
        validate_base_url("github.raw_base_url", &self.github.raw_base_url)?;
        validate_base_url("github.archive_base_url", &self.github.archive_base_url)?;
        Ok(())
    }
}

/// Base URLs must be absolute http(s) URLs.
fn validate_base_url(key: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value.trim())
        .map_err(|e| Error::config(key, format!("invalid URL {value:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::config(
            key,
            format!("unsupported URL scheme {other:?}"),
        )),
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_archive_base_url() -> String {
    "https://github.com".to_string()
}

fn default_user_agent() -> String {
    concat!("repo-dl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_reference() -> String {
    "main".to_string()
}

fn default_concurrency() -> usize {
    10
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_recovery_passes() -> u32 {
    2
}

fn default_compression_level() -> u32 {
    6
}

fn default_max_repository_archive_bytes() -> u64 {
    200 * 1024 * 1024
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.fetch.concurrency, 10);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(20));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert!(!config.retry.jitter);
        assert!(config.retry.retry_not_found);
        assert_eq!(config.archive.compression_level, 6);
        assert_eq!(config.archive.naming_policy, NamingPolicy::FullPath);
        assert_eq!(config.github.default_reference, "main");
        assert_eq!(config.github.archive_base_url, "https://github.com");
        assert_eq!(config.retry.recovery_passes, 2);
        assert!(!config.archive.use_repository_archive);
        assert_eq!(config.archive.max_repository_archive_bytes, 200 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fetch.concurrency, 10);
        assert_eq!(config.github.api_base_url, "https://api.github.com");
        assert_eq!(config.output.file_collision, FileCollisionAction::Rename);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let json = r#"{
            "fetch": { "concurrency": 4 },
            "retry": { "max_retries": 1, "max_delay": 30 },
            "archive": { "naming_policy": "simple_name" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.fetch.concurrency, 4);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(20));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.max_delay, Duration::from_secs(30));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.archive.naming_policy, NamingPolicy::SimpleName);
    }

    #[test]
    fn durations_round_trip_as_seconds() {
        let config = RetryConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["initial_delay"], 1);
        assert_eq!(json["max_delay"], 10);
    }

    #[test]
    fn negative_duration_is_rejected_by_serde() {
        let json = r#"{"initial_delay": -1}"#;
        assert!(serde_json::from_str::<RetryConfig>(json).is_err());
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let mut config = Config::default();
        config.fetch.concurrency = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("fetch.concurrency"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_compression_fails_validation() {
        let mut config = Config::default();
        config.archive.compression_level = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_delays_fail_validation() {
        let mut config = Config::default();
        config.retry.initial_delay = Duration::from_secs(30);
        config.retry.max_delay = Duration::from_secs(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn shrinking_multiplier_fails_validation() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
        config.retry.backoff_multiplier = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn repository_archive_settings_deserialize() {
        let json = r#"{
            "archive": { "use_repository_archive": true, "max_repository_archive_bytes": 1024 },
            "retry": { "recovery_passes": 0 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.archive.use_repository_archive);
        assert_eq!(config.archive.max_repository_archive_bytes, 1024);
        assert_eq!(config.archive.compression_level, 6);
        assert_eq!(config.retry.recovery_passes, 0);
    }

    #[test]
    fn blank_base_url_fails_validation() {
        let mut config = Config::default();
        config.github.raw_base_url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn coordinate_falls_back_to_default_reference() {
        let config = GitHubConfig::default();
        assert_eq!(config.coordinate("octo", "hello", None).reference, "main");
        assert_eq!(
            config
                .coordinate("octo", "hello", Some("v1.2".to_string()))
                .reference,
            "v1.2"
        );
        assert_eq!(
            config.coordinate("octo", "hello", Some(" ".to_string())).reference,
            "main"
        );
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = Config {
            github: GitHubConfig {
                token: Some("ghp_s3cret".to_string()),
                ..GitHubConfig::default()
            },
            ..Config::default()
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("ghp_s3cret"));
        assert!(shown.contains(r#"token: Some("***")"#));
        assert!(shown.contains("api.github.com"));

        let anonymous = format!("{:?}", GitHubConfig::default());
        assert!(anonymous.contains("token: None"));
    }

    #[test]
    fn non_http_base_url_fails_validation() {
        let mut config = Config::default();
        config.github.api_base_url = "ftp://api.example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key.as_deref() == Some("github.api_base_url")));

        config.github.api_base_url = "http://127.0.0.1:8080/api/".to_string();
        assert!(config.validate().is_ok());
    }
}
