//! Download sinks -- where finished archives are handed off for saving.

use std::path::{Path, PathBuf};

use crate::archive::ArchiveBlob;
use crate::config::{FileCollisionAction, OutputConfig};
use crate::error::Result;
use crate::utils::{format_bytes, get_unique_path, sanitize_filename};

/// Accepts a finished archive plus a suggested file name.
#[async_trait::async_trait]
pub trait DownloadSink: Send + Sync {
    /// Save `blob`, returning where it ended up.
    async fn save(&self, blob: &ArchiveBlob, suggested_file_name: &str) -> Result<PathBuf>;
}

/// [`DownloadSink`] that writes archives into a directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct FileSink {
    output_dir: PathBuf,
    collision: FileCollisionAction,
}

impl FileSink {
    /// Create a sink writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>, collision: FileCollisionAction) -> Self {
        Self {
            output_dir: output_dir.into(),
            collision,
        }
    }

    /// Create a sink from the output section of the configuration
    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.output_dir.clone(), config.file_collision)
    }

    /// Directory archives are written into
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait::async_trait]
impl DownloadSink for FileSink {
    async fn save(&self, blob: &ArchiveBlob, suggested_file_name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let file_name = sanitize_filename(suggested_file_name);
        let target = get_unique_path(&self.output_dir.join(file_name), self.collision)?;
        tokio::fs::write(&target, &blob.bytes).await?;

        tracing::info!(
            path = %target.display(),
            size = %format_bytes(blob.len() as u64),
            "Archive saved"
        );
        Ok(target)
    }
}
