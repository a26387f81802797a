//! Utility functions for file naming and path manipulation

use crate::config::{FileCollisionAction, NamingPolicy};
use crate::error::{Error, Result};
use crate::types::{RepositoryCoordinate, TreeEntry};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Maximum length in bytes of a sanitized file name
const MAX_FILENAME_BYTES: usize = 255;

/// Join a tree-relative directory path and an entry name with a single `/`.
///
/// The root directory is the empty string, so its children have no prefix.
pub fn join_tree_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_matches('/');
    let name = name.trim_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Strip leading and trailing slashes from a requested tree path.
pub fn normalize_tree_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Percent-encode each segment of a tree path separately, keeping the `/` separators.
///
/// Segments that are already percent-encoded are decoded first, so
/// `my%20notes` stays `my%20notes` instead of becoming `my%2520notes`.
/// A segment that does not decode to UTF-8 is encoded as given.
pub fn encode_tree_path(path: &str) -> String {
    normalize_tree_path(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let decoded = urlencoding::decode(segment).unwrap_or(std::borrow::Cow::Borrowed(segment));
            urlencoding::encode(&decoded).into_owned()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Map a tree-relative file path to the path it is stored under in the archive.
///
/// The requested root path is stripped, so selecting `a` turns `a/b/c.txt`
/// into `b/c.txt`. With `include_root_folder` the root's own last segment is
/// kept as the single top-level folder (`a/b/c.txt` → `a/b/c.txt` for root
/// `x/a`). The result is validated with [`sanitize_archive_path`].
pub fn archive_relative_path(
    file_path: &str,
    root_path: &str,
    include_root_folder: bool,
) -> Result<String> {
    let file_path = normalize_tree_path(file_path);
    let root_path = normalize_tree_path(root_path);

    let relative = if root_path.is_empty() {
        file_path
    } else {
        match file_path.strip_prefix(root_path) {
            Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
            _ => {
                return Err(Error::InvalidPath {
                    path: file_path.to_string(),
                    reason: format!("not located under {root_path}"),
                });
            }
        }
    };

    let joined = match root_path.rsplit('/').next() {
        Some(root_name) if include_root_folder && !root_name.is_empty() => {
            join_tree_path(root_name, relative)
        }
        _ => relative.to_string(),
    };

    sanitize_archive_path(&joined)
}

/// Normalize an archive entry path.
///
/// Backslashes become `/`, empty and `.` segments are dropped. Parent
/// references and NUL bytes are rejected, as is a path with nothing left.
pub fn sanitize_archive_path(path: &str) -> Result<String> {
    if path.contains('\0') {
        return Err(Error::InvalidPath {
            path: path.escape_default().to_string(),
            reason: "contains a NUL byte".to_string(),
        });
    }

    let unified = path.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(Error::InvalidPath {
                    path: path.to_string(),
                    reason: "parent directory references are not allowed".to_string(),
                });
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: "empty path".to_string(),
        });
    }

    Ok(segments.join("/"))
}

/// Make a string safe to use as a file name on common filesystems.
///
/// Reserved characters (`<>:"/\|?*`) and control characters become `_`,
/// leading and trailing dots are trimmed and the result is capped at 255
/// bytes. An empty result falls back to `download.zip`.
///
/// # Examples
///
/// ```
/// use repo_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("a/b:c.zip"), "a_b_c.zip");
/// assert_eq!(sanitize_filename("..hidden.."), "hidden");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches('.');

    let mut end = trimmed.len().min(MAX_FILENAME_BYTES);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let capped = &trimmed[..end];

    if capped.is_empty() {
        "download.zip".to_string()
    } else {
        capped.to_string()
    }
}

/// Suggested archive file name for a download.
///
/// - whole repository → `{repository}-{reference}.zip`
/// - [`NamingPolicy::SimpleName`] → `{last segment}.zip`
/// - [`NamingPolicy::FullPath`] → `{owner}_{repository}_{path_with_underscores}.zip`
pub fn archive_file_name(
    root: &RepositoryCoordinate,
    root_path: &str,
    policy: NamingPolicy,
) -> String {
    let root_path = normalize_tree_path(root_path);
    let name = if root_path.is_empty() {
        format!("{}-{}.zip", root.repository, root.reference)
    } else {
        match policy {
            NamingPolicy::SimpleName => {
                let last = root_path.rsplit('/').next().unwrap_or(root_path);
                format!("{last}.zip")
            }
            NamingPolicy::FullPath => format!(
                "{}_{}_{}.zip",
                root.owner,
                root.repository,
                root_path.replace('/', "_")
            ),
        }
    };
    sanitize_filename(&name)
}

/// Suggested archive file name for a selection download.
///
/// A single item is named after itself (`{name}.zip`); several items share
/// `selected_items_{timestamp_millis}.zip`.
pub fn selection_file_name(items: &[TreeEntry], timestamp_millis: i64) -> String {
    match items {
        [single] if !single.name.is_empty() => sanitize_filename(&format!("{}.zip", single.name)),
        [_] => "download.zip".to_string(),
        _ => format!("selected_items_{timestamp_millis}.zip"),
    }
}

/// Human-readable byte count (`"1.5 KB"`).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Get a unique path for a file, handling collisions according to the specified action
///
/// For Rename, ` (1)`, ` (2)`, … is inserted before the extension until an
/// unused name is found. For Skip, an existing file is an error. Overwrite
/// returns the path unchanged.
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::InvalidPath {
                    path: path.display().to_string(),
                    reason: "file already exists and collision action is Skip".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::InvalidPath {
                    path: path.display().to_string(),
                    reason: "invalid file stem".to_string(),
                })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().unwrap_or_else(|| Path::new(""));

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let candidate_name = match extension {
                    Some(ext) => format!("{stem} ({i}).{ext}"),
                    None => format!("{stem} ({i})"),
                };
                let candidate = parent.join(candidate_name);
                if !candidate.exists() {
                    return Ok(candidate);
                }
            }

            Err(Error::InvalidPath {
                path: path.display().to_string(),
                reason: format!("no unique name found after {MAX_RENAME_ATTEMPTS} attempts"),
            })
        }
    }
}
