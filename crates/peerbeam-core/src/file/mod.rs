//! File helpers for PeerBeam.
//!
//! This module handles:
//! - Reading the metadata announced before a transfer
//! - Turning an announced name into a safe output path
//! - Writing a reassembled file without clobbering existing files

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fallback MIME type when nothing better is known.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Metadata announced by the sender before any chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// File name (no directory components)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type guessed from the extension
    pub mime_type: String,
}

impl FileMetadata {
    /// Read metadata for a local file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] if the path is missing, unreadable or not a
    /// regular file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::read(&display, e))?;

        if !meta.is_file() {
            return Err(Error::read(display, "not a regular file"));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::read(&display, "path has no file name"))?;

        let mime_type = mime_guess::from_path(path)
            .first()
            .map_or_else(|| DEFAULT_MIME_TYPE.to_string(), |m| m.to_string());

        Ok(Self {
            name,
            size: meta.len(),
            mime_type,
        })
    }
}

/// Reduce an announced file name to a single safe path component.
///
/// Directory separators and parent references are stripped; an empty result
/// becomes `"download"`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "download".to_string(),
        _ => cleaned,
    }
}

/// Most suffixes tried before giving up on a name.
const MAX_NAME_SUFFIX: usize = 10_000;

/// Output paths for `name` under `dir` in the order they are tried.
///
/// `report.pdf` is followed by `report (1).pdf`, `report (2).pdf`, ...
fn output_candidates(dir: &Path, name: &str) -> impl Iterator<Item = PathBuf> {
    let name = sanitize_file_name(name);
    let as_path = Path::new(&name);
    let stem = as_path
        .file_stem()
        .map_or_else(|| name.clone(), |s| s.to_string_lossy().to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let first = dir.join(&name);
    let dir = dir.to_path_buf();
    std::iter::once(first).chain(
        (1..=MAX_NAME_SUFFIX).map(move |n| dir.join(format!("{stem} ({n}){ext}"))),
    )
}

/// Pick an output path for `name` under `dir` that does not exist yet.
///
/// `report.pdf` becomes `report (1).pdf`, `report (2).pdf`, ... on collision.
/// The answer can be stale by the time it is used; [`write_received`]
/// claims its path atomically instead.
#[must_use]
pub fn unique_output_path(dir: &Path, name: &str) -> PathBuf {
    let mut candidates = output_candidates(dir, name);
    let first = candidates.next().unwrap_or_else(|| dir.join("download"));
    if !first.exists() {
        return first;
    }
    candidates.find(|p| !p.exists()).unwrap_or(first)
}

/// Write a received file into `dir`, returning the path used.
///
/// Each candidate path is created exclusively, so a file that appears
/// concurrently is skipped rather than overwritten.
///
/// # Errors
///
/// Returns an error if the directory cannot be created, the file written,
/// or every suffixed name is taken.
pub async fn write_received(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    use tokio::io::AsyncWriteExt;

    tokio::fs::create_dir_all(dir).await?;

    for path in output_candidates(dir, name) {
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        };

        file.write_all(data).await?;
        file.flush().await?;
        tracing::debug!("Wrote {} bytes to {}", data.len(), path.display());
        return Ok(path);
    }

    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name for '{name}' in {}", dir.display()),
    )))
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
