//! URL path → filesystem path resolution.
//!
//! # Responsibilities
//! - Refuse any path containing `..` before the filesystem is touched
//! - Map `/~user/rest` into the home directory tree
//! - Resolve symlinks and refuse anything that lands outside the document root
//!
//! # Design Decisions
//! - Only the longest existing prefix is canonicalised; the missing
//!   remainder is re-appended so CGI path info survives resolution
//! - Not-found and permission problems never reveal more than "not found"

use std::ffi::OsString;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::protocol::status::{Rejection, Status};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path contains a parent directory reference")]
    Traversal,

    #[error("path resolves outside the document root")]
    OutsideRoot,

    #[error("failed to resolve path: {0}")]
    Io(#[from] io::Error),
}

impl PathError {
    pub fn rejection(&self) -> Rejection {
        match self {
            PathError::Traversal => Rejection::new(
                Status::PermanentFailure,
                "Your directory traversal technique has been defeated!",
            ),
            PathError::OutsideRoot => Rejection::not_found(),
            PathError::Io(e) if is_hidden_error(e) => Rejection::not_found(),
            PathError::Io(_) => Rejection::temporary_failure(),
        }
    }

    /// Whether operators should hear about this failure.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, PathError::Io(e) if !is_hidden_error(e))
    }
}

/// Errors reported to clients as plain "not found".
pub fn is_hidden_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::NotADirectory
            | ErrorKind::InvalidInput
    )
}

/// Join a decoded URL path onto the document root without touching the filesystem.
pub fn map_url_path(url_path: &str, doc_root: &Path, home_dir: &str) -> Result<PathBuf, PathError> {
    if url_path.contains("..") {
        return Err(PathError::Traversal);
    }

    let mapped = match url_path.strip_prefix("/~") {
        Some(rest) => {
            let (user, remainder) = rest.split_once('/').unwrap_or((rest, ""));
            let mut path = doc_root.join(home_dir);
            if !user.is_empty() {
                path.push(user);
            }
            if !remainder.is_empty() {
                path.push(remainder);
            }
            path
        }
        None => doc_root.join(url_path.trim_start_matches('/')),
    };
    Ok(mapped)
}

/// Resolve a decoded URL path to a filesystem path contained in `doc_root`.
///
/// `doc_root` must be canonical. The returned path may not exist.
pub async fn resolve(url_path: &str, doc_root: &Path, home_dir: &str) -> Result<PathBuf, PathError> {
    let mapped = map_url_path(url_path, doc_root, home_dir)?;
    let resolved = canonicalize_existing(&mapped).await?;
    if !resolved.starts_with(doc_root) {
        tracing::warn!(
            requested = url_path,
            resolved = %resolved.display(),
            "Path escapes document root"
        );
        return Err(PathError::OutsideRoot);
    }
    Ok(resolved)
}

/// Canonicalise the longest existing prefix of `path` and re-append the rest.
async fn canonicalize_existing(path: &Path) -> Result<PathBuf, PathError> {
    let mut existing = path;
    let mut missing: Vec<OsString> = Vec::new();
    let canonical = loop {
        match tokio::fs::canonicalize(existing).await {
            Ok(canonical) => break canonical,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }
    };

    let mut resolved = canonical;
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
