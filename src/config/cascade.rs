//! Per-directory configuration cascade.
//!
//! Override files are applied root-most first so deeper directories win.
//! The walk never leaves the document root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::schema::{OverrideFile, ServerConfig, OVERRIDE_FILE_NAME};

/// Derive the effective configuration for a resolved filesystem path.
///
/// `doc_root` must be canonical and `path` must already be contained in it.
/// The base configuration is never modified.
pub async fn cascade(base: &ServerConfig, doc_root: &Path, path: &Path) -> ServerConfig {
    let mut config = base.clone();
    if !base.read_override_files {
        return config;
    }

    for dir in ancestors_within(doc_root, path).await.iter().rev() {
        let file_path = dir.join(OVERRIDE_FILE_NAME);
        match read_override(&file_path).await {
            Ok(Some(file)) => config.apply_override(file),
            Ok(None) => {}
            Err(reason) => {
                tracing::warn!(path = %file_path.display(), %reason, "Skipping override file");
            }
        }
    }

    config
}

/// Directories from the leaf-most existing one up to `doc_root` inclusive.
async fn ancestors_within(doc_root: &Path, path: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    for dir in path.ancestors() {
        if !dir.starts_with(doc_root) {
            break;
        }
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => dirs.push(dir.to_path_buf()),
            // Files and not-yet-existing path info below a real directory.
            _ if dirs.is_empty() => {}
            _ => break,
        }
        if dir == doc_root {
            break;
        }
    }
    dirs
}

async fn read_override(path: &Path) -> Result<Option<OverrideFile>, String> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    toml::from_str(&content).map(Some).map_err(|e| e.to_string())
}
