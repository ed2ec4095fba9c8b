//! Static content subsystem.
//!
//! # Data Flow
//! ```text
//! Existing, world-readable, non-sensitive path
//!     → directory? → listing.rs (slash redirect, index file, generated listing)
//!     → file?      → file.rs (MIME resolution, read, `20 <mime>` + body)
//! ```

pub mod file;
pub mod listing;

use std::fs::Metadata;
use std::os::unix::fs::PermissionsExt;

pub use file::{resolve_mime, serve_file};
pub use listing::serve_directory;

/// Readable by owner, group and others.
pub fn is_world_readable(meta: &Metadata) -> bool {
    meta.permissions().mode() & 0o444 == 0o444
}
