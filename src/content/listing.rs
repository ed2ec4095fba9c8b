//! Generated directory listings.

use std::io;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};

use crate::config::schema::LISTING_HEADER_FILE_NAME;
use crate::config::{ServerConfig, SortKey};
use crate::content::file::{serve_file, with_language, GEMINI_MIME};
use crate::content::is_world_readable;
use crate::protocol::request::{encode_path, Request};
use crate::protocol::response::Responder;
use crate::protocol::status::{Rejection, Status};

const DEFAULT_HEADING: &str = "# Directory listing\n\n";
const NAME_WIDTH: usize = 40;

/// Characters left as-is in entry links: unreserved plus path-safe sub-delims.
const NAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'=')
    .remove(b'@');

/// One listed directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
}

/// Serve a directory: redirect to add a trailing slash, serve the index
/// file if there is one, otherwise generate a listing.
pub async fn serve_directory<S>(
    request: &Request,
    dir: &Path,
    config: &ServerConfig,
    out: &mut Responder<S>,
) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if !request.path.ends_with('/') {
        let target = request.url_with_path(&format!("{}/", request.path));
        return out.header(Status::RedirectPermanent, &target).await;
    }

    let index = dir.join(format!("index.{}", config.gemini_ext));
    if let Ok(meta) = tokio::fs::metadata(&index).await {
        if meta.is_file() && is_world_readable(&meta) {
            return serve_file(&index, config, out).await;
        }
    }

    match generate_listing(&request.path, dir, config).await {
        Ok(listing) => {
            let mime = with_language(GEMINI_MIME.to_string(), config);
            out.success(&mime, listing.as_bytes()).await
        }
        Err(e) => {
            tracing::error!(dir = %dir.display(), error = %e, "Failed to generate directory listing");
            out.reject(&Rejection::temporary_failure()).await
        }
    }
}

/// Render the listing body for `dir`, reached at `url_path`.
pub async fn generate_listing(url_path: &str, dir: &Path, config: &ServerConfig) -> io::Result<String> {
    let mut listing = tokio::fs::read_to_string(dir.join(LISTING_HEADER_FILE_NAME))
        .await
        .unwrap_or_else(|_| DEFAULT_HEADING.to_string());

    if url_path != "/" {
        listing.push_str(&format!("=> {} ..\n", encode_path(&parent_url(url_path))));
    }

    let mut entries = read_entries(dir).await?;
    sort_entries(&mut entries, config.directory_sort, config.directory_reverse);

    for entry in &entries {
        let label = entry_label(entry, dir, config).await;
        let link = utf8_percent_encode(&entry.name, NAME_ESCAPE);
        listing.push_str(&format!("=> {link} {label}\n"));
    }
    Ok(listing)
}

/// Visible entries: no dotfiles, world-readable only.
async fn read_entries(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(dir_entry) = reader.next_entry().await? {
        let Ok(name) = dir_entry.file_name().into_string() else {
            tracing::debug!(dir = %dir.display(), "Skipping entry with non UTF-8 name");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        // Follows symlinks; dangling links are not listed.
        let Ok(meta) = tokio::fs::metadata(dir_entry.path()).await else {
            continue;
        };
        if !is_world_readable(&meta) {
            continue;
        }
        entries.push(Entry {
            name,
            is_dir: meta.is_dir(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(entries)
}

/// Stable sort ascending by `key`, then reversed if requested.
pub fn sort_entries(entries: &mut [Entry], key: SortKey, reverse: bool) {
    match key {
        SortKey::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
        SortKey::Size => entries.sort_by_key(|e| e.size),
        SortKey::Time => entries.sort_by_key(|e| e.modified),
    }
    if reverse {
        entries.reverse();
    }
}

/// URL path of the parent directory, with a trailing slash.
fn parent_url(url_path: &str) -> String {
    let trimmed = url_path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => format!("{}/", &trimmed[..i]),
    }
}

async fn entry_label(entry: &Entry, dir: &Path, config: &ServerConfig) -> String {
    let mut name = entry.name.clone();
    if config.directory_titles && !entry.is_dir {
        let extension = Path::new(&entry.name).extension().and_then(|e| e.to_str());
        if extension == Some(config.gemini_ext.as_str()) {
            if let Some(title) = read_heading(&dir.join(&entry.name)).await {
                name = title;
            }
        }
    }
    format_label(&name, entry)
}

pub fn format_label(display_name: &str, entry: &Entry) -> String {
    let mut name = if display_name.chars().count() > NAME_WIDTH {
        let mut cut: String = display_name.chars().take(NAME_WIDTH - 4).collect();
        cut.push_str("...");
        cut
    } else {
        display_name.to_string()
    };
    if entry.is_dir {
        name.push('/');
    }
    let date = DateTime::<Utc>::from(entry.modified).format("%b %e %Y");
    format!("{name:<width$}    {}   {date}", size_label(entry), width = NAME_WIDTH)
}

/// Fixed-width, eight-column human size.
pub fn size_label(entry: &Entry) -> String {
    const KIB: u64 = 1 << 10;
    let size = entry.size;
    if entry.is_dir {
        " ".repeat(8)
    } else if size < KIB {
        format!("{size:4}   B")
    } else if size < KIB << 10 {
        format!("{:4} KiB", size >> 10)
    } else if size < KIB << 20 {
        format!("{:4} MiB", size >> 20)
    } else if size < KIB << 30 {
        format!("{:4} GiB", size >> 30)
    } else if size < KIB << 40 {
        format!("{:4} TiB", size >> 40)
    } else {
        "GIGANTIC".to_string()
    }
}

/// First `# ` heading of a Gemini document.
async fn read_heading(path: &Path) -> Option<String> {
    let file = tokio::fs::File::open(path).await.ok()?;
    let mut lines = BufReader::new(file).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(title) = line.strip_prefix("# ") {
            return Some(title.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(name: &str, size: u64, age_secs: u64) -> Entry {
        Entry {
            name: name.to_string(),
            is_dir: false,
            size,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 - age_secs),
        }
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn sorts_by_each_key() {
        let mut entries = vec![entry("b", 10, 5), entry("a", 30, 1), entry("c", 20, 9)];
        sort_entries(&mut entries, SortKey::Name, false);
        assert_eq!(names(&entries), ["a", "b", "c"]);
        sort_entries(&mut entries, SortKey::Size, false);
        assert_eq!(names(&entries), ["b", "c", "a"]);
        sort_entries(&mut entries, SortKey::Time, false);
        assert_eq!(names(&entries), ["c", "b", "a"]);
    }

    #[test]
    fn reverse_reverses_relative_order() {
        let base = vec![entry("x", 1, 0), entry("y", 1, 0), entry("z", 2, 0)];
        let mut forward = base.clone();
        sort_entries(&mut forward, SortKey::Size, false);
        let mut backward = base;
        sort_entries(&mut backward, SortKey::Size, true);

        let mut reversed = names(&forward);
        reversed.reverse();
        assert_eq!(names(&backward), reversed);
    }

    #[test]
    fn size_labels() {
        let mut e = entry("f", 0, 0);
        for (size, label) in [
            (0, "   0   B"),
            (1023, "1023   B"),
            (1024, "   1 KiB"),
            (5 << 20, "   5 MiB"),
            (3 << 30, "   3 GiB"),
            (7 << 40, "   7 TiB"),
            (1 << 50, "GIGANTIC"),
        ] {
            e.size = size;
            assert_eq!(size_label(&e), label);
        }
        e.is_dir = true;
        assert_eq!(size_label(&e), "        ");
    }

    #[test]
    fn label_layout_and_truncation() {
        let e = entry("notes.gmi", 12, 0);
        let label = format_label("notes.gmi", &e);
        assert_eq!(label, format!("{:<40}      12   B   Sep 13 2020", "notes.gmi"));

        let long = "x".repeat(50);
        let label = format_label(&long, &e);
        assert!(label.starts_with(&format!("{}...    ", "x".repeat(36))));

        let mut d = entry("sub", 4096, 0);
        d.is_dir = true;
        assert!(format_label("sub", &d).starts_with("sub/ "));
    }

    #[test]
    fn parent_links() {
        assert_eq!(parent_url("/a/b/"), "/a/");
        assert_eq!(parent_url("/a/"), "/");
        assert_eq!(parent_url("/~alice/"), "/");
    }
}
