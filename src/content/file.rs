//! Static file responses.

use std::ffi::OsStr;
use std::io;
use std::path::Path;

use tokio::io::AsyncWrite;

use crate::config::ServerConfig;
use crate::protocol::response::Responder;
use crate::protocol::status::Status;
use crate::routing::matcher::compile_pattern;

pub const GEMINI_MIME: &str = "text/gemini";
const FALLBACK_MIME: &str = "application/octet-stream";

/// Resolve the MIME type for a file.
///
/// Order: configured Gemini extension, extension table, then path overrides
/// (last match wins), then the generic fallback.
pub fn resolve_mime(path: &Path, config: &ServerConfig) -> String {
    let extension = path.extension().and_then(OsStr::to_str);
    let mut mime = if extension == Some(config.gemini_ext.as_str()) {
        Some(GEMINI_MIME.to_string())
    } else {
        mime_guess::from_path(path).first_raw().map(str::to_string)
    };

    let path_text = path.to_string_lossy();
    for (pattern, override_mime) in config.mime_overrides.iter() {
        if compile_pattern(pattern, "mime_overrides").is_some_and(|re| re.is_match(&path_text)) {
            mime = Some(override_mime.clone());
        }
    }

    with_language(mime.unwrap_or_else(|| FALLBACK_MIME.to_string()), config)
}

/// Append `; lang=` to Gemini text when a default language is configured.
pub fn with_language(mut mime: String, config: &ServerConfig) -> String {
    if mime == GEMINI_MIME && !config.default_lang.is_empty() {
        mime.push_str("; lang=");
        mime.push_str(&config.default_lang);
    }
    mime
}

/// Serve a file that has already passed existence and permission checks.
///
/// The body is read before the header is written, so a read failure still
/// produces a clean `50`.
pub async fn serve_file<S>(path: &Path, config: &ServerConfig, out: &mut Responder<S>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mime = resolve_mime(path, config);
    match tokio::fs::read(path).await {
        Ok(body) => out.success(&mime, &body).await,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read file");
            out.header(Status::PermanentFailure, "Error!").await
        }
    }
}
