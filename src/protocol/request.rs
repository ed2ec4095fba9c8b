//! Request line framing and URL parsing.

use std::io;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use url::Url;

use crate::protocol::status::{Rejection, Status};

/// Longest accepted request URL, excluding the CRLF terminator.
pub const MAX_REQUEST_LENGTH: usize = 1024;

/// Characters escaped when a decoded path is written back into a URL.
const PATH_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Why a request line could not be turned into a [`Request`].
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request line exceeds {MAX_REQUEST_LENGTH} bytes")]
    TooLong,

    #[error("failed to read request: {0}")]
    Read(#[source] io::Error),

    #[error("timed out waiting for request line")]
    Timeout,

    #[error("malformed request URL: {0}")]
    Malformed(String),
}

impl RequestError {
    pub fn rejection(&self) -> Rejection {
        match self {
            RequestError::TooLong => Rejection::new(Status::BadRequest, "Request too long!"),
            RequestError::Read(_) | RequestError::Timeout => {
                Rejection::new(Status::TemporaryFailure, "Unknown error reading request!")
            }
            RequestError::Malformed(_) => Rejection::new(Status::BadRequest, "Error parsing URL!"),
        }
    }
}

/// A parsed Gemini request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Percent-decoded path with empty and `.` segments collapsed. `..`
    /// segments are kept so traversal stays visible. Every routing decision
    /// and the filesystem mapping use this string. Rewritten in place by
    /// redirects.
    pub path: String,
    /// Raw query string, without the `?`.
    pub query: Option<String>,
}

impl Request {
    /// Parse a request line. A missing scheme means `gemini`.
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        if line.trim().is_empty() {
            return Err(RequestError::Malformed("empty request".to_string()));
        }
        let (url, text) = match Url::parse(line) {
            Ok(url) => (url, line.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let text = match line.strip_prefix("//") {
                    Some(rest) => format!("gemini://{rest}"),
                    None => format!("gemini://{line}"),
                };
                let url = Url::parse(&text).map_err(|e| RequestError::Malformed(e.to_string()))?;
                (url, text)
            }
            Err(e) => return Err(RequestError::Malformed(e.to_string())),
        };

        // The parser resolves dot segments, which would hide traversal
        // attempts, so the path comes from the raw text.
        let raw_path = raw_path(&text).unwrap_or_else(|| url.path());
        let decoded = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|e| RequestError::Malformed(e.to_string()))?;
        let path = normalize_path(&decoded);

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
            port: url.port(),
            path,
            query: url.query().map(str::to_string),
        })
    }

    /// The request URL with `path` substituted for the current path.
    pub fn url_with_path(&self, path: &str) -> String {
        let mut url = format!("{}://{}", self.scheme, self.host);
        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }
        url.push_str(&encode_path(path));
        if let Some(query) = &self.query {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// Percent-encode a decoded path for use in a URL or link line.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ENCODE).to_string()
}

/// Collapse empty and `.` segments of a decoded path, keeping a trailing slash.
///
/// `//a/./b/` and `/a/b/` name the same file once joined onto the document
/// root, so they must also match the same zones, redirects and routes.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    let mut normalized = String::with_capacity(path.len());
    normalized.push('/');
    normalized.push_str(&segments.join("/"));
    let trailing = path.ends_with('/') || path.ends_with("/.");
    if trailing && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// The undecoded path component of an absolute URL with an authority.
fn raw_path(text: &str) -> Option<&str> {
    let after_scheme = &text[text.find("://")? + 3..];
    let start = after_scheme
        .find(['/', '?', '#'])
        .unwrap_or(after_scheme.len());
    let rest = &after_scheme[start..];
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Read one CRLF (or LF) terminated request line.
///
/// Never consumes more than [`MAX_REQUEST_LENGTH`] + 2 bytes from `reader`.
pub async fn read_request_line<R>(reader: &mut R) -> Result<String, RequestError>
where
    R: AsyncRead + Unpin,
{
    let limit = MAX_REQUEST_LENGTH + 2;
    let mut limited = BufReader::new(reader.take(limit as u64));
    let mut line = Vec::with_capacity(256);
    limited
        .read_until(b'\n', &mut line)
        .await
        .map_err(RequestError::Read)?;

    if line.last() != Some(&b'\n') {
        return Err(if line.len() >= limit {
            RequestError::TooLong
        } else {
            RequestError::Read(io::ErrorKind::UnexpectedEof.into())
        });
    }
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.len() > MAX_REQUEST_LENGTH {
        return Err(RequestError::TooLong);
    }

    String::from_utf8(line).map_err(|e| RequestError::Malformed(e.to_string()))
}
