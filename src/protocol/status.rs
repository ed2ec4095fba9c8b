//! Gemini response status codes.

use std::fmt;

/// Status codes this server emits itself.
///
/// Gateways may relay any two-digit status; those are recorded as raw `u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    RedirectTemporary,
    RedirectPermanent,
    TemporaryFailure,
    CgiError,
    PermanentFailure,
    NotFound,
    ProxyRequestRefused,
    BadRequest,
    ClientCertificateRequired,
    CertificateNotAuthorised,
    CertificateNotYetValid,
    CertificateExpired,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 20,
            Status::RedirectTemporary => 30,
            Status::RedirectPermanent => 31,
            Status::TemporaryFailure => 40,
            Status::CgiError => 42,
            Status::PermanentFailure => 50,
            Status::NotFound => 51,
            Status::ProxyRequestRefused => 53,
            Status::BadRequest => 59,
            Status::ClientCertificateRequired => 60,
            Status::CertificateNotAuthorised => 61,
            Status::CertificateNotYetValid => 64,
            Status::CertificateExpired => 65,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A response that ends the request without a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: Status,
    pub meta: String,
}

impl Rejection {
    pub fn new(status: Status, meta: impl Into<String>) -> Self {
        Self {
            status,
            meta: meta.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(Status::NotFound, "Not found!")
    }

    pub fn temporary_failure() -> Self {
        Self::new(Status::TemporaryFailure, "Temporary failure!")
    }
}

/// Parse the status of a gateway response header line (`<status> <meta>`).
///
/// Only the first line of `output` is considered. Returns `None` unless it
/// starts with exactly two ASCII digits followed by whitespace or the end of
/// the line.
pub fn parse_header_status(output: &[u8]) -> Option<u8> {
    let end = output
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(output.len());
    let line = output[..end].strip_suffix(b"\r").unwrap_or(&output[..end]);
    let token = line.split(|b| b.is_ascii_whitespace()).next()?;
    match token {
        [a @ b'1'..=b'6', b @ b'0'..=b'9'] => Some((a - b'0') * 10 + (b - b'0')),
        _ => None,
    }
}
