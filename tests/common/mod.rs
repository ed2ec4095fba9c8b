//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use gemini_capsule::config::ServerConfig;
use gemini_capsule::observability::access_log;
use gemini_capsule::observability::LogEntry;
use gemini_capsule::protocol::RequestHandler;
use gemini_capsule::security::{CertificateError, ClientCertificate};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

pub const CLIENT_ADDR: &str = "192.0.2.10";

/// A temporary document root and the configuration serving it.
pub struct Capsule {
    _dir: TempDir,
    pub root: PathBuf,
    pub config: ServerConfig,
}

impl Capsule {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = ServerConfig::default();
        config.doc_base = root.clone();
        config.access_log = root.join("access.log");
        Self {
            _dir: dir,
            root,
            config,
        }
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.root.join(rel);
        fs::create_dir_all(&path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// World-readable file, parents created as needed.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        self.write_mode(rel, content, 0o644)
    }

    pub fn write_mode(&self, rel: &str, content: &str, mode: u32) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).unwrap();
                fs::set_permissions(parent, fs::Permissions::from_mode(0o755)).unwrap();
            }
        }
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    pub fn script(&self, rel: &str, body: &str) -> PathBuf {
        self.write_mode(rel, body, 0o755)
    }

    pub fn handler(&self) -> Server {
        let (sender, log) = access_log::channel(64);
        let handler = RequestHandler::new(self.config.clone(), sender).unwrap();
        Server { handler, _log: log }
    }
}

/// A request handler plus the receiving end of its access log.
pub struct Server {
    pub handler: RequestHandler,
    _log: mpsc::Receiver<LogEntry>,
}

/// What the client saw, plus the access log record.
#[derive(Debug)]
pub struct Reply {
    /// Header line without CRLF; empty when nothing was sent.
    pub header: String,
    pub body: Vec<u8>,
    pub entry: LogEntry,
}

impl Reply {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Server {
    /// Send `line` plus CRLF without a client certificate.
    pub async fn get(&self, line: &str) -> Reply {
        self.exchange(format!("{line}\r\n").as_bytes(), Ok(Vec::new())).await
    }

    pub async fn get_with(&self, line: &str, chain: Vec<ClientCertificate>) -> Reply {
        self.exchange(format!("{line}\r\n").as_bytes(), Ok(chain)).await
    }

    /// Send raw bytes, then close the client's write side.
    pub async fn exchange(
        &self,
        raw: &[u8],
        chain: Result<Vec<ClientCertificate>, CertificateError>,
    ) -> Reply {
        let (mut client, server) = tokio::io::duplex(1 << 20);
        client.write_all(raw).await.unwrap();
        client.shutdown().await.unwrap();

        let addr: IpAddr = CLIENT_ADDR.parse().unwrap();
        let entry = self.handler.handle(server, addr, chain).await;

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        let (header, body) = match output.windows(2).position(|w| w == b"\r\n") {
            Some(end) => (
                String::from_utf8_lossy(&output[..end]).into_owned(),
                output[end + 2..].to_vec(),
            ),
            None => (String::from_utf8_lossy(&output).into_owned(), Vec::new()),
        };
        Reply {
            header,
            body,
            entry,
        }
    }
}

/// A certificate valid from the epoch until 2096.
pub fn certificate(fingerprint: &str) -> ClientCertificate {
    certificate_valid(fingerprint, 0, 4_000_000_000)
}

pub fn certificate_valid(fingerprint: &str, not_before: i64, not_after: i64) -> ClientCertificate {
    ClientCertificate {
        fingerprint: fingerprint.to_string(),
        not_before,
        not_after,
        issuer: "CN=tester".to_string(),
        issuer_cn: "tester".to_string(),
        subject: "CN=tester".to_string(),
        subject_cn: "tester".to_string(),
    }
}

/// Fingerprint-shaped string built from one repeated hex digit.
pub fn fingerprint(digit: char) -> String {
    std::iter::repeat(digit).take(64).collect()
}
