//! Per-connection request pipeline.
//!
//! # Responsibilities
//! - Read and parse the request line under a deadline
//! - Apply every gate in order, stopping at the first one that answers
//! - Dispatch to a gateway or to static content
//! - Produce exactly one access log record per connection
//!
//! # Data Flow
//! ```text
//! read line → parse → certificate chain → validity → scheme/host/port
//!     → path resolution → config cascade → redirects → certificate zones
//!     → SCGI → CGI → existence/permissions/sensitive files → file or directory
//! ```
//!
//! # Design Decisions
//! - The base configuration is shared and never mutated; each request
//!   cascades into its own copy
//! - Gates return a [`Rejection`]; only the pipeline writes to the client

use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::cascade::cascade;
use crate::config::schema::{LISTING_HEADER_FILE_NAME, OVERRIDE_FILE_NAME};
use crate::config::ServerConfig;
use crate::content::{is_world_readable, serve_directory, serve_file};
use crate::gateway::cgi::{locate_script, run_cgi};
use crate::gateway::scgi::{run_scgi, scgi_variables};
use crate::gateway::{gateway_variables, GatewayLimit};
use crate::observability::{AccessLogSender, LogEntry};
use crate::protocol::request::{read_request_line, Request, RequestError};
use crate::protocol::response::Responder;
use crate::protocol::status::{Rejection, Status};
use crate::routing::apply_redirects;
use crate::routing::matcher::match_prefix;
use crate::security::certificate::{enforce_validity, CertificateError, ClientCertificate};
use crate::security::path::resolve;
use crate::security::zones::authorize;

/// Error type for handler construction.
#[derive(Debug, thiserror::Error)]
#[error("document root {path} is unusable: {source}")]
pub struct DocRootError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// Shared, immutable state for answering requests.
#[derive(Debug)]
pub struct RequestHandler {
    config: Arc<ServerConfig>,
    doc_root: PathBuf,
    cgi_roots: Vec<PathBuf>,
    sensitive_paths: Vec<PathBuf>,
    access_log: AccessLogSender,
    gateway_limit: GatewayLimit,
}

impl RequestHandler {
    pub fn new(config: ServerConfig, access_log: AccessLogSender) -> Result<Self, DocRootError> {
        let doc_root = std::fs::canonicalize(&config.doc_base).map_err(|source| DocRootError {
            path: config.doc_base.clone(),
            source,
        })?;

        let cgi_roots = config
            .cgi_paths
            .iter()
            .map(|path| {
                let joined = doc_root.join(path);
                std::fs::canonicalize(&joined).unwrap_or_else(|e| {
                    tracing::warn!(path = %joined.display(), error = %e, "CGI path does not resolve");
                    joined
                })
            })
            .collect();

        let sensitive_paths = [
            Some(&config.cert_path),
            Some(&config.key_path),
            Some(&config.access_log),
            config.error_log.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter_map(|path| std::fs::canonicalize(path).ok())
        .collect();

        let gateway_limit = GatewayLimit::new(config.limits.max_gateway_processes);

        Ok(Self {
            config: Arc::new(config),
            doc_root,
            cgi_roots,
            sensitive_paths,
            access_log,
            gateway_limit,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Canonical document root.
    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    /// Answer one request on `stream`, then close it and log the outcome.
    ///
    /// `chain` is the client certificate chain from the TLS layer, or the
    /// parse failure of one of its certificates.
    pub async fn handle<S>(
        &self,
        stream: S,
        remote_addr: IpAddr,
        chain: Result<Vec<ClientCertificate>, CertificateError>,
    ) -> LogEntry
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut entry = LogEntry::new(remote_addr);
        let mut out = Responder::new(stream);

        if let Err(e) = self.respond(&mut out, remote_addr, chain, &mut entry).await {
            tracing::debug!(client = %remote_addr, error = %e, "Abandoned response after write failure");
        }
        entry.status = out.status();
        if let Err(e) = out.shutdown().await {
            tracing::debug!(client = %remote_addr, error = %e, "Failed to close connection cleanly");
        }

        self.access_log.record(entry.clone()).await;
        entry
    }

    async fn respond<S>(
        &self,
        out: &mut Responder<S>,
        remote_addr: IpAddr,
        chain: Result<Vec<ClientCertificate>, CertificateError>,
        entry: &mut LogEntry,
    ) -> std::io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let deadline = Duration::from_secs(self.config.limits.request_timeout_secs);
        let line = match tokio::time::timeout(deadline, read_request_line(out.get_mut())).await {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => return self.refuse(out, &e).await,
            Err(_) => return self.refuse(out, &RequestError::Timeout).await,
        };

        let mut request = match Request::parse(&line) {
            Ok(request) => request,
            Err(e) => return self.refuse(out, &e).await,
        };
        entry.request_url = Some(line);

        let chain = match chain {
            Ok(chain) => chain,
            Err(e) => {
                tracing::warn!(client = %remote_addr, error = %e, "Rejecting malformed client certificate");
                return out
                    .reject(&Rejection::new(Status::BadRequest, "Malformed client certificate!"))
                    .await;
            }
        };

        if let Err(rejection) = enforce_validity(&chain, chrono::Utc::now().timestamp()) {
            return out.reject(&rejection).await;
        }
        if let Err(rejection) = self.check_destination(&request) {
            return out.reject(&rejection).await;
        }

        let path = match resolve(&request.path, &self.doc_root, &self.config.home_doc_base).await {
            Ok(path) => path,
            Err(e) => {
                if e.is_unexpected() {
                    tracing::error!(path = %request.path, error = %e, "Failed to resolve request path");
                }
                return out.reject(&e.rejection()).await;
            }
        };

        let config = cascade(&self.config, &self.doc_root, &path).await;

        if let Some(redirect) = apply_redirects(&config, &mut request) {
            return out.header(redirect.status, &redirect.target).await;
        }
        if let Err(rejection) = authorize(&config.certificate_zones, &request.path, &chain) {
            return out.reject(&rejection).await;
        }

        if let Some((prefix, socket)) = match_prefix(config.scgi_paths.iter(), &request.path) {
            let vars = scgi_variables(
                gateway_variables(&config, &request, remote_addr, &chain),
                prefix,
                &request.path,
            );
            let _slot = self.gateway_limit.acquire().await;
            return run_scgi(socket, vars, out).await;
        }

        if let Some(script) = locate_script(&path, &self.cgi_roots).await {
            let vars = gateway_variables(&config, &request, remote_addr, &chain);
            let limit = Duration::from_secs(config.limits.cgi_timeout_secs);
            let _slot = self.gateway_limit.acquire().await;
            return run_cgi(&script, vars, limit, out).await;
        }

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                return out.reject(&Rejection::not_found()).await;
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to stat path");
                return out.reject(&Rejection::temporary_failure()).await;
            }
        };
        if !is_world_readable(&meta) || self.is_sensitive(&path) {
            return out.reject(&Rejection::not_found()).await;
        }

        if meta.is_dir() {
            serve_directory(&request, &path, &config, out).await
        } else {
            serve_file(&path, &config, out).await
        }
    }

    async fn refuse<S>(&self, out: &mut Responder<S>, error: &RequestError) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        tracing::debug!(error = %error, "Rejecting request line");
        out.reject(&error.rejection()).await
    }

    /// Refuse proxy requests: other schemes, hosts or ports.
    fn check_destination(&self, request: &Request) -> Result<(), Rejection> {
        if request.scheme != "gemini" {
            return Err(Rejection::new(
                Status::ProxyRequestRefused,
                "No proxying to non-Gemini content!",
            ));
        }
        let wrong_host = !request.host.eq_ignore_ascii_case(&self.config.hostname);
        let wrong_port = request.port.is_some_and(|port| port != self.config.port);
        if wrong_host || wrong_port {
            return Err(Rejection::new(
                Status::ProxyRequestRefused,
                "No proxying to other hosts or ports!",
            ));
        }
        Ok(())
    }

    /// Server secrets, logs and control files are never served.
    fn is_sensitive(&self, path: &Path) -> bool {
        if self.sensitive_paths.iter().any(|p| p == path) {
            return true;
        }
        path.file_name()
            .is_some_and(|name| name == OVERRIDE_FILE_NAME || name == LISTING_HEADER_FILE_NAME)
    }
}
