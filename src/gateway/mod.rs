//! Gateway subsystem: dynamic content from external programs.
//!
//! # Data Flow
//! ```text
//! Request that passed redirects and certificate zones
//!     → scgi.rs  (URL prefix routed to a Unix socket, response streamed)
//!     → cgi.rs   (executable under a CGI root, output captured then relayed)
//!     → neither  → static content
//! ```
//!
//! # Design Decisions
//! - Both gateways see the same variable set (this module)
//! - Every gateway failure is status 42; details only reach the operator log
//! - Gateway concurrency is unbounded unless `max_gateway_processes` is set

pub mod cgi;
pub mod scgi;

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ServerConfig;
use crate::protocol::request::Request;
use crate::security::certificate::ClientCertificate;

/// Value of `SERVER_SOFTWARE`.
pub const SERVER_SOFTWARE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Ordered `NAME=value` pairs handed to a gateway.
pub type Variables = Vec<(&'static str, String)>;

/// Variables common to CGI and SCGI.
///
/// TLS variables describe the first certificate of the chain and are only
/// present when the client sent one.
pub fn gateway_variables(
    config: &ServerConfig,
    request: &Request,
    remote_addr: IpAddr,
    chain: &[ClientCertificate],
) -> Variables {
    let mut vars = vec![
        ("QUERY_STRING", request.query.clone().unwrap_or_default()),
        ("REMOTE_ADDR", remote_addr.to_string()),
        ("REQUEST_METHOD", String::new()),
        ("SERVER_NAME", config.hostname.clone()),
        ("SERVER_PORT", config.port.to_string()),
        ("SERVER_PROTOCOL", "GEMINI".to_string()),
        ("SERVER_SOFTWARE", SERVER_SOFTWARE.to_string()),
    ];
    if let Some(cert) = chain.first() {
        vars.extend([
            ("TLS_CLIENT_HASH", cert.fingerprint.clone()),
            ("TLS_CLIENT_ISSUER", cert.issuer.clone()),
            ("TLS_CLIENT_ISSUER_CN", cert.issuer_cn.clone()),
            ("TLS_CLIENT_SUBJECT", cert.subject.clone()),
            ("TLS_CLIENT_SUBJECT_CN", cert.subject_cn.clone()),
        ]);
    }
    vars
}

/// Optional cap on concurrent gateway invocations.
#[derive(Debug, Clone, Default)]
pub struct GatewayLimit {
    slots: Option<Arc<Semaphore>>,
}

impl GatewayLimit {
    pub fn new(max: Option<usize>) -> Self {
        Self {
            slots: max.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Wait for a slot. Always succeeds immediately when unbounded.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        let slots = self.slots.as_ref()?;
        slots.clone().acquire_owned().await.ok()
    }
}
