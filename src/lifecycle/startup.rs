//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the access log and start its writer
//! - Build the request handler, TLS configuration and listener
//! - Run the server until a signal arrives, then drain and flush
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::lifecycle::signals::wait_for_signal;
use crate::lifecycle::Shutdown;
use crate::net::{load_tls_config, Listener, ListenerError, TlsError};
use crate::observability::access_log;
use crate::protocol::handler::{DocRootError, RequestHandler};
use crate::protocol::GeminiServer;

/// Error type for startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open access log: {0}")]
    AccessLog(#[source] std::io::Error),

    #[error(transparent)]
    DocRoot(#[from] DocRootError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Address the server listens on: all interfaces, configured port.
pub fn bind_address(config: &ServerConfig) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port))
}

/// Run the server with `config` until SIGINT or SIGTERM.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let (access_log, writer) = access_log::open(&config.access_log)
        .await
        .map_err(StartupError::AccessLog)?;

    let tls = load_tls_config(&config.cert_path, &config.key_path)?;
    let addr = bind_address(&config);
    let max_connections = config.limits.max_connections;
    let handler = Arc::new(RequestHandler::new(config, access_log)?);
    tracing::info!(doc_root = %handler.doc_root().display(), "Document root ready");

    let listener = Listener::bind(addr, max_connections).await?;
    let server = GeminiServer::new(handler, tls);

    let shutdown = Shutdown::new();
    let serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    tracing::info!(subscribers = shutdown.receiver_count(), "Shutting down");
    shutdown.trigger();

    // The writer exits once the last handler reference is gone. Connections
    // abandoned by the drain timeout may still hold one.
    if let Err(e) = serving.await {
        tracing::error!(error = %e, "Server task failed");
    }
    match tokio::time::timeout(LOG_FLUSH_TIMEOUT, writer).await {
        Ok(Ok(())) => tracing::info!("Access log flushed"),
        Ok(Err(e)) => tracing::error!(error = %e, "Access log writer failed"),
        Err(_) => tracing::warn!("Access log still busy at exit"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_all_interfaces_on_configured_port() {
        let mut config = ServerConfig::default();
        config.port = 1966;
        let addr = bind_address(&config);
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 1966);
    }
}
