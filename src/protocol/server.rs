//! Accept loop: TLS handshake and one task per connection.
//!
//! # Responsibilities
//! - Accept connections within the connection limit
//! - Run the TLS handshake under a deadline
//! - Hand the decrypted stream and client chain to the [`RequestHandler`]
//! - Stop accepting on shutdown and drain in-flight connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::net::{peer_chain, ConnectionPermit, ConnectionTracker, Listener};
use crate::protocol::handler::RequestHandler;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Gemini server bound to one TLS configuration and request handler.
pub struct GeminiServer {
    handler: Arc<RequestHandler>,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
    tracker: ConnectionTracker,
}

impl GeminiServer {
    pub fn new(handler: Arc<RequestHandler>, tls: Arc<rustls::ServerConfig>) -> Self {
        let handshake_timeout = Duration::from_secs(handler.config().limits.handshake_timeout_secs);
        Self {
            handler,
            acceptor: TlsAcceptor::from(tls),
            handshake_timeout,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Serve until `shutdown` fires, then wait for in-flight connections.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "Gemini server starting"),
            Err(e) => tracing::warn!(error = %e, "Gemini server starting on unknown address"),
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn_connection(stream, peer, permit),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active, "Draining connections");
        }
        if !self.tracker.wait_for_idle(DRAIN_TIMEOUT).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain timed out, abandoning connections"
            );
        }
        tracing::info!("Gemini server stopped");
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
        let handler = Arc::clone(&self.handler);
        let acceptor = self.acceptor.clone();
        let handshake_timeout = self.handshake_timeout;

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;

                let tls = match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                    Ok(Ok(tls)) => tls,
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "TLS handshake failed");
                        return;
                    }
                    Err(_) => {
                        tracing::debug!("TLS handshake timed out");
                        return;
                    }
                };

                let chain = peer_chain(tls.get_ref().1.peer_certificates());
                let entry = handler.handle(tls, peer.ip(), chain).await;
                tracing::debug!(
                    status = entry.status,
                    url = entry.request_url.as_deref().unwrap_or("-"),
                    "Request complete"
                );
            }
            .instrument(span),
        );
    }
}
