//! Response writing.
//!
//! # Responsibilities
//! - Emit exactly one `<status> <meta>\r\n` header per connection
//! - Write bodies only after a 2x header
//! - Relay gateway output verbatim while recording its status
//!
//! # Design Decisions
//! - The header and the body are separate writes
//! - A second header is refused rather than written
//! - Write failures surface as `io::Error`; callers abandon the request

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::protocol::status::{Rejection, Status};

/// Wraps the client stream and tracks what has been sent on it.
#[derive(Debug)]
pub struct Responder<S> {
    stream: S,
    status: Option<u8>,
}

impl<S> Responder<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            status: None,
        }
    }

    /// Status recorded for this connection, if a header has been sent or relayed.
    pub fn status(&self) -> Option<u8> {
        self.status
    }

    /// Record a status without writing anything.
    ///
    /// Used when a gateway fails after its own header was already relayed.
    pub fn override_status(&mut self, status: Status) {
        self.status = Some(status.code());
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncWrite + Unpin> Responder<S> {
    /// Send a header line with no body.
    pub async fn header(&mut self, status: Status, meta: &str) -> io::Result<()> {
        self.claim(status.code())?;
        let line = format!("{} {}\r\n", status.code(), meta);
        self.stream.write_all(line.as_bytes()).await
    }

    pub async fn reject(&mut self, rejection: &Rejection) -> io::Result<()> {
        self.header(rejection.status, &rejection.meta).await
    }

    /// Send `20 <mime>` followed by the body.
    pub async fn success(&mut self, mime: &str, body: &[u8]) -> io::Result<()> {
        self.header(Status::Success, mime).await?;
        self.stream.write_all(body).await
    }

    /// Relay a complete gateway response whose header carries `status`.
    pub async fn relay(&mut self, status: u8, output: &[u8]) -> io::Result<()> {
        self.claim(status)?;
        self.stream.write_all(output).await
    }

    /// Relay a further chunk after [`Responder::relay`] started a response.
    pub async fn relay_more(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.status.is_none() {
            return Err(io::Error::other("body chunk before response header"));
        }
        self.stream.write_all(chunk).await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.flush().await?;
        self.stream.shutdown().await
    }

    fn claim(&mut self, status: u8) -> io::Result<()> {
        if let Some(sent) = self.status {
            return Err(io::Error::other(format!(
                "response header {sent} already sent, refusing {status}"
            )));
        }
        self.status = Some(status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_header_and_body() {
        let mut out = Responder::new(Vec::new());
        out.success("text/gemini", b"# Hello\n").await.unwrap();
        assert_eq!(out.status(), Some(20));
        assert_eq!(out.into_inner(), b"20 text/gemini\r\n# Hello\n");
    }

    #[tokio::test]
    async fn refuses_second_header() {
        let mut out = Responder::new(Vec::new());
        out.reject(&Rejection::not_found()).await.unwrap();
        assert!(out.header(Status::Success, "text/plain").await.is_err());
        assert_eq!(out.status(), Some(51));
        assert_eq!(out.into_inner(), b"51 Not found!\r\n");
    }

    #[tokio::test]
    async fn relay_records_gateway_status() {
        let mut out = Responder::new(Vec::new());
        assert!(out.relay_more(b"early").await.is_err());
        out.relay(31, b"31 gemini://x/\r\n").await.unwrap();
        out.relay_more(b"tail").await.unwrap();
        assert_eq!(out.status(), Some(31));
        assert_eq!(out.into_inner(), b"31 gemini://x/\r\ntail");
    }
}
