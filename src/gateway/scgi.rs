//! SCGI: forward the request to a Unix-socket application and stream its reply.

use std::io;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::gateway::Variables;
use crate::protocol::response::Responder;
use crate::protocol::status::{parse_header_status, Rejection, Status};

const CHUNK_SIZE: usize = 4096;

/// SCGI variables for a request routed by `route_prefix`.
///
/// `CONTENT_LENGTH` comes first, as the SCGI protocol requires.
pub fn scgi_variables(gateway_vars: Variables, route_prefix: &str, url_path: &str) -> Variables {
    let path_info = url_path.strip_prefix(route_prefix).unwrap_or_default();
    let mut vars = vec![("CONTENT_LENGTH", "0".to_string()), ("SCGI", "1".to_string())];
    vars.extend(gateway_vars);
    vars.push(("SCRIPT_PATH", route_prefix.to_string()));
    vars.push(("PATH_INFO", path_info.to_string()));
    vars
}

/// Encode variables as an SCGI header netstring: `<len>:NAME\0value\0...,`.
pub fn encode_netstring(vars: &[(&str, String)]) -> Vec<u8> {
    let mut block = Vec::new();
    for (name, value) in vars {
        block.extend_from_slice(name.as_bytes());
        block.push(0);
        block.extend_from_slice(value.as_bytes());
        block.push(0);
    }

    let mut encoded = format!("{}:", block.len()).into_bytes();
    encoded.extend_from_slice(&block);
    encoded.push(b',');
    encoded
}

fn scgi_error() -> Rejection {
    Rejection::new(Status::CgiError, "SCGI error!")
}

/// Send the request to the application at `socket_path` and relay its response.
///
/// Only client write failures are returned as errors.
pub async fn run_scgi<S>(socket_path: &Path, vars: Variables, out: &mut Responder<S>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let socket_name = socket_path.display().to_string();
    let mut socket = match UnixStream::connect(socket_path).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!(socket = %socket_name, error = %e, "Failed to connect to SCGI service");
            return out
                .reject(&Rejection::new(Status::CgiError, "Error connecting to SCGI service!"))
                .await;
        }
    };

    if let Err(e) = socket.write_all(&encode_netstring(&vars)).await {
        tracing::error!(socket = %socket_name, error = %e, "Failed to send SCGI request");
        return out.reject(&scgi_error()).await;
    }

    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut started = false;
    loop {
        let n = match socket.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if !started => {
                tracing::error!(socket = %socket_name, error = %e, "Failed to read SCGI response");
                return out.reject(&scgi_error()).await;
            }
            Err(e) => {
                tracing::error!(
                    socket = %socket_name,
                    error = %e,
                    "SCGI response interrupted after partial relay"
                );
                out.override_status(Status::CgiError);
                return Ok(());
            }
        };
        let chunk = &buffer[..n];

        if started {
            out.relay_more(chunk).await?;
            continue;
        }
        started = true;
        match parse_header_status(chunk) {
            Some(status) => out.relay(status, chunk).await?,
            None => {
                tracing::error!(
                    socket = %socket_name,
                    "SCGI response does not start with a valid response header"
                );
                return out.reject(&scgi_error()).await;
            }
        }
    }

    if !started {
        tracing::debug!(socket = %socket_name, "SCGI service closed without responding");
    }
    Ok(())
}
