//! CGI: run an executable and relay its captured output.
//!
//! # Responsibilities
//! - Split a resolved path into script path and path info
//! - Spawn with a clean environment, no stdin, and a wall-clock limit
//! - Validate the first output line before anything reaches the client
//!
//! # Design Decisions
//! - The child is killed and reaped on timeout; `kill_on_drop` covers
//!   every other early exit of the owning task
//! - Output is buffered in full so a failing script never produces a
//!   half-sent success response

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite};
use tokio::process::{Child, Command};

use crate::gateway::Variables;
use crate::protocol::response::Responder;
use crate::protocol::status::{parse_header_status, Rejection, Status};

/// A located CGI program and the part of the path that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiScript {
    pub script_path: PathBuf,
    /// Always begins with `/`.
    pub path_info: String,
}

/// Find the shortest prefix of `path` under a CGI root that is an executable file.
///
/// Returns `None` when `path` is outside every root or no prefix qualifies,
/// in which case the request falls through to static serving.
pub async fn locate_script(path: &Path, cgi_roots: &[PathBuf]) -> Option<CgiScript> {
    if !cgi_roots.iter().any(|root| path.starts_with(root)) {
        return None;
    }

    let components: Vec<_> = path.components().collect();
    let mut prefix = PathBuf::new();
    for (i, component) in components.iter().enumerate() {
        prefix.push(component);
        if !cgi_roots.iter().any(|root| prefix.starts_with(root)) {
            continue;
        }
        let Ok(meta) = tokio::fs::metadata(&prefix).await else {
            return None;
        };
        if meta.is_dir() {
            continue;
        }
        if meta.permissions().mode() & 0o111 != 0o111 {
            return None;
        }

        let rest: Vec<_> = components[i + 1..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        return Some(CgiScript {
            script_path: prefix,
            path_info: format!("/{}", rest.join("/")),
        });
    }
    None
}

fn cgi_error() -> Rejection {
    Rejection::new(Status::CgiError, "CGI error!")
}

/// Run `script` and write its response (or a 42) to `out`.
///
/// Only client write failures are returned as errors.
pub async fn run_cgi<S>(
    script: &CgiScript,
    vars: Variables,
    timeout: Duration,
    out: &mut Responder<S>,
) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let script_path = script.script_path.display().to_string();
    let mut command = Command::new(&script.script_path);
    command
        .env_clear()
        .envs(vars)
        .env("GATEWAY_INTERFACE", "CGI/1.1")
        .env("SCRIPT_PATH", &script.script_path)
        .env("PATH_INFO", &script.path_info)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = script.script_path.parent() {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(script = %script_path, error = %e, "Failed to spawn CGI process");
            return out.reject(&cgi_error()).await;
        }
    };

    let output = match tokio::time::timeout(timeout, collect_output(&mut child)).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            tracing::error!(script = %script_path, error = %e, "Failed to collect CGI output");
            terminate(&mut child, &script_path).await;
            return out.reject(&cgi_error()).await;
        }
        Err(_) => {
            tracing::warn!(
                script = %script_path,
                limit_secs = timeout.as_secs(),
                "Terminating CGI process for exceeding runtime limit"
            );
            terminate(&mut child, &script_path).await;
            return out
                .reject(&Rejection::new(Status::CgiError, "CGI process timed out!"))
                .await;
        }
    };

    if !output.status.success() {
        tracing::error!(
            script = %script_path,
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "CGI process failed"
        );
        return out.reject(&cgi_error()).await;
    }

    match parse_header_status(&output.stdout) {
        Some(status) => out.relay(status, &output.stdout).await,
        None => {
            let first_line = output.stdout.split(|&b| b == b'\n').next().unwrap_or_default();
            tracing::error!(
                script = %script_path,
                line = %String::from_utf8_lossy(first_line),
                "CGI output does not start with a valid response header"
            );
            out.reject(&cgi_error()).await
        }
    }
}

async fn collect_output(child: &mut Child) -> io::Result<Output> {
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("CGI stdout not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("CGI stderr not captured"))?;

    let mut out = Vec::new();
    let mut err = Vec::new();
    let (status, _, _) = tokio::try_join!(
        child.wait(),
        stdout.read_to_end(&mut out),
        stderr.read_to_end(&mut err)
    )?;
    Ok(Output {
        status,
        stdout: out,
        stderr: err,
    })
}

/// Kill and reap.
async fn terminate(child: &mut Child, script_path: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!(script = %script_path, error = %e, "Failed to terminate CGI process");
    }
}
