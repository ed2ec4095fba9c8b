//! CGI and SCGI gateways.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

mod common;

use common::{certificate, fingerprint, Capsule};

/// Writing an executable while another thread forks can fail with ETXTBSY.
static CGI_LOCK: Mutex<()> = Mutex::new(());

fn cgi_capsule() -> Capsule {
    let mut capsule = Capsule::new();
    capsule.config.cgi_paths = vec![PathBuf::from("cgi-bin")];
    capsule.mkdir("cgi-bin");
    capsule
}

const ENV_SCRIPT: &str = r#"#!/bin/sh
printf '20 text/plain\r\n'
echo "QUERY_STRING=$QUERY_STRING"
echo "PATH_INFO=$PATH_INFO"
echo "SERVER_NAME=$SERVER_NAME"
echo "SERVER_PORT=$SERVER_PORT"
echo "REMOTE_ADDR=$REMOTE_ADDR"
echo "GATEWAY_INTERFACE=$GATEWAY_INTERFACE"
echo "TLS_CLIENT_HASH=$TLS_CLIENT_HASH"
echo "CWD=$(pwd)"
"#;

#[tokio::test]
async fn cgi_receives_request_environment() {
    let _lock = CGI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let capsule = cgi_capsule();
    capsule.script("cgi-bin/env.sh", ENV_SCRIPT);
    let server = capsule.handler();

    let fp = fingerprint('a');
    let reply = server
        .get_with(
            "gemini://localhost/cgi-bin/env.sh/extra/bits?name=x",
            vec![certificate(&fp)],
        )
        .await;
    assert_eq!(reply.header, "20 text/plain");
    let body = reply.body_text();
    assert!(body.contains("QUERY_STRING=name=x\n"), "{body}");
    assert!(body.contains("PATH_INFO=/extra/bits\n"), "{body}");
    assert!(body.contains("SERVER_NAME=localhost\n"), "{body}");
    assert!(body.contains("SERVER_PORT=1965\n"), "{body}");
    assert!(body.contains(&format!("REMOTE_ADDR={}\n", common::CLIENT_ADDR)), "{body}");
    assert!(body.contains("GATEWAY_INTERFACE=CGI/1.1\n"), "{body}");
    assert!(body.contains(&format!("TLS_CLIENT_HASH={fp}\n")), "{body}");
    assert!(body.contains(&format!("CWD={}\n", capsule.root.join("cgi-bin").display())), "{body}");
    assert_eq!(reply.entry.status, Some(20));
}

#[tokio::test]
async fn cgi_path_info_defaults_to_slash() {
    let _lock = CGI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let capsule = cgi_capsule();
    capsule.script("cgi-bin/env.sh", ENV_SCRIPT);
    let server = capsule.handler();

    let body = server.get("gemini://localhost/cgi-bin/env.sh").await.body_text();
    assert!(body.contains("PATH_INFO=/\n"), "{body}");
    assert!(body.contains("TLS_CLIENT_HASH=\n"), "{body}");
}

#[tokio::test]
async fn cgi_status_is_relayed() {
    let _lock = CGI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let capsule = cgi_capsule();
    capsule.script("cgi-bin/ask.sh", "#!/bin/sh\nprintf '10 Your name?\\r\\n'\n");
    let server = capsule.handler();

    let reply = server.get("gemini://localhost/cgi-bin/ask.sh").await;
    assert_eq!(reply.header, "10 Your name?");
    assert_eq!(reply.entry.status, Some(10));
}

#[tokio::test]
async fn failing_cgi_is_a_gateway_error() {
    let _lock = CGI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let capsule = cgi_capsule();
    capsule.script(
        "cgi-bin/fail.sh",
        "#!/bin/sh\nprintf '20 text/plain\\r\\npartial'\necho oops >&2\nexit 3\n",
    );
    capsule.script("cgi-bin/http.sh", "#!/bin/sh\nprintf 'Content-Type: text/html\\r\\n\\r\\n'\n");
    let server = capsule.handler();

    let reply = server.get("gemini://localhost/cgi-bin/fail.sh").await;
    assert_eq!(reply.header, "42 CGI error!");
    assert!(reply.body.is_empty());

    let reply = server.get("gemini://localhost/cgi-bin/http.sh").await;
    assert_eq!(reply.header, "42 CGI error!");
}

#[tokio::test]
async fn slow_cgi_is_terminated() {
    let _lock = CGI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut capsule = cgi_capsule();
    capsule.config.limits.cgi_timeout_secs = 1;
    let marker = capsule.root.join("finished");
    capsule.script(
        "cgi-bin/slow.sh",
        &format!("#!/bin/sh\nsleep 3\ntouch '{}'\n", marker.display()),
    );
    let server = capsule.handler();

    let started = Instant::now();
    let reply = server.get("gemini://localhost/cgi-bin/slow.sh").await;
    assert_eq!(reply.header, "42 CGI process timed out!");
    assert!(reply.body.is_empty());
    assert!(started.elapsed() < Duration::from_secs(3));

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(!marker.exists(), "CGI process kept running after the deadline");
}

#[tokio::test]
async fn non_executable_files_in_cgi_paths_are_static() {
    let _lock = CGI_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let capsule = cgi_capsule();
    capsule.write("cgi-bin/readme.txt", "just text\n");
    let server = capsule.handler();

    let reply = server.get("gemini://localhost/cgi-bin/readme.txt").await;
    assert_eq!(reply.header, "20 text/plain");
    assert_eq!(reply.body_text(), "just text\n");
}

/// Read one SCGI request: a netstring of NUL-separated pairs.
async fn read_scgi_request(stream: &mut tokio::net::UnixStream) -> Vec<(String, String)> {
    let mut length = Vec::new();
    loop {
        let byte = stream.read_u8().await.unwrap();
        if byte == b':' {
            break;
        }
        length.push(byte);
    }
    let length: usize = String::from_utf8(length).unwrap().parse().unwrap();
    let mut block = vec![0u8; length + 1];
    stream.read_exact(&mut block).await.unwrap();
    assert_eq!(block.pop(), Some(b','));

    let fields: Vec<_> = block
        .split(|&b| b == 0)
        .map(|f| String::from_utf8(f.to_vec()).unwrap())
        .collect();
    fields
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

/// Serve one SCGI connection, answering with `respond(variables)`.
fn spawn_scgi_app<F>(listener: UnixListener, respond: F)
where
    F: FnOnce(Vec<(String, String)>) -> Vec<u8> + Send + 'static,
{
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let vars = read_scgi_request(&mut stream).await;
        let response = respond(vars);
        stream.write_all(&response).await.unwrap();
        stream.shutdown().await.unwrap();
    });
}

fn scgi_capsule() -> (Capsule, PathBuf) {
    let mut capsule = Capsule::new();
    let socket = capsule.root.join("app.sock");
    capsule.config.scgi_paths.insert("/app/", socket.clone());
    (capsule, socket)
}

#[tokio::test]
async fn scgi_request_and_response() {
    let (capsule, socket) = scgi_capsule();
    let listener = UnixListener::bind(&socket).unwrap();
    spawn_scgi_app(listener, |vars| {
        assert_eq!(vars[0], ("CONTENT_LENGTH".to_string(), "0".to_string()));
        let map: HashMap<_, _> = vars.into_iter().collect();
        format!(
            "20 text/plain\r\nscript={} info={} query={} scgi={}\n",
            map["SCRIPT_PATH"], map["PATH_INFO"], map["QUERY_STRING"], map["SCGI"]
        )
        .into_bytes()
    });
    let server = capsule.handler();

    let reply = server.get("gemini://localhost/app/users/7?q=1").await;
    assert_eq!(reply.header, "20 text/plain");
    assert_eq!(reply.body_text(), "script=/app/ info=users/7 query=q=1 scgi=1\n");
    assert_eq!(reply.entry.status, Some(20));
}

#[tokio::test]
async fn scgi_connect_failure() {
    let (capsule, _socket) = scgi_capsule();
    let server = capsule.handler();

    let reply = server.get("gemini://localhost/app/").await;
    assert_eq!(reply.header, "42 Error connecting to SCGI service!");
}

#[tokio::test]
async fn scgi_invalid_header() {
    let (capsule, socket) = scgi_capsule();
    let listener = UnixListener::bind(&socket).unwrap();
    spawn_scgi_app(listener, |_| b"HTTP/1.1 200 OK\r\n\r\n".to_vec());
    let server = capsule.handler();

    let reply = server.get("gemini://localhost/app/").await;
    assert_eq!(reply.header, "42 SCGI error!");
}

#[tokio::test]
async fn scgi_empty_response_sends_nothing() {
    let (capsule, socket) = scgi_capsule();
    let listener = UnixListener::bind(&socket).unwrap();
    spawn_scgi_app(listener, |_| Vec::new());
    let server = capsule.handler();

    let reply = server.get("gemini://localhost/app/").await;
    assert_eq!(reply.header, "");
    assert_eq!(reply.entry.status, None);
}

#[tokio::test]
async fn scgi_routes_take_precedence_over_static_files() {
    let (capsule, socket) = scgi_capsule();
    capsule.write("app/index.gmi", "# Static\n");
    let listener = UnixListener::bind(&socket).unwrap();
    spawn_scgi_app(listener, |_| b"20 text/gemini\r\n# Dynamic\n".to_vec());
    let server = capsule.handler();

    let reply = server.get("gemini://localhost/app/").await;
    assert_eq!(reply.body_text(), "# Dynamic\n");
}
