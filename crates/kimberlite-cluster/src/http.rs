//! Lightweight HTTP sidecars: the `/status` and `/healthcheck` API, and the
//! separate `/metrics` exporter. Minimal hand-rolled HTTP/1.1 parsing —
//! these endpoints are GET/HEAD-only and never accept a body.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::role::Role;
use crate::state::SharedRoleState;

/// Serves `GET /status` and `GET|HEAD /healthcheck` until the process exits.
/// Runs as its own task; the only state it touches is the shared role lock.
pub async fn serve_status(port: u16, role: SharedRoleState) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "status HTTP endpoint listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                error!(%error, "status endpoint accept failed");
                continue;
            }
        };
        let role = Arc::clone(&role);
        tokio::spawn(async move {
            if let Err(error) = handle_status_connection(stream, role).await {
                debug!(%peer, %error, "status connection closed with error");
            }
        });
    }
}

/// Serves `GET /metrics` until the process exits.
pub async fn serve_metrics(port: u16, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "metrics HTTP endpoint listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                error!(%error, "metrics endpoint accept failed");
                continue;
            }
        };
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(error) = handle_metrics_connection(stream, metrics).await {
                debug!(%peer, %error, "metrics connection closed with error");
            }
        });
    }
}

async fn handle_status_connection(mut stream: TcpStream, role: SharedRoleState) -> std::io::Result<()> {
    let Some((method, path)) = read_request_line(&mut stream).await? else {
        return write_response(&mut stream, 400, "text/plain", "Bad Request").await;
    };

    let response = match (method.as_str(), path.as_str()) {
        ("GET", "/status") => {
            let current = role.read().await.current;
            let body = format!(r#"{{"state":"{}"}}"#, current.as_str());
            write_response(&mut stream, 200, "application/json", &body).await
        }
        ("GET", "/healthcheck") | ("HEAD", "/healthcheck") => {
            let current = role.read().await.current;
            let status = if current == Role::Primary { 200 } else { 503 };
            write_response(&mut stream, status, "text/plain", "").await
        }
        _ => write_response(&mut stream, 404, "text/plain", "Not Found").await,
    };
    response
}

async fn handle_metrics_connection(mut stream: TcpStream, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let Some((method, path)) = read_request_line(&mut stream).await? else {
        return write_response(&mut stream, 400, "text/plain", "Bad Request").await;
    };

    match (method.as_str(), path.as_str()) {
        ("GET", "/metrics") => {
            let body = metrics.encode();
            write_response(&mut stream, 200, "text/plain; version=0.0.4; charset=utf-8", &body).await
        }
        _ => write_response(&mut stream, 404, "text/plain", "Not Found").await,
    }
}

/// Reads just enough of the request to extract its method and path,
/// tolerating a client that never sends a body (GET/HEAD never do).
async fn read_request_line(stream: &mut TcpStream) -> std::io::Result<Option<(String, String)>> {
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    let request = String::from_utf8_lossy(&buf[..n]);
    let Some(first_line) = request.lines().next() else {
        return Ok(None);
    };
    let mut parts = first_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        return Ok(None);
    };

    if method != "GET" && method != "HEAD" {
        warn!(method, "rejecting unsupported HTTP method");
        return Ok(None);
    }

    Ok(Some((method.to_string(), path.to_string())))
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Unknown",
    };

    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );

    stream.write_all(response.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RoleState;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn status_endpoint_reports_lowercase_role() {
        let role: SharedRoleState = Arc::new(RwLock::new(RoleState {
            current: Role::Replica,
            previous: Role::Candidate,
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let role_clone = Arc::clone(&role);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_status_connection(stream, role_clone).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET /status HTTP/1.1\r\n\r\n").await.unwrap();
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(r#"{"state":"replica"}"#));
    }

    #[tokio::test]
    async fn healthcheck_is_503_unless_primary() {
        let role: SharedRoleState = Arc::new(RwLock::new(RoleState {
            current: Role::Fault,
            previous: Role::Fault,
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let role_clone = Arc::clone(&role);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_status_connection(stream, role_clone).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET /healthcheck HTTP/1.1\r\n\r\n").await.unwrap();
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("HTTP/1.1 503"));
    }
}
