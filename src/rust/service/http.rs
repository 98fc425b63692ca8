//! Minimal HTTP/1.1 front end for [`IntentService`].
//!
//! Exposes `POST /classify-intent` with body `{"text": "..."}` and answers
//! `{"type": "<label>"}`. Every connection serves a single request and is then closed.
//! Errors are JSON objects of the form `{"detail": "..."}`. A client that does not
//! deliver a complete request within the read timeout gets `408`.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::IntentService;
use crate::config::{ServiceConfig, DEFAULT_MAX_BODY_BYTES, DEFAULT_READ_TIMEOUT};

pub const CLASSIFY_PATH: &str = "/classify-intent";

const MAX_HEADER_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResponse {
    #[serde(rename = "type")]
    pub intent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Bounds applied to every connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub max_body_bytes: usize,
    /// Deadline for receiving the whole request, headers and body
    pub read_timeout: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl From<&ServiceConfig> for ConnectionLimits {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_body_bytes: config.max_body_bytes,
            read_timeout: config.read_timeout,
        }
    }
}

#[derive(Debug)]
struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[derive(Debug)]
struct Response {
    status: u16,
    body: String,
}

impl Response {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::error(500, format!("Failed to encode response: {}", e)),
        }
    }

    fn error(status: u16, detail: impl Into<String>) -> Self {
        let body = serde_json::json!({ "detail": detail.into() }).to_string();
        Self { status, body }
    }
}

/// Binds `config.bind_addr` and serves until `shutdown` resolves.
pub async fn run<F>(config: &ServiceConfig, service: IntentService, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(&config.bind_addr).await?;
    log::info!("[http] serving {} on {}", CLASSIFY_PATH, listener.local_addr()?);
    serve(listener, service, ConnectionLimits::from(config), shutdown).await
}

/// Accepts connections on `listener`, one task per connection, until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    service: IntentService,
    limits: ConnectionLimits,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("[http] shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (mut socket, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        log::warn!("[http] accept failed: {}", e);
                        continue;
                    }
                };
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_conn(&mut socket, &service, limits).await {
                        log::debug!("[http] connection from {} failed: {}", peer, e);
                    }
                });
            }
        }
    }
}

async fn handle_conn(socket: &mut TcpStream, service: &IntentService, limits: ConnectionLimits) -> io::Result<()> {
    let read = tokio::time::timeout(limits.read_timeout, read_request(socket, limits.max_body_bytes)).await;
    let response = match read {
        Ok(result) => match result? {
            Ok(Some(request)) => route(request, service).await,
            Ok(None) => return Ok(()),
            Err(response) => response,
        },
        Err(_) => {
            log::warn!("[http] no complete request within {:?}", limits.read_timeout);
            Response::error(408, "Request Timeout")
        }
    };
    write_response(socket, &response).await
}

/// Reads one request. `Ok(Err(_))` carries the response for a request that cannot be
/// served; `Ok(None)` means the peer closed the connection without sending anything.
async fn read_request(
    socket: &mut TcpStream,
    max_body_bytes: usize,
) -> io::Result<Result<Option<Request>, Response>> {
    let mut buf = vec![0u8; 4096];
    let mut read_len = 0usize;
    let header_end = loop {
        let n = socket.read(&mut buf[read_len..]).await?;
        if n == 0 {
            if read_len == 0 {
                return Ok(Ok(None));
            }
            return Ok(Err(Response::error(400, "Incomplete request")));
        }
        read_len += n;
        if let Some(pos) = buf[..read_len].windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if read_len >= MAX_HEADER_BYTES {
            return Ok(Err(Response::error(431, "Request headers too large")));
        }
        if read_len == buf.len() {
            buf.resize(buf.len() + 4096, 0);
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]);
    let mut lines = head.split("\r\n");
    let mut parts = lines.next().unwrap_or("").split_whitespace();
    let (method, target) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) if version.starts_with("HTTP/1.") => (method, target),
        _ => return Ok(Err(Response::error(400, "Malformed request line"))),
    };
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    if headers.contains_key("transfer-encoding") {
        return Ok(Err(Response::error(411, "Chunked bodies are not supported; send Content-Length")));
    }
    let content_length = match headers.get("content-length").map(|v| v.parse::<usize>()) {
        None => 0,
        Some(Ok(len)) => len,
        Some(Err(_)) => return Ok(Err(Response::error(400, "Invalid Content-Length"))),
    };
    if content_length > max_body_bytes {
        return Ok(Err(Response::error(413, format!("Body exceeds {} bytes", max_body_bytes))));
    }

    let body_start = header_end + 4;
    let mut body = buf[body_start..read_len].to_vec();
    if body.len() < content_length {
        let already = body.len();
        body.resize(content_length, 0);
        if let Err(e) = socket.read_exact(&mut body[already..]).await {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                return Ok(Err(Response::error(400, "Incomplete request body")));
            }
            return Err(e);
        }
    }
    body.truncate(content_length);

    let path = target.split('?').next().unwrap_or(target).to_string();
    Ok(Ok(Some(Request {
        method: method.to_string(),
        path,
        body,
    })))
}

async fn route(request: Request, service: &IntentService) -> Response {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", CLASSIFY_PATH) => classify_intent(&request.body, service).await,
        (_, CLASSIFY_PATH) => Response::error(405, "Method Not Allowed"),
        _ => Response::error(404, "Not Found"),
    }
}

async fn classify_intent(body: &[u8], service: &IntentService) -> Response {
    let request: IntentRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("[http] rejected request body: {}", e);
            return Response::error(422, format!("Invalid request body: {}", e));
        }
    };

    let service = service.clone();
    let text = request.text;
    match tokio::task::spawn_blocking(move || service.classify(&text)).await {
        Ok(Ok(intent)) => {
            log::debug!("[http] classified as '{}'", intent);
            Response::json(200, &IntentResponse { intent })
        }
        Ok(Err(e)) if e.is_client_error() => {
            log::warn!("[http] rejected request: {}", e);
            Response::error(422, e.to_string())
        }
        Ok(Err(e)) => {
            log::error!("[http] classification failed: {}", e);
            Response::error(500, e.to_string())
        }
        Err(e) => {
            log::error!("[http] classification task failed: {}", e);
            Response::error(500, "Internal Server Error")
        }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

async fn write_response(socket: &mut TcpStream, response: &Response) -> io::Result<()> {
    let mut resp = Vec::with_capacity(response.body.len() + 128);
    resp.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", response.status, reason_phrase(response.status)).as_bytes());
    resp.extend_from_slice(b"Content-Type: application/json\r\n");
    if response.status == 405 {
        resp.extend_from_slice(b"Allow: POST\r\n");
    }
    resp.extend_from_slice(format!("Content-Length: {}\r\n", response.body.len()).as_bytes());
    resp.extend_from_slice(b"Connection: close\r\n\r\n");
    resp.extend_from_slice(response.body.as_bytes());
    socket.write_all(&resp).await?;
    socket.shutdown().await
}
