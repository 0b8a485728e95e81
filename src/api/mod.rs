//! HTTP read and control surface.
//!
//! A small hand-rolled HTTP/1.1 server over `TcpListener`, running on its own
//! accept thread with one thread per connection (the MJPEG stream holds its
//! connection open indefinitely, so connections must not serialize).
//!
//! Read endpoints only touch the last published snapshot/frame — they never
//! block on camera I/O or inference. Control endpoints call into the
//! coordinator's control surface and report the outcome.
//!
//! Routes:
//! - `GET /health` — liveness probe
//! - `GET /stats` — current stats snapshot as JSON
//! - `GET /video` — multipart MJPEG stream of the rendered overlay
//! - `POST /control/source` — switch the active capture source
//! - `POST /control/sensitivity` — update the confidence threshold

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::system::ParkingSystem;

const MAX_REQUEST_BYTES: usize = 8192;

/// Interval between MJPEG parts, independent of the worker's cycle rate.
const STREAM_FRAME_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    system: Arc<ParkingSystem>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, system: Arc<ParkingSystem>) -> Self {
        Self { cfg, system }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let listener = TcpListener::bind(&self.cfg.addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let system = self.system;
        let join = std::thread::Builder::new()
            .name("parkwatch-api".into())
            .spawn(move || run_api(listener, system, shutdown_thread))
            .map_err(|err| anyhow!("failed to spawn api thread: {}", err))?;

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(listener: TcpListener, system: Arc<ParkingSystem>, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let system = system.clone();
                let shutdown = shutdown.clone();
                let spawned = std::thread::Builder::new()
                    .name("parkwatch-api-conn".into())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &system, &shutdown) {
                            log::debug!("api connection closed: {}", err);
                        }
                    });
                if let Err(err) = spawned {
                    log::warn!("failed to spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                log::error!("api accept failed: {}", err);
                break;
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourceRequest {
    source: String,
}

#[derive(Debug, Deserialize)]
struct SensitivityRequest {
    threshold: f32,
}

fn handle_connection(
    mut stream: TcpStream,
    system: &ParkingSystem,
    shutdown: &AtomicBool,
) -> Result<()> {
    let request = read_request(&mut stream)?;

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        ("GET", "/stats") => {
            let payload = serde_json::to_vec(&*system.stats())?;
            write_response(&mut stream, 200, "application/json", &payload)
        }
        ("GET", "/video") => stream_video(stream, system, shutdown),
        ("POST", "/control/source") => {
            let body: SourceRequest = match serde_json::from_slice(&request.body) {
                Ok(body) => body,
                Err(_) => {
                    return write_json_response(
                        &mut stream,
                        400,
                        r#"{"error":"body must be {\"source\": \"...\"}"}"#,
                    )
                }
            };
            match system.switch_source(&body.source) {
                Ok(descriptor) => {
                    let payload =
                        serde_json::json!({ "switched": true, "source": descriptor.to_string() });
                    write_response(&mut stream, 200, "application/json", payload.to_string().as_bytes())
                }
                Err(err) => {
                    log::warn!("source switch to '{}' failed: {:#}", body.source, err);
                    let payload = serde_json::json!({ "switched": false, "error": format!("{:#}", err) });
                    write_response(&mut stream, 409, "application/json", payload.to_string().as_bytes())
                }
            }
        }
        ("POST", "/control/sensitivity") => {
            let body: SensitivityRequest = match serde_json::from_slice(&request.body) {
                Ok(body) => body,
                Err(_) => {
                    return write_json_response(
                        &mut stream,
                        400,
                        r#"{"error":"body must be {\"threshold\": 0.0..1.0}"}"#,
                    )
                }
            };
            match system.update_sensitivity(body.threshold) {
                Ok(()) => {
                    let payload = serde_json::json!({ "threshold": system.sensitivity() });
                    write_response(&mut stream, 200, "application/json", payload.to_string().as_bytes())
                }
                Err(err) => {
                    let payload = serde_json::json!({ "error": err.to_string() });
                    write_response(&mut stream, 400, "application/json", payload.to_string().as_bytes())
                }
            }
        }
        ("GET", _) => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
        _ => write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#),
    }
}

/// Serve the multipart MJPEG stream until the client disconnects or the
/// server shuts down. Each part carries the latest published frame; the
/// polling interval is bounded and independent of the worker's cycle rate.
fn stream_video(mut stream: TcpStream, system: &ParkingSystem, shutdown: &AtomicBool) -> Result<()> {
    stream.write_all(
        b"HTTP/1.1 200 OK\r\n\
          Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
          Cache-Control: no-store\r\n\
          Connection: close\r\n\r\n",
    )?;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(jpeg) = system.latest_jpeg() {
            let header = format!(
                "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                jpeg.len()
            );
            stream.write_all(header.as_bytes())?;
            stream.write_all(&jpeg)?;
            stream.write_all(b"\r\n")?;
        }
        std::thread::sleep(STREAM_FRAME_INTERVAL);
    }
}

struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break data
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .ok_or_else(|| anyhow!("connection closed mid-request"))?;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length"))?
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body: Vec<u8> = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        409 => "HTTP/1.1 409 Conflict",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}
