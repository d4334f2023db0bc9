use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::{MeshchatError, Result};
use crate::ipc::{RpcResponse, ToolResult, INTERNAL_ERROR, PARSE_ERROR};
use crate::scene::{Executor, SceneBackend};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// A parsed request waiting for the scene executor.
pub struct Job {
    pub method: String,
    pub params: Map<String, Value>,
    pub reply: oneshot::Sender<ToolResult>,
}

/// Request as read off the wire. Everything is optional so that a request
/// missing fields still gets a response instead of a parse error.
#[derive(Debug, Deserialize)]
struct IncomingRequest {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Map<String, Value>>,
}

/// Cloneable handle used to stop a running listener.
#[derive(Clone)]
pub struct ShutdownHandle {
    signal: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.signal.notify_one();
    }
}

/// TCP listener embedded on the scene tool side.
///
/// Connections are served concurrently, but every request is funnelled through
/// one bounded queue into a single executor thread that owns the scene.
pub struct ToolListener {
    listener: TcpListener,
    queue_capacity: usize,
    max_line_bytes: usize,
    shutdown_signal: Arc<Notify>,
}

impl ToolListener {
    pub async fn bind(addr: &str, queue_capacity: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MeshchatError::Connection {
                addr: addr.to_string(),
                reason: format!("failed to bind: {e}"),
            })?;
        Ok(Self {
            listener,
            queue_capacity: queue_capacity.max(1),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            shutdown_signal: Arc::new(Notify::new()),
        })
    }

    /// Cap on a single request line; longer lines close the connection.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: self.shutdown_signal.clone(),
        }
    }

    /// Accept connections until shut down. The backend moves onto the
    /// executor thread and never leaves it.
    pub async fn serve<B>(self, backend: B) -> Result<()>
    where
        B: SceneBackend + 'static,
    {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(self.queue_capacity);
        let executor = Executor::new(backend);
        std::thread::Builder::new()
            .name("scene-executor".into())
            .spawn(move || executor.run(jobs_rx))?;

        let local = self.listener.local_addr()?;
        tracing::info!(addr = %local, "scene tool listening");

        let shutdown = self.shutdown_signal.clone();
        let max_line_bytes = self.max_line_bytes;
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            tracing::info!(peer = %peer, "relay connected");
                            let jobs = jobs_tx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, jobs, max_line_bytes).await {
                                    tracing::warn!(peer = %peer, error = %e, "connection error");
                                }
                                tracing::info!(peer = %peer, "relay disconnected");
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept error");
                        }
                    }
                }
                _ = shutdown.notified() => {
                    tracing::info!("scene tool listener shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Serve one relay connection: one response line per request line.
///
/// A line that is not UTF-8 or not JSON gets a parse error and the connection
/// keeps serving. A line longer than `max_line_bytes` gets a parse error and
/// the connection is closed, since the rest of it cannot be framed.
async fn handle_connection(
    stream: TcpStream,
    jobs: mpsc::Sender<Job>,
    max_line_bytes: usize,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    // Room for the newline on a line of exactly `max_line_bytes`.
    let limit = (max_line_bytes as u64).saturating_add(1);

    loop {
        buf.clear();
        let read = (&mut reader).take(limit).read_until(b'\n', &mut buf).await?;
        if read == 0 {
            break;
        }
        if !buf.ends_with(b"\n") && read as u64 == limit {
            tracing::warn!(limit = max_line_bytes, "request line too long, closing");
            let response = RpcResponse::failure(
                None,
                PARSE_ERROR,
                format!("Parse error: request exceeds {max_line_bytes} bytes"),
            );
            write_response(&mut writer, &response).await?;
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::warn!(error = %e, "request is not valid UTF-8");
                let response =
                    RpcResponse::failure(None, PARSE_ERROR, format!("Parse error: {e}"));
                write_response(&mut writer, &response).await?;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IncomingRequest>(line) {
            Ok(request) => dispatch(&jobs, request).await,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request");
                RpcResponse::failure(None, PARSE_ERROR, format!("Parse error: {e}"))
            }
        };

        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn dispatch(jobs: &mpsc::Sender<Job>, request: IncomingRequest) -> RpcResponse {
    let id = request.id;
    let method = request.method.unwrap_or_else(|| "unknown".into());
    tracing::debug!(?id, method = %method, "request queued");

    let (reply_tx, reply_rx) = oneshot::channel();
    let job = Job {
        method,
        params: request.params.unwrap_or_default(),
        reply: reply_tx,
    };

    if jobs.send(job).await.is_err() {
        return RpcResponse::failure(
            id,
            INTERNAL_ERROR,
            "Internal error: scene executor is not running",
        );
    }

    match reply_rx.await {
        Ok(result) => match serde_json::to_value(&result) {
            Ok(value) => RpcResponse::success(id, value),
            Err(e) => RpcResponse::failure(id, INTERNAL_ERROR, format!("Internal error: {e}")),
        },
        Err(_) => RpcResponse::failure(
            id,
            INTERNAL_ERROR,
            "Internal error: scene executor dropped the request",
        ),
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &RpcResponse) -> Result<()> {
    let mut json = serde_json::to_string(response)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    Ok(())
}
