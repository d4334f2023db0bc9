use std::path::Path;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::RelayConfig;
use crate::error::{MeshchatError, Result};
use crate::ipc::{
    RpcRequest, RpcResponse, ToolResult, METHOD_EXECUTE_EDIT, METHOD_EXPORT_MODEL,
    METHOD_LOAD_MODEL, METHOD_SCENE_INFO,
};
use crate::scene::SceneInfo;
use crate::translate::EditCommand;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_LIMIT: usize = 8192;

/// TCP client that relays JSON-RPC commands to the scene tool.
///
/// Holds at most one connection. Every `call` writes one request line and
/// blocks until the matching response line arrives, so a client must never be
/// shared between concurrent callers without an outer lock.
pub struct RelayClient {
    addr: String,
    connect_timeout: Duration,
    response_timeout: Duration,
    read_limit: usize,
    stream: Option<BufReader<TcpStream>>,
    next_id: u64,
}

impl RelayClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            read_limit: DEFAULT_READ_LIMIT,
            stream: None,
            next_id: 0,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.addr())
            .with_timeouts(config.connect_timeout(), config.response_timeout())
            .with_read_limit(config.read_buffer_bytes)
    }

    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    pub fn with_read_limit(mut self, bytes: usize) -> Self {
        self.read_limit = bytes.max(1);
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the connection. No-op when already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        tracing::info!(addr = %self.addr, "connecting to scene tool");
        let connect = TcpStream::connect(self.addr.as_str());
        let stream = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "scene tool unreachable");
                return Err(MeshchatError::Connection {
                    addr: self.addr.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                tracing::error!(addr = %self.addr, "connect timed out");
                return Err(MeshchatError::Connection {
                    addr: self.addr.clone(),
                    reason: format!("connect timed out after {:?}", self.connect_timeout),
                });
            }
        };
        let _ = stream.set_nodelay(true);

        self.stream = Some(BufReader::new(stream));
        tracing::info!(addr = %self.addr, "connected to scene tool");
        Ok(())
    }

    /// Close the connection if open. Errors while closing are ignored.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.get_mut().shutdown().await {
                tracing::debug!(error = %e, "ignoring error while closing relay socket");
            }
            tracing::info!(addr = %self.addr, "disconnected from scene tool");
        }
    }

    /// Send one request and wait for its response.
    pub async fn call(&mut self, method: &str, params: Map<String, Value>) -> Result<RpcResponse> {
        if self.stream.is_none() {
            self.connect().await?;
        }

        self.next_id += 1;
        let request = RpcRequest::new(self.next_id, method, params);
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        tracing::debug!(id = request.id, method, "sending request");

        let addr = self.addr.clone();
        let response_timeout = self.response_timeout;
        let read_limit = self.read_limit;
        let stream = self.stream.as_mut().ok_or_else(|| MeshchatError::Connection {
            addr: addr.clone(),
            reason: "not connected".into(),
        })?;

        stream
            .get_mut()
            .write_all(line.as_bytes())
            .await
            .map_err(|e| MeshchatError::Connection {
                addr: addr.clone(),
                reason: format!("write failed: {e}"),
            })?;

        let mut buf = Vec::with_capacity(read_limit.min(DEFAULT_READ_LIMIT));
        let read = tokio::time::timeout(
            response_timeout,
            read_response_line(stream, read_limit, &mut buf),
        )
        .await;

        let read_bytes = match read {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                return Err(MeshchatError::Connection {
                    addr,
                    reason: format!("read failed: {e}"),
                })
            }
            Err(_) => {
                tracing::warn!(id = request.id, method, "scene tool response timed out");
                return Err(MeshchatError::Timeout {
                    timeout: response_timeout,
                });
            }
        };

        if read_bytes == 0 {
            return Err(MeshchatError::EmptyResponse);
        }
        if buf.last() != Some(&b'\n') && read_bytes >= read_limit {
            return Err(MeshchatError::Protocol {
                reason: format!("response exceeds {read_limit} bytes"),
            });
        }

        let text = String::from_utf8_lossy(&buf);
        let text = text.trim();
        tracing::debug!(id = request.id, response = %truncate(text, 200), "received response");

        let response: RpcResponse =
            serde_json::from_str(text).map_err(|e| MeshchatError::Protocol {
                reason: format!("invalid response JSON: {e}"),
            })?;

        if let Some(id) = response.id {
            if id != request.id {
                return Err(MeshchatError::Protocol {
                    reason: format!("response id {id} does not match request id {}", request.id),
                });
            }
        }

        Ok(response)
    }

    /// Ask the tool to replace its scene with the model at `path`.
    pub async fn load_model(&mut self, path: &Path) -> Result<ToolResult> {
        let params = object(json!({ "file_path": path.display().to_string() }));
        let result = self.call(METHOD_LOAD_MODEL, params).await?.into_tool_result()?;
        if result.is_success() {
            tracing::info!(path = %path.display(), "model loaded");
        } else {
            tracing::warn!(path = %path.display(), message = %result.message, "model load rejected");
        }
        Ok(result)
    }

    /// Ask the tool to export its scene. Only valid on an open connection.
    pub async fn save_model(&mut self, path: &Path, format: &str) -> Result<ToolResult> {
        if !self.is_connected() {
            return Err(MeshchatError::Connection {
                addr: self.addr.clone(),
                reason: "not connected".into(),
            });
        }
        let params = object(json!({
            "file_path": path.display().to_string(),
            "format": format,
        }));
        self.call(METHOD_EXPORT_MODEL, params).await?.into_tool_result()
    }

    pub async fn execute_edit(&mut self, command: &EditCommand) -> Result<ToolResult> {
        let params = object(serde_json::to_value(command)?);
        self.call(METHOD_EXECUTE_EDIT, params).await?.into_tool_result()
    }

    pub async fn scene_info(&mut self) -> Result<SceneInfo> {
        let result = self
            .call(METHOD_SCENE_INFO, Map::new())
            .await?
            .into_tool_result()?;
        if !result.is_success() {
            return Err(MeshchatError::Scene {
                reason: result.message,
            });
        }
        let data = result.data.unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| MeshchatError::Protocol {
            reason: format!("invalid scene info: {e}"),
        })
    }
}

/// Read up to one newline-terminated response, never more than `limit` bytes.
async fn read_response_line(
    stream: &mut BufReader<TcpStream>,
    limit: usize,
    buf: &mut Vec<u8>,
) -> std::io::Result<usize> {
    stream.take(limit as u64).read_until(b'\n', buf).await
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
