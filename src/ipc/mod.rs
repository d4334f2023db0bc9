pub mod listener;
pub mod relay_client;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MeshchatError, Result};

pub const JSONRPC_VERSION: &str = "2.0";

/// Malformed JSON received by the listener.
pub const PARSE_ERROR: i64 = -32700;
/// The listener could not hand the request to its executor.
pub const INTERNAL_ERROR: i64 = -32603;

pub const METHOD_LOAD_MODEL: &str = "load_model";
pub const METHOD_EXECUTE_EDIT: &str = "execute_edit";
pub const METHOD_EXPORT_MODEL: &str = "export_model";
pub const METHOD_SCENE_INFO: &str = "scene_info";

/// JSON-RPC request sent from the relay to the scene tool, one per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// JSON-RPC response. `id` is null when the listener could not attribute the
/// message to a request (parse failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<u64>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<u64>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Turn the response into the tool's structured result, surfacing a
    /// JSON-RPC error object as `MeshchatError::Remote`.
    pub fn into_tool_result(self) -> Result<ToolResult> {
        if let Some(err) = self.error {
            return Err(MeshchatError::Remote {
                code: err.code,
                message: err.message,
            });
        }
        let result = self.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| MeshchatError::Protocol {
            reason: format!("unexpected result shape: {e}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// The `result` object of every listener response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}
