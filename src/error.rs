use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MeshchatError {
    #[error("cannot connect to scene tool at {addr}: {reason}")]
    Connection { addr: String, reason: String },

    #[error("scene tool did not respond within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("scene tool closed the connection without a response")]
    EmptyResponse,

    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("translation failed: {reason}")]
    Translation { reason: String },

    #[error("unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("model file not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("edited model not found: {path}")]
    EditedModelNotFound { path: PathBuf },

    #[error("model load failed: {reason}")]
    LoadFailed { reason: String },

    #[error("edit failed: {reason}")]
    EditFailed { reason: String },

    #[error("scene error: {reason}")]
    Scene { reason: String },

    #[error("config parse error in {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("api error: status={status}, body={body}")]
    Api { status: u16, body: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MeshchatError {
    /// HTTP status an outer web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            MeshchatError::ModelNotFound { .. } | MeshchatError::EditedModelNotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Failures after which the relay socket must not be reused.
    pub fn is_relay_failure(&self) -> bool {
        matches!(
            self,
            MeshchatError::Connection { .. }
                | MeshchatError::Timeout { .. }
                | MeshchatError::Protocol { .. }
                | MeshchatError::EmptyResponse
        )
    }
}

pub type Result<T> = std::result::Result<T, MeshchatError>;
