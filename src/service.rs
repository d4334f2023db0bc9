use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::config::{Settings, StorageConfig};
use crate::error::{MeshchatError, Result};
use crate::ipc::relay_client::RelayClient;
use crate::session::SessionStore;
use crate::translate::{Role, Translator};

pub const TOOL_NAME: &str = "scene_edit";

const SAVE_WARNING: &str = "\n(note: saving the edited model failed)";
const DEFAULT_EDIT_MESSAGE: &str = "Edit completed.";
const RESET_MESSAGE: &str = "Conversation history has been reset.";

/// One relayed command, as reported back to the chat client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub tool: String,
    pub command: String,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOutcome {
    pub success: bool,
    pub message: String,
    pub tools_used: Vec<ToolUse>,
    pub model_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub message: String,
    pub task_id: String,
}

/// Failure body for an HTTP host, paired with `MeshchatError::status_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub detail: String,
}

impl From<&MeshchatError> for ErrorBody {
    fn from(err: &MeshchatError) -> Self {
        Self {
            success: false,
            detail: err.to_string(),
        }
    }
}

/// The relay connection and the task whose model the tool's scene holds.
/// The tool has a single scene, so at most one task owns it.
struct RelayState {
    client: RelayClient,
    scene_owner: Option<String>,
}

/// Chat-driven model editing: the three operations an HTTP layer exposes.
///
/// The relay lock is held for a whole edit, so load, edit and export of one
/// request are never interleaved with another request's commands.
pub struct EditService {
    relay: Mutex<RelayState>,
    translator: Translator,
    sessions: SessionStore,
    storage: StorageConfig,
}

impl EditService {
    pub fn new(relay: RelayClient, translator: Translator, storage: StorageConfig) -> Self {
        Self {
            relay: Mutex::new(RelayState {
                client: relay,
                scene_owner: None,
            }),
            translator,
            sessions: SessionStore::new(),
            storage,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            RelayClient::from_config(&settings.relay),
            Translator::from_config(&settings.model)?,
            settings.storage.clone(),
        ))
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// `<output_dir>/<task_id>.glb`
    pub fn source_path(&self, task_id: &str) -> PathBuf {
        self.storage.output_dir.join(format!("{task_id}.glb"))
    }

    /// `<output_dir>/<task_id>_edited.glb`
    pub fn edited_path(&self, task_id: &str) -> PathBuf {
        self.storage.output_dir.join(format!("{task_id}_edited.glb"))
    }

    pub fn model_url(&self, task_id: &str) -> String {
        format!(
            "{}/{task_id}_edited.glb",
            self.storage.static_prefix.trim_end_matches('/')
        )
    }

    /// Apply one chat message to the task's model and export the result.
    pub async fn edit(&self, task_id: &str, message: &str) -> Result<EditOutcome> {
        let source = self.source_path(task_id);
        if !source.exists() {
            return Err(MeshchatError::ModelNotFound { path: source });
        }

        let mut guard = self.relay.lock().await;
        let state = &mut *guard;
        let record = self.sessions.get_or_create(task_id);
        let owns_scene = state.scene_owner.as_deref() == Some(task_id);

        if !record.model_loaded || !owns_scene {
            tracing::info!(task_id, path = %source.display(), "loading source model");
            if let Some(previous) = state.scene_owner.take() {
                self.sessions.mark_unloaded(&previous);
            }
            let relay = &mut state.client;
            let loaded = relay.load_model(&source).await;
            let loaded = settle(relay, loaded).await?;
            if !loaded.is_success() {
                return Err(MeshchatError::LoadFailed {
                    reason: loaded.message,
                });
            }
            self.sessions.mark_loaded(task_id, &source);
            state.scene_owner = Some(task_id.to_string());
        } else {
            tracing::debug!(task_id, "model already loaded");
        }
        let relay = &mut state.client;

        let mut transcript = record.transcript;
        let translated = self.translator.translate(message, &mut transcript).await;
        let reply = transcript
            .last()
            .filter(|t| t.role == Role::Assistant)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        self.sessions.store_transcript(task_id, transcript);
        let command = translated?;
        tracing::info!(task_id, command = %command.command, "relaying edit");

        let edited = relay.execute_edit(&command).await;
        let edited = settle(relay, edited).await;
        let edited = match edited {
            Ok(edited) => edited,
            Err(e) => {
                if e.is_relay_failure() {
                    self.sessions.mark_unloaded(task_id);
                    state.scene_owner = None;
                }
                return Err(e);
            }
        };
        if !edited.is_success() {
            return Err(MeshchatError::EditFailed {
                reason: edited.message,
            });
        }

        let mut outcome_message = if !command.description.is_empty() {
            command.description.clone()
        } else if !reply.trim().is_empty() {
            reply
        } else {
            DEFAULT_EDIT_MESSAGE.to_string()
        };

        let output = self.edited_path(task_id);
        let saved = relay.save_model(&output, &self.storage.export_format).await;
        let model_url = match settle(relay, saved).await {
            Ok(result) if result.is_success() => {
                tracing::info!(task_id, path = %output.display(), "edited model saved");
                Some(self.model_url(task_id))
            }
            Ok(result) => {
                tracing::warn!(task_id, message = %result.message, "export rejected");
                outcome_message.push_str(SAVE_WARNING);
                None
            }
            Err(e) => {
                tracing::warn!(task_id, error = %e, "export failed");
                outcome_message.push_str(SAVE_WARNING);
                None
            }
        };

        Ok(EditOutcome {
            success: true,
            message: outcome_message,
            tools_used: vec![ToolUse {
                tool: TOOL_NAME.into(),
                command: command.command,
                params: command.params,
            }],
            model_url,
        })
    }

    /// Forget the task's transcript and loaded state; the next edit reloads
    /// the source model.
    pub fn reset(&self, task_id: &str) -> ResetOutcome {
        self.sessions.reset(task_id);
        ResetOutcome {
            message: RESET_MESSAGE.into(),
            task_id: task_id.to_string(),
        }
    }

    /// Path of the edited model, if one has been exported.
    pub fn download(&self, task_id: &str) -> Result<PathBuf> {
        let path = self.edited_path(task_id);
        if !path.exists() {
            return Err(MeshchatError::EditedModelNotFound { path });
        }
        Ok(path)
    }
}

/// Drop the connection after a failure that leaves the socket unusable.
async fn settle<T>(relay: &mut RelayClient, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_relay_failure() {
            tracing::warn!(addr = relay.addr(), error = %e, "relay failed, dropping connection");
            relay.disconnect().await;
        }
    }
    result
}
