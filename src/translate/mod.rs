pub mod anthropic;
pub mod extract;
pub mod keywords;

pub use anthropic::AnthropicModel;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::config::{ModelConfig, ModelProvider};
use crate::error::{MeshchatError, Result};

/// Fixed system prompt sent with every translation request.
pub const SYSTEM_PROMPT: &str = r#"You are an assistant that edits 3D models in a modeling tool.
Translate the user's request into exactly one edit command and reply with it as a JSON object.

Available commands:
1. change_color - change the color: {"command": "change_color", "params": {"r": 0-1, "g": 0-1, "b": 0-1, "a": 1.0}}
2. scale_model - resize the model: {"command": "scale_model", "params": {"factor": number}}
3. rotate_model - rotate the model: {"command": "rotate_model", "params": {"axis": "X|Y|Z", "angle": degrees}}
4. apply_smooth - smooth the surface: {"command": "apply_smooth", "params": {}}
5. add_object - add a primitive: {"command": "add_object", "params": {"type": "CUBE|SPHERE|CYLINDER|CONE", "position": [x, y, z], "scale": number}}
6. change_material - change material properties: {"command": "change_material", "params": {"metallic": 0-1, "roughness": 0-1}}
7. subdivide - add geometry detail: {"command": "subdivide", "params": {"levels": 1-3}}
8. mirror - mirror the model: {"command": "mirror", "params": {"axis": "X|Y|Z"}}
9. array - repeat the model: {"command": "array", "params": {"count": number, "offset": [x, y, z]}}

Reply with a short explanation followed by the JSON object, for example:
{"command": "change_color", "params": {"r": 1.0, "g": 0.0, "b": 0.0, "a": 1.0}, "description": "Changed the color to red"}"#;

/// Every edit command name the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    ChangeColor,
    ScaleModel,
    RotateModel,
    ApplySmooth,
    AddObject,
    ChangeMaterial,
    Subdivide,
    Mirror,
    Array,
    GenericEdit,
}

impl CommandKind {
    pub const ALL: [CommandKind; 10] = [
        CommandKind::ChangeColor,
        CommandKind::ScaleModel,
        CommandKind::RotateModel,
        CommandKind::ApplySmooth,
        CommandKind::AddObject,
        CommandKind::ChangeMaterial,
        CommandKind::Subdivide,
        CommandKind::Mirror,
        CommandKind::Array,
        CommandKind::GenericEdit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ChangeColor => "change_color",
            CommandKind::ScaleModel => "scale_model",
            CommandKind::RotateModel => "rotate_model",
            CommandKind::ApplySmooth => "apply_smooth",
            CommandKind::AddObject => "add_object",
            CommandKind::ChangeMaterial => "change_material",
            CommandKind::Subdivide => "subdivide",
            CommandKind::Mirror => "mirror",
            CommandKind::Array => "array",
            CommandKind::GenericEdit => "generic_edit",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommandKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown command: {s}"))
    }
}

/// A structured edit request. The name is kept as a string so commands a
/// model invents are relayed verbatim and acknowledged by the tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditCommand {
    pub command: String,
    #[serde(default, deserialize_with = "lenient")]
    pub params: Map<String, Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
}

/// `null` or a value of the wrong shape reads as the default, so a model
/// reply with a usable `command` is never discarded over a side field.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl EditCommand {
    pub fn new(kind: CommandKind, params: Map<String, Value>, description: impl Into<String>) -> Self {
        Self {
            command: kind.as_str().to_string(),
            params,
            description: description.into(),
        }
    }

    /// Typed kind, or `None` for names outside the known set.
    pub fn kind(&self) -> Option<CommandKind> {
        self.command.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A remote (or local) text completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Complete the conversation and return the reply text.
    async fn complete(&self, system: &str, turns: &[Turn]) -> Result<String>;
}

/// Model that never answers, so every translation goes through the keyword
/// fallback. Useful without network access.
#[derive(Debug, Default, Clone)]
pub struct OfflineModel;

#[async_trait]
impl LanguageModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _system: &str, _turns: &[Turn]) -> Result<String> {
        Ok(String::new())
    }
}

/// Turns chat text into an `EditCommand`.
#[derive(Clone)]
pub struct Translator {
    model: Arc<dyn LanguageModel>,
}

impl Translator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let model: Arc<dyn LanguageModel> = match config.provider {
            ModelProvider::Anthropic => Arc::new(AnthropicModel::from_config(config)?),
            ModelProvider::Offline => Arc::new(OfflineModel),
        };
        Ok(Self::new(model))
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Translate `message`, recording both sides of the exchange in
    /// `transcript`. A model failure leaves the transcript unchanged.
    pub async fn translate(&self, message: &str, transcript: &mut Vec<Turn>) -> Result<EditCommand> {
        transcript.push(Turn::user(message));

        let reply = match self.model.complete(SYSTEM_PROMPT, transcript).await {
            Ok(reply) => reply,
            Err(e) => {
                transcript.pop();
                tracing::error!(model = self.model.name(), error = %e, "language model call failed");
                return Err(MeshchatError::Translation {
                    reason: e.to_string(),
                });
            }
        };
        transcript.push(Turn::assistant(reply.clone()));

        let command = match extract::extract_command(&reply) {
            Some(command) => {
                tracing::debug!(command = %command.command, "command extracted from reply");
                command
            }
            None => {
                let command = keywords::fallback_command(message, &reply);
                tracing::info!(command = %command.command, "using keyword fallback");
                command
            }
        };
        Ok(command)
    }
}
