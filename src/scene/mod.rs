pub mod memory;

pub use memory::MemoryScene;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{MeshchatError, Result};
use crate::ipc::listener::Job;
use crate::ipc::{
    ToolResult, METHOD_EXECUTE_EDIT, METHOD_EXPORT_MODEL, METHOD_LOAD_MODEL, METHOD_SCENE_INFO,
};
use crate::translate::CommandKind;

/// Index of an object inside the backend's scene.
pub type ObjectId = usize;

/// Capabilities the scene tool exposes to the executor.
///
/// Implementations are only ever driven from the executor thread.
pub trait SceneBackend: Send {
    /// Remove every object from the scene.
    fn clear(&mut self) -> Result<()>;

    /// Import a model file into the scene, returning how many objects arrived.
    fn import(&mut self, path: &Path, format: ModelFormat) -> Result<usize>;

    /// Write the whole scene to `path`.
    fn export(&mut self, path: &Path, format: ModelFormat) -> Result<()>;

    /// Objects an edit applies to: the current selection, or every mesh
    /// (which then becomes selected) when nothing is selected.
    fn edit_targets(&mut self) -> Vec<ObjectId>;

    /// Apply one edit to the given objects.
    fn apply(&mut self, targets: &[ObjectId], op: &EditOp) -> Result<()>;

    fn info(&self) -> SceneInfo;
}

/// 3D interchange formats the tool can import and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelFormat {
    Glb,
    Gltf,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "glb" => Ok(ModelFormat::Glb),
            "gltf" => Ok(ModelFormat::Gltf),
            _ => Err(MeshchatError::UnsupportedFormat {
                format: if ext.is_empty() {
                    path.display().to_string()
                } else {
                    format!(".{ext}")
                },
            }),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GLB" => Ok(ModelFormat::Glb),
            "GLTF" => Ok(ModelFormat::Gltf),
            _ => Err(MeshchatError::UnsupportedFormat {
                format: name.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFormat::Glb => write!(f, "GLB"),
            ModelFormat::Gltf => write!(f, "GLTF"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl std::str::FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "X" => Ok(Axis::X),
            "Y" => Ok(Axis::Y),
            "Z" => Ok(Axis::Z),
            _ => Err(format!("unknown axis: {s}")),
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Primitive {
    Cube,
    Sphere,
    Cylinder,
    Cone,
}

impl Primitive {
    pub fn display_name(&self) -> &'static str {
        match self {
            Primitive::Cube => "Cube",
            Primitive::Sphere => "Sphere",
            Primitive::Cylinder => "Cylinder",
            Primitive::Cone => "Cone",
        }
    }
}

impl std::str::FromStr for Primitive {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CUBE" => Ok(Primitive::Cube),
            "SPHERE" | "UV_SPHERE" => Ok(Primitive::Sphere),
            "CYLINDER" => Ok(Primitive::Cylinder),
            "CONE" => Ok(Primitive::Cone),
            _ => Err(format!("unsupported object type: {s}")),
        }
    }
}

/// A typed edit, parsed from an `execute_edit` request.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    ChangeColor { rgba: [f64; 4] },
    AddObject { primitive: Primitive, location: [f64; 3], size: f64 },
    Scale { factor: f64 },
    Rotate { axis: Axis, degrees: f64 },
    Smooth,
    Subdivide { levels: u32 },
    Material { metallic: f64, roughness: f64 },
    Mirror { axis: Axis },
    Array { count: u32, offset: [f64; 3] },
}

impl EditOp {
    /// Parse an edit command. Returns `None` for commands the tool only
    /// acknowledges (`generic_edit` and names it does not know).
    pub fn parse(command: &str, params: &Map<String, Value>) -> Result<Option<Self>> {
        let Ok(kind) = command.parse::<CommandKind>() else {
            return Ok(None);
        };

        let op = match kind {
            CommandKind::ChangeColor => EditOp::ChangeColor {
                rgba: [
                    number(params, "r", 0.0)?,
                    number(params, "g", 0.3)?,
                    number(params, "b", 1.0)?,
                    number(params, "a", 1.0)?,
                ],
            },
            CommandKind::AddObject => EditOp::AddObject {
                primitive: parsed(params, "type", Primitive::Cube)?,
                location: vector(params, "position", [0.0, 0.0, 0.0])?,
                size: number(params, "scale", 1.0)?,
            },
            CommandKind::ScaleModel => EditOp::Scale {
                factor: number(params, "factor", 1.0)?,
            },
            CommandKind::RotateModel => EditOp::Rotate {
                axis: parsed(params, "axis", Axis::Z)?,
                degrees: number(params, "angle", 90.0)?,
            },
            CommandKind::ApplySmooth => EditOp::Smooth,
            CommandKind::Subdivide => EditOp::Subdivide {
                levels: number(params, "levels", 2.0)?.max(0.0) as u32,
            },
            CommandKind::ChangeMaterial => EditOp::Material {
                metallic: number(params, "metallic", 0.0)?,
                roughness: number(params, "roughness", 0.5)?,
            },
            CommandKind::Mirror => EditOp::Mirror {
                axis: parsed(params, "axis", Axis::X)?,
            },
            CommandKind::Array => EditOp::Array {
                count: number(params, "count", 3.0)?.max(1.0) as u32,
                offset: vector(params, "offset", [2.0, 0.0, 0.0])?,
            },
            CommandKind::GenericEdit => return Ok(None),
        };
        Ok(Some(op))
    }

    pub fn summary(&self) -> String {
        match self {
            EditOp::ChangeColor { rgba } => format!(
                "Color changed to RGBA({}, {}, {}, {})",
                rgba[0], rgba[1], rgba[2], rgba[3]
            ),
            EditOp::AddObject { primitive, .. } => {
                format!("{} added", primitive.display_name())
            }
            EditOp::Scale { factor } => format!("Scaled by {factor}x"),
            EditOp::Rotate { axis, degrees } => format!("Rotated {degrees} degrees around {axis}"),
            EditOp::Smooth => "Smooth shading applied".into(),
            EditOp::Subdivide { levels } => format!("Subdivided at level {levels}"),
            EditOp::Material {
                metallic,
                roughness,
            } => format!("Material changed (metallic: {metallic}, roughness: {roughness})"),
            EditOp::Mirror { axis } => format!("Mirrored along {axis}"),
            EditOp::Array { count, .. } => format!("Arrayed into {count} copies"),
        }
    }
}

fn number(params: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| MeshchatError::Scene {
            reason: format!("parameter '{key}' must be a number, got {value}"),
        }),
    }
}

fn vector(params: &Map<String, Value>, key: &str, default: [f64; 3]) -> Result<[f64; 3]> {
    let invalid = |value: &Value| MeshchatError::Scene {
        reason: format!("parameter '{key}' must be an array of 3 numbers, got {value}"),
    };
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            let items = value.as_array().ok_or_else(|| invalid(value))?;
            if items.len() != 3 {
                return Err(invalid(value));
            }
            let mut out = [0.0; 3];
            for (slot, item) in out.iter_mut().zip(items) {
                *slot = item.as_f64().ok_or_else(|| invalid(value))?;
            }
            Ok(out)
        }
    }
}

fn parsed<T>(params: &Map<String, Value>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(s)) => s.parse().map_err(|reason| MeshchatError::Scene { reason }),
        Some(value) => Err(MeshchatError::Scene {
            reason: format!("parameter '{key}' must be a string, got {value}"),
        }),
    }
}

/// Transform summary of one scene object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub name: String,
    pub kind: String,
    pub location: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub object_count: usize,
    pub objects: Vec<ObjectSummary>,
}

/// Runs every scene-mutating request on the thread that owns the backend.
pub struct Executor<B> {
    backend: B,
}

impl<B: SceneBackend> Executor<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drain the job queue in receipt order until every sender is gone.
    pub fn run(mut self, mut jobs: mpsc::Receiver<Job>) {
        tracing::info!("scene executor started");
        while let Some(job) = jobs.blocking_recv() {
            let result = self.execute(&job.method, &job.params);
            if job.reply.send(result).is_err() {
                tracing::warn!(method = %job.method, "requester went away before the reply");
            }
        }
        tracing::info!("scene executor stopped");
    }

    /// Execute one request. Failures, including panics inside the backend,
    /// become `status: error` results.
    pub fn execute(&mut self, method: &str, params: &Map<String, Value>) -> ToolResult {
        tracing::debug!(method, "executing request");
        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch(method, params)));
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(method, error = %e, "request failed");
                ToolResult::error(e.to_string())
            }
            Err(_) => {
                tracing::error!(method, "scene backend panicked");
                ToolResult::error(format!("{method} failed: scene backend panicked"))
            }
        }
    }

    fn dispatch(&mut self, method: &str, params: &Map<String, Value>) -> Result<ToolResult> {
        match method {
            METHOD_LOAD_MODEL => self.load_model(params),
            METHOD_EXECUTE_EDIT => self.execute_edit(params),
            METHOD_EXPORT_MODEL => self.export_model(params),
            METHOD_SCENE_INFO => {
                let info = serde_json::to_value(self.backend.info())?;
                Ok(ToolResult::success("Scene info").with_data(info))
            }
            other => Ok(ToolResult::error(format!("Unknown method: {other}"))),
        }
    }

    fn load_model(&mut self, params: &Map<String, Value>) -> Result<ToolResult> {
        let file_path = string_param(params, "file_path")?;
        let path = Path::new(&file_path);
        let format = match ModelFormat::from_path(path) {
            Ok(format) => format,
            Err(e) => return Ok(ToolResult::error(format!("Unsupported file format: {e}"))),
        };

        self.backend.clear()?;
        let count = self.backend.import(path, format)?;
        tracing::info!(path = %file_path, objects = count, "model imported");
        Ok(ToolResult::success(format!("Model loaded: {file_path}")))
    }

    fn execute_edit(&mut self, params: &Map<String, Value>) -> Result<ToolResult> {
        let command = params
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let empty = Map::new();
        let edit_params = params
            .get("params")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let Some(op) = EditOp::parse(&command, edit_params)? else {
            return Ok(ToolResult::success(format!("Command received: {command}")));
        };

        let targets = match op {
            EditOp::AddObject { .. } => Vec::new(),
            _ => self.backend.edit_targets(),
        };
        self.backend.apply(&targets, &op)?;
        tracing::info!(command = %command, targets = targets.len(), "edit applied");
        Ok(ToolResult::success(op.summary()))
    }

    fn export_model(&mut self, params: &Map<String, Value>) -> Result<ToolResult> {
        let file_path = string_param(params, "file_path")?;
        let format_name = params
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("GLB");
        let format = match ModelFormat::from_name(format_name) {
            Ok(format) => format,
            Err(_) => {
                return Ok(ToolResult::error(format!(
                    "Unsupported export format: {format_name}"
                )))
            }
        };

        self.backend.export(Path::new(&file_path), format)?;
        tracing::info!(path = %file_path, format = %format, "model exported");
        Ok(ToolResult::success(format!("Model exported: {file_path}")))
    }
}

fn string_param(params: &Map<String, Value>, key: &str) -> Result<String> {
    match params.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(MeshchatError::Scene {
            reason: format!("missing '{key}' parameter"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ModelFormat::from_path(Path::new("a/model.GLB")).unwrap(),
            ModelFormat::Glb
        );
        assert_eq!(
            ModelFormat::from_path(Path::new("model.gltf")).unwrap(),
            ModelFormat::Gltf
        );
        assert!(ModelFormat::from_path(Path::new("model.obj")).is_err());
        assert!(ModelFormat::from_path(Path::new("model")).is_err());
    }

    #[test]
    fn test_parse_uses_listener_defaults() {
        let op = EditOp::parse("change_color", &Map::new()).unwrap().unwrap();
        assert_eq!(
            op,
            EditOp::ChangeColor {
                rgba: [0.0, 0.3, 1.0, 1.0]
            }
        );

        let op = EditOp::parse("rotate_model", &params(json!({"angle": 45})))
            .unwrap()
            .unwrap();
        assert_eq!(
            op,
            EditOp::Rotate {
                axis: Axis::Z,
                degrees: 45.0
            }
        );
    }

    #[test]
    fn test_parse_add_object() {
        let op = EditOp::parse(
            "add_object",
            &params(json!({"type": "sphere", "position": [0, 0, 1], "scale": 0.5})),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            op,
            EditOp::AddObject {
                primitive: Primitive::Sphere,
                location: [0.0, 0.0, 1.0],
                size: 0.5
            }
        );
    }

    #[test]
    fn test_parse_generic_and_unknown_are_acknowledged() {
        assert!(EditOp::parse("generic_edit", &Map::new()).unwrap().is_none());
        assert!(EditOp::parse("change_light", &Map::new()).unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(EditOp::parse("scale_model", &params(json!({"factor": "big"}))).is_err());
        assert!(EditOp::parse("array", &params(json!({"offset": [1, 2]}))).is_err());
        assert!(EditOp::parse("mirror", &params(json!({"axis": "W"}))).is_err());
    }

    #[test]
    fn test_unknown_method_is_structured_error() {
        let mut executor = Executor::new(MemoryScene::new());
        let result = executor.execute("explode", &Map::new());
        assert!(!result.is_success());
        assert!(result.message.contains("Unknown method"));
    }

    #[test]
    fn test_load_unsupported_format_keeps_scene() {
        let mut executor = Executor::new(MemoryScene::new());
        executor.execute(
            METHOD_EXECUTE_EDIT,
            &params(json!({"command": "add_object", "params": {"type": "CUBE"}})),
        );
        let result = executor.execute(
            METHOD_LOAD_MODEL,
            &params(json!({"file_path": "/tmp/model.fbx"})),
        );
        assert!(!result.is_success());
        assert!(result.message.contains("Unsupported file format"));
        assert_eq!(executor.backend().info().object_count, 1);
    }

    #[test]
    fn test_export_unsupported_format() {
        let mut executor = Executor::new(MemoryScene::new());
        let result = executor.execute(
            METHOD_EXPORT_MODEL,
            &params(json!({"file_path": "/tmp/out.usdz", "format": "USDZ"})),
        );
        assert!(!result.is_success());
        assert!(result.message.contains("Unsupported export format"));
    }

    #[test]
    fn test_missing_file_path_is_error_result() {
        let mut executor = Executor::new(MemoryScene::new());
        let result = executor.execute(METHOD_LOAD_MODEL, &Map::new());
        assert!(!result.is_success());
        assert!(result.message.contains("file_path"));
    }
}
