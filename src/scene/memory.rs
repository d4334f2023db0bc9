use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MeshchatError, Result};
use crate::scene::{
    Axis, EditOp, ModelFormat, ObjectId, ObjectSummary, Primitive, SceneBackend, SceneInfo,
};

const SNAPSHOT_FORMAT: &str = "meshchat-scene";
const SNAPSHOT_VERSION: u32 = 1;
const MESH: &str = "MESH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub base_color: [f64; 4],
    pub metallic: f64,
    pub roughness: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "Material".into(),
            base_color: [0.8, 0.8, 0.8, 1.0],
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Modifier {
    Subdivision { levels: u32 },
    Mirror { axis: Axis },
    Array { count: u32, offset: [f64; 3] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub kind: String,
    pub location: [f64; 3],
    /// Euler angles in radians.
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
    #[serde(skip)]
    pub selected: bool,
    #[serde(default)]
    pub smooth: bool,
    #[serde(default)]
    pub material: Option<Material>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

impl SceneObject {
    pub fn mesh(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MESH.into(),
            location: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            selected: false,
            smooth: false,
            material: Some(Material::default()),
            modifiers: Vec::new(),
        }
    }

    pub fn is_mesh(&self) -> bool {
        self.kind == MESH
    }

    fn summary(&self) -> ObjectSummary {
        ObjectSummary {
            name: self.name.clone(),
            kind: self.kind.clone(),
            location: self.location,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

/// On-disk form written by `export` and understood by `import`.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    format: String,
    version: u32,
    objects: Vec<SceneObject>,
}

/// In-memory scene that records transforms, materials and modifiers.
///
/// Exports a JSON snapshot rather than real glTF bytes. Importing a file that
/// is not a snapshot yields one mesh named after the file stem.
#[derive(Debug, Default)]
pub struct MemoryScene {
    objects: Vec<SceneObject>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn insert(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    /// First free name in the `Cube`, `Cube.001`, `Cube.002` sequence.
    fn unique_name(&self, base: &str) -> String {
        if self.object(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}.{n:03}"))
            .find(|candidate| self.object(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    fn add_primitive(&mut self, primitive: Primitive, location: [f64; 3], size: f64) {
        for object in &mut self.objects {
            object.selected = false;
        }
        let mut object = SceneObject::mesh(self.unique_name(primitive.display_name()));
        object.location = location;
        object.scale = [size; 3];
        object.material = None;
        object.selected = true;
        self.objects.push(object);
    }
}

impl SceneBackend for MemoryScene {
    fn clear(&mut self) -> Result<()> {
        self.objects.clear();
        Ok(())
    }

    fn import(&mut self, path: &Path, _format: ModelFormat) -> Result<usize> {
        let bytes = std::fs::read(path).map_err(|e| MeshchatError::LoadFailed {
            reason: format!("{}: {e}", path.display()),
        })?;

        let imported = match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) if snapshot.format == SNAPSHOT_FORMAT => snapshot.objects,
            _ => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("Imported");
                vec![SceneObject::mesh(self.unique_name(stem))]
            }
        };

        let count = imported.len();
        self.objects.extend(imported);
        Ok(count)
    }

    fn export(&mut self, path: &Path, _format: ModelFormat) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let snapshot = Snapshot {
            format: SNAPSHOT_FORMAT.into(),
            version: SNAPSHOT_VERSION,
            objects: self.objects.clone(),
        };
        std::fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;
        Ok(())
    }

    fn edit_targets(&mut self) -> Vec<ObjectId> {
        let selected: Vec<ObjectId> = self
            .objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.selected)
            .map(|(i, _)| i)
            .collect();
        if !selected.is_empty() {
            return selected;
        }

        let meshes: Vec<ObjectId> = self
            .objects
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_mesh())
            .map(|(i, _)| i)
            .collect();
        for &i in &meshes {
            self.objects[i].selected = true;
        }
        meshes
    }

    fn apply(&mut self, targets: &[ObjectId], op: &EditOp) -> Result<()> {
        if let EditOp::AddObject {
            primitive,
            location,
            size,
        } = op
        {
            self.add_primitive(*primitive, *location, *size);
            return Ok(());
        }

        for &id in targets {
            let object = self.objects.get_mut(id).ok_or_else(|| MeshchatError::Scene {
                reason: format!("no object with index {id}"),
            })?;

            match op {
                EditOp::ChangeColor { rgba } => {
                    if object.is_mesh() {
                        object.material = Some(Material {
                            name: "EditedMaterial".into(),
                            base_color: *rgba,
                            ..Material::default()
                        });
                    }
                }
                EditOp::Scale { factor } => {
                    for s in &mut object.scale {
                        *s *= factor;
                    }
                }
                EditOp::Rotate { axis, degrees } => {
                    object.rotation[axis.index()] += degrees.to_radians();
                }
                EditOp::Smooth if object.is_mesh() => object.smooth = true,
                EditOp::Subdivide { levels } if object.is_mesh() => {
                    object.modifiers.push(Modifier::Subdivision { levels: *levels });
                }
                EditOp::Material {
                    metallic,
                    roughness,
                } if object.is_mesh() => {
                    if let Some(material) = object.material.as_mut() {
                        material.metallic = *metallic;
                        material.roughness = *roughness;
                    }
                }
                EditOp::Mirror { axis } if object.is_mesh() => {
                    object.modifiers.push(Modifier::Mirror { axis: *axis });
                }
                EditOp::Array { count, offset } if object.is_mesh() => {
                    object.modifiers.push(Modifier::Array {
                        count: *count,
                        offset: *offset,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn info(&self) -> SceneInfo {
        SceneInfo {
            object_count: self.objects.len(),
            objects: self.objects.iter().map(SceneObject::summary).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scene_with(names: &[&str]) -> MemoryScene {
        let mut scene = MemoryScene::new();
        for name in names {
            scene.insert(SceneObject::mesh(*name));
        }
        scene
    }

    #[test]
    fn test_targets_fall_back_to_all_meshes() {
        let mut scene = scene_with(&["Body", "Wheel"]);
        let mut lamp = SceneObject::mesh("Lamp");
        lamp.kind = "LIGHT".into();
        scene.insert(lamp);

        let targets = scene.edit_targets();
        assert_eq!(targets, vec![0, 1]);
        assert!(scene.objects()[0].selected);
        assert!(!scene.objects()[2].selected);
    }

    #[test]
    fn test_add_object_selects_only_new_object() {
        let mut scene = scene_with(&["Body"]);
        scene.edit_targets();
        scene
            .apply(
                &[],
                &EditOp::AddObject {
                    primitive: Primitive::Cube,
                    location: [0.0, 0.0, 1.0],
                    size: 1.0,
                },
            )
            .unwrap();

        assert_eq!(scene.edit_targets(), vec![1]);
        assert_eq!(scene.objects()[1].name, "Cube");
        assert_eq!(scene.objects()[1].location, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unique_names() {
        let mut scene = MemoryScene::new();
        let cube = EditOp::AddObject {
            primitive: Primitive::Cube,
            location: [0.0; 3],
            size: 1.0,
        };
        for _ in 0..3 {
            scene.apply(&[], &cube).unwrap();
        }
        let names: Vec<&str> = scene.objects().iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Cube", "Cube.001", "Cube.002"]);
    }

    #[test]
    fn test_scale_and_rotate_accumulate() {
        let mut scene = scene_with(&["Body"]);
        let targets = scene.edit_targets();
        scene.apply(&targets, &EditOp::Scale { factor: 2.0 }).unwrap();
        scene.apply(&targets, &EditOp::Scale { factor: 2.0 }).unwrap();
        scene
            .apply(
                &targets,
                &EditOp::Rotate {
                    axis: Axis::Z,
                    degrees: 90.0,
                },
            )
            .unwrap();

        let body = scene.object("Body").unwrap();
        assert_eq!(body.scale, [4.0; 3]);
        assert!((body.rotation[2] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_color_replaces_material() {
        let mut scene = scene_with(&["Body"]);
        let targets = scene.edit_targets();
        scene
            .apply(
                &targets,
                &EditOp::ChangeColor {
                    rgba: [1.0, 0.0, 0.0, 1.0],
                },
            )
            .unwrap();
        let material = scene.object("Body").unwrap().material.clone().unwrap();
        assert_eq!(material.base_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(material.roughness, 0.5);
    }

    #[test]
    fn test_color_leaves_non_meshes_alone() {
        let mut scene = scene_with(&["Body"]);
        let mut lamp = SceneObject::mesh("Lamp");
        lamp.kind = "LIGHT".into();
        scene.insert(lamp);

        scene
            .apply(
                &[0, 1],
                &EditOp::ChangeColor {
                    rgba: [0.0, 1.0, 0.0, 1.0],
                },
            )
            .unwrap();
        let body = scene.object("Body").unwrap().material.clone().unwrap();
        assert_eq!(body.base_color, [0.0, 1.0, 0.0, 1.0]);
        let lamp = scene.object("Lamp").unwrap().material.clone().unwrap();
        assert_eq!(lamp.name, "Material");
        assert_eq!(lamp.base_color, Material::default().base_color);
    }

    #[test]
    fn test_material_skips_objects_without_material() {
        let mut scene = MemoryScene::new();
        scene
            .apply(
                &[],
                &EditOp::AddObject {
                    primitive: Primitive::Sphere,
                    location: [0.0; 3],
                    size: 1.0,
                },
            )
            .unwrap();
        let targets = scene.edit_targets();
        scene
            .apply(
                &targets,
                &EditOp::Material {
                    metallic: 0.9,
                    roughness: 0.1,
                },
            )
            .unwrap();
        assert!(scene.object("Sphere").unwrap().material.is_none());
    }

    #[test]
    fn test_export_then_import_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("scene_edited.glb");

        let mut scene = scene_with(&["Body", "Wheel"]);
        let targets = scene.edit_targets();
        scene
            .apply(&targets, &EditOp::Subdivide { levels: 2 })
            .unwrap();
        scene.export(&path, ModelFormat::Glb).unwrap();

        let mut reloaded = MemoryScene::new();
        let count = reloaded.import(&path, ModelFormat::Glb).unwrap();
        assert_eq!(count, 2);
        assert_eq!(reloaded.info(), scene.info());
        assert_eq!(
            reloaded.object("Wheel").unwrap().modifiers,
            vec![Modifier::Subdivision { levels: 2 }]
        );
        assert!(reloaded.objects().iter().all(|o| !o.selected));
    }

    #[test]
    fn test_import_foreign_file_yields_single_mesh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chair.glb");
        std::fs::write(&path, b"glTF\x02\x00\x00\x00").unwrap();

        let mut scene = MemoryScene::new();
        assert_eq!(scene.import(&path, ModelFormat::Glb).unwrap(), 1);
        assert_eq!(scene.objects()[0].name, "chair");
    }

    #[test]
    fn test_import_missing_file_fails() {
        let mut scene = MemoryScene::new();
        let err = scene
            .import(Path::new("/nonexistent/model.glb"), ModelFormat::Glb)
            .unwrap_err();
        assert!(matches!(err, MeshchatError::LoadFailed { .. }));
    }
}
