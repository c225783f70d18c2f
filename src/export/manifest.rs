use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use mesh_common::MaterialRegistry;
use serde::{Deserialize, Serialize};

use crate::flatten::FlatMesh;

use super::ExportError;

/// Sidecar describing the materials of an exported mesh.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MaterialManifest {
    pub materials: Vec<ManifestMaterial>,
    pub textures: Vec<PathBuf>,
    /// Registry id of every triangle, in index buffer order.
    pub face_materials: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ManifestMaterial {
    pub id: u32,
    pub name: String,
    pub base_color: [f32; 4],
    pub opacity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_color_map: Option<PathBuf>,
}

impl MaterialManifest {
    pub const EXTENSION: &'static str = "materials.json";

    pub fn new(materials: &MaterialRegistry, mesh: &FlatMesh) -> Self {
        Self {
            materials: materials
                .iter()
                .map(|(id, material)| ManifestMaterial {
                    id: id.raw(),
                    name: material.name.clone(),
                    base_color: material.base_color,
                    opacity: material.opacity,
                    base_color_map: material.base_color_map.clone(),
                })
                .collect(),
            textures: materials
                .texture_paths()
                .into_iter()
                .map(Path::to_path_buf)
                .collect(),
            face_materials: mesh.face_materials.iter().map(|id| id.raw()).collect(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), ExportError> {
        let io_error = |source: std::io::Error| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_common::{MaterialDescriptor, MaterialId};

    #[test]
    fn manifest_lists_registry_and_faces() {
        let mut registry = MaterialRegistry::new();
        let ids = registry.register(vec![
            MaterialDescriptor::new("wood", [0.5, 0.3, 0.1, 1.0]).with_base_color_map("wood.png")
        ]);
        let mesh = FlatMesh {
            face_materials: vec![ids[0], MaterialId::new(0)],
            ..Default::default()
        };
        let manifest = MaterialManifest::new(&registry, &mesh);
        assert_eq!(manifest.materials.len(), 2);
        assert_eq!(manifest.materials[0].name, "default");
        assert_eq!(manifest.textures, vec![PathBuf::from("wood.png")]);
        assert_eq!(manifest.face_materials, vec![1, 0]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.materials.json");
        manifest.write(&path).unwrap();
        let read: MaterialManifest =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, manifest);
    }
}
