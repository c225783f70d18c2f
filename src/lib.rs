pub mod convert_config;
pub mod export;
pub mod flatten;
pub mod scene_loader;

use std::{fs, path::Path, path::PathBuf};

use anyhow::Context;
use mesh_common::Scene;

use crate::{
    convert_config::ConvertConfig,
    export::{export, MaterialManifest},
    flatten::flatten,
    scene_loader::GltfSceneLoader,
};

/// Reads a scene snapshot or imports a glTF file.
pub fn load_scene(config: &ConvertConfig) -> anyhow::Result<Scene> {
    if config.is_snapshot_input() {
        read_snapshot(&config.input)
    } else {
        GltfSceneLoader::new().load_scene(&config.input)
    }
}

pub fn read_snapshot(path: &Path) -> anyhow::Result<Scene> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    Scene::from_bytes(&bytes).with_context(|| format!("Invalid scene snapshot {:?}", path))
}

pub fn write_snapshot(scene: &Scene, path: &Path) -> anyhow::Result<()> {
    fs::write(path, scene.to_bytes()?).with_context(|| format!("Failed to write {:?}", path))
}

/// Runs the whole conversion and returns the written files.
pub fn convert(config: &ConvertConfig) -> anyhow::Result<Vec<PathBuf>> {
    let scene = load_scene(config)?;
    let mut written = Vec::new();

    if config.write_snapshot && !config.is_snapshot_input() {
        let path = config.output_path("scene");
        write_snapshot(&scene, &path)?;
        log::info!("Wrote {:?}", path);
        written.push(path);
    }

    let flattened = flatten(&scene, &config.flatten_options())?;
    let mesh = flattened.mesh.unwrap_or_default();
    if mesh.is_empty() {
        log::warn!("{:?} contains no geometry", config.input);
    }
    written.extend(export(&mesh, &config.input, config.export_targets())?);

    if config.write_materials {
        let path = config.output_path(MaterialManifest::EXTENSION);
        MaterialManifest::new(scene.materials(), &mesh).write(&path)?;
        log::info!("Wrote {:?}", path);
        written.push(path);
    }

    Ok(written)
}
