use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::MaterialId;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MaterialDescriptor {
    pub name: String,
    pub base_color_map: Option<PathBuf>,
    /// RGBA in `0..=1`.
    pub base_color: [f32; 4],
    pub opacity: f32,
}

impl MaterialDescriptor {
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn new(name: impl Into<String>, base_color: [f32; 4]) -> Self {
        Self {
            name: name.into(),
            base_color_map: None,
            base_color,
            opacity: 1.0,
        }
    }

    /// The neutral material every registry reserves at index 0.
    pub fn default_material() -> Self {
        Self::new(Self::DEFAULT_NAME, [1.0, 1.0, 1.0, 1.0])
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_base_color_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_color_map = Some(path.into());
        self
    }
}

/// Ordered list of materials. Index 0 is always the default material.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MaterialRegistry {
    materials: Vec<MaterialDescriptor>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self {
            materials: vec![MaterialDescriptor::default_material()],
        }
    }

    pub fn default_id() -> MaterialId {
        MaterialId::new(0)
    }

    /// Appends the materials in order and returns their ids.
    pub fn register(&mut self, materials: Vec<MaterialDescriptor>) -> Vec<MaterialId> {
        let first = self.materials.len() as u32;
        let ids = (first..first + materials.len() as u32)
            .map(MaterialId::new)
            .collect();
        self.materials.extend(materials);
        ids
    }

    pub fn get(&self, id: MaterialId) -> Option<&MaterialDescriptor> {
        self.materials.get(id.index())
    }

    pub fn contains(&self, id: MaterialId) -> bool {
        id.index() < self.materials.len()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Never true, the default material is always present.
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &MaterialDescriptor)> {
        self.materials
            .iter()
            .enumerate()
            .map(|(index, material)| (MaterialId::new(index as u32), material))
    }

    /// Every distinct texture map referenced by a registered material.
    pub fn texture_paths(&self) -> BTreeSet<&Path> {
        self.materials
            .iter()
            .filter_map(|material| material.base_color_map.as_deref())
            .collect()
    }
}

impl Default for MaterialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_material_is_reserved() {
        let registry = MaterialRegistry::new();
        assert_eq!(registry.len(), 1);
        let default = registry.get(MaterialRegistry::default_id()).unwrap();
        assert_eq!(default.name, MaterialDescriptor::DEFAULT_NAME);
        assert_eq!(default.opacity, 1.0);
    }

    #[test]
    fn register_appends_after_default() {
        let mut registry = MaterialRegistry::new();
        let ids = registry.register(vec![
            MaterialDescriptor::new("brick", [0.6, 0.2, 0.1, 1.0]),
            MaterialDescriptor::new("glass", [0.9, 0.9, 1.0, 0.3]).with_opacity(0.3),
        ]);
        assert_eq!(ids, vec![MaterialId::new(1), MaterialId::new(2)]);
        assert_eq!(registry.get(ids[1]).unwrap().name, "glass");
        assert!(registry.get(MaterialId::new(3)).is_none());
    }

    #[test]
    fn texture_paths_are_deduplicated() {
        let mut registry = MaterialRegistry::new();
        registry.register(vec![
            MaterialDescriptor::new("a", [1.0; 4]).with_base_color_map("./wood.png"),
            MaterialDescriptor::new("b", [1.0; 4]).with_base_color_map("./wood.png"),
            MaterialDescriptor::new("c", [1.0; 4]).with_base_color_map("./tile.png"),
            MaterialDescriptor::new("d", [1.0; 4]),
        ]);
        let paths: Vec<_> = registry.texture_paths().into_iter().collect();
        assert_eq!(paths, vec![Path::new("./tile.png"), Path::new("./wood.png")]);
    }
}
