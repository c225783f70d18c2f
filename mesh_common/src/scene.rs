mod material;
mod mesh;
mod node;

pub use material::*;
pub use mesh::*;
pub use node::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform::Affine;

use mesh::{check_count, check_indices, check_stride};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u32);

impl MeshId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Index into the [`MaterialRegistry`].
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u32);

impl MaterialId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown mesh {0:?}")]
    UnknownMesh(MeshId),
    #[error("unknown material {0:?}")]
    UnknownMaterial(MaterialId),
    #[error("node {child:?} references parent {parent:?}, which was not created before it")]
    ParentOrder { child: NodeId, parent: NodeId },
    #[error("{attribute} buffer has length {len}, which is not a multiple of {stride}")]
    Stride {
        attribute: &'static str,
        len: usize,
        stride: usize,
    },
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("{attribute} has {got} entries, expected {expected}")]
    AttributeCount {
        attribute: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("face material slot {slot} is invalid for a mesh with {applied} slots")]
    MaterialSlot { slot: i32, applied: usize },
    #[error("uv channel {0} is not supported, only channel 0 is stored")]
    UvChannel(u32),
    #[error("scene snapshot could not be encoded or decoded")]
    Snapshot(#[from] bincode::Error),
}

/// The imported scene: a node arena in creation order, the meshes the nodes
/// reference and the material registry.
///
/// Parents are always created before their children, so iterating `nodes` in
/// order visits every parent first.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Scene {
    nodes: Vec<Node>,
    meshes: Vec<MeshSource>,
    materials: MaterialRegistry,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn meshes(&self) -> &[MeshSource] {
        &self.meshes
    }

    pub fn materials(&self) -> &MaterialRegistry {
        &self.materials
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, SceneError> {
        self.nodes.get(id.index()).ok_or(SceneError::UnknownNode(id))
    }

    pub fn mesh(&self, id: MeshId) -> Result<&MeshSource, SceneError> {
        self.meshes.get(id.index()).ok_or(SceneError::UnknownMesh(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SceneError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(SceneError::UnknownNode(id))
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Result<&mut MeshSource, SceneError> {
        self.meshes
            .get_mut(id.index())
            .ok_or(SceneError::UnknownMesh(id))
    }

    /// Appends a node with an identity transform.
    pub fn create_node(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
    ) -> Result<NodeId, SceneError> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node::new(name, parent));
        Ok(id)
    }

    pub fn create_mesh(&mut self, name: impl Into<String>) -> MeshId {
        let id = MeshId::new(self.meshes.len() as u32);
        self.meshes.push(MeshSource::new(name));
        id
    }

    /// Sets the local transform from a row-major 3x3 linear part followed by the
    /// translation.
    pub fn set_transform(&mut self, node: NodeId, matrix: [f32; 12]) -> Result<(), SceneError> {
        self.set_affine(node, Affine::from_3x4(matrix))
    }

    pub fn set_affine(&mut self, node: NodeId, transform: Affine) -> Result<(), SceneError> {
        self.node_mut(node)?.local_transform = transform;
        Ok(())
    }

    pub fn attach_mesh(&mut self, node: NodeId, mesh: MeshId) -> Result<(), SceneError> {
        self.mesh(mesh)?;
        self.node_mut(node)?.mesh = Some(mesh);
        Ok(())
    }

    pub fn set_positions(
        &mut self,
        mesh: MeshId,
        positions: Vec<f32>,
        indices: Vec<u32>,
    ) -> Result<(), SceneError> {
        check_stride("positions", positions.len(), 3)?;
        check_stride("indices", indices.len(), 3)?;
        check_indices(&indices, positions.len() / 3)?;

        let mesh = self.mesh_mut(mesh)?;
        mesh.positions = positions;
        mesh.indices = indices;
        let triangle_count = mesh.triangle_count();
        if mesh.face_material_index.len() != triangle_count {
            mesh.face_material_index = vec![0; triangle_count];
        }
        Ok(())
    }

    pub fn set_normals(&mut self, mesh: MeshId, normals: Vec<f32>) -> Result<(), SceneError> {
        check_stride("normals", normals.len(), 3)?;
        let mesh = self.mesh_mut(mesh)?;
        if !normals.is_empty() {
            check_count("normals", mesh.vertex_count(), normals.len() / 3)?;
        }
        mesh.normals = normals;
        Ok(())
    }

    /// Only texture channel 0 is stored.
    pub fn set_uv(&mut self, mesh: MeshId, channel: u32, uvs: Vec<f32>) -> Result<(), SceneError> {
        if channel != 0 {
            return Err(SceneError::UvChannel(channel));
        }
        check_stride("uvs", uvs.len(), 2)?;
        let mesh = self.mesh_mut(mesh)?;
        if !uvs.is_empty() {
            check_count("uvs", mesh.vertex_count(), uvs.len() / 2)?;
        }
        mesh.uvs = uvs;
        Ok(())
    }

    pub fn set_face_material_indices(
        &mut self,
        mesh: MeshId,
        indices: Vec<i32>,
    ) -> Result<(), SceneError> {
        let mesh = self.mesh_mut(mesh)?;
        check_count("face material indices", mesh.triangle_count(), indices.len())?;
        mesh.check_slots(&indices)?;
        mesh.face_material_index = indices;
        Ok(())
    }

    pub fn register_materials(&mut self, materials: Vec<MaterialDescriptor>) -> Vec<MaterialId> {
        self.materials.register(materials)
    }

    /// Adds `material` to the mesh's slots unless it is already there and
    /// returns its slot.
    pub fn apply_material(
        &mut self,
        mesh: MeshId,
        material: MaterialId,
    ) -> Result<i32, SceneError> {
        if !self.materials.contains(material) {
            return Err(SceneError::UnknownMaterial(material));
        }
        let mesh = self.mesh_mut(mesh)?;
        let slot = match mesh.materials_used.iter().position(|&m| m == material) {
            Some(slot) => slot,
            None => {
                mesh.materials_used.push(material);
                mesh.materials_used.len() - 1
            }
        };
        Ok(slot as i32)
    }

    pub fn get_material(&self, id: MaterialId) -> Result<&MaterialDescriptor, SceneError> {
        self.materials.get(id).ok_or(SceneError::UnknownMaterial(id))
    }

    /// The registry material a triangle's slot points to.
    pub fn material_id_for_face(
        &self,
        mesh: MeshId,
        face: usize,
    ) -> Result<MaterialId, SceneError> {
        let mesh = self.mesh(mesh)?;
        Ok(resolve_face_material(mesh, face))
    }

    pub fn material_for_face(
        &self,
        mesh: MeshId,
        face: usize,
    ) -> Result<&MaterialDescriptor, SceneError> {
        let id = self.material_id_for_face(mesh, face)?;
        self.get_material(id)
    }

    /// Checks every id reference and every mesh buffer.
    pub fn validate(&self) -> Result<(), SceneError> {
        for (index, node) in self.nodes.iter().enumerate() {
            let child = NodeId::new(index as u32);
            if let Some(parent) = node.parent {
                if parent >= child {
                    return Err(SceneError::ParentOrder { child, parent });
                }
            }
            if let Some(mesh) = node.mesh {
                self.mesh(mesh)?;
            }
        }
        for mesh in &self.meshes {
            mesh.validate()?;
            if let Some(&material) = mesh
                .materials_used
                .iter()
                .find(|&&material| !self.materials.contains(material))
            {
                return Err(SceneError::UnknownMaterial(material));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SceneError> {
        Ok(bincode::serialize(self)?)
    }

    /// Reads a snapshot written by [`Scene::to_bytes`] and validates it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SceneError> {
        let scene: Scene = bincode::deserialize(bytes)?;
        scene.validate()?;
        Ok(scene)
    }
}

/// Resolves a face slot to a registry id. Slots that do not point at an applied
/// material resolve to the default material.
pub fn resolve_face_material(mesh: &MeshSource, face: usize) -> MaterialId {
    mesh.face_material_index
        .get(face)
        .and_then(|&slot| usize::try_from(slot).ok())
        .and_then(|slot| mesh.materials_used.get(slot).copied())
        .unwrap_or_else(MaterialRegistry::default_id)
}
