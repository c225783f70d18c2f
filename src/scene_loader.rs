use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use mesh_common::{
    transform::{decompose, Affine},
    MaterialDescriptor, MaterialId, MaterialRegistry, MeshId, NodeId, Scene,
};

/// Drives the scene build operations from a glTF file.
///
/// Node transforms are decomposed on the way down. Whatever cannot be stored on
/// a node is baked into a private copy of its mesh and handed on to the
/// children. Meshes are shared between nodes only when nothing had to be baked.
pub struct GltfSceneLoader {}

struct SceneLoadingData {
    scene: Scene,
    buffers: Vec<gltf::buffer::Data>,
    /// Registry id of every glTF material, by glTF index.
    material_ids: Vec<MaterialId>,
    shared_meshes: HashMap<MeshKey, MeshId>,
    baked_instances: usize,
}

#[derive(Hash, Eq, PartialEq, Debug)]
struct MeshKey {
    index: usize,
}

/// Merged triangle primitives of one glTF mesh.
#[derive(Default)]
struct PrimitiveBuffers {
    positions: Vec<f32>,
    normals: Vec<f32>,
    uvs: Vec<f32>,
    indices: Vec<u32>,
    has_normals: bool,
    has_uvs: bool,
    /// Material and triangle count of each merged primitive.
    faces: Vec<(MaterialId, usize)>,
}

impl GltfSceneLoader {
    pub fn new() -> Self {
        Self {}
    }

    pub fn load_scene(&mut self, path: impl AsRef<Path>) -> anyhow::Result<Scene> {
        let path = path.as_ref();
        let gltf::Gltf { document, blob } =
            gltf::Gltf::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let buffers = gltf::import_buffers(&document, Some(base_dir.as_path()), blob)
            .with_context(|| format!("Failed to read the buffers of {:?}", path))?;

        let gltf_scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .context("Expected a scene in the glTF file")?;

        let mut loading_data = SceneLoadingData {
            scene: Scene::new(),
            buffers,
            material_ids: Vec::new(),
            shared_meshes: HashMap::new(),
            baked_instances: 0,
        };
        self.load_materials(&mut loading_data, &document, &base_dir);

        let root = loading_data
            .scene
            .create_node(None, gltf_scene.name().unwrap_or("root"))?;
        for node in gltf_scene.nodes() {
            self.load_node(&mut loading_data, &node, root, Affine::identity())?;
        }

        let scene = loading_data.scene;
        log::info!(
            "Loaded {} nodes, {} meshes ({} baked instances) and {} materials from {:?}",
            scene.nodes().len(),
            scene.meshes().len(),
            loading_data.baked_instances,
            scene.materials().len(),
            path
        );
        Ok(scene)
    }

    fn load_materials(
        &mut self,
        loading_data: &mut SceneLoadingData,
        document: &gltf::Document,
        base_dir: &Path,
    ) {
        let materials = document
            .materials()
            .map(|material| {
                let pbr = material.pbr_metallic_roughness();
                let base_color = pbr.base_color_factor();
                let name = match (material.name(), material.index()) {
                    (Some(name), _) => name.to_string(),
                    (None, Some(index)) => format!("material_{}", index),
                    (None, None) => MaterialDescriptor::DEFAULT_NAME.to_string(),
                };
                let mut descriptor =
                    MaterialDescriptor::new(name, base_color).with_opacity(base_color[3]);
                if let Some(path) = pbr
                    .base_color_texture()
                    .and_then(|info| texture_path(info.texture(), base_dir))
                {
                    descriptor = descriptor.with_base_color_map(path);
                }
                descriptor
            })
            .collect();
        loading_data.material_ids = loading_data.scene.register_materials(materials);
    }

    fn load_node(
        &mut self,
        loading_data: &mut SceneLoadingData,
        node: &gltf::Node<'_>,
        parent: NodeId,
        parent_bake: Affine,
    ) -> anyhow::Result<()> {
        let local_transform = Affine::from_cols_array(node.transform().matrix());
        let decomposition = decompose(&(parent_bake * local_transform));

        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", node.index()));
        let id = loading_data.scene.create_node(Some(parent), name)?;
        loading_data
            .scene
            .set_affine(id, decomposition.representable)?;

        if let Some(mesh) = node.mesh() {
            let mesh_id = if decomposition.needs_baking() {
                let mesh_id = self.load_mesh(loading_data, &mesh)?;
                loading_data
                    .scene
                    .mesh_mut(mesh_id)?
                    .bake(&decomposition.bake);
                loading_data.baked_instances += 1;
                log::debug!("Baked a private copy of mesh {} into node {:?}", mesh.index(), id);
                mesh_id
            } else {
                let key = MeshKey {
                    index: mesh.index(),
                };
                match loading_data.shared_meshes.get(&key) {
                    Some(&mesh_id) => mesh_id,
                    None => {
                        let mesh_id = self.load_mesh(loading_data, &mesh)?;
                        loading_data.shared_meshes.insert(key, mesh_id);
                        mesh_id
                    }
                }
            };
            loading_data.scene.attach_mesh(id, mesh_id)?;
        }

        for child in node.children() {
            self.load_node(loading_data, &child, id, decomposition.bake)?;
        }
        Ok(())
    }

    fn load_mesh(
        &mut self,
        loading_data: &mut SceneLoadingData,
        mesh: &gltf::Mesh<'_>,
    ) -> anyhow::Result<MeshId> {
        let mut buffers = PrimitiveBuffers::default();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping a {:?} primitive of mesh {}, only triangles are supported",
                    primitive.mode(),
                    mesh.index()
                );
                continue;
            }
            let material = primitive
                .material()
                .index()
                .and_then(|index| loading_data.material_ids.get(index).copied())
                .unwrap_or_else(MaterialRegistry::default_id);
            buffers.append(&loading_data.buffers, &primitive, material)?;
        }

        let name = mesh
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("mesh_{}", mesh.index()));
        let scene = &mut loading_data.scene;
        let id = scene.create_mesh(name);
        scene.set_positions(id, buffers.positions, buffers.indices)?;
        if buffers.has_normals {
            scene.set_normals(id, buffers.normals)?;
        }
        if buffers.has_uvs {
            scene.set_uv(id, 0, buffers.uvs)?;
        }

        let mut face_slots = Vec::new();
        for (material, triangle_count) in buffers.faces {
            let slot = scene.apply_material(id, material)?;
            face_slots.extend(std::iter::repeat(slot).take(triangle_count));
        }
        scene.set_face_material_indices(id, face_slots)?;
        Ok(id)
    }
}

impl Default for GltfSceneLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimitiveBuffers {
    fn append(
        &mut self,
        buffers: &[gltf::buffer::Data],
        primitive: &gltf::Primitive<'_>,
        material: MaterialId,
    ) -> anyhow::Result<()> {
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|v| &v.0[..]));
        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .context("Expected the primitive to have positions")?
            .collect();
        let base = (self.positions.len() / 3) as u32;
        let vertex_count = positions.len();

        // Attributes missing on some primitives are zero filled so that all
        // buffers stay aligned with the positions.
        match reader.read_normals() {
            Some(normals) => {
                if !self.has_normals {
                    self.normals = vec![0.0; self.positions.len()];
                    self.has_normals = true;
                }
                self.normals.extend(normals.flatten());
            }
            None if self.has_normals => self.normals.extend(vec![0.0; vertex_count * 3]),
            None => {}
        }
        match reader.read_tex_coords(0) {
            Some(uvs) => {
                if !self.has_uvs {
                    self.uvs = vec![0.0; self.positions.len() / 3 * 2];
                    self.has_uvs = true;
                }
                self.uvs.extend(uvs.into_f32().flatten());
            }
            None if self.has_uvs => self.uvs.extend(vec![0.0; vertex_count * 2]),
            None => {}
        }
        self.positions.extend(positions.into_iter().flatten());

        let indices: Vec<u32> = reader
            .read_indices()
            .map(|indices| indices.into_u32().collect())
            .unwrap_or_else(|| (0..vertex_count as u32).collect());
        let triangle_count = indices.len() / 3;
        self.indices
            .extend(indices.into_iter().take(triangle_count * 3).map(|i| i + base));
        self.faces.push((material, triangle_count));
        Ok(())
    }
}

fn texture_path(texture: gltf::Texture<'_>, base_dir: &Path) -> Option<PathBuf> {
    match texture.source().source() {
        gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => {
            Some(base_dir.join(uri))
        }
        _ => None,
    }
}
