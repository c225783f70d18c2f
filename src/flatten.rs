use mesh_common::{
    gpu::Vertex, resolve_face_material, transform::Affine, MaterialId, MeshSource, NodeId, Scene,
    SceneError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ultraviolet::{Mat3, Vec2, Vec3};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum VerticalAxis {
    Y,
    #[default]
    Z,
}

impl VerticalAxis {
    pub fn unit(self) -> Vec3 {
        match self {
            VerticalAxis::Y => Vec3::unit_y(),
            VerticalAxis::Z => Vec3::unit_z(),
        }
    }

    pub fn rotation(self, angle: f32) -> Mat3 {
        match self {
            VerticalAxis::Y => Mat3::from_rotation_y(angle),
            VerticalAxis::Z => Mat3::from_rotation_z(angle),
        }
    }

    /// Drops the vertical component of `v`.
    fn flatten(self, v: Vec3) -> Vec3 {
        let up = self.unit();
        v - up * v.dot(up)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlattenOptions {
    /// Build the merged mesh. Without it only the world transforms are computed.
    pub merge: bool,
    pub vertical_axis: VerticalAxis,
    /// Radians about the vertical axis, applied before normalization.
    pub rotation: f32,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            merge: true,
            vertical_axis: VerticalAxis::default(),
            rotation: 0.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("mesh {mesh:?} has inconsistent buffers")]
    InvalidMesh {
        mesh: String,
        #[source]
        source: SceneError,
    },
    #[error(transparent)]
    Scene(#[from] SceneError),
}

#[derive(Debug, Error)]
pub enum FlatMeshError {
    #[error("attribute counts differ: {positions} positions, {normals} normals, {uvs} uvs")]
    AttributeCount {
        positions: usize,
        normals: usize,
        uvs: usize,
    },
    #[error("{0} indices do not form whole triangles")]
    PartialTriangle(usize),
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("{materials} face materials for {triangles} triangles")]
    FaceMaterialCount { materials: usize, triangles: usize },
}

/// All geometry of a scene in world space, in one buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlatMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    /// Registry material of every triangle.
    pub face_materials: Vec<MaterialId>,
}

impl FlatMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Checks that the attribute buffers line up and every index is in range.
    pub fn validate(&self) -> Result<(), FlatMeshError> {
        let positions = self.positions.len();
        if self.normals.len() != positions || self.uvs.len() != positions {
            return Err(FlatMeshError::AttributeCount {
                positions,
                normals: self.normals.len(),
                uvs: self.uvs.len(),
            });
        }
        if self.indices.len() % 3 != 0 {
            return Err(FlatMeshError::PartialTriangle(self.indices.len()));
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= positions) {
            return Err(FlatMeshError::IndexOutOfRange {
                index,
                vertex_count: positions,
            });
        }
        if self.face_materials.len() != self.triangle_count() {
            return Err(FlatMeshError::FaceMaterialCount {
                materials: self.face_materials.len(),
                triangles: self.triangle_count(),
            });
        }
        Ok(())
    }

    /// Axis aligned bounding box, `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(min, max), &p| {
            (min.min_by_component(p), max.max_by_component(p))
        }))
    }

    pub fn vertices(&self) -> Vec<Vertex> {
        self.positions
            .iter()
            .zip(&self.normals)
            .zip(&self.uvs)
            .map(|((p, n), uv)| Vertex {
                position: [p.x, p.y, p.z],
                normal: [n.x, n.y, n.z],
                uv: [uv.x, uv.y],
            })
            .collect()
    }

    fn append(&mut self, mesh: &MeshSource, world: &Affine) {
        let base = self.positions.len() as u32;
        let vertex_count = mesh.vertex_count();

        self.positions.extend(mesh.positions_iter().map(|p| world.transform_point(p)));

        if mesh.has_normals() {
            self.normals.extend(mesh.normals_iter().map(|n| {
                let n = world.transform_vector(n);
                if n.mag_sq() > 0.0 {
                    n.normalized()
                } else {
                    n
                }
            }));
        } else {
            self
                .normals
                .extend(std::iter::repeat(Vec3::zero()).take(vertex_count));
        }

        if mesh.has_uvs() {
            self.uvs.extend(mesh.uvs_iter());
        } else {
            self
                .uvs
                .extend(std::iter::repeat(Vec2::zero()).take(vertex_count));
        }

        self.indices.extend(mesh.indices.iter().map(|i| i + base));
        self.face_materials
            .extend((0..mesh.triangle_count()).map(|face| resolve_face_material(mesh, face)));
    }

    fn rotate(&mut self, rotation: &Mat3) {
        for p in &mut self.positions {
            *p = *rotation * *p;
        }
        for n in &mut self.normals {
            *n = *rotation * *n;
        }
    }

    /// Centers the mesh horizontally and scales its bounding box diagonal to 1.
    /// The vertical position is kept.
    fn normalize(&mut self, vertical_axis: VerticalAxis) -> f32 {
        if self.is_empty() {
            return 1.0;
        }

        let sum = self.positions.iter().fold(Vec3::zero(), |sum, &p| sum + p);
        let centroid = vertical_axis.flatten(sum * (1.0 / self.positions.len() as f32));
        for p in &mut self.positions {
            *p -= centroid;
        }

        let Some((min, max)) = self.bounds() else {
            return 1.0;
        };
        let diagonal = (max - min).mag();
        if diagonal <= 0.0 {
            log::debug!("Merged mesh has a zero sized bounding box, skipping the scale step");
            return 1.0;
        }
        let scale = 1.0 / diagonal;
        for p in &mut self.positions {
            *p *= scale;
        }
        scale
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Flattened {
    /// Absolute transform of every node, indexed like [`Scene::nodes`].
    pub world_transforms: Vec<Affine>,
    pub mesh: Option<FlatMesh>,
}

/// Resolves every node's local transform against its ancestors.
pub fn world_transforms(scene: &Scene) -> Result<Vec<Affine>, FlattenError> {
    let mut world: Vec<Affine> = Vec::with_capacity(scene.nodes().len());
    for (index, node) in scene.nodes().iter().enumerate() {
        let transform = match node.parent {
            Some(parent) => {
                let parent_world = world.get(parent.index()).ok_or(SceneError::ParentOrder {
                    child: NodeId::new(index as u32),
                    parent,
                })?;
                parent_world * node.local_transform
            }
            None => node.local_transform,
        };
        world.push(transform);
    }
    Ok(world)
}

/// Computes world transforms and, when requested, merges all mesh instances
/// into one normalized mesh. The scene is left untouched.
pub fn flatten(scene: &Scene, options: &FlattenOptions) -> Result<Flattened, FlattenError> {
    let world_transforms = world_transforms(scene)?;
    if !options.merge {
        return Ok(Flattened {
            world_transforms,
            mesh: None,
        });
    }

    let mut merged = FlatMesh::default();
    for (node, world) in scene.nodes().iter().zip(&world_transforms) {
        let Some(mesh_id) = node.mesh else {
            continue;
        };
        let mesh = scene.mesh(mesh_id)?;
        if mesh.is_empty() {
            log::debug!("Skipping empty mesh {:?} on node {:?}", mesh.name, node.name);
            continue;
        }
        mesh.validate().map_err(|source| FlattenError::InvalidMesh {
            mesh: mesh.name.clone(),
            source,
        })?;
        merged.append(mesh, world);
    }

    if options.rotation != 0.0 {
        merged.rotate(&options.vertical_axis.rotation(options.rotation));
    }
    let scale = merged.normalize(options.vertical_axis);

    log::info!(
        "Flattened {} nodes into {} vertices and {} triangles (scale {})",
        world_transforms.len(),
        merged.vertex_count(),
        merged.triangle_count(),
        scale
    );

    Ok(Flattened {
        world_transforms,
        mesh: Some(merged),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_common::{MaterialDescriptor, MaterialRegistry, MeshId};

    const TRIANGLE: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

    fn triangle_mesh(scene: &mut Scene, name: &str) -> MeshId {
        let mesh = scene.create_mesh(name);
        scene
            .set_positions(mesh, TRIANGLE.to_vec(), vec![0, 1, 2])
            .unwrap();
        mesh
    }

    #[test]
    fn world_transforms_compose_parent_first() {
        let mut scene = Scene::new();
        let parent = scene.create_node(None, "parent").unwrap();
        let child = scene.create_node(Some(parent), "child").unwrap();
        scene
            .set_affine(parent, Affine::from_translation(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        scene
            .set_affine(child, Affine::from_scale(Vec3::new(2.0, 2.0, 2.0)))
            .unwrap();

        let world = world_transforms(&scene).unwrap();
        let point = world[child.index()].transform_point(Vec3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(point.x, 3.0);
        assert_relative_eq!(point.y, 2.0);
        assert_eq!(scene.node(child).unwrap().local_transform.translation, Vec3::zero());
    }

    #[test]
    fn without_merge_only_transforms_are_returned() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = triangle_mesh(&mut scene, "tri");
        scene.attach_mesh(node, mesh).unwrap();

        let options = FlattenOptions {
            merge: false,
            ..Default::default()
        };
        let flattened = flatten(&scene, &options).unwrap();
        assert!(flattened.mesh.is_none());
        assert_eq!(flattened.world_transforms.len(), 1);
    }

    #[test]
    fn indices_are_offset_per_instance() {
        let mut scene = Scene::new();
        let mesh = triangle_mesh(&mut scene, "tri");
        for x in [0.0, 5.0] {
            let node = scene.create_node(None, "instance").unwrap();
            scene
                .set_affine(node, Affine::from_translation(Vec3::new(x, 0.0, 0.0)))
                .unwrap();
            scene.attach_mesh(node, mesh).unwrap();
        }

        let merged = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.indices, vec![0, 1, 2, 3, 4, 5]);
        assert!(merged.indices.iter().all(|&i| (i as usize) < merged.vertex_count()));
        assert_eq!(merged.face_materials.len(), merged.triangle_count());
    }

    #[test]
    fn offsets_count_vertices_not_indices() {
        let mut scene = Scene::new();
        let quad_node = scene.create_node(None, "quad").unwrap();
        let quad = scene.create_mesh("quad");
        scene
            .set_positions(
                quad,
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
                vec![0, 1, 2, 0, 2, 3],
            ).unwrap();
        scene.attach_mesh(quad_node, quad).unwrap();
        let triangle_node = scene.create_node(None, "triangle").unwrap();
        let triangle = triangle_mesh(&mut scene, "triangle");
        scene.attach_mesh(triangle_node, triangle).unwrap();

        let merged = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        assert_eq!(merged.vertex_count(), 7);
        assert_eq!(merged.indices, vec![0, 1, 2, 0, 2, 3, 4, 5, 6]);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn normalization_centers_horizontally_only() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = triangle_mesh(&mut scene, "tri");
        scene.attach_mesh(node, mesh).unwrap();
        scene
            .set_affine(node, Affine::from_translation(Vec3::new(10.0, 10.0, 4.0)))
            .unwrap();

        let merged = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        let sum = merged.positions.iter().fold(Vec3::zero(), |sum, &p| sum + p);
        assert_relative_eq!(sum.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(sum.y, 0.0, epsilon = 1e-5);

        let (min, max) = merged.bounds().unwrap();
        assert_relative_eq!((max - min).mag(), 1.0, epsilon = 1e-5);
        // z is scaled but not recentered
        assert_relative_eq!(merged.positions[0].z, 4.0 / 2f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn y_up_keeps_y() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = triangle_mesh(&mut scene, "tri");
        scene.attach_mesh(node, mesh).unwrap();

        let options = FlattenOptions {
            vertical_axis: VerticalAxis::Y,
            ..Default::default()
        };
        let merged = flatten(&scene, &options).unwrap().mesh.unwrap();
        let scale = 1.0 / 2f32.sqrt();
        assert_relative_eq!(merged.positions[0].y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(merged.positions[2].y, scale, epsilon = 1e-6);
        assert_relative_eq!(merged.positions[0].x, -scale / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_meshes_skip_scaling() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = scene.create_mesh("point");
        scene
            .set_positions(mesh, vec![2.0, 3.0, 4.0, 2.0, 3.0, 4.0, 2.0, 3.0, 4.0], vec![0, 1, 2])
            .unwrap();
        scene.attach_mesh(node, mesh).unwrap();

        let merged = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        assert_eq!(merged.positions[0], Vec3::new(0.0, 0.0, 4.0));

        let empty = flatten(&Scene::new(), &FlattenOptions::default()).unwrap();
        assert!(empty.mesh.unwrap().is_empty());
    }

    #[test]
    fn empty_meshes_and_meshless_nodes_are_skipped() {
        let mut scene = Scene::new();
        let group = scene.create_node(None, "group").unwrap();
        let empty = scene.create_mesh("empty");
        let holder = scene.create_node(Some(group), "holder").unwrap();
        scene.attach_mesh(holder, empty).unwrap();

        let merged = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn missing_attributes_are_zero_filled() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = triangle_mesh(&mut scene, "tri");
        scene.attach_mesh(node, mesh).unwrap();

        let merged = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        assert!(merged.normals.iter().all(|&n| n == Vec3::zero()));
        assert!(merged.uvs.iter().all(|&uv| uv == Vec2::zero()));
        assert_eq!(merged.vertices().len(), 3);
    }

    #[test]
    fn normals_follow_the_world_transform() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = triangle_mesh(&mut scene, "tri");
        scene.set_normals(mesh, [0.0, 0.0, 1.0].repeat(3)).unwrap();
        scene.attach_mesh(node, mesh).unwrap();
        // a quarter turn about x maps +z to -y
        scene
            .set_transform(
                node,
                [1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            ).unwrap();

        let merged = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        for n in &merged.normals {
            assert_relative_eq!(n.y, -1.0, epsilon = 1e-6);
            assert_relative_eq!(n.mag(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn corrupted_normals_are_fatal() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = triangle_mesh(&mut scene, "tri");
        scene.attach_mesh(node, mesh).unwrap();
        scene.mesh_mut(mesh).unwrap().normals = vec![0.0, 0.0, 1.0];

        assert!(matches!(
            flatten(&scene, &FlattenOptions::default()),
            Err(FlattenError::InvalidMesh { .. })
        ));
    }

    #[test]
    fn faces_resolve_to_registry_materials() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = triangle_mesh(&mut scene, "tri");
        scene.attach_mesh(node, mesh).unwrap();
        let plain = scene.create_node(None, "plain").unwrap();
        let other = triangle_mesh(&mut scene, "plain");
        scene.attach_mesh(plain, other).unwrap();

        let ids =
            scene.register_materials(vec![MaterialDescriptor::new("red", [1.0, 0.0, 0.0, 1.0])]);
        scene.apply_material(mesh, ids[0]).unwrap();

        let merged = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        assert_eq!(
            merged.face_materials,
            vec![ids[0], MaterialRegistry::default_id()]
        );
    }

    #[test]
    fn rotation_turns_about_the_vertical_axis() {
        let mut scene = Scene::new();
        let node = scene.create_node(None, "n").unwrap();
        let mesh = triangle_mesh(&mut scene, "tri");
        scene.attach_mesh(node, mesh).unwrap();

        let plain = flatten(&scene, &FlattenOptions::default())
            .unwrap()
            .mesh
            .unwrap();
        let options = FlattenOptions {
            rotation: std::f32::consts::PI,
            ..Default::default()
        };
        let turned = flatten(&scene, &options).unwrap().mesh.unwrap();
        for (a, b) in plain.positions.iter().zip(&turned.positions) {
            assert_relative_eq!(a.x, -b.x, epsilon = 1e-5);
            assert_relative_eq!(a.y, -b.y, epsilon = 1e-5);
            assert_relative_eq!(a.z, b.z, epsilon = 1e-5);
        }
    }
}
