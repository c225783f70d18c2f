use serde::{Deserialize, Serialize};
use ultraviolet::{Vec2, Vec3};

use crate::transform::Affine;

use super::{MaterialId, SceneError};

/// Raw geometry of one mesh as delivered by an importer.
///
/// Attribute buffers are flat: 3 floats per position and normal, 2 per uv and
/// 3 indices per triangle. `normals` and `uvs` may be empty.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct MeshSource {
    pub name: String,
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub indices: Vec<u32>,
    /// Registry materials applied to this mesh, addressed by slot.
    pub materials_used: Vec<MaterialId>,
    /// One slot into `materials_used` per triangle.
    pub face_material_index: Vec<i32>,
}

impl MeshSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    pub fn positions_iter(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
    }

    pub fn normals_iter(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.normals
            .chunks_exact(3)
            .map(|n| Vec3::new(n[0], n[1], n[2]))
    }

    pub fn uvs_iter(&self) -> impl Iterator<Item = Vec2> + '_ {
        self.uvs.chunks_exact(2).map(|uv| Vec2::new(uv[0], uv[1]))
    }

    /// Number of valid face material slots. A mesh without applied materials
    /// still has slot 0, which resolves to the default material.
    pub fn slot_count(&self) -> usize {
        self.materials_used.len().max(1)
    }

    /// Checks every buffer against the others.
    pub fn validate(&self) -> Result<(), SceneError> {
        check_stride("positions", self.positions.len(), 3)?;
        check_stride("indices", self.indices.len(), 3)?;
        check_indices(&self.indices, self.vertex_count())?;

        let vertex_count = self.vertex_count();
        if self.has_normals() {
            check_stride("normals", self.normals.len(), 3)?;
            check_count("normals", vertex_count, self.normals.len() / 3)?;
        }
        if self.has_uvs() {
            check_stride("uvs", self.uvs.len(), 2)?;
            check_count("uvs", vertex_count, self.uvs.len() / 2)?;
        }

        check_count(
            "face material indices",
            self.triangle_count(),
            self.face_material_index.len(),
        )?;
        self.check_slots(&self.face_material_index)
    }

    pub(crate) fn check_slots(&self, slots: &[i32]) -> Result<(), SceneError> {
        let applied = self.slot_count();
        match slots
            .iter()
            .find(|&&slot| slot < 0 || slot as usize >= applied)
        {
            Some(&slot) => Err(SceneError::MaterialSlot { slot, applied }),
            None => Ok(()),
        }
    }

    /// Applies `transform` to the vertex data.
    ///
    /// Positions get the full transform, normals the inverse transpose of its
    /// linear part. A mirroring transform also reverses the triangle winding so
    /// that faces keep pointing outwards.
    pub fn bake(&mut self, transform: &Affine) {
        if transform.is_identity(0.0) {
            return;
        }

        for p in self.positions.chunks_exact_mut(3) {
            let v = transform.transform_point(Vec3::new(p[0], p[1], p[2]));
            p.copy_from_slice(&[v.x, v.y, v.z]);
        }

        let normal_matrix = transform.normal_matrix().unwrap_or_else(|| {
            log::warn!(
                "Baking a singular transform into mesh {}, normals are only approximated",
                self.name
            );
            transform.linear
        });
        for n in self.normals.chunks_exact_mut(3) {
            let mut v = normal_matrix * Vec3::new(n[0], n[1], n[2]);
            if v.mag_sq() > 0.0 {
                v.normalize();
            }
            n.copy_from_slice(&[v.x, v.y, v.z]);
        }

        if transform.determinant() < 0.0 {
            for triangle in self.indices.chunks_exact_mut(3) {
                triangle.swap(1, 2);
            }
        }
    }
}

pub(crate) fn check_stride(
    attribute: &'static str,
    len: usize,
    stride: usize,
) -> Result<(), SceneError> {
    if len % stride != 0 {
        return Err(SceneError::Stride {
            attribute,
            len,
            stride,
        });
    }
    Ok(())
}

pub(crate) fn check_count(
    attribute: &'static str,
    expected: usize,
    got: usize,
) -> Result<(), SceneError> {
    if expected != got {
        return Err(SceneError::AttributeCount {
            attribute,
            expected,
            got,
        });
    }
    Ok(())
}

pub(crate) fn check_indices(indices: &[u32], vertex_count: usize) -> Result<(), SceneError> {
    match indices.iter().find(|&&index| index as usize >= vertex_count) {
        Some(&index) => Err(SceneError::IndexOutOfRange {
            index,
            vertex_count,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ultraviolet::Mat3;

    fn triangle() -> MeshSource {
        MeshSource {
            name: "tri".into(),
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            uvs: vec![],
            indices: vec![0, 1, 2],
            materials_used: vec![],
            face_material_index: vec![0],
        }
    }

    #[test]
    fn valid_triangle_passes() {
        assert!(triangle().validate().is_ok());
    }

    #[test]
    fn normal_count_mismatch_is_rejected() {
        let mut mesh = triangle();
        mesh.normals.truncate(6);
        assert!(matches!(
            mesh.validate(),
            Err(SceneError::AttributeCount {
                attribute: "normals",
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut mesh = triangle();
        mesh.face_material_index = vec![1];
        assert!(matches!(
            mesh.validate(),
            Err(SceneError::MaterialSlot { slot: 1, applied: 1 })
        ));
    }

    #[test]
    fn mirror_bake_flips_winding_and_normals() {
        let mut mesh = triangle();
        let mirror = Affine::from_scale(Vec3::new(1.0, 1.0, -1.0));
        mesh.bake(&mirror);

        assert_eq!(mesh.indices, vec![0, 2, 1]);
        for normal in mesh.normals_iter() {
            assert_relative_eq!(normal.z, -1.0);
        }
    }

    #[test]
    fn bake_scales_positions_and_renormalizes() {
        let mut mesh = triangle();
        let stretch = Affine::from_linear(
            Mat3::from_nonuniform_scale(Vec3::new(2.0, 1.0, 4.0)),
            Vec3::new(0.0, 0.0, 1.0),
        );
        mesh.bake(&stretch);

        let positions: Vec<_> = mesh.positions_iter().collect();
        assert_relative_eq!(positions[1].x, 2.0);
        assert_relative_eq!(positions[1].z, 1.0);
        for normal in mesh.normals_iter() {
            assert_relative_eq!(normal.mag(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }
}
