mod binary;
mod manifest;
mod text;

pub use manifest::*;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::flatten::{FlatMesh, FlatMeshError};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path:?}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("refusing to write {path:?}")]
    InvalidMesh {
        path: PathBuf,
        #[source]
        source: FlatMeshError,
    },
}

impl ExportError {
    pub fn path(&self) -> &Path {
        match self {
            ExportError::Io { path, .. }
            | ExportError::Json { path, .. }
            | ExportError::InvalidMesh { path, .. } => path,
        }
    }
}

/// An output format for a flattened mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportTarget {
    /// Interleaved TRIS file for the renderer.
    Binary,
    /// ASCII PLY with positions and triangles only.
    Text,
}

impl ExportTarget {
    pub const ALL: [ExportTarget; 2] = [ExportTarget::Binary, ExportTarget::Text];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportTarget::Binary => "tri",
            ExportTarget::Text => "ply",
        }
    }

    /// Checks the mesh buffers, then writes the file. Nothing is written for an
    /// inconsistent mesh.
    pub fn write(&self, mesh: &FlatMesh, path: &Path) -> Result<(), ExportError> {
        mesh.validate().map_err(|source| ExportError::InvalidMesh {
            path: path.to_path_buf(),
            source,
        })?;
        let result = match self {
            ExportTarget::Binary => binary::write_tris(mesh, path),
            ExportTarget::Text => text::write_ply(mesh, path),
        };
        result.map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Writes `mesh` once per target, next to `base_path` with the target's
/// extension. Stops at the first failure.
pub fn export(
    mesh: &FlatMesh,
    base_path: &Path,
    targets: &[ExportTarget],
) -> Result<Vec<PathBuf>, ExportError> {
    let mut written = Vec::with_capacity(targets.len());
    for target in targets {
        let path = base_path.with_extension(target.extension());
        target.write(mesh, &path)?;
        log::info!("Wrote {:?}", path);
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultraviolet::{Vec2, Vec3};

    fn quad() -> FlatMesh {
        FlatMesh {
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            normals: vec![Vec3::unit_z(); 4],
            uvs: vec![Vec2::zero(); 4],
            indices: vec![0, 1, 2, 0, 2, 3],
            face_materials: vec![mesh_common::MaterialRegistry::default_id(); 2],
        }
    }

    #[test]
    fn writes_every_target_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let written = export(&quad(), &dir.path().join("quad"), &ExportTarget::ALL).unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("quad.tri"), dir.path().join("quad.ply")]
        );
        for path in &written {
            assert!(path.is_file());
        }
    }

    #[test]
    fn mismatched_attributes_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.tri");
        let mesh = FlatMesh {
            uvs: vec![],
            ..quad()
        };
        let error = ExportTarget::Binary.write(&mesh, &path).unwrap_err();
        assert!(matches!(
            error,
            ExportError::InvalidMesh {
                source: FlatMeshError::AttributeCount { uvs: 0, .. },
                ..
            }
        ));
        assert!(!path.exists());
    }

    #[test]
    fn out_of_range_indices_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.ply");
        let mut mesh = quad();
        mesh.indices[5] = 4;
        let error = ExportTarget::Text.write(&mesh, &path).unwrap_err();
        assert!(matches!(
            error,
            ExportError::InvalidMesh {
                source: FlatMeshError::IndexOutOfRange {
                    index: 4,
                    vertex_count: 4
                },
                ..
            }
        ));
        assert!(!path.exists());
    }

    #[test]
    fn first_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("missing").join("quad");
        let error = export(&quad(), &base, &ExportTarget::ALL).unwrap_err();
        assert_eq!(error.path(), base.with_extension("tri"));
        assert!(!base.with_extension("ply").exists());
    }
}
