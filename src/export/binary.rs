use std::{fs::File, io::BufWriter, path::Path};

use mesh_common::tris;

use crate::flatten::FlatMesh;

pub(super) fn write_tris(mesh: &FlatMesh, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    tris::write_to(BufWriter::new(file), &mesh.vertices(), &mesh.indices)
}
