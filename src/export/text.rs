use std::{fs::File, io::BufWriter, io::Write, path::Path};

use ply_rs::{
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};

use crate::flatten::FlatMesh;

pub(super) fn write_ply(mesh: &FlatMesh, path: &Path) -> std::io::Result<()> {
    let mut ply = to_ply(mesh);
    let mut writer = BufWriter::new(File::create(path)?);
    Writer::new().write_ply(&mut writer, &mut ply)?;
    writer.flush()
}

fn to_ply(mesh: &FlatMesh) -> Ply<DefaultElement> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for name in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    vertex_def.count = mesh.vertex_count();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::UInt),
    ));
    face_def.count = mesh.triangle_count();
    ply.header.elements.add(face_def);

    let vertices = mesh
        .positions
        .iter()
        .map(|p| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(p.x));
            element.insert("y".to_string(), Property::Float(p.y));
            element.insert("z".to_string(), Property::Float(p.z));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces = mesh
        .indices
        .chunks_exact(3)
        .map(|triangle| {
            let mut element = DefaultElement::new();
            element.insert(
                "vertex_indices".to_string(),
                Property::ListUInt(triangle.to_vec()),
            );
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    ply
}
