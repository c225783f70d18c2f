//! The TRIS mesh file.
//!
//! ```text
//! b"TRIS"
//! u32                vertex count * 8
//! [f32; 8] * count   position, normal, uv
//! u32                index count
//! [u32] * count      triangle list
//! ```
//!
//! Numbers are stored in native byte order.

use std::io::{self, Write};

use thiserror::Error;

use crate::gpu::Vertex;

pub const MAGIC: &[u8; 4] = b"TRIS";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrisMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Error)]
pub enum TrisError {
    #[error("not a TRIS file, found magic {0:?}")]
    BadMagic([u8; 4]),
    #[error("float count {0} is not a multiple of {}", Vertex::FLOAT_COUNT)]
    BadVertexHeader(u32),
    #[error("file ends after {available} bytes, {needed} more are needed")]
    Truncated { available: usize, needed: usize },
    #[error("{0} trailing bytes after the index list")]
    TrailingBytes(usize),
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn encoded_len(vertex_count: usize, index_count: usize) -> usize {
    MAGIC.len() + 4 + vertex_count * Vertex::BYTE_SIZE + 4 + index_count * 4
}

pub fn encode(vertices: &[Vertex], indices: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(encoded_len(vertices.len(), indices.len()));
    bytes.extend_from_slice(MAGIC);
    let float_count = (vertices.len() * Vertex::FLOAT_COUNT) as u32;
    bytes.extend_from_slice(&float_count.to_ne_bytes());
    for vertex in vertices {
        for float in vertex.floats() {
            bytes.extend_from_slice(&float.to_ne_bytes());
        }
    }
    bytes.extend_from_slice(&(indices.len() as u32).to_ne_bytes());
    for index in indices {
        bytes.extend_from_slice(&index.to_ne_bytes());
    }
    bytes
}

pub fn write_to<W: Write>(mut writer: W, vertices: &[Vertex], indices: &[u32]) -> io::Result<()> {
    writer.write_all(&encode(vertices, indices))?;
    writer.flush()
}

pub fn decode(bytes: &[u8]) -> Result<TrisMesh, TrisError> {
    let mut reader = Reader { bytes, offset: 0 };

    let magic: [u8; 4] = reader.array()?;
    if &magic != MAGIC {
        return Err(TrisError::BadMagic(magic));
    }

    let float_count = reader.u32()?;
    if float_count as usize % Vertex::FLOAT_COUNT != 0 {
        return Err(TrisError::BadVertexHeader(float_count));
    }
    let vertex_count = float_count as usize / Vertex::FLOAT_COUNT;
    reader.require(vertex_count * Vertex::BYTE_SIZE)?;
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let mut floats = [0.0; Vertex::FLOAT_COUNT];
        for float in &mut floats {
            *float = f32::from_ne_bytes(reader.array()?);
        }
        vertices.push(Vertex::from_floats(floats));
    }

    let index_count = reader.u32()? as usize;
    reader.require(index_count * 4)?;
    let mut indices = Vec::with_capacity(index_count);
    for _ in 0..index_count {
        let index = reader.u32()?;
        if index as usize >= vertex_count {
            return Err(TrisError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        indices.push(index);
    }

    let trailing = bytes.len() - reader.offset;
    if trailing != 0 {
        return Err(TrisError::TrailingBytes(trailing));
    }

    Ok(TrisMesh { vertices, indices })
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn require(&self, needed: usize) -> Result<(), TrisError> {
        let available = self.bytes.len() - self.offset;
        if available < needed {
            return Err(TrisError::Truncated {
                available: self.offset + available,
                needed: needed - available,
            });
        }
        Ok(())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], TrisError> {
        self.require(N)?;
        let mut array = [0; N];
        array.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        Ok(array)
    }

    fn u32(&mut self) -> Result<u32, TrisError> {
        Ok(u32::from_ne_bytes(self.array()?))
    }
}
