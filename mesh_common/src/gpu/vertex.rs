use serde::{Deserialize, Serialize};

/// One interleaved vertex, laid out exactly as in a TRIS file.
#[derive(Clone, Debug, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Number of `f32` values per vertex.
    pub const FLOAT_COUNT: usize = 8;
    pub const BYTE_SIZE: usize = Self::FLOAT_COUNT * std::mem::size_of::<f32>();

    pub fn floats(&self) -> [f32; Self::FLOAT_COUNT] {
        let [px, py, pz] = self.position;
        let [nx, ny, nz] = self.normal;
        let [u, v] = self.uv;
        [px, py, pz, nx, ny, nz, u, v]
    }

    pub fn from_floats(floats: [f32; Self::FLOAT_COUNT]) -> Self {
        let [px, py, pz, nx, ny, nz, u, v] = floats;
        Self {
            position: [px, py, pz],
            normal: [nx, ny, nz],
            uv: [u, v],
        }
    }
}
