pub mod gpu;
mod scene;
pub mod transform;
pub mod tris;

pub use scene::*;
