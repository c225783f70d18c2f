use serde::{Deserialize, Serialize};

use crate::transform::Affine;

use super::{MeshId, NodeId};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Node {
    pub name: String,
    /// Relative to the parent, or to the world for root nodes.
    pub local_transform: Affine,
    pub parent: Option<NodeId>,
    pub mesh: Option<MeshId>,
}

impl Node {
    pub fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            local_transform: Affine::identity(),
            parent,
            mesh: None,
        }
    }
}
