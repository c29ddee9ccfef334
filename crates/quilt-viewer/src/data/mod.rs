//! Mesh generation and GPU data layouts.

pub mod mesh;
pub mod types;

pub use self::mesh::{MeshData, MeshKind};
pub use self::types::{InstanceRaw, ObjectUniform, SkyUniform, Vertex, ViewInstancingUniform, MAX_VIEWS};
