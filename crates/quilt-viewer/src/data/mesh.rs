//! Procedural meshes for the demo scene.

use super::types::Vertex;
use glam::Vec3;

/// The meshes the viewer can draw. The discriminant doubles as the mesh id
/// handed to the quilt passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    Cube = 0,
    Plane = 1,
    Octahedron = 2,
}

impl MeshKind {
    pub const ALL: [MeshKind; 3] = [MeshKind::Cube, MeshKind::Plane, MeshKind::Octahedron];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn build(self) -> MeshData {
        match self {
            MeshKind::Cube => cube(),
            MeshKind::Plane => plane(),
            MeshKind::Octahedron => octahedron(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Appends a flat-shaded triangle, counter-clockwise seen from outside.
    fn push_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3) {
        let normal = (b - a).cross(c - a).normalize_or_zero().to_array();
        let base = self.vertices.len() as u16;
        for p in [a, b, c] {
            self.vertices.push(Vertex { position: p.to_array(), normal });
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    fn push_quad(&mut self, a: Vec3, b: Vec3, c: Vec3, d: Vec3) {
        let normal = (b - a).cross(c - a).normalize_or_zero().to_array();
        let base = self.vertices.len() as u16;
        for p in [a, b, c, d] {
            self.vertices.push(Vertex { position: p.to_array(), normal });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

/// Unit cube centered on the origin.
pub fn cube() -> MeshData {
    let mut mesh = MeshData::default();
    let h = 0.5;
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];
    for (normal, right, up) in faces {
        let center = normal * h;
        let (r, u) = (right * h, up * h);
        mesh.push_quad(center - r - u, center + r - u, center + r + u, center - r + u);
    }
    mesh
}

/// Unit square in the XY plane facing +Z.
pub fn plane() -> MeshData {
    let mut mesh = MeshData::default();
    mesh.push_quad(
        Vec3::new(-0.5, -0.5, 0.0),
        Vec3::new(0.5, -0.5, 0.0),
        Vec3::new(0.5, 0.5, 0.0),
        Vec3::new(-0.5, 0.5, 0.0),
    );
    mesh
}

pub fn octahedron() -> MeshData {
    let mut mesh = MeshData::default();
    let ring = [Vec3::X, Vec3::Z, Vec3::NEG_X, Vec3::NEG_Z];
    for i in 0..ring.len() {
        let (a, b) = (ring[i] * 0.5, ring[(i + 1) % ring.len()] * 0.5);
        mesh.push_triangle(a, Vec3::Y * 0.5, b);
        mesh.push_triangle(b, Vec3::NEG_Y * 0.5, a);
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centroid(mesh: &MeshData, tri: usize) -> Vec3 {
        let idx = &mesh.indices[tri * 3..tri * 3 + 3];
        idx.iter()
            .map(|&i| Vec3::from(mesh.vertices[i as usize].position))
            .sum::<Vec3>()
            / 3.0
    }

    #[test]
    fn closed_meshes_face_outwards() {
        for mesh in [cube(), octahedron()] {
            for tri in 0..mesh.indices.len() / 3 {
                let normal = Vec3::from(mesh.vertices[mesh.indices[tri * 3] as usize].normal);
                assert!(normal.dot(centroid(&mesh, tri)) > 0.0, "triangle {tri} faces inwards");
            }
        }
    }

    #[test]
    fn sizes_and_ids() {
        assert_eq!(cube().indices.len(), 36);
        assert_eq!(octahedron().indices.len(), 24);
        assert_eq!(plane().vertices[0].normal, [0.0, 0.0, 1.0]);
        for kind in MeshKind::ALL {
            assert_eq!(MeshKind::from_id(kind.id()), Some(kind));
            assert!(kind.build().indices.iter().all(|&i| (i as usize) < kind.build().vertices.len()));
        }
        assert_eq!(MeshKind::from_id(9), None);
    }
}
