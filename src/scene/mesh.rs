use index_vec::IndexVec;

use super::{MeshTriangle, SceneRef, TriangleFlags, TriangleIdx};
use crate::geometry::{FloatType, WorldPoint, WorldVector};

/// Owned triangle soup with per-vertex normals.
/// Used for procedurally generated test and benchmark geometry; real scenes
/// only need to provide a [`SceneRef`].
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub positions: Vec<WorldPoint>,
    pub normals: Vec<WorldVector>,
    pub triangles: IndexVec<TriangleIdx, MeshTriangle>,
}

impl Mesh {
    pub fn as_scene(&self) -> SceneRef<'_> {
        SceneRef {
            positions: &self.positions,
            normals: &self.normals,
            triangles: self.triangles.as_slice(),
        }
    }

    pub fn push_triangle(&mut self, vertices: [usize; 3], flags: TriangleFlags) -> TriangleIdx {
        self.triangles
            .push(MeshTriangle::with_positions(vertices, flags, &self.positions))
    }

    /// Unit square in the z=0 plane tessellated into `2 * n * n` counter-clockwise
    /// triangles, all normals pointing to +z.
    pub fn grid(n: usize, flags: TriangleFlags) -> Mesh {
        let mut mesh = Mesh::default();
        let step = 1.0 / n as FloatType;
        for j in 0..=n {
            for i in 0..=n {
                mesh.positions
                    .push(WorldPoint::new(i as FloatType * step, j as FloatType * step, 0.0));
                mesh.normals.push(WorldVector::z());
            }
        }

        let vertex = |i: usize, j: usize| j * (n + 1) + i;
        for j in 0..n {
            for i in 0..n {
                let quad = [
                    vertex(i, j),
                    vertex(i + 1, j),
                    vertex(i + 1, j + 1),
                    vertex(i, j + 1),
                ];
                mesh.push_triangle([quad[0], quad[1], quad[2]], flags);
                mesh.push_triangle([quad[0], quad[2], quad[3]], flags);
            }
        }

        mesh
    }

    /// Latitude/longitude sphere with outward facing triangles and smooth normals.
    pub fn uv_sphere(
        center: WorldPoint,
        radius: FloatType,
        rings: usize,
        segments: usize,
        flags: TriangleFlags,
    ) -> Mesh {
        use std::f32::consts::{PI, TAU};

        let rings = rings.max(2);
        let segments = segments.max(3);

        let mut mesh = Mesh::default();
        for ring in 0..=rings {
            let theta = PI * ring as FloatType / rings as FloatType;
            for segment in 0..=segments {
                let phi = TAU * segment as FloatType / segments as FloatType;
                let normal = WorldVector::new(
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                );
                mesh.positions.push(center + normal * radius);
                mesh.normals.push(normal);
            }
        }

        let vertex = |ring: usize, segment: usize| ring * (segments + 1) + segment;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = vertex(ring, segment);
                let b = vertex(ring + 1, segment);
                let c = vertex(ring + 1, segment + 1);
                let d = vertex(ring, segment + 1);
                // Pole rows have one collapsed edge, skip the zero area half
                if ring != 0 {
                    mesh.push_triangle([a, b, d], flags);
                }
                if ring != rings - 1 {
                    mesh.push_triangle([b, c, d], flags);
                }
            }
        }

        mesh
    }
}
