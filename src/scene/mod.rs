//! Borrowed view of the externally owned triangle soup that the kd-tree indexes.

mod mesh;

use std::ops::BitOr;

use index_vec::IndexSlice;

use crate::geometry::{Triangle, WorldPoint, WorldVector};

pub use mesh::Mesh;

index_vec::define_index_type! {
    /// Index of a triangle in the scene's triangle array.
    pub struct TriangleIdx = u32;
}

/// Bit set of user defined triangle categories.
/// Queries and the tree build select triangles by intersecting with a mask.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TriangleFlags(pub u32);

impl TriangleFlags {
    pub const NONE: TriangleFlags = TriangleFlags(0);
    pub const ALL: TriangleFlags = TriangleFlags(u32::MAX);

    pub fn intersects(self, mask: TriangleFlags) -> bool {
        self.0 & mask.0 != 0
    }
}

impl BitOr for TriangleFlags {
    type Output = TriangleFlags;

    fn bitor(self, rhs: TriangleFlags) -> TriangleFlags {
        TriangleFlags(self.0 | rhs.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MeshTriangle {
    /// Indices into the scene's position (and normal) arrays
    pub vertices: Triangle<usize>,
    pub flags: TriangleFlags,
    /// Precomputed face normal
    pub normal: WorldVector,
}

impl MeshTriangle {
    /// Creates the triangle, computing its unit face normal from the positions.
    /// Degenerate triangles get a zero normal.
    pub fn with_positions(
        vertices: [usize; 3],
        flags: TriangleFlags,
        positions: &[WorldPoint],
    ) -> MeshTriangle {
        let vertices = Triangle::from(vertices);
        let normal = vertices
            .map(|i| positions[*i])
            .normal()
            .try_normalize(0.0)
            .unwrap_or_else(WorldVector::zeros);
        MeshTriangle {
            vertices,
            flags,
            normal,
        }
    }
}

/// Non-owning view of the scene geometry.
/// The kd-tree keeps this view for its whole lifetime.
#[derive(Copy, Clone, Debug)]
pub struct SceneRef<'a> {
    pub positions: &'a [WorldPoint],
    /// Per-vertex normals, parallel to `positions`. May be empty.
    pub normals: &'a [WorldVector],
    pub triangles: &'a IndexSlice<TriangleIdx, [MeshTriangle]>,
}

impl<'a> SceneRef<'a> {
    pub fn new(
        positions: &'a [WorldPoint],
        normals: &'a [WorldVector],
        triangles: &'a [MeshTriangle],
    ) -> SceneRef<'a> {
        SceneRef {
            positions,
            normals,
            triangles: IndexSlice::from_slice(triangles),
        }
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    /// True if all vertex indices of the triangle are in range.
    pub fn is_well_formed(&self, triangle: &MeshTriangle) -> bool {
        triangle.vertices.iter().all(|i| *i < self.positions.len())
    }

    /// Vertex positions of a well formed triangle.
    pub fn positions_of(&self, triangle: &MeshTriangle) -> Triangle<WorldPoint> {
        triangle.vertices.map(|i| self.positions[*i])
    }

    /// Vertex normals of a well formed triangle, if the scene has any.
    pub fn normals_of(&self, triangle: &MeshTriangle) -> Option<Triangle<WorldVector>> {
        self.has_normals()
            .then(|| triangle.vertices.map(|i| self.normals[*i]))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::assert;

    #[test]
    fn flags_intersection() {
        let a = TriangleFlags(0b0101);
        assert!(a.intersects(TriangleFlags(0b0100)));
        assert!(!a.intersects(TriangleFlags(0b1010)));
        assert!(!a.intersects(TriangleFlags::NONE));
        assert!(a.intersects(TriangleFlags::ALL));
        assert!((TriangleFlags(1) | TriangleFlags(2)) == TriangleFlags(3));
    }

    #[test]
    fn face_normal_is_normalized() {
        let positions = [
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(2.0, 0.0, 0.0),
            WorldPoint::new(0.0, 2.0, 0.0),
        ];
        let t = MeshTriangle::with_positions([0, 1, 2], TriangleFlags::ALL, &positions);
        assert!(t.normal == WorldVector::new(0.0, 0.0, 1.0));

        let flat = MeshTriangle::with_positions([0, 1, 1], TriangleFlags::ALL, &positions);
        assert!(flat.normal == WorldVector::zeros());
    }

    #[test]
    fn well_formed_checks_indices() {
        let positions = [WorldPoint::origin(); 3];
        let triangles = [
            MeshTriangle::with_positions([0, 1, 2], TriangleFlags::ALL, &positions),
            MeshTriangle {
                vertices: Triangle::new(0, 1, 3),
                flags: TriangleFlags::ALL,
                normal: WorldVector::zeros(),
            },
        ];
        let scene = SceneRef::new(&positions, &[], &triangles);
        assert!(scene.is_well_formed(&triangles[0]));
        assert!(!scene.is_well_formed(&triangles[1]));
        assert!(scene.normals_of(&triangles[0]).is_none());
    }
}
