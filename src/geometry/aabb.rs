use std::ops::Sub;

use super::{FloatType, Triangle, WorldBox, WorldPoint, WorldVector};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }

    pub fn zip_map<Point2, Point3, F: FnMut(&Point, &Point2) -> Point3>(
        &self,
        rhs: &AABB<Point2>,
        mut f: F,
    ) -> AABB<Point3> {
        AABB {
            min: f(&self.min, &rhs.min),
            max: f(&self.max, &rhs.max),
        }
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl WorldBox {
    /// Box that contains nothing, neutral element of `union`.
    pub fn empty() -> WorldBox {
        AABB {
            min: WorldPoint::from(WorldVector::repeat(FloatType::INFINITY)),
            max: WorldPoint::from(WorldVector::repeat(FloatType::NEG_INFINITY)),
        }
    }

    /// Smallest box containing the triangle.
    pub fn from_triangle(triangle: &Triangle<WorldPoint>) -> WorldBox {
        let mut ret = AABB::new(triangle[0], triangle[0]);
        ret.include_point(&triangle[1]);
        ret.include_point(&triangle[2]);
        ret
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    pub fn include_point(&mut self, p: &WorldPoint) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn union(&self, other: &WorldBox) -> WorldBox {
        AABB {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Returns the box enlarged by `margin` in every direction.
    pub fn grow(&self, margin: FloatType) -> WorldBox {
        let margin = WorldVector::repeat(margin);
        AABB {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    /// Index of the axis with the largest extent, ties go to the lower axis.
    pub fn largest_axis(&self) -> usize {
        let size = self.size();
        let mut axis = 0;
        for candidate in 1..3 {
            if size[candidate] > size[axis] {
                axis = candidate;
            }
        }
        axis
    }

    pub fn largest_extent(&self) -> FloatType {
        self.size().max()
    }

    /// Inclusive containment test.
    pub fn contains_point(&self, p: &WorldPoint) -> bool {
        (0..3).all(|axis| self.min[axis] <= p[axis] && p[axis] <= self.max[axis])
    }

    /// Inclusive overlap test of the two boxes' ranges on a single axis.
    pub fn overlaps_on_axis(&self, other: &WorldBox, axis: usize) -> bool {
        self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis]
    }

    /// Cuts the box with a plane perpendicular to `axis`.
    /// Both halves keep the extent of the original on the other two axes.
    pub fn split(&self, axis: usize, position: FloatType) -> [WorldBox; 2] {
        let mut lower = self.clone();
        let mut upper = self.clone();
        lower.max[axis] = position;
        upper.min[axis] = position;
        [lower, upper]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::assert;
    use test_case::test_case;

    fn unit_box() -> WorldBox {
        WorldBox::new(WorldPoint::new(0.0, 0.0, 0.0), WorldPoint::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn triangle_box_covers_vertices() {
        let t = Triangle::new(
            WorldPoint::new(1.0, -2.0, 3.0),
            WorldPoint::new(-1.0, 5.0, 0.0),
            WorldPoint::new(0.5, 0.0, 7.0),
        );
        let b = WorldBox::from_triangle(&t);
        assert!(b.min == WorldPoint::new(-1.0, -2.0, 0.0));
        assert!(b.max == WorldPoint::new(1.0, 5.0, 7.0));
        assert!(t.iter().all(|p| b.contains_point(p)));
    }

    #[test]
    fn collinear_triangle_box_is_flat() {
        let t = Triangle::new(
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(1.0, 0.0, 0.0),
            WorldPoint::new(2.0, 0.0, 0.0),
        );
        let b = WorldBox::from_triangle(&t);
        assert!(!b.is_empty());
        assert!(b.size() == WorldVector::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn empty_is_union_neutral() {
        let b = unit_box();
        assert!(WorldBox::empty().is_empty());
        assert!(WorldBox::empty().union(&b) == b);
    }

    #[test_case(1.0, 1.0, 1.0, 0 ; "all equal picks x")]
    #[test_case(1.0, 2.0, 2.0, 1 ; "y and z tie picks y")]
    #[test_case(1.0, 2.0, 3.0, 2 ; "z largest")]
    #[test_case(3.0, 1.0, 3.0, 0 ; "x and z tie picks x")]
    fn largest_axis(x: FloatType, y: FloatType, z: FloatType, expected: usize) {
        let b = WorldBox::new(WorldPoint::origin(), WorldPoint::new(x, y, z));
        assert!(b.largest_axis() == expected);
    }

    #[test]
    fn split_keeps_other_axes() {
        let [lower, upper] = unit_box().split(1, 0.25);
        assert!(lower.min == WorldPoint::new(0.0, 0.0, 0.0));
        assert!(lower.max == WorldPoint::new(1.0, 0.25, 1.0));
        assert!(upper.min == WorldPoint::new(0.0, 0.25, 0.0));
        assert!(upper.max == WorldPoint::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn grow_and_contains() {
        let p = WorldPoint::new(1.05, 0.5, 0.5);
        assert!(!unit_box().contains_point(&p));
        assert!(unit_box().grow(0.1).contains_point(&p));
    }

    #[test]
    fn overlap_is_inclusive() {
        let a = unit_box();
        let b = WorldBox::new(WorldPoint::new(1.0, 5.0, 5.0), WorldPoint::new(2.0, 6.0, 6.0));
        assert!(a.overlaps_on_axis(&b, 0));
        assert!(!a.overlaps_on_axis(&b, 1));
    }
}
