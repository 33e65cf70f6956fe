use super::{FloatType, Ray, WorldBox};

pub trait RayIntersectionExt {
    type DistanceType;
    /// Calculate first and last ray intersection with the box
    fn intersect(&self, ray: &Ray) -> (Self::DistanceType, Self::DistanceType);
}

impl RayIntersectionExt for WorldBox {
    type DistanceType = FloatType;

    /// Calculates ray intersection with the box (slab test).
    /// Returns minimum and maximum distance along the ray, ray intersects if min <= max.
    /// Distances may be negative when the box is (partially) behind the ray origin.
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType) {
        // Componentwise distances along the ray to the box's min and max corners
        // The multiplication is NAN if the ray is starting inside the slab bounding plane
        // and is parallel to it. In this case we replace it with +-infinity, so that the range becomes infinite
        let to_box_min = (self.min - ray.origin)
            .component_mul(&ray.inv_direction)
            .map(|x| if x.is_nan() { FloatType::NEG_INFINITY } else { x });
        let to_box_max = (self.max - ray.origin)
            .component_mul(&ray.inv_direction)
            .map(|x| if x.is_nan() { FloatType::INFINITY } else { x });

        // Correctly ordered (min_t <= max_t)
        let componentwise_min_t = to_box_min.zip_map(&to_box_max, FloatType::min);
        let componentwise_max_t = to_box_min.zip_map(&to_box_max, FloatType::max);

        (componentwise_min_t.max(), componentwise_max_t.min())
    }
}

#[cfg(test)]
pub mod test {
    use assert2::{assert, let_assert};
    use test_case::{test_case, test_matrix};

    use super::*;

    use crate::geometry::{WorldPoint, WorldVector};

    fn test_box() -> WorldBox {
        WorldBox::new(WorldPoint::new(5.0, 5.0, 5.0), WorldPoint::new(10.0, 10.0, 10.0))
    }

    /// Checks cases when the ray hits the box, including some corner cases.
    #[test_matrix(
        [5.0, 7.0, 10.0],
        [5.0, 7.0, 10.0],
        [5.0, 7.0, 10.0],
        [-1.0, 0.0, 2.0],
        [-1.0, 0.0, 2.0],
        [-1.0, 0.0, 2.0],
        [-10.0, -1.0, 0.0, 2.0, 5.0, 20.0]
    )]
    fn hit(px: f32, py: f32, pz: f32, dx: f32, dy: f32, dz: f32, origin_pos: f32) {
        if dx == 0.0 && dy == 0.0 && dz == 0.0 {
            return;
        }

        let b = test_box();

        let p = WorldPoint::new(px, py, pz);
        let d = WorldVector::new(dx, dy, dz);
        let temp_r = Ray::new(p, d);
        let origin = temp_r.point_at(origin_pos);
        let r = Ray::new(origin, d);

        let (t1, t2) = checked_result(b.intersect(&r))
            .expect("The ray passes through a point of the box, we should always have an intersection");

        let p1 = r.point_at(t1);
        let p2 = r.point_at(t2);

        assert!(point_is_on_box_surface(&p1, &b), "{p1:?} must be in {b:?}");
        assert!(point_is_on_box_surface(&p2, &b), "{p2:?} must be in {b:?}");
    }

    /// Returns the intersection if one was found, merging nearly touching ranges
    fn checked_result((t1, t2): (f32, f32)) -> Option<(f32, f32)> {
        const TOLERANCE: f32 = 1e-3;

        if t1 <= t2 {
            Some((t1, t2))
        } else if t1 <= t2 + TOLERANCE {
            let t = (t1 + t2) / 2.0;
            Some((t, t))
        } else {
            None
        }
    }

    /// Just a manual example of ray grazing along an edge.
    #[test]
    fn hit_along_edge() {
        let r = Ray::new(
            WorldPoint::new(5.0, 5.0, 0.0),
            WorldVector::new(0.0, 0.0, 1.0),
        );

        let result = checked_result(test_box().intersect(&r));

        assert!(result == Some((5.0, 10.0)))
    }

    #[test]
    fn origin_inside_gives_negative_entry() {
        let r = Ray::new(
            WorldPoint::new(7.0, 7.0, 7.0),
            WorldVector::new(1.0, 0.0, 0.0),
        );
        let (t1, t2) = test_box().intersect(&r);
        assert!(t1 == -2.0);
        assert!(t2 == 3.0);
    }

    #[test_case(0.0, 7.0, 7.0, 0.0, 1.0, 0.0 ; "parallel below x slab")]
    #[test_case(7.0, 12.0, 7.0, 1.0, 0.0, 0.0 ; "parallel above y slab")]
    #[test_case(7.0, 7.0, 12.0, 1.0, 1.0, 0.0 ; "parallel above z slab")]
    #[test_case(0.0, 5.0, 7.0, 1.0, 0.0, 1.0 ; "passes the corner edge")]
    #[test_case(7.0, 7.0, 12.0, 0.0, 0.0, 1.0 ; "pointing away")]
    fn misses(px: f32, py: f32, pz: f32, dx: f32, dy: f32, dz: f32) {
        let r = Ray::new(WorldPoint::new(px, py, pz), WorldVector::new(dx, dy, dz));
        let (t1, t2) = test_box().intersect(&r);
        assert!(t1 > t2 || t2 < 0.0);
    }

    /// Flat boxes (a planar mesh before growing) still intersect rays in their plane.
    #[test]
    fn flat_box() {
        let flat = WorldBox::new(WorldPoint::new(0.0, 0.0, 0.0), WorldPoint::new(1.0, 1.0, 0.0));

        let in_plane = Ray::new(WorldPoint::new(-1.0, 0.5, 0.0), WorldVector::new(1.0, 0.0, 0.0));
        assert!(checked_result(flat.intersect(&in_plane)) == Some((1.0, 2.0)));

        let through = Ray::new(WorldPoint::new(0.5, 0.5, 2.0), WorldVector::new(0.0, 0.0, -1.0));
        let_assert!(Some((t1, t2)) = checked_result(flat.intersect(&through)));
        assert!(t1 == 2.0 && t2 == 2.0);

        let above = Ray::new(WorldPoint::new(-1.0, 0.5, 0.1), WorldVector::new(1.0, 0.0, 0.0));
        assert!(checked_result(flat.intersect(&above)).is_none());
    }

    fn point_is_on_box_surface(p: &WorldPoint, b: &WorldBox) -> bool {
        const TOLERANCE: f32 = 1e-3;

        let inside = |axis: usize| {
            p[axis] >= b.min[axis] - TOLERANCE && p[axis] <= b.max[axis] + TOLERANCE
        };
        let on_face = |axis: usize| {
            (p[axis] - b.min[axis]).abs() <= TOLERANCE || (p[axis] - b.max[axis]).abs() <= TOLERANCE
        };

        (0..3).all(inside) && (0..3).any(on_face)
    }
}
