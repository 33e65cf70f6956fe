use std::ops::ControlFlow;

use arrayvec::ArrayVec;
use assert2::debug_assert;
use index_vec::IndexVec;
use nalgebra::Unit;

use super::{CandidateIdx, Hit, KdTree, Node, NodeIdx, NodeKind, NormalMode, STACK_CAPACITY};
use crate::{
    geometry::{BarycentricCoordinates, FloatType, Ray, RayIntersectionExt as _},
    scene::{TriangleFlags, TriangleIdx},
};

/// Direction components smaller than this are treated as parallel to the split plane.
const PARALLEL_EPSILON: FloatType = 1e-9;

/// Minimal distance of an accepted hit, avoids self intersection of rays leaving a surface.
const MIN_HIT_DISTANCE: FloatType = 1e-6;

/// Squared length under which interpolated vertex normals are replaced by the face normal.
const MIN_SMOOTH_NORMAL_SQUARED: FloatType = 1e-12;

/// Scratch state of a single querying thread.
///
/// Holds the traversal stack and the set of triangles already tested by the running query
/// (triangles straddling split planes live in several leaves).
#[derive(Clone, Debug, Default)]
pub struct QueryCache {
    stack: ArrayVec<TraversalFrame, STACK_CAPACITY>,
    visited: VisitedSet,
    stats: QueryStats,
}

/// Work done by the last query.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub nodes_visited: usize,
    pub leaves_visited: usize,
    pub triangles_tested: usize,
}

#[derive(Copy, Clone, Debug)]
struct TraversalFrame {
    node: NodeIdx,
    t_min: FloatType,
    t_max: FloatType,
}

/// Generation stamps per candidate; a candidate is visited if its stamp equals the current generation.
#[derive(Clone, Debug, Default)]
struct VisitedSet {
    stamps: IndexVec<CandidateIdx, u32>,
    generation: u32,
}

impl VisitedSet {
    fn reset(&mut self, candidate_count: usize) {
        if self.stamps.len() != candidate_count {
            self.stamps = IndexVec::from_vec(vec![0; candidate_count]);
            self.generation = 0;
        }
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.stamps.iter_mut().for_each(|stamp| *stamp = 0);
            self.generation = 1;
        }
    }

    /// Marks the candidate as visited, returns false if it already was.
    fn insert(&mut self, candidate: CandidateIdx) -> bool {
        let stamp = &mut self.stamps[candidate];
        if *stamp == self.generation {
            false
        } else {
            *stamp = self.generation;
            true
        }
    }
}

impl QueryCache {
    pub fn with_candidates(candidate_count: usize) -> QueryCache {
        let mut ret = QueryCache::default();
        ret.visited.reset(candidate_count);
        ret
    }

    /// Statistics of the most recent query.
    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    fn begin(&mut self, candidate_count: usize) {
        self.stack.clear();
        self.visited.reset(candidate_count);
        self.stats = QueryStats::default();
    }
}

#[derive(Copy, Clone, Debug)]
struct LeafHitRecord {
    t: FloatType,
    uv: BarycentricCoordinates<FloatType>,
    triangle: Option<TriangleIdx>,
}

impl LeafHitRecord {
    fn up_to(t: FloatType) -> LeafHitRecord {
        LeafHitRecord {
            t,
            uv: BarycentricCoordinates::default(),
            triangle: None,
        }
    }
}

impl KdTree<'_> {
    /// Finds the nearest triangle hit by the ray among triangles whose flags intersect `flags_mask`.
    pub fn intersect(
        &self,
        ray: &Ray,
        flags_mask: TriangleFlags,
        normal_mode: NormalMode,
        cache: &mut QueryCache,
    ) -> Option<Hit> {
        let mut best = LeafHitRecord::up_to(FloatType::INFINITY);

        self.traverse(ray, FloatType::INFINITY, cache, |node, members, visited, stats| {
            self.intersect_members(members, ray, flags_mask, visited, stats, &mut best);

            // Leaves are visited front to back, a hit inside this leaf can't be beaten by later leaves.
            // Hits outside of it might be, by a triangle that was not tested yet.
            if best.triangle.is_some()
                && node
                    .bounds
                    .grow(self.epsilon)
                    .contains_point(&ray.point_at(best.t))
            {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(best.t)
            }
        });

        // Whatever the early exit decided, `best` is the nearest of all tested triangles
        let triangle = best.triangle?;
        Some(self.make_hit(ray, triangle, best.t, best.uv, normal_mode))
    }

    /// Returns true if any triangle matching `flags_mask` is hit closer than `max_distance`.
    pub fn occluded(
        &self,
        ray: &Ray,
        max_distance: FloatType,
        flags_mask: TriangleFlags,
        cache: &mut QueryCache,
    ) -> bool {
        let mut best = LeafHitRecord::up_to(max_distance);

        self.traverse(ray, max_distance, cache, |_, members, visited, stats| {
            self.intersect_members(members, ray, flags_mask, visited, stats, &mut best);
            if best.triangle.is_some() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(max_distance)
            }
        });

        best.triangle.is_some()
    }

    /// Visits the leaves pierced by the ray in front to back order.
    /// `visit_leaf` returns either `Break` to end the traversal, or the distance beyond which
    /// no further nodes need to be visited.
    fn traverse<F>(&self, ray: &Ray, max_distance: FloatType, cache: &mut QueryCache, mut visit_leaf: F)
    where
        F: FnMut(&Node, &[CandidateIdx], &mut VisitedSet, &mut QueryStats) -> ControlFlow<(), FloatType>,
    {
        cache.begin(self.candidates.len());
        if self.is_empty() {
            return;
        }
        let Some((t_min, t_max)) = self.clip_to_root(ray, max_distance) else {
            return;
        };

        let QueryCache {
            stack,
            visited,
            stats,
        } = cache;

        let mut bound = max_distance;
        let mut next = Some(TraversalFrame {
            node: self.root,
            t_min,
            t_max,
        });

        while let Some(frame) = next.take().or_else(|| stack.pop()) {
            if frame.t_min > bound + self.epsilon {
                // The node starts further away than the best hit so far, it can't improve on it
                continue;
            }
            stats.nodes_visited += 1;

            let node = &self.nodes[frame.node];
            match node.kind {
                NodeKind::Inner {
                    axis,
                    split,
                    children,
                } => {
                    next = Some(self.step_inner(ray, axis, split, children, frame, stack));
                }
                NodeKind::Leaf { members } => {
                    stats.leaves_visited += 1;
                    match visit_leaf(node, &self.members[members.into_range()], visited, stats) {
                        ControlFlow::Break(()) => return,
                        ControlFlow::Continue(new_bound) => bound = new_bound,
                    }
                }
            }
        }
    }

    /// Distance interval of the ray inside the root box, None if the ray misses it.
    fn clip_to_root(&self, ray: &Ray, max_distance: FloatType) -> Option<(FloatType, FloatType)> {
        let (t1, t2) = self.bounding_box.intersect(ray);
        if t1.is_nan() || t2.is_nan() {
            return None;
        }

        let t_min = (t1 - self.epsilon).max(0.0);
        let t_max = (t2 + self.epsilon).min(max_distance);
        (t_min <= t_max).then_some((t_min, t_max))
    }

    /// Chooses the children of an inner node to visit.
    /// Returns the frame to continue with, the far child goes on the stack if it needs a visit too.
    fn step_inner(
        &self,
        ray: &Ray,
        axis: usize,
        split: FloatType,
        children: [NodeIdx; 2],
        frame: TraversalFrame,
        stack: &mut ArrayVec<TraversalFrame, STACK_CAPACITY>,
    ) -> TraversalFrame {
        let direction = ray.direction[axis];
        let offset = split - ray.origin[axis];

        // Stack depth never exceeds tree depth, which is checked against the capacity when building
        debug_assert!(stack.len() < STACK_CAPACITY);

        if direction.abs() < PARALLEL_EPSILON {
            if offset.abs() <= self.epsilon {
                // Running along the plane itself, both sides need to be checked
                stack.push(TraversalFrame {
                    node: children[1],
                    ..frame
                });
                return TraversalFrame {
                    node: children[0],
                    ..frame
                };
            }
            let side = if offset > 0.0 { 0 } else { 1 };
            return TraversalFrame {
                node: children[side],
                ..frame
            };
        }

        let lower_first = offset > 0.0 || (offset == 0.0 && direction <= 0.0);
        let [near, far] = if lower_first {
            children
        } else {
            [children[1], children[0]]
        };
        let t_plane = offset * ray.inv_direction[axis];

        if t_plane > frame.t_max || t_plane <= 0.0 {
            // The plane is crossed after the interval ends, or behind the origin
            TraversalFrame { node: near, ..frame }
        } else if t_plane < frame.t_min {
            TraversalFrame { node: far, ..frame }
        } else {
            stack.push(TraversalFrame {
                node: far,
                t_min: t_plane,
                t_max: frame.t_max,
            });
            TraversalFrame {
                node: near,
                t_min: frame.t_min,
                t_max: t_plane,
            }
        }
    }

    /// Tests the not yet visited members of a leaf, updating `best` with hits closer than `best.t`.
    fn intersect_members(
        &self,
        members: &[CandidateIdx],
        ray: &Ray,
        flags_mask: TriangleFlags,
        visited: &mut VisitedSet,
        stats: &mut QueryStats,
        best: &mut LeafHitRecord,
    ) {
        for &candidate in members {
            let triangle_index = self.candidates[candidate];
            let triangle = &self.scene.triangles[triangle_index];
            if !triangle.flags.intersects(flags_mask) || !visited.insert(candidate) {
                continue;
            }

            stats.triangles_tested += 1;
            let Some((t, uv)) = self.scene.positions_of(triangle).intersect(ray) else {
                continue;
            };
            if t > MIN_HIT_DISTANCE && t < best.t {
                *best = LeafHitRecord {
                    t,
                    uv,
                    triangle: Some(triangle_index),
                };
            }
        }
    }

    fn make_hit(
        &self,
        ray: &Ray,
        triangle_index: TriangleIdx,
        t: FloatType,
        uv: BarycentricCoordinates<FloatType>,
        normal_mode: NormalMode,
    ) -> Hit {
        let triangle = &self.scene.triangles[triangle_index];
        let geometric_normal = self.scene.positions_of(triangle).normal();

        let normal = match (normal_mode, self.scene.normals_of(triangle)) {
            (NormalMode::Smooth, Some(normals)) => {
                let interpolated = uv.interpolate_triangle(&normals);
                if interpolated.norm_squared() > MIN_SMOOTH_NORMAL_SQUARED {
                    interpolated
                } else {
                    geometric_normal
                }
            }
            _ => geometric_normal,
        };

        Hit {
            distance: t,
            point: ray.point_at(t),
            normal: Unit::new_normalize(normal),
            triangle: triangle_index,
            barycentric: uv,
        }
    }
}
