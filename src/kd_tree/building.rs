use assert2::debug_assert;
use index_vec::{IndexSlice, IndexVec};
use log::{debug, warn};
use thiserror::Error;

use crate::{
    geometry::{FloatType, Triangle, WorldBox, WorldPoint, WorldVector},
    scene::{MeshTriangle, SceneRef, TriangleIdx},
};

use super::{
    CandidateIdx, DUPLICATION_GUARD_LIMIT, DegenerateTriangles, KdTree, KdTreeConfig, MemberRange,
    Node, NodeIdx, NodeKind, SPLIT_RATIO, STACK_CAPACITY,
};

/// Enlargement of the root box relative to the scene extent.
const BOUNDS_EPSILON: FloatType = 1e-5;

/// Squared length under which a normal counts as zero.
const ZERO_NORMAL_EPSILON: FloatType = 1e-12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("The scene contains no triangles")]
    NoGeometry,

    #[error("Maximum depth {max_depth} does not fit the traversal stack (capacity {capacity})")]
    MaxDepthTooLarge { max_depth: usize, capacity: usize },

    #[error("The scene has {normals} vertex normals for {positions} vertex positions")]
    MismatchedNormals { positions: usize, normals: usize },
}

/// Counters collected while building the tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildCounters {
    pub node_count: usize,
    pub leaf_count: usize,
    /// Depth of the deepest leaf, root is 0
    pub max_depth: usize,
    /// Number of times a triangle was assigned to both children of a split
    pub duplicated_references: usize,

    pub filtered_by_flags: usize,
    pub malformed_triangles: usize,
    pub degenerate_triangles: usize,

    /// Oversized leaves created by the duplication guard
    pub guard_stops: usize,
    /// Oversized leaves created by the depth limit
    pub depth_stops: usize,
}

impl BuildCounters {
    /// Triangles of the scene that were not indexed.
    pub fn skipped_triangles(&self) -> usize {
        self.filtered_by_flags + self.malformed_triangles + self.degenerate_triangles
    }
}

impl<'a> KdTree<'a> {
    pub fn build(scene: SceneRef<'a>, config: KdTreeConfig) -> Result<KdTree<'a>, ConfigError> {
        if scene.triangles.is_empty() {
            return Err(ConfigError::NoGeometry);
        }
        if config.max_depth >= STACK_CAPACITY {
            return Err(ConfigError::MaxDepthTooLarge {
                max_depth: config.max_depth,
                capacity: STACK_CAPACITY,
            });
        }
        if scene.has_normals() && scene.normals.len() != scene.positions.len() {
            return Err(ConfigError::MismatchedNormals {
                positions: scene.positions.len(),
                normals: scene.normals.len(),
            });
        }

        let mut counters = BuildCounters::default();
        let cache = BoundingBoxCache::collect(&scene, &config, &mut counters);

        let (bounding_box, epsilon) = match &cache.bounds {
            Some(bounds) => {
                let epsilon = BOUNDS_EPSILON * (1.0 + bounds.largest_extent());
                (bounds.grow(epsilon), epsilon)
            }
            None => {
                warn!(
                    "None of the {} triangles passed the build filters, the kd-tree is empty",
                    scene.triangles.len()
                );
                let origin = WorldPoint::origin();
                (WorldBox::new(origin, origin), BOUNDS_EPSILON)
            }
        };

        let mut builder = Builder {
            config: &config,
            boxes: &cache.boxes,
            sides: IndexVec::from_vec(vec![[false; 2]; cache.boxes.len()]),
            nodes: IndexVec::new(),
            members: Vec::new(),
            counters: &mut counters,
        };
        let root = builder.subdivide(
            bounding_box.clone(),
            cache.candidates.indices().collect(),
            0,
            0,
        );
        let Builder { nodes, members, .. } = builder;

        debug!(
            "Built kd-tree: {} of {} triangles indexed, {} nodes, {} leaves, depth {}, {} duplicated references",
            cache.candidates.len(),
            scene.triangles.len(),
            counters.node_count,
            counters.leaf_count,
            counters.max_depth,
            counters.duplicated_references,
        );

        Ok(KdTree {
            scene,
            config,
            bounding_box,
            epsilon,
            root,
            nodes,
            members,
            candidates: cache.candidates,
            counters,
        })
    }
}

/// Per-candidate bounding boxes, only alive during the build.
struct BoundingBoxCache {
    candidates: IndexVec<CandidateIdx, TriangleIdx>,
    boxes: IndexVec<CandidateIdx, WorldBox>,
    /// Union of all candidate boxes, None if there are no candidates
    bounds: Option<WorldBox>,
}

impl BoundingBoxCache {
    fn collect(
        scene: &SceneRef,
        config: &KdTreeConfig,
        counters: &mut BuildCounters,
    ) -> BoundingBoxCache {
        let mut candidates = IndexVec::new();
        let mut boxes = IndexVec::new();
        let mut bounds = WorldBox::empty();

        for (index, triangle) in scene.triangles.iter_enumerated() {
            if !triangle.flags.intersects(config.flag_mask) {
                counters.filtered_by_flags += 1;
                continue;
            }
            if !scene.is_well_formed(triangle) {
                counters.malformed_triangles += 1;
                continue;
            }

            let positions = scene.positions_of(triangle);
            if !positions.iter().all(|p| p.coords.iter().all(|c| c.is_finite())) {
                counters.malformed_triangles += 1;
                continue;
            }
            if is_degenerate(config.degenerate_triangles, scene, triangle, &positions) {
                counters.degenerate_triangles += 1;
                continue;
            }

            let triangle_box = WorldBox::from_triangle(&positions);
            bounds = bounds.union(&triangle_box);
            candidates.push(index);
            boxes.push(triangle_box);
        }

        BoundingBoxCache {
            bounds: (!boxes.is_empty()).then_some(bounds),
            candidates,
            boxes,
        }
    }
}

fn is_degenerate(
    mode: DegenerateTriangles,
    scene: &SceneRef,
    triangle: &MeshTriangle,
    positions: &Triangle<WorldPoint>,
) -> bool {
    match mode {
        DegenerateTriangles::Keep => false,
        DegenerateTriangles::SkipZeroArea => {
            let [e1, e2] = positions.edges();
            e1.cross(&e2).norm() <= FloatType::EPSILON * e1.norm() * e2.norm()
        }
        DegenerateTriangles::SkipZeroNormals => {
            let vertex_normal_sum = scene
                .normals_of(triangle)
                .map_or_else(WorldVector::zeros, |n| n[0] + n[1] + n[2]);
            triangle.normal.norm_squared() < ZERO_NORMAL_EPSILON
                && vertex_normal_sum.norm_squared() < ZERO_NORMAL_EPSILON
        }
    }
}

struct Builder<'b> {
    config: &'b KdTreeConfig,
    boxes: &'b IndexSlice<CandidateIdx, [WorldBox]>,
    /// Scratch: which children each candidate of the node being split goes to
    sides: IndexVec<CandidateIdx, [bool; 2]>,

    nodes: IndexVec<NodeIdx, Node>,
    members: Vec<CandidateIdx>,
    counters: &'b mut BuildCounters,
}

impl Builder<'_> {
    /// Turns the node into a leaf or splits it in two and recurses.
    /// `guard` counts how many ancestors in a row passed all of their triangles down to this node.
    fn subdivide(
        &mut self,
        bounds: WorldBox,
        members: Vec<CandidateIdx>,
        guard: u32,
        depth: usize,
    ) -> NodeIdx {
        let oversized = members.len() > self.config.max_leaf_size;
        if !oversized {
            return self.make_leaf(bounds, &members, depth);
        }
        if depth >= self.config.max_depth {
            self.counters.depth_stops += 1;
            return self.make_leaf(bounds, &members, depth);
        }
        if guard >= DUPLICATION_GUARD_LIMIT {
            self.counters.guard_stops += 1;
            return self.make_leaf(bounds, &members, depth);
        }

        let axis = bounds.largest_axis();
        let split = bounds.min[axis] + SPLIT_RATIO * bounds.size()[axis];
        let [lower_bounds, upper_bounds] = bounds.split(axis, split);

        let member_count = members.len();
        let [lower, upper] = self.distribute(members, &lower_bounds, &upper_bounds, axis);
        let child_guard = |child: &Vec<CandidateIdx>| {
            if child.len() == member_count {
                guard + 1
            } else {
                0
            }
        };
        let guards = [child_guard(&lower), child_guard(&upper)];

        // Placeholder that gets replaced once the children are built
        let index = self.nodes.push(Node {
            bounds,
            kind: NodeKind::Leaf {
                members: MemberRange::new(0, 0),
            },
        });
        self.counters.node_count += 1;

        let children = [
            self.subdivide(lower_bounds, lower, guards[0], depth + 1),
            self.subdivide(upper_bounds, upper, guards[1], depth + 1),
        ];
        self.nodes[index].kind = NodeKind::Inner {
            axis,
            split,
            children,
        };

        index
    }

    fn make_leaf(&mut self, bounds: WorldBox, members: &[CandidateIdx], depth: usize) -> NodeIdx {
        let start = self.members.len();
        self.members.extend_from_slice(members);

        self.counters.node_count += 1;
        self.counters.leaf_count += 1;
        self.counters.max_depth = self.counters.max_depth.max(depth);

        self.nodes.push(Node {
            bounds,
            kind: NodeKind::Leaf {
                members: MemberRange::new(start, self.members.len()),
            },
        })
    }

    /// Assigns each member to every child whose range on the split axis its box overlaps.
    /// Counts first, then fills exactly sized arrays. A child that receives all members
    /// takes over the parent's array.
    fn distribute(
        &mut self,
        members: Vec<CandidateIdx>,
        lower_bounds: &WorldBox,
        upper_bounds: &WorldBox,
        axis: usize,
    ) -> [Vec<CandidateIdx>; 2] {
        let mut counts = [0usize; 2];
        for &candidate in &members {
            let candidate_box = &self.boxes[candidate];
            let sides = [
                candidate_box.overlaps_on_axis(lower_bounds, axis),
                candidate_box.overlaps_on_axis(upper_bounds, axis),
            ];
            debug_assert!(sides[0] || sides[1]);

            if sides[0] && sides[1] {
                self.counters.duplicated_references += 1;
            }
            for (count, side) in counts.iter_mut().zip(sides) {
                *count += usize::from(side);
            }
            self.sides[candidate] = sides;
        }

        let everything = members.len();
        match (counts[0] == everything, counts[1] == everything) {
            (true, true) => [members.clone(), members],
            (true, false) => {
                let upper = filter_side(&members, &self.sides, 1, counts[1]);
                [members, upper]
            }
            (false, true) => {
                let lower = filter_side(&members, &self.sides, 0, counts[0]);
                [lower, members]
            }
            (false, false) => [
                filter_side(&members, &self.sides, 0, counts[0]),
                filter_side(&members, &self.sides, 1, counts[1]),
            ],
        }
    }
}

fn filter_side(
    members: &[CandidateIdx],
    sides: &IndexSlice<CandidateIdx, [[bool; 2]]>,
    side: usize,
    count: usize,
) -> Vec<CandidateIdx> {
    let mut ret = Vec::with_capacity(count);
    ret.extend(members.iter().copied().filter(|c| sides[*c][side]));
    debug_assert!(ret.len() == count);
    ret
}
