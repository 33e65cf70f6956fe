mod building;
mod printing;
mod ray_kd_intersection;

use bon::bon;
use index_vec::IndexVec;

use crate::{
    geometry::{BarycentricCoordinates, FloatType, WorldBox, WorldPoint, WorldVector},
    scene::{SceneRef, TriangleFlags, TriangleIdx},
};

use nalgebra::Unit;

pub use building::{BuildCounters, ConfigError};
pub use printing::TreeStatistics;
pub use ray_kd_intersection::{QueryCache, QueryStats};

/// Capacity of the traversal stack. Trees are at most `STACK_CAPACITY - 1` levels deep.
pub const STACK_CAPACITY: usize = 64;

/// Nodes whose triangles were all handed down unchanged this many times in a row become leaves.
pub const DUPLICATION_GUARD_LIMIT: u32 = 10;

/// Position of the split plane as a fraction of the node extent.
const SPLIT_RATIO: FloatType = 0.499999;

/// Kd-tree over the triangles of a borrowed scene, answering nearest hit ray queries.
///
/// The tree is immutable once built; all per-query state lives in a [`QueryCache`],
/// so a single tree can be queried from many threads at once.
#[derive(Clone, Debug)]
pub struct KdTree<'a> {
    scene: SceneRef<'a>,
    config: KdTreeConfig,

    bounding_box: WorldBox,
    /// Slack used by the traversal, scaled to the scene size
    epsilon: FloatType,
    root: NodeIdx,

    nodes: IndexVec<NodeIdx, Node>,
    /// Concatenated leaf membership lists
    members: Vec<CandidateIdx>,
    /// Triangles that passed the build filters
    candidates: IndexVec<CandidateIdx, TriangleIdx>,

    counters: BuildCounters,
}

#[derive(Clone, Debug)]
struct Node {
    bounds: WorldBox,
    kind: NodeKind,
}

#[derive(Clone, Debug, PartialEq)]
enum NodeKind {
    Inner {
        axis: usize,
        split: FloatType,
        children: [NodeIdx; 2],
    },
    Leaf {
        members: MemberRange,
    },
}

index_vec::define_index_type! {
    struct NodeIdx = u32;
}

index_vec::define_index_type! {
    struct CandidateIdx = u32;
}

/// Range of a leaf's entries in `KdTree::members`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct MemberRange {
    start: u32,
    end: u32,
}

impl MemberRange {
    fn new(start: usize, end: usize) -> MemberRange {
        MemberRange {
            start: start as u32,
            end: end as u32,
        }
    }

    fn into_range(self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }

    fn len(&self) -> usize {
        (self.end - self.start) as usize
    }
}

/// What to do with triangles that can never be hit reliably.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DegenerateTriangles {
    /// Index everything that passes the flag mask.
    Keep,
    /// Skip triangles whose edges span (almost) no area.
    #[default]
    SkipZeroArea,
    /// Skip triangles whose stored face normal and the sum of their vertex normals
    /// are both (almost) zero.
    SkipZeroNormals,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KdTreeConfig {
    pub max_depth: usize,
    pub max_leaf_size: usize,
    /// Only triangles whose flags intersect this mask are indexed
    pub flag_mask: TriangleFlags,
    pub degenerate_triangles: DegenerateTriangles,
}

#[bon]
impl KdTreeConfig {
    #[builder]
    pub fn new(
        #[builder(default = 24)] max_depth: usize,
        #[builder(default = 8)] max_leaf_size: usize,
        #[builder(default = TriangleFlags::ALL)] flag_mask: TriangleFlags,
        #[builder(default)] degenerate_triangles: DegenerateTriangles,
    ) -> Self {
        KdTreeConfig {
            max_depth,
            max_leaf_size,
            flag_mask,
            degenerate_triangles,
        }
    }
}

impl Default for KdTreeConfig {
    fn default() -> Self {
        KdTreeConfig::builder().build()
    }
}

/// How the normal of a hit is calculated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum NormalMode {
    /// Geometric normal of the triangle
    Flat,
    /// Vertex normals interpolated at the hit point, flat if the scene has none
    #[default]
    Smooth,
}

/// Nearest intersection of a ray with the indexed triangles.
#[derive(Clone, Debug)]
pub struct Hit {
    /// Distance along the (normalized) ray direction
    pub distance: FloatType,
    pub point: WorldPoint,
    pub normal: Unit<WorldVector>,
    pub triangle: TriangleIdx,
    pub barycentric: BarycentricCoordinates<FloatType>,
}

impl<'a> KdTree<'a> {
    pub fn bounding_box(&self) -> &WorldBox {
        &self.bounding_box
    }

    pub fn config(&self) -> &KdTreeConfig {
        &self.config
    }

    pub fn counters(&self) -> &BuildCounters {
        &self.counters
    }

    pub fn scene(&self) -> SceneRef<'a> {
        self.scene
    }

    /// Number of triangles that passed the build filters.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Creates a query cache already sized for this tree.
    pub fn query_cache(&self) -> QueryCache {
        QueryCache::with_candidates(self.candidates.len())
    }

    /// Scene triangles referenced by at least one leaf.
    pub fn reachable_triangles(&self) -> impl Iterator<Item = TriangleIdx> + '_ {
        let mut seen = vec![false; self.candidates.len()];
        self.members.iter().filter_map(move |candidate| {
            let flag = &mut seen[candidate.index()];
            if *flag {
                None
            } else {
                *flag = true;
                Some(self.candidates[*candidate])
            }
        })
    }
}
