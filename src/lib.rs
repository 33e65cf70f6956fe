pub mod geometry;
pub mod kd_tree;
pub mod scene;
mod util;

pub use geometry::Ray;
pub use kd_tree::{
    ConfigError, DegenerateTriangles, Hit, KdTree, KdTreeConfig, NormalMode, QueryCache,
    QueryStats, TreeStatistics,
};
pub use scene::{Mesh, MeshTriangle, SceneRef, TriangleFlags, TriangleIdx};
pub use util::Stats;
