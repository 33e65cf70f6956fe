use std::{fmt::Display, io};

use itertools::Itertools as _;

use crate::util::Stats;

use super::{KdTree, NodeIdx, NodeKind};

/// Shape summary of a built tree.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeStatistics {
    pub node_count: usize,
    pub leaf_count: usize,
    /// Depth of leaves, root is depth 0
    pub depth: Stats,
    pub leaf_size: Stats,
    pub empty_leaves: usize,
    pub duplicated_references: usize,
    pub skipped_triangles: usize,
}

impl Display for TreeStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Nodes: {} ({} leaves, {} empty)",
            self.node_count, self.leaf_count, self.empty_leaves
        )?;
        writeln!(f, "Leaf depth: {}", self.depth)?;
        writeln!(f, "Leaf size: {}", self.leaf_size)?;
        write!(
            f,
            "Duplicated references: {}; skipped triangles: {}",
            self.duplicated_references, self.skipped_triangles
        )
    }
}

impl KdTree<'_> {
    pub fn statistics(&self) -> TreeStatistics {
        let leaf_size: Stats = self
            .nodes
            .iter()
            .filter_map(|node| match node.kind {
                NodeKind::Leaf { members } => Some(members.len()),
                NodeKind::Inner { .. } => None,
            })
            .collect();

        TreeStatistics {
            node_count: self.nodes.len(),
            leaf_count: leaf_size.count,
            depth: self.depth_statistics_recursive(self.root),
            empty_leaves: self
                .nodes
                .iter()
                .filter(|node| matches!(node.kind, NodeKind::Leaf { members } if members.len() == 0))
                .count(),
            leaf_size,
            duplicated_references: self.counters.duplicated_references,
            skipped_triangles: self.counters.skipped_triangles(),
        }
    }

    fn depth_statistics_recursive(&self, node: NodeIdx) -> Stats {
        match self.nodes[node].kind {
            NodeKind::Leaf { .. } => Stats::new_single(0),
            NodeKind::Inner { children, .. } => {
                let [lower, upper] = children.map(|child| self.depth_statistics_recursive(child));
                lower.merge(&upper).shifted(1)
            }
        }
    }

    /// Writes an indented dump of the tree, one node per line.
    pub fn write_tree<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        self.write_recursive(out, 0, self.root)
    }

    fn write_recursive<W: io::Write>(&self, out: &mut W, indent: usize, node: NodeIdx) -> io::Result<()> {
        let node = &self.nodes[node];
        let indent_str = "  ".repeat(indent);
        match node.kind {
            NodeKind::Inner {
                axis,
                split,
                children,
            } => {
                writeln!(
                    out,
                    "{}- I: {}={} {:?}-{:?}",
                    indent_str,
                    ["x", "y", "z"][axis],
                    split,
                    node.bounds.min,
                    node.bounds.max
                )?;
                for child in children {
                    self.write_recursive(out, indent + 1, child)?;
                }
            }
            NodeKind::Leaf { members } => {
                let triangles = self.members[members.into_range()]
                    .iter()
                    .map(|candidate| self.candidates[*candidate].index())
                    .collect_vec();
                writeln!(
                    out,
                    "{}- L: {:?}-{:?} {:?}",
                    indent_str, node.bounds.min, node.bounds.max, triangles
                )?;
            }
        }
        Ok(())
    }
}
