//! Quad-tree nodes and the arena that owns them.
//!
//! Nodes live in a flat `Vec` and refer to their children by [`NodeId`].
//! A node is either a leaf or has all four quadrant children, always kept in
//! NW, NE, SW, SE order. An entry is pushed into a child only when the child
//! fully contains its box; entries straddling a split line stay at the parent.

use crate::bounding_box::BoundingBox;

use super::qtree_constants::MAX_NODES;
use super::qtree_types::{IndexEntry, NodeId, SpatialError, SpatialResult};

/// Child position inside a parent node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Quadrant {
    /// Canonical child order
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Quadrant::NorthWest => "NW",
            Quadrant::NorthEast => "NE",
            Quadrant::SouthWest => "SW",
            Quadrant::SouthEast => "SE",
        }
    }
}

/// Split policy applied during insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPolicy {
    pub max_depth: u32,
    pub split_threshold: u32,
}

/// One partition of the plane
#[derive(Debug, Clone, PartialEq)]
pub struct QuadTreeNode {
    pub bounds: BoundingBox,
    pub depth: u32,
    pub children: Option<[NodeId; 4]>,
    pub entries: Vec<IndexEntry>,
}

impl QuadTreeNode {
    pub fn leaf(bounds: BoundingBox, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            children: None,
            entries: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Owner of every node of one tree. The root is `NodeId::ROOT`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeArena {
    nodes: Vec<QuadTreeNode>,
    node_limit: usize,
}

impl NodeArena {
    /// Creates a tree consisting of a single empty root leaf.
    pub fn new(root_bounds: BoundingBox) -> Self {
        Self {
            nodes: vec![QuadTreeNode::leaf(root_bounds, 0)],
            node_limit: MAX_NODES,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_node_limit(mut self, node_limit: usize) -> Self {
        self.node_limit = node_limit;
        self
    }

    /// Wraps nodes that were decoded from disk. The caller guarantees the
    /// first node is the root and child ids are in range.
    pub(crate) fn from_nodes(nodes: Vec<QuadTreeNode>) -> Self {
        Self {
            nodes,
            node_limit: MAX_NODES,
        }
    }

    pub fn root(&self) -> &QuadTreeNode {
        &self.nodes[NodeId::ROOT.index()]
    }

    pub fn node(&self, id: NodeId) -> &QuadTreeNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Total number of entries across all nodes.
    pub fn entry_count(&self) -> u64 {
        self.nodes.iter().map(|n| n.entries.len() as u64).sum()
    }

    /// Checks that an entry with `bbox` can be inserted without failing.
    ///
    /// One insert splits at most once per level, so the tree must have room
    /// for four new nodes per level below the root.
    pub fn check_insert(&self, bbox: &BoundingBox, policy: &SplitPolicy) -> SpatialResult<()> {
        if !bbox.is_valid() {
            return Err(SpatialError::InvalidArgument(format!(
                "cannot index invalid bounding box {}",
                bbox
            )));
        }
        if !self.root().bounds.overlaps(bbox) {
            return Err(SpatialError::InvalidArgument(format!(
                "{} lies outside the index bounds {}",
                bbox,
                self.root().bounds
            )));
        }
        let headroom = 4 * policy.max_depth as usize;
        if self.nodes.len() + headroom > self.node_limit {
            return Err(SpatialError::InvalidState(format!(
                "index would exceed {} nodes",
                self.node_limit
            )));
        }
        Ok(())
    }

    /// Inserts an entry and returns the id of the node that now holds it.
    pub fn insert(&mut self, entry: IndexEntry, policy: &SplitPolicy) -> SpatialResult<NodeId> {
        self.check_insert(&entry.bbox, policy)?;

        let mut id = NodeId::ROOT;
        loop {
            let node = &self.nodes[id.index()];
            match node.children {
                None => {
                    if node.entries.len() < policy.split_threshold as usize
                        || node.depth >= policy.max_depth
                    {
                        self.nodes[id.index()].entries.push(entry);
                        return Ok(id);
                    }
                    self.split(id)?;
                }
                Some(children) => {
                    let target = children
                        .iter()
                        .copied()
                        .find(|child| self.nodes[child.index()].bounds.contains(&entry.bbox));
                    match target {
                        Some(child) => id = child,
                        None => {
                            self.nodes[id.index()].entries.push(entry);
                            return Ok(id);
                        }
                    }
                }
            }
        }
    }

    /// Materializes the four children of a leaf and pushes down every entry
    /// that one child fully contains. The others stay, in their original order.
    fn split(&mut self, id: NodeId) -> SpatialResult<()> {
        if self.nodes.len() + 4 > self.node_limit {
            return Err(SpatialError::InvalidState(format!(
                "index would exceed {} nodes",
                self.node_limit
            )));
        }

        let (bounds, depth) = {
            let node = &self.nodes[id.index()];
            (node.bounds, node.depth)
        };

        let first = self.nodes.len() as u32;
        let children = [
            NodeId(first),
            NodeId(first + 1),
            NodeId(first + 2),
            NodeId(first + 3),
        ];
        for quadrant in bounds.quadrants() {
            self.nodes.push(QuadTreeNode::leaf(quadrant, depth + 1));
        }

        let entries = std::mem::take(&mut self.nodes[id.index()].entries);
        let mut kept = Vec::new();
        for entry in entries {
            let target = children
                .iter()
                .copied()
                .find(|child| self.nodes[child.index()].bounds.contains(&entry.bbox));
            match target {
                Some(child) => self.nodes[child.index()].entries.push(entry),
                None => kept.push(entry),
            }
        }

        let node = &mut self.nodes[id.index()];
        node.entries = kept;
        node.children = Some(children);

        log::trace!("Split node {:?} at depth {} ({} entries kept)", id, depth, node.entries.len());
        Ok(())
    }

    /// Node ids in pre-order (parent first, children in canonical order).
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(children) = self.nodes[id.index()].children {
                stack.extend(children.iter().rev());
            }
        }
        order
    }

    /// Pre-order walk yielding each node id with its quadrant path, e.g. `root/NE/SW`.
    pub fn preorder_with_paths(&self) -> Vec<(NodeId, String)> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(NodeId::ROOT, "root".to_string())];
        while let Some((id, path)) = stack.pop() {
            if let Some(children) = self.nodes[id.index()].children {
                for (child, quadrant) in children.iter().zip(Quadrant::ALL).rev() {
                    stack.push((*child, format!("{}/{}", path, quadrant.label())));
                }
            }
            order.push((id, path));
        }
        order
    }

    /// Node count, leaf count, deepest depth and entries per depth.
    pub fn shape(&self) -> TreeShape {
        let mut shape = TreeShape::default();
        for node in &self.nodes {
            shape.node_count += 1;
            if node.is_leaf() {
                shape.leaf_count += 1;
            }
            shape.tree_depth = shape.tree_depth.max(node.depth);
            let depth = node.depth as usize;
            if shape.entries_per_depth.len() <= depth {
                shape.entries_per_depth.resize(depth + 1, 0);
            }
            shape.entries_per_depth[depth] += node.entries.len() as u64;
        }
        shape
    }
}

/// Structural summary of a tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeShape {
    pub node_count: u64,
    pub leaf_count: u64,
    pub tree_depth: u32,
    pub entries_per_depth: Vec<u64>,
}
