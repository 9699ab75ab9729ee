//! A bounding volume hierarchy stored as an implicit binary tree.
//!
//! Node `i` has children `2i + 1` and `2i + 2`, and parent `(i - 1) / 2`.
//! The node array only ever grows; slots between occupied nodes stay
//! [`NodeState::Vacant`]. Primitives live in a single append-only arena and
//! leaves refer to them by index, so an index is a stable identity for the
//! lifetime of the tree.

mod aabb;
mod build;
mod data;
mod insert;
mod prim;
pub mod sah;
mod traverse;

use std::fmt;

pub use aabb::{Aabb, Volume};
pub use data::{AabbUniform, BvhData};
pub use prim::{Bounded, Primitive};

// This stores all configuration options
// for construction of the BVH and its intersection logic
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct BvhConfig {
    // Most primitives a leaf may hold before it has to split
    pub threshold: usize,
    pub traversal_cost: f32,
    pub intersect_cost: f32,
    // Stand-in for zero ray direction components
    pub eps: f32,
    // Skip nodes that are farther away than the best hit so far
    pub prune: bool,
    // Nodes this deep become leaves no matter how full they are.
    // The node array can reach 2^(max_depth + 1) slots, so this is capped
    // at `BvhConfig::DEPTH_LIMIT` (about 2 GiB of nodes)
    pub max_depth: u32,
    // Inputs at least this large get their bounds reduced in parallel
    pub parallel_threshold: usize,
}

impl BvhConfig {
    pub const DEPTH_LIMIT: u32 = 24;

    pub const fn new() -> Self {
        Self {
            threshold: 20,
            traversal_cost: 1.,
            intersect_cost: 2.,
            eps: 0.0000001,
            prune: false,
            max_depth: 20,
            parallel_threshold: 80_000,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.threshold > 0, "Leaf threshold must be at least 1");

        anyhow::ensure!(
            self.traversal_cost.is_finite() && self.traversal_cost >= 0.,
            "Traversal cost {} must be finite and non-negative", self.traversal_cost
        );

        anyhow::ensure!(
            self.intersect_cost.is_finite() && self.intersect_cost >= 0.,
            "Intersection cost {} must be finite and non-negative", self.intersect_cost
        );

        anyhow::ensure!(
            self.eps.is_finite() && self.eps > 0.,
            "Epsilon {} must be finite and positive", self.eps
        );

        anyhow::ensure!(
            self.max_depth <= Self::DEPTH_LIMIT,
            "Maximum depth {} is too deep (limit {})", self.max_depth, Self::DEPTH_LIMIT
        );

        Ok(())
    }
}

impl Default for BvhConfig {
    fn default() -> Self { Self::new() }
}

#[derive(Clone)]
#[derive(Debug, PartialEq)]
pub enum NodeState {
    // Allocated so a deeper index fits, but not part of the tree
    Vacant,
    Leaf(Vec<usize>),
    Internal,
}

#[derive(Clone)]
#[derive(Debug)]
pub struct Node {
    pub bounds: Aabb,
    pub state: NodeState,
}

impl Node {
    const VACANT: Self = Self {
        bounds: Aabb::EMPTY,
        state: NodeState::Vacant,
    };

    fn leaf() -> Self {
        Self {
            bounds: Aabb::EMPTY,
            state: NodeState::Leaf(Vec::new()),
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.state != NodeState::Vacant
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.state, NodeState::Leaf(_))
    }

    // Primitive indices held directly by this node
    pub fn items(&self) -> &[usize] {
        match &self.state {
            NodeState::Leaf(items) => items,
            _ => &[],
        }
    }
}

pub const fn left(idx: usize) -> usize { 2 * idx + 1 }

pub const fn right(idx: usize) -> usize { 2 * idx + 2 }

pub const fn parent(idx: usize) -> Option<usize> {
    if idx == 0 { None } else { Some((idx - 1) / 2) }
}

pub const fn depth(idx: usize) -> u32 { (idx + 1).ilog2() }

pub struct Bvh<T> {
    config: BvhConfig,
    nodes: Vec<Node>,
    prims: Vec<Primitive<T>>,
}

impl<T: Bounded> Default for Bvh<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Bounded> Bvh<T> {
    pub fn new() -> Self {
        Self {
            config: BvhConfig::new(),
            nodes: vec![Node::leaf()],
            prims: Vec::new(),
        }
    }

    pub fn with_config(config: BvhConfig) -> anyhow::Result<Self> {
        config.validate()?;

        Ok(Self { config, ..Self::new() })
    }

    // Back to a lone, empty root
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::leaf());

        self.prims.clear();
    }

    pub fn config(&self) -> &BvhConfig { &self.config }

    pub fn root(&self) -> &Node { &self.nodes[0] }

    pub fn node(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx).filter(|node| node.is_occupied())
    }

    // Occupied nodes in index order
    pub fn nodes(&self) -> impl Iterator<Item = (usize, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_occupied())
    }

    pub fn slots(&self) -> usize { self.nodes.len() }

    pub fn primitives(&self) -> &[Primitive<T>] { &self.prims }

    pub fn len(&self) -> usize { self.prims.len() }

    pub fn is_empty(&self) -> bool { self.prims.is_empty() }

    pub fn leaf_count(&self) -> usize {
        self.nodes().filter(|(_, node)| node.is_leaf()).count()
    }

    pub fn depth(&self) -> u32 {
        self.nodes().map(|(idx, _)| depth(idx)).max().unwrap_or(0)
    }

    fn has_child(&self, idx: usize) -> bool {
        self.node(idx).is_some()
    }

    fn children(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        [left(idx), right(idx)]
            .into_iter()
            .filter(|&child| self.has_child(child))
    }

    // Indices of every occupied node at or below `idx`
    fn subtree(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let mut stack = vec![idx];

        std::iter::from_fn(move || {
            let idx = stack.pop()?;
                stack.extend(self.children(idx));

            Some(idx)
        })
    }

    fn subtree_items(&self, idx: usize) -> Vec<usize> {
        self.subtree(idx)
            .flat_map(|idx| self.nodes[idx].items().iter().copied())
            .collect()
    }

    fn subtree_len(&self, idx: usize) -> usize {
        self.subtree(idx).map(|idx| self.nodes[idx].items().len()).sum()
    }

    // Frees `idx` and everything under it
    fn vacate(&mut self, idx: usize) {
        let doomed = self.subtree(idx).collect::<Vec<_>>();

        for idx in doomed {
            self.nodes[idx] = Node::VACANT;
        }
    }

    // Drops vacant slots from the end of the array
    fn trim(&mut self) {
        while self.nodes.len() > 1 && self.nodes.last().is_some_and(|node| !node.is_occupied()) {
            self.nodes.pop();
        }
    }

    // Extends the array so that `idx` is addressable
    fn slot(&mut self, idx: usize) -> &mut Node {
        if idx >= self.nodes.len() {
            self.nodes.resize(idx + 1, Node::VACANT);
        }

        &mut self.nodes[idx]
    }

    // Appends to the arena, handing back the new indices
    fn push_prims<I>(&mut self, prims: I) -> Vec<usize>
        where I: IntoIterator<Item = Primitive<T>> {

        let start = self.prims.len();

        self.prims.extend(prims);

        (start..self.prims.len()).collect()
    }

    // Only coincident centroids excuse an overfull leaf
    fn leaf_must_split(&self, idx: usize, items: &[usize]) -> bool {
        if items.len() <= self.config.threshold {
            return false;
        }

        let partition = sah::partition(
            items.to_vec(),
            &self.nodes[idx].bounds,
            self.config.traversal_cost,
            self.config.intersect_cost,
            |&i| (self.prims[i].bounds, self.prims[i].centroid),
        );

        matches!(partition, sah::Partition::Split(_))
    }

    /// Checks the structural invariants: every node encloses whatever sits
    /// beneath it, every primitive is reachable from exactly one leaf, and
    /// no leaf holds more than `threshold` items unless its centroids coincide.
    /// Leaves forced by `max_depth` are reported like any other overfull leaf.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = vec![0usize; self.prims.len()];

        anyhow::ensure!(self.root().is_occupied(), "The root node is vacant");

        for (idx, node) in self.nodes() {
            if let Some(parent) = parent(idx) {
                anyhow::ensure!(
                    self.nodes[parent].state == NodeState::Internal,
                    "Node {} hangs off non-internal node {}", idx, parent
                );

                anyhow::ensure!(
                    self.nodes[parent].bounds.encloses(&node.bounds),
                    "Node {} escapes the bounds of its parent {}", idx, parent
                );
            }

            match &node.state {
                NodeState::Leaf(items) => {
                    for &item in items {
                        let Some(prim) = self.prims.get(item) else {
                            anyhow::bail!("Leaf {} refers to missing primitive {}", idx, item);
                        };

                        anyhow::ensure!(
                            node.bounds.encloses(&prim.bounds),
                            "Leaf {} does not enclose primitive {}", idx, item
                        );

                        seen[item] += 1;
                    }

                    anyhow::ensure!(
                        !self.leaf_must_split(idx, items),
                        "Leaf {} holds {} primitives (threshold {})",
                        idx, items.len(), self.config.threshold
                    );
                },
                NodeState::Internal => {
                    anyhow::ensure!(
                        self.children(idx).next().is_some(),
                        "Internal node {} has no children", idx
                    );
                },
                NodeState::Vacant => unreachable!(),
            }
        }

        if let Some(item) = seen.iter().position(|&count| count != 1) {
            anyhow::bail!(
                "Primitive {} is reachable from {} leaves", item, seen[item]
            );
        }

        Ok(())
    }
}

impl<T> fmt::Debug for Bvh<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Tree<'a> {
            nodes: &'a [Node],
            idx: usize,
        }

        impl fmt::Debug for Tree<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let node = &self.nodes[self.idx];

                if let NodeState::Leaf(items) = &node.state {
                    return write!(f, "{:?}", items);
                }

                let mut out = f.debug_list();

                for child in [left(self.idx), right(self.idx)] {
                    if self.nodes.get(child).is_some_and(Node::is_occupied) {
                        out.entry(&Tree { nodes: self.nodes, idx: child });
                    }
                }

                out.finish()
            }
        }

        fmt::Debug::fmt(&Tree { nodes: &self.nodes, idx: 0 }, f)
    }
}
