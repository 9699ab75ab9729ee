use std::collections::VecDeque;

use super::{depth, left, parent, right, sah};
use super::{Aabb, Bounded, Bvh, NodeState, Primitive};

// A subtree is rebuilt once one child holds more than this share of it
const BALANCE: f32 = 0.6;

impl<T: Bounded> Bvh<T> {
    /// Adds a single object to the existing tree, returning its arena index.
    ///
    /// Only the receiving leaf and its ancestors are touched, unless the leaf
    /// overflows and has to be split. A split that reaches too deep for the
    /// tree's size rebuilds the most lopsided subtree above it.
    pub fn insert(&mut self, object: T) -> usize {
        self.insert_prim(Primitive::new(object))
    }

    /// Like [`Bvh::insert`], but malformed objects are refused
    /// before anything is written.
    pub fn try_insert(&mut self, object: T) -> anyhow::Result<usize> {
        let prim = Primitive::try_new(object)?;

        Ok(self.insert_prim(prim))
    }

    fn insert_prim(&mut self, prim: Primitive<T>) -> usize {
        let bounds = prim.bounds;

        // The root bounds everything, including whatever comes next
        self.nodes[0].bounds.grow(bounds);

        let target = self.cheapest_leaf(&bounds);

        let item = self.prims.len();
            self.prims.push(prim);

        let overflow = {
            let node = &mut self.nodes[target];
                node.bounds.grow(bounds);

            match &mut node.state {
                NodeState::Leaf(items) => {
                    items.push(item);
                    items.len() > self.config.threshold
                },
                state => {
                    *state = NodeState::Leaf(vec![item]);
                    false
                },
            }
        };

        let mut idx = target;
        while let Some(up) = parent(idx) {
            self.nodes[up].bounds.grow(bounds);

            idx = up;
        }

        if overflow && self.split(target) > self.balanced_depth() {
            self.rebalance(target);
        }

        log::trace!("Inserted primitive {} under node {}", item, target);

        item
    }

    // Branch-and-bound search over the tree, breadth first.
    // Internal nodes whose estimate already exceeds the best leaf are not expanded
    fn cheapest_leaf(&self, bounds: &Aabb) -> usize {
        let prim_area = bounds.surface_area();

        let mut queue = VecDeque::from([(0, 0.)]);

        let mut best_cost = f32::INFINITY;
        let mut best = None;

        while let Some((idx, inherited)) = queue.pop_front() {
            let node = &self.nodes[idx];

            let cost = sah::lower_bound(
                inherited,
                prim_area,
                node.bounds.surface_area(),
                node.items().len(),
            );

            if cost > best_cost {
                continue;
            }

            if node.is_leaf() {
                if best.is_none() || cost < best_cost {
                    best_cost = cost;
                    best = Some(idx);
                }
            } else {
                queue.extend(self.children(idx).map(|child| (child, cost)));
            }
        }

        best.unwrap_or(0)
    }

    // Redistributes an overflowing leaf between two fresh children,
    // recursing into any child that still overflows.
    // Returns the depth of the deepest leaf it leaves behind
    fn split(&mut self, idx: usize) -> u32 {
        if depth(idx) >= self.config.max_depth {
            log::trace!("Leaf {} is at the depth limit and stays full", idx);

            return depth(idx);
        }

        let items = match std::mem::replace(&mut self.nodes[idx].state, NodeState::Internal) {
            NodeState::Leaf(items) => items,
            state => {
                self.nodes[idx].state = state;

                return depth(idx);
            },
        };

        let partition = {
            let prims = &self.prims;

            sah::partition(
                items,
                &self.nodes[idx].bounds,
                self.config.traversal_cost,
                self.config.intersect_cost,
                |&i| (prims[i].bounds, prims[i].centroid),
            )
        };

        let split = match partition {
            sah::Partition::Split(split) => split,
            sah::Partition::Degenerate(items) => {
                log::trace!("Leaf {} cannot be separated, keeping {} items", idx, items.len());

                self.nodes[idx].state = NodeState::Leaf(items);

                return depth(idx);
            },
        };

        log::debug!(
            "Split leaf {} into {} | {} items on axis {}",
            idx, split.left.len(), split.right.len(), split.axis
        );

        let children = [
            (left(idx), split.left, split.left_bounds),
            (right(idx), split.right, split.right_bounds),
        ];

        let mut deepest = depth(idx) + 1;

        for (child, items, bounds) in children {
            let overflow = items.len() > self.config.threshold;

            let node = self.slot(child);
                node.bounds.grow(bounds);
                node.state = NodeState::Leaf(items);

            if overflow {
                deepest = deepest.max(self.split(child));
            }
        }

        deepest
    }

    // Deepest leaf a reasonably balanced tree of this size should need.
    // Splits past this (or into the depth limit) trigger a rebuild
    fn balanced_depth(&self) -> u32 {
        let leaves = (self.prims.len() / self.config.threshold + 1) as f32;

        let bound = (leaves.ln() / BALANCE.recip().ln()).ceil() as u32;

        bound.min(self.config.max_depth.saturating_sub(1))
    }

    // Rebuilds the highest ancestor of `idx` whose children are lopsided,
    // reusing the batch builder on the primitives already beneath it
    fn rebalance(&mut self, idx: usize) {
        let mut path = vec![idx];
        while let Some(up) = path.last().copied().and_then(parent) {
            path.push(up);
        }

        let scapegoat = path.into_iter().rev().find(|&node| {
            if self.nodes[node].state != NodeState::Internal {
                return false;
            }

            let sizes = self
                .children(node)
                .map(|child| self.subtree_len(child))
                .collect::<Vec<_>>();

            let total = sizes.iter().sum::<usize>();
            let heaviest = sizes.iter().copied().max().unwrap_or(0);

            total > 2 * self.config.threshold && heaviest as f32 > BALANCE * total as f32
        });

        let Some(scapegoat) = scapegoat else {
            return;
        };

        let items = self.subtree_items(scapegoat);
        let bounds = self.nodes[scapegoat].bounds;

        log::debug!("Rebuilding {} primitives beneath node {}", items.len(), scapegoat);

        self.vacate(scapegoat);
        self.build_sah(scapegoat, items, bounds);
        self.trim();
    }
}
