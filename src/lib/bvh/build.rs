use super::{depth, left, right, sah};
use super::{Aabb, Bounded, Bvh, NodeState, Primitive};

impl<T: Bounded> Bvh<T> {
    /// Discards the current tree and builds a new one over `objects`
    /// with a top-down binned SAH split.
    pub fn build<I>(&mut self, objects: I)
        where I: IntoIterator<Item = T> {

        let prims = objects
            .into_iter()
            .map(Primitive::new)
            .collect::<Vec<_>>();

        self.build_prims(prims);
    }

    /// Like [`Bvh::build`], but every object is checked first.
    /// On error the previous tree is left as it was.
    pub fn try_build<I>(&mut self, objects: I) -> anyhow::Result<()>
        where I: IntoIterator<Item = T> {

        let prims = objects
            .into_iter()
            .map(Primitive::try_new)
            .collect::<anyhow::Result<Vec<_>>>()?;

        self.build_prims(prims);

        Ok(())
    }

    fn build_prims(&mut self, prims: Vec<Primitive<T>>) {
        self.clear();

        if prims.is_empty() {
            log::debug!("Built an empty BVH");

            return;
        }

        let items = self.push_prims(prims);

        let bounds = {
            let boxes = self.prims
                .iter()
                .map(|prim| prim.bounds)
                .collect::<Vec<_>>();

            Aabb::par_union(&boxes, self.config.parallel_threshold)
        };

        self.build_sah(0, items, bounds);

        log::debug!(
            "Built BVH over {} primitives: {} leaves, depth {}, {} slots",
            self.prims.len(), self.leaf_count(), self.depth(), self.nodes.len()
        );
    }

    // Lays out the arena entries in `items` beneath node `idx`.
    // Also used to rebuild a lopsided subtree after insertion
    pub(super) fn build_sah(&mut self, idx: usize, items: Vec<usize>, bounds: Aabb) {
        let resident = {
            let node = self.slot(idx);
                node.bounds = bounds;
                node.items().len()
        };

        if items.len() + resident <= self.config.threshold {
            self.settle(idx, items);

            return;
        }

        if depth(idx) >= self.config.max_depth {
            log::trace!("Node {} hit the depth limit with {} primitives", idx, items.len());

            self.settle(idx, items);

            return;
        }

        let partition = sah::partition(
            items,
            &bounds,
            self.config.traversal_cost,
            self.config.intersect_cost,
            |&i| (self.prims[i].bounds, self.prims[i].centroid),
        );

        match partition {
            sah::Partition::Degenerate(items) => {
                log::trace!("Forced {} primitives into leaf {}", items.len(), idx);

                self.settle(idx, items);
            },
            sah::Partition::Split(split) => {
                self.nodes[idx].state = NodeState::Internal;

                self.build_sah(left(idx), split.left, split.left_bounds);
                self.build_sah(right(idx), split.right, split.right_bounds);
            },
        }
    }

    // Hangs arena entries off leaf `idx`
    fn settle(&mut self, idx: usize, items: Vec<usize>) {
        match &mut self.nodes[idx].state {
            NodeState::Leaf(resident) => resident.extend(items),
            state => *state = NodeState::Leaf(items),
        }
    }
}
