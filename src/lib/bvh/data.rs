use super::{left, right, Aabb, Bvh, NodeState};

// The tree gets rendered down into an array of AabbUniform structs.
// Slot `i` here is node `i` of the tree, so the implicit child
// arithmetic still holds on the flattened data
#[repr(C)]
#[derive(Clone, Copy)]
#[derive(Debug)]
#[derive(serde::Deserialize, serde::Serialize)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
pub struct AabbUniform {
    pub bounds: Aabb,
    pub item_idx: u32,
    pub item_count: u32,
    // 0 for vacant slots, 1 for leaves, 2 for internal nodes
    pub kind: u32,
    // Which children are present: bit 0 is left, bit 1 is right
    pub children: u32,
}

impl AabbUniform {
    pub const VACANT: u32 = 0;
    pub const LEAF: u32 = 1;
    pub const INTERNAL: u32 = 2;
}

// Flattened copy of the tree, ready to be cast to bytes or serialized
#[derive(Clone)]
#[derive(serde::Deserialize, serde::Serialize)]
#[derive(Default)]
pub struct BvhData {
    pub uniforms: Vec<AabbUniform>,
    pub indices: Vec<u32>,
}

impl BvhData {
    pub fn new<T>(bvh: &Bvh<T>) -> Self {
        let mut data = Self::default();

        let occupied = |idx: usize| {
            bvh.nodes.get(idx).is_some_and(|node| node.state != NodeState::Vacant)
        };

        for (idx, node) in bvh.nodes.iter().enumerate() {
            let kind = match node.state {
                NodeState::Vacant => AabbUniform::VACANT,
                NodeState::Leaf(_) => AabbUniform::LEAF,
                NodeState::Internal => AabbUniform::INTERNAL,
            };

            let children = u32::from(occupied(left(idx)))
                | u32::from(occupied(right(idx))) << 1;

            // Infinite corners don't survive JSON, and nothing reads
            // the bounds of an empty node anyway
            let bounds = if node.bounds.is_valid() {
                node.bounds
            } else {
                bytemuck::Zeroable::zeroed()
            };

            data.uniforms.push(AabbUniform {
                bounds,
                item_idx: data.indices.len() as u32,
                item_count: node.items().len() as u32,
                kind,
                children,
            });

            data.indices.extend(node.items().iter().map(|&i| i as u32));
        }

        data
    }

    pub fn as_bytes(&self) -> (&[u8], &[u8]) {
        (
            bytemuck::cast_slice(&self.uniforms),
            bytemuck::cast_slice(&self.indices),
        )
    }
}
