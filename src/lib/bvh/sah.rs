//! Surface area heuristic: scoring candidate splits, and the binned plane
//! search that the batch builder and the incremental inserter share.

use crate::geom::v3::V3;

use super::Aabb;

/// Number of candidate planes tried along the split axis,
/// at tenths 1 through 8 of the centroid extent.
pub const PLANES: usize = 8;

// A zero-area parent only happens for flat or collinear input,
// where every candidate is equally good
fn area_ratio(inner: &Aabb, outer: &Aabb) -> f32 {
    let outer = outer.surface_area();

    if outer > 0. { inner.surface_area() / outer } else { 0. }
}

/// Expected cost of testing a ray against a node split into `a` and `b`.
/// Lower is better.
pub fn evaluate_split(
    a: &Aabb,
    b: &Aabb,
    parent: &Aabb,
    traversal_cost: f32,
    intersect_cost: f32,
    count_a: usize,
    count_b: usize,
) -> f32 {
    let cost_a = intersect_cost * count_a as f32 * area_ratio(a, parent);
    let cost_b = intersect_cost * count_b as f32 * area_ratio(b, parent);

    traversal_cost + cost_a + cost_b
}

/// Greedy estimate used to rank nodes while searching for an insertion
/// point. It is not a strict lower bound on the true cost.
pub fn lower_bound(
    inherited: f32,
    prim_area: f32,
    node_area: f32,
    leaf_count: usize,
) -> f32 {
    let ratio = if prim_area == 0. {
        0.
    } else if node_area == 0. {
        f32::INFINITY
    } else {
        prim_area / node_area
    };

    inherited + ratio * (leaf_count + 1) as f32
}

#[derive(Debug)]
pub struct Split<I> {
    pub axis: usize,
    pub cost: f32,
    pub left: Vec<I>,
    pub left_bounds: Aabb,
    pub right: Vec<I>,
    pub right_bounds: Aabb,
}

#[derive(Debug)]
pub enum Partition<I> {
    Split(Split<I>),
    // Nothing separates these items; the caller has to keep them together
    Degenerate(Vec<I>),
}

/// Picks the cheapest of the candidate planes along the widest centroid axis
/// and divides `items` by it. `key` yields an item's bounds and centroid.
///
/// Items whose centroid lies exactly on the plane go right. On equal cost the
/// lower plane wins.
pub fn partition<I, F>(
    items: Vec<I>,
    parent: &Aabb,
    traversal_cost: f32,
    intersect_cost: f32,
    key: F,
) -> Partition<I>
    where F: Fn(&I) -> (Aabb, V3<f32>) {

    if items.is_empty() {
        return Partition::Degenerate(items);
    }

    let centroids = Aabb::from_volumes(items.iter().map(|item| key(item).1));

    let axis = centroids.max_dimension();

    let lo = centroids.min[axis];
    let hi = centroids.max[axis];

    if lo == hi {
        return Partition::Degenerate(items);
    }

    let mut best: Option<(f32, f32)> = None;

    for k in 1..=PLANES {
        let plane = lo + (hi - lo) * (k as f32 / 10.);

        let mut left_bounds = Aabb::EMPTY;
        let mut right_bounds = Aabb::EMPTY;

        let mut left_count = 0;
        let mut right_count = 0;

        for item in items.iter() {
            let (bounds, centroid) = key(item);

            if centroid[axis] < plane {
                left_bounds.grow(bounds);
                left_count += 1;
            } else {
                right_bounds.grow(bounds);
                right_count += 1;
            }
        }

        let cost = evaluate_split(
            &left_bounds,
            &right_bounds,
            parent,
            traversal_cost,
            intersect_cost,
            left_count,
            right_count,
        );

        if best.map_or(true, |(best_cost, _)| cost < best_cost) {
            best = Some((cost, plane));
        }
    }

    let Some((cost, plane)) = best else {
        return Partition::Degenerate(items);
    };

    let (mut left, right): (Vec<I>, Vec<I>) = items
        .into_iter()
        .partition(|item| key(item).1[axis] < plane);

    // Rounding can park the plane on an extreme centroid
    if left.is_empty() || right.is_empty() {
        left.extend(right);

        return Partition::Degenerate(left);
    }

    let left_bounds = Aabb::from_volumes(left.iter().map(|item| key(item).0));
    let right_bounds = Aabb::from_volumes(right.iter().map(|item| key(item).0));

    log::trace!(
        "Split {} | {} items on axis {} at {} (cost {})",
        left.len(), right.len(), axis, plane, cost
    );

    Partition::Split(Split {
        axis,
        cost,
        left,
        left_bounds,
        right,
        right_bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(lo: f32, hi: f32) -> Aabb {
        Aabb::new([lo; 3], [hi; 3])
    }

    fn keyed(aabb: &Aabb) -> (Aabb, V3<f32>) {
        (*aabb, aabb.centroid())
    }

    #[test]
    fn empty_split_costs_only_traversal() {
        let parent = cube(0., 4.);

        assert_eq!(evaluate_split(&Aabb::EMPTY, &Aabb::EMPTY, &parent, 1., 2., 0, 0), 1.);
        assert_eq!(evaluate_split(&cube(0., 1.), &cube(1., 2.), &parent, 1.5, 2., 0, 0), 1.5);
    }

    #[test]
    fn split_cost_grows_with_counts() {
        let parent = cube(0., 4.);
        let a = cube(0., 2.);
        let b = cube(2., 4.);

        let mut previous = evaluate_split(&a, &b, &parent, 1., 2., 0, 0);

        for count_a in 0..5 {
            for count_b in 0..5 {
                let cost = evaluate_split(&a, &b, &parent, 1., 2., count_a, count_b);
                let more_a = evaluate_split(&a, &b, &parent, 1., 2., count_a + 1, count_b);
                let more_b = evaluate_split(&a, &b, &parent, 1., 2., count_a, count_b + 1);

                assert!(more_a >= cost, "cost fell when count_a grew past {}", count_a);
                assert!(more_b >= cost, "cost fell when count_b grew past {}", count_b);
            }
        }

        // a and b each cover a quarter of the parent's area
        previous += 2. * 3. * 0.25 + 2. * 1. * 0.25;
        assert_eq!(evaluate_split(&a, &b, &parent, 1., 2., 3, 1), previous);
    }

    #[test]
    fn lower_bound_scales_with_leaf_count() {
        assert_eq!(lower_bound(0., 1., 4., 0), 0.25);
        assert_eq!(lower_bound(1., 1., 4., 3), 2.);
        assert_eq!(lower_bound(0.5, 0., 0., 10), 0.5);
        assert_eq!(lower_bound(0., 1., 0., 0), f32::INFINITY);
    }

    #[test]
    fn partition_separates_clusters() {
        let items = vec![cube(0., 1.), cube(9., 10.), cube(0.5, 1.5), cube(8., 9.)];
        let parent = Aabb::from_volumes(items.iter().copied());

        let Partition::Split(split) = partition(items, &parent, 1., 2., keyed) else {
            panic!("two clusters should always split");
        };

        assert_eq!(split.axis, 0);
        assert_eq!(split.left, vec![cube(0., 1.), cube(0.5, 1.5)]);
        assert_eq!(split.right, vec![cube(9., 10.), cube(8., 9.)]);
        assert_eq!(split.left_bounds, cube(0., 1.5));
        assert_eq!(split.right_bounds, cube(8., 10.));
    }

    #[test]
    fn coincident_centroids_are_degenerate() {
        let items = vec![cube(0., 2.), cube(0.5, 1.5), cube(0.9, 1.1)];
        let parent = cube(0., 2.);

        match partition(items, &parent, 1., 2., keyed) {
            Partition::Degenerate(items) => assert_eq!(items.len(), 3),
            Partition::Split(_) => panic!("identical centroids cannot be split"),
        }

        let empty: Vec<Aabb> = Vec::new();
        assert!(matches!(
            partition(empty, &parent, 1., 2., keyed),
            Partition::Degenerate(items) if items.is_empty()
        ));
    }
}
