use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::geom::{v3::V3, Ray};

use super::{Bounded, Bvh};

impl<T: Bounded> Bvh<T> {
    /// Builds a ray using this tree's epsilon for zero direction components.
    pub fn ray(&self, origin: V3<f32>, dir: V3<f32>) -> anyhow::Result<Ray> {
        Ray::new(origin, dir, self.config.eps)
    }

    /// Finds the nearest object along `ray` and hands its data to `on_hit`,
    /// or calls `on_miss` when nothing is hit.
    ///
    /// `test` is asked about every object stored in a visited leaf and
    /// returns the hit distance along with whatever data the caller needs.
    pub fn traverse<D, R, F, H, M>(
        &self,
        ray: &Ray,
        test: F,
        on_hit: H,
        on_miss: M,
    ) -> R
        where
            F: FnMut(&Ray, &T) -> Option<(f32, D)>,
            H: FnOnce(D) -> R,
            M: FnOnce(&Ray) -> R {

        match self.nearest(ray, test) {
            Some((_, data)) => on_hit(data),
            None => on_miss(ray),
        }
    }

    /// Best-first search for the closest hit, ordered by box entry distance.
    ///
    /// Unless `prune` is set in the config, every node whose box the ray
    /// touches is visited, even once a closer object hit is known.
    pub fn nearest<D, F>(&self, ray: &Ray, mut test: F) -> Option<(f32, D)>
        where F: FnMut(&Ray, &T) -> Option<(f32, D)> {

        let root = self.root().bounds.intersect(ray);
        if root < 0. {
            return None;
        }

        let mut heap = BinaryHeap::from([Reverse((OrderedFloat(root), 0))]);

        let mut best: Option<(f32, D)> = None;

        while let Some(Reverse((OrderedFloat(dist), idx))) = heap.pop() {
            // Everything left in the heap starts at least this far away
            if self.config.prune && best.as_ref().is_some_and(|(t, _)| dist > *t) {
                break;
            }

            for &item in self.nodes[idx].items() {
                let Some((t, data)) = test(ray, &self.prims[item].object) else {
                    continue;
                };

                if t.is_nan() || t < 0. {
                    continue;
                }

                if best.as_ref().map_or(true, |(best_t, _)| t < *best_t) {
                    best = Some((t, data));
                }
            }

            for child in self.children(idx) {
                let t = self.nodes[child].bounds.intersect(ray);

                if t >= 0. {
                    heap.push(Reverse((OrderedFloat(t), child)));
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng as _, SeedableRng as _};

    use crate::bvh::BvhConfig;
    use crate::geom::Sphere;

    use super::*;

    fn hit_sphere(ray: &Ray, sphere: &Sphere) -> Option<(f32, V3<f32>)> {
        sphere.intersect(ray).map(|t| (t, sphere.center))
    }

    fn row() -> [Sphere; 3] {
        [
            Sphere::new([0., 0., 0.], 1.),
            Sphere::new([5., 0., 0.], 1.),
            Sphere::new([10., 0., 0.], 1.),
        ]
    }

    #[test]
    fn nearest_sphere_in_a_row() {
        for threshold in [1, 2, 20] {
            let config = BvhConfig { threshold, ..Default::default() };

            let mut bvh = Bvh::with_config(config).unwrap();
                bvh.build(row());

            let ray = bvh.ray([-5., 0., 0.], [1., 0., 0.]).unwrap();

            let mut missed = false;

            let hit = bvh.traverse(
                &ray,
                hit_sphere,
                Some,
                |_| { missed = true; None },
            );

            assert_eq!(hit, Some([0., 0., 0.]), "threshold {}", threshold);
            assert!(!missed);

            assert_eq!(bvh.nearest(&ray, hit_sphere), Some((4., [0., 0., 0.])));
        }
    }

    #[test]
    fn nearest_from_the_other_side() {
        let config = BvhConfig { threshold: 1, ..Default::default() };

        let mut bvh = Bvh::with_config(config).unwrap();
            bvh.build(row());

        let ray = bvh.ray([20., 0., 0.], [-2., 0., 0.]).unwrap();

        assert_eq!(bvh.nearest(&ray, hit_sphere), Some((9., [10., 0., 0.])));
    }

    #[test]
    fn empty_tree_always_misses() {
        let mut bvh = Bvh::<Sphere>::new();
            bvh.build([]);

        for dir in [[1., 0., 0.], [0., -1., 0.], [1., 1., 1.]] {
            let ray = bvh.ray([0.; 3], dir).unwrap();

            let result = bvh.traverse(&ray, hit_sphere, |_| "hit", |_| "miss");

            assert_eq!(result, "miss");
        }
    }

    #[test]
    fn ray_through_gaps_misses() {
        let mut bvh = Bvh::new();
            bvh.build(row());

        // Inside the root box, but between the spheres
        let ray = bvh.ray([2.5, -5., 0.], [0., 1., 0.]).unwrap();

        assert_eq!(bvh.traverse(&ray, hit_sphere, |_| 1, |_| 0), 0);
        assert!(bvh.nearest(&ray, hit_sphere).is_none());
    }

    #[test]
    fn negative_test_distances_are_ignored() {
        let mut bvh = Bvh::new();
            bvh.build(row());

        let ray = bvh.ray([-5., 0., 0.], [1., 0., 0.]).unwrap();

        let hit = bvh.nearest(&ray, |_, sphere: &Sphere| {
            if sphere.center[0] == 0. { Some((-1., 0)) } else { Some((sphere.center[0], 1)) }
        });

        assert_eq!(hit, Some((5., 1)));
    }

    fn brute_force(objects: &[Sphere], ray: &Ray) -> Option<f32> {
        objects
            .iter()
            .filter_map(|sphere| sphere.intersect(ray))
            .fold(None, |best: Option<f32>, t| Some(best.map_or(t, |b| b.min(t))))
    }

    #[test]
    fn matches_brute_force_with_and_without_pruning() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);

        let objects = (0..300)
            .map(|_| {
                let center = [
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                ];

                Sphere::new(center, rng.gen_range(1.0..8.0))
            })
            .collect::<Vec<_>>();

        for prune in [false, true] {
            let config = BvhConfig { threshold: 4, prune, ..Default::default() };

            let mut built = Bvh::with_config(config).unwrap();
                built.build(objects.iter().copied());

            let mut inserted = Bvh::with_config(config).unwrap();
            for sphere in objects.iter().copied() {
                inserted.insert(sphere);
            }

            for _ in 0..200 {
                let origin = [
                    rng.gen_range(-150.0..150.0),
                    rng.gen_range(-150.0..150.0),
                    rng.gen_range(-150.0..150.0),
                ];

                let dir = [
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                ];

                let Ok(ray) = built.ray(origin, dir) else {
                    continue;
                };

                let expected = brute_force(&objects, &ray);

                let found = built.nearest(&ray, hit_sphere).map(|(t, _)| t);
                assert_eq!(found, expected, "built tree, prune {}", prune);

                let found = inserted.nearest(&ray, hit_sphere).map(|(t, _)| t);
                assert_eq!(found, expected, "inserted tree, prune {}", prune);
            }
        }
    }

    #[test]
    fn pruning_never_tests_more_objects() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(8);

        let objects = (0..200)
            .map(|i| Sphere::new([i as f32 * 3., rng.gen_range(-1.0..1.0), 0.], 1.))
            .collect::<Vec<_>>();

        let count = |prune: bool| {
            let config = BvhConfig { threshold: 2, prune, ..Default::default() };

            let mut bvh = Bvh::with_config(config).unwrap();
                bvh.build(objects.iter().copied());

            let ray = bvh.ray([-10., 0., 0.], [1., 0., 0.]).unwrap();

            let mut tests = 0;
            let hit = bvh.nearest(&ray, |ray, sphere| {
                tests += 1;
                hit_sphere(ray, sphere)
            });

            (hit.map(|(t, _)| t), tests)
        };

        let (unpruned_hit, unpruned_tests) = count(false);
        let (pruned_hit, pruned_tests) = count(true);

        assert_eq!(unpruned_hit, pruned_hit);
        assert!(pruned_tests < unpruned_tests, "{} vs {}", pruned_tests, unpruned_tests);
    }
}
