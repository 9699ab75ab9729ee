use std::fmt;

use crate::geom::{self, v3::{self, V3, V3Ops as _}};

// Anything an Aabb can be grown by, shrunk by, or tested against
#[derive(Clone, Copy)]
#[derive(Debug)]
pub enum Volume {
    Aabb(Aabb),
    Sphere(geom::Sphere),
    Point(V3<f32>),
}

impl From<Aabb> for Volume {
    fn from(aabb: Aabb) -> Self { Self::Aabb(aabb) }
}

impl From<geom::Sphere> for Volume {
    fn from(sphere: geom::Sphere) -> Self { Self::Sphere(sphere) }
}

impl From<V3<f32>> for Volume {
    fn from(point: V3<f32>) -> Self { Self::Point(point) }
}

impl Volume {
    // Every kind collapses to a box before the actual math happens
    fn extent(self) -> Aabb {
        match self {
            Volume::Aabb(aabb) => aabb,
            Volume::Sphere(geom::Sphere { center, radius, .. }) => Aabb::new(
                center.sub([radius; 3]),
                center.add([radius; 3]),
            ),
            Volume::Point(point) => Aabb::new(point, point),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self {
            Volume::Aabb(aabb) => {
                // Only the untouched sentinel counts as empty
                if *aabb == Aabb::EMPTY {
                    return Ok(());
                }

                anyhow::ensure!(
                    aabb.min.is_finite() && aabb.max.is_finite(),
                    "Bounding box {:?} has non-finite corners", aabb
                );

                anyhow::ensure!(
                    (0..3).all(|axis| aabb.min[axis] <= aabb.max[axis]),
                    "Bounding box {:?} is inverted", aabb
                );
            },
            Volume::Sphere(sphere) => {
                anyhow::ensure!(
                    sphere.center.is_finite() && sphere.radius.is_finite(),
                    "Sphere {:?} has non-finite geometry", sphere
                );

                anyhow::ensure!(
                    sphere.radius >= 0.,
                    "Sphere radius {} is negative", sphere.radius
                );
            },
            Volume::Point(point) => {
                anyhow::ensure!(point.is_finite(), "Point {:?} is not finite", point);
            },
        }

        Ok(())
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[derive(serde::Serialize)]
#[derive(PartialEq)]
pub struct Aabb {
    pub min: V3<f32>,
    #[serde(skip)]
    _p0: u32,
    pub max: V3<f32>,
    #[serde(skip)]
    _p1: u32,
}

impl<'de> serde::Deserialize<'de> for Aabb {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: serde::Deserializer<'de> {

        #[derive(serde::Deserialize)]
        struct Intermediate {
            min: Vec<f32>,
            max: Vec<f32>,
        }

        let intermediate = Intermediate::deserialize(deserializer)?;

        Ok(Self::new(
            v3::from_vec(intermediate.min)?,
            v3::from_vec(intermediate.max)?,
        ))
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "Aabb(empty)");
        }

        write!(f, "Aabb({:?} -> {:?})", self.min, self.max)
    }
}

impl Default for Aabb {
    fn default() -> Self { Self::EMPTY }
}

impl Aabb {
    // No Grow call has touched this box yet
    pub const EMPTY: Self = Self {
        min: [f32::INFINITY; 3],
        _p0: 0,
        max: [f32::NEG_INFINITY; 3],
        _p1: 0,
    };

    pub const fn new(min: V3<f32>, max: V3<f32>) -> Self {
        Self { min, _p0: 0, max, _p1: 0 }
    }

    pub fn from_volumes<I, V>(volumes: I) -> Self
        where I: IntoIterator<Item = V>, V: Into<Volume> {

        let mut aabb = Self::EMPTY;
            aabb.grow_from(volumes, |v| v);
        aabb
    }

    pub fn is_valid(&self) -> bool {
        self.min != [f32::INFINITY; 3]
    }

    // Growing by an empty box leaves the receiver as it is
    pub fn grow<V: Into<Volume>>(&mut self, volume: V) {
        let extent = volume.into().extent();
        if !extent.is_valid() {
            return;
        }

        let Aabb { min, max, .. } = extent;

        self.min = self.min.min(min);
        self.max = self.max.max(max);
    }

    // Checked variant for caller-supplied geometry.
    // Nothing is written unless the volume is well-formed
    pub fn try_grow<V: Into<Volume>>(&mut self, volume: V) -> anyhow::Result<()> {
        let volume = volume.into();
            volume.validate()?;

        self.grow(volume);

        Ok(())
    }

    pub fn shrink<V: Into<Volume>>(&mut self, volume: V) {
        let Aabb { min, max, .. } = volume.into().extent();

        self.min = self.min.max(min);
        self.max = self.max.min(max);
    }

    pub fn grow_from<I, F, V>(&mut self, items: I, key: F)
        where I: IntoIterator, F: Fn(I::Item) -> V, V: Into<Volume> {

        for item in items {
            self.grow(key(item));
        }
    }

    pub fn shrink_from<I, F, V>(&mut self, items: I, key: F)
        where I: IntoIterator, F: Fn(I::Item) -> V, V: Into<Volume> {

        for item in items {
            self.shrink(key(item));
        }
    }

    pub fn union(mut self, other: Self) -> Self {
        self.grow(other);
        self
    }

    // Splits large inputs into one chunk per worker, unions each chunk,
    // then folds the partial boxes together.
    // Union is associative and commutative, so chunk order doesn't matter
    pub fn par_union(boxes: &[Aabb], parallel_threshold: usize) -> Self {
        use rayon::prelude::*;

        if boxes.len() < parallel_threshold.max(1) {
            return Self::from_volumes(boxes.iter().copied());
        }

        let chunk = boxes.len().div_ceil(rayon::current_num_threads().max(1));

        boxes
            .par_chunks(chunk.max(1))
            .map(|chunk| Self::from_volumes(chunk.iter().copied()))
            .reduce(|| Self::EMPTY, Self::union)
    }

    // Boundary-inclusive; a box counts as contained if it overlaps at all
    pub fn contains<V: Into<Volume>>(&self, volume: V) -> bool {
        let other = volume.into().extent();

        !(other.min[0] > self.max[0] ||
          other.min[1] > self.max[1] ||
          other.min[2] > self.max[2] ||
          other.max[0] < self.min[0] ||
          other.max[1] < self.min[1] ||
          other.max[2] < self.min[2])
    }

    // Full containment, unlike `contains`. An empty box fits anywhere
    pub fn encloses(&self, other: &Aabb) -> bool {
        if !other.is_valid() {
            return true;
        }

        (0..3).all(|axis| {
            self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis]
        })
    }

    // Ties favour x, then y
    pub fn max_dimension(&self) -> usize {
        let d = self.diagonal();

        if d[0] >= d[1] && d[0] >= d[2] {
            0
        } else if d[1] >= d[2] {
            1
        } else {
            2
        }
    }

    pub fn diagonal(&self) -> V3<f32> {
        self.max.sub(self.min)
    }

    pub fn surface_area(&self) -> f32 {
        if !self.is_valid() {
            return 0.;
        }

        let d = self.diagonal();

        2. * (d[0] * d[1] + d[0] * d[2] + d[1] * d[2])
    }

    pub fn volume(&self) -> f32 {
        if !self.is_valid() {
            return 0.;
        }

        let d = self.diagonal();

        d[0] * d[1] * d[2]
    }

    pub fn centroid(&self) -> V3<f32> {
        self.min.add(self.max).scale(0.5)
    }

    // Slab test against the ray.
    // Returns the entry distance (0 when the origin is inside),
    // or -1 when the ray misses or the box is entirely behind it
    pub fn intersect(&self, ray: &geom::Ray) -> f32 {
        if !self.is_valid() {
            return -1.;
        }

        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let mut t0 = (self.min[axis] - ray.origin[axis]) * ray.inv_dir[axis];
            let mut t1 = (self.max[axis] - ray.origin[axis]) * ray.inv_dir[axis];

            if ray.inv_dir[axis] < 0. {
                std::mem::swap(&mut t0, &mut t1);
            }

            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
        }

        if t_min > t_max || t_max < 0. {
            return -1.;
        }

        t_min.max(0.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(lo: f32, hi: f32) -> Aabb {
        Aabb::new([lo; 3], [hi; 3])
    }

    #[test]
    fn empty_box_is_invalid() {
        let aabb = Aabb::default();

        assert!(!aabb.is_valid());
        assert_eq!(aabb.surface_area(), 0.);
        assert_eq!(aabb.volume(), 0.);
    }

    #[test]
    fn grow_unions_every_volume_kind() {
        let mut aabb = Aabb::EMPTY;
            aabb.grow([1., 2., 3.]);

        assert!(aabb.is_valid());
        assert_eq!(aabb, Aabb::new([1., 2., 3.], [1., 2., 3.]));

        aabb.grow(geom::Sphere::new([0.; 3], 1.));
        assert_eq!(aabb, Aabb::new([-1.; 3], [1., 2., 3.]));

        aabb.grow(cube(-4., 0.));
        assert_eq!(aabb, Aabb::new([-4.; 3], [1., 2., 3.]));

        // Growing by an empty box changes nothing
        aabb.grow(Aabb::EMPTY);
        assert_eq!(aabb, Aabb::new([-4.; 3], [1., 2., 3.]));
    }

    #[test]
    fn try_grow_leaves_receiver_untouched_on_error() {
        let mut aabb = cube(0., 1.);

        assert!(aabb.try_grow([f32::NAN, 0., 0.]).is_err());
        assert!(aabb.try_grow(geom::Sphere::new([0.; 3], -1.)).is_err());
        assert!(aabb.try_grow(Aabb::new([1.; 3], [0.; 3])).is_err());
        assert_eq!(aabb, cube(0., 1.));

        assert!(aabb.try_grow([2., 2., 2.]).is_ok());
        assert_eq!(aabb, cube(0., 2.));

        assert!(aabb.try_grow(Aabb::EMPTY).is_ok());
        assert_eq!(aabb, cube(0., 2.));
    }

    #[test]
    fn half_empty_boxes_are_rejected() {
        let mut aabb = cube(0., 1.);

        let lopsided = Aabb::new([f32::INFINITY; 3], [10.; 3]);

        assert!(aabb.try_grow(lopsided).is_err());
        assert_eq!(aabb, cube(0., 1.));

        aabb.grow(lopsided);
        assert_eq!(aabb, cube(0., 1.));

        let unbounded = Aabb::new([0.; 3], [f32::INFINITY; 3]);
        assert!(aabb.try_grow(unbounded).is_err());
        assert_eq!(aabb, cube(0., 1.));
    }

    #[test]
    fn shrink_intersects() {
        let mut aabb = cube(0., 10.);
            aabb.shrink(cube(5., 15.));

        assert_eq!(aabb, cube(5., 10.));

        aabb.shrink_from([cube(6., 20.), cube(0., 9.)], |b| b);
        assert_eq!(aabb, cube(6., 9.));
    }

    #[test]
    fn contains_is_boundary_inclusive() {
        let aabb = cube(0., 10.);

        assert!(aabb.contains([10., 10., 10.]));
        assert!(aabb.contains([0., 5., 0.]));
        assert!(!aabb.contains([10.5, 5., 5.]));

        assert!(aabb.contains(cube(10., 12.)));
        assert!(!aabb.contains(cube(11., 12.)));
        assert!(aabb.contains(geom::Sphere::new([11., 5., 5.], 1.)));
    }

    #[test]
    fn encloses_requires_full_containment() {
        let aabb = cube(0., 10.);

        assert!(aabb.encloses(&cube(0., 10.)));
        assert!(aabb.encloses(&cube(2., 3.)));
        assert!(aabb.encloses(&Aabb::EMPTY));
        assert!(!aabb.encloses(&cube(5., 11.)));
        assert!(!Aabb::EMPTY.encloses(&cube(0., 1.)));
    }

    #[test]
    fn max_dimension_prefers_x_then_y() {
        assert_eq!(cube(0., 1.).max_dimension(), 0);
        assert_eq!(Aabb::new([0.; 3], [1., 2., 2.]).max_dimension(), 1);
        assert_eq!(Aabb::new([0.; 3], [1., 1., 2.]).max_dimension(), 2);
        assert_eq!(Aabb::new([0.; 3], [3., 1., 3.]).max_dimension(), 0);
    }

    #[test]
    fn measures() {
        let aabb = Aabb::new([0.; 3], [1., 2., 3.]);

        assert_eq!(aabb.surface_area(), 22.);
        assert_eq!(aabb.volume(), 6.);
        assert_eq!(aabb.centroid(), [0.5, 1., 1.5]);
    }

    #[test]
    fn par_union_matches_sequential_union() {
        let boxes = (0..1000)
            .map(|i| {
                let i = i as f32;

                Aabb::new([i, -i, i * 0.5], [i + 1., -i + 1., i * 0.5 + 1.])
            })
            .collect::<Vec<_>>();

        let sequential = Aabb::from_volumes(boxes.iter().copied());

        assert_eq!(Aabb::par_union(&boxes, 10), sequential);
        assert_eq!(Aabb::par_union(&boxes, usize::MAX), sequential);
        assert_eq!(Aabb::par_union(&[], 0), Aabb::EMPTY);
    }

    #[test]
    fn slab_hit_distance() {
        let aabb = cube(0., 10.);

        let ray = geom::Ray::new([5., 5., -5.], [0., 0., 1.], 1e-7).unwrap();
        assert_eq!(aabb.intersect(&ray), 5.);

        let away = geom::Ray::new([5., 5., -5.], [0., 0., -1.], 1e-7).unwrap();
        assert!(aabb.intersect(&away) < 0.);

        let inside = geom::Ray::new([5.; 3], [1., 1., 0.], 1e-7).unwrap();
        assert_eq!(aabb.intersect(&inside), 0.);

        let beside = geom::Ray::new([20., 5., -5.], [0., 0., 1.], 1e-7).unwrap();
        assert!(aabb.intersect(&beside) < 0.);

        assert!(Aabb::EMPTY.intersect(&ray) < 0.);
    }
}
