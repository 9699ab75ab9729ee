use crate::geom::{self, v3::{V3, V3Ops as _}};

use super::{Aabb, Volume};

// Anything that can live in the tree has to report the box around it
pub trait Bounded {
    fn bounds(&self) -> Aabb;

    // The shape itself, checked before it gets collapsed into a box
    fn volume(&self) -> Volume {
        Volume::Aabb(self.bounds())
    }
}

impl Bounded for geom::Sphere {
    fn bounds(&self) -> Aabb {
        Aabb::from_volumes([*self])
    }

    fn volume(&self) -> Volume { Volume::Sphere(*self) }
}

impl Bounded for Aabb {
    fn bounds(&self) -> Aabb { *self }
}

impl Bounded for V3<f32> {
    fn bounds(&self) -> Aabb {
        Aabb::new(*self, *self)
    }

    fn volume(&self) -> Volume { Volume::Point(*self) }
}

// An object paired with its precomputed bounds and centroid.
// Never modified after construction
#[derive(Clone)]
#[derive(Debug)]
pub struct Primitive<T> {
    pub bounds: Aabb,
    pub centroid: V3<f32>,
    pub object: T,
}

impl<T: Bounded> Primitive<T> {
    pub fn new(object: T) -> Self {
        let bounds = object.bounds();

        Self {
            bounds,
            centroid: bounds.centroid(),
            object,
        }
    }

    // Same as `Primitive::new`, but refuses malformed objects
    pub fn try_new(object: T) -> anyhow::Result<Self> {
        let mut check = Aabb::EMPTY;
            check.try_grow(object.volume())?;

        let prim = Self::new(object);

        anyhow::ensure!(
            prim.bounds.is_valid() && prim.centroid.is_finite(),
            "Object bounds {:?} are empty or not finite", prim.bounds
        );

        Ok(prim)
    }
}
