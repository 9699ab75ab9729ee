pub mod v3;

use v3::{V3, V3Ops as _};

// Laid out as two vec4s so a list of spheres can be uploaded as-is
#[repr(C)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
#[derive(Clone, Copy)]
#[derive(serde::Serialize)]
#[derive(Debug, PartialEq)]
pub struct Sphere {
    pub center: V3<f32>,
    pub radius: f32,
    pub colour: V3<f32>,
    pub emission: f32,
}

impl Sphere {
    pub const fn new(center: V3<f32>, radius: f32) -> Self {
        Self {
            center,
            radius,
            colour: [0.; 3],
            emission: 0.,
        }
    }

    pub fn volume(&self) -> f32 {
        (4. / 3.) * std::f32::consts::PI * self.radius.powi(3)
    }

    // Nearest non-negative distance along the ray, if any.
    // A ray starting inside the sphere reports the exit point
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let oc = ray.origin.sub(self.center);

        let b = oc.dot(ray.dir);
        let c = oc.dot(oc) - self.radius * self.radius;

        let disc = b * b - c;
        if disc < 0. {
            return None;
        }

        let root = disc.sqrt();

        let near = -b - root;
        if near >= 0. {
            return Some(near);
        }

        let far = -b + root;
        if far >= 0. { Some(far) } else { None }
    }
}

// Uniformly spread spheres inside [0, extent]^3, used by the tools
#[cfg(feature = "cli")]
pub fn scatter<R: rand::Rng>(
    rng: &mut R,
    count: usize,
    extent: f32,
    radius: f32,
) -> Vec<Sphere> {
    (0..count)
        .map(|_| {
            let center = [
                rng.gen_range(0.0..=extent),
                rng.gen_range(0.0..=extent),
                rng.gen_range(0.0..=extent),
            ];

            Sphere::new(center, radius)
        })
        .collect()
}

impl<'de> serde::Deserialize<'de> for Sphere {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: serde::Deserializer<'de> {

        #[derive(serde::Deserialize)]
        struct Intermediate {
            center: Vec<f32>,
            radius: f32,
            #[serde(default)]
            colour: Option<Vec<f32>>,
            #[serde(default)]
            emission: f32,
        }

        let intermediate = Intermediate::deserialize(deserializer)?;

        let colour = match intermediate.colour {
            Some(colour) => v3::from_vec(colour)?,
            None => [0.; 3],
        };

        Ok(Self {
            center: v3::from_vec(intermediate.center)?,
            radius: intermediate.radius,
            colour,
            emission: intermediate.emission,
        })
    }
}

#[derive(Clone, Copy)]
#[derive(Debug)]
pub struct Ray {
    pub origin: V3<f32>,
    pub dir: V3<f32>,
    pub inv_dir: V3<f32>,
}

impl Ray {
    // The direction is normalized here, callers don't have to.
    // `eps` stands in for any zero component when taking reciprocals
    pub fn new(origin: V3<f32>, dir: V3<f32>, eps: f32) -> anyhow::Result<Self> {
        anyhow::ensure!(origin.is_finite(), "Ray origin {:?} is not finite", origin);
        anyhow::ensure!(dir.is_finite(), "Ray direction {:?} is not finite", dir);

        if dir.mag() == 0. {
            anyhow::bail!("Ray direction must have a non-zero length");
        }

        let dir = dir.normalize();

        Ok(Self {
            origin,
            dir,
            inv_dir: dir.recip_or(eps),
        })
    }

    pub fn at(&self, t: f32) -> V3<f32> {
        self.origin.add(self.dir.scale(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_hit_reports_near_surface() {
        let sphere = Sphere::new([0.; 3], 1.);
        let ray = Ray::new([-5., 0., 0.], [1., 0., 0.], 1e-7).unwrap();

        assert_eq!(sphere.intersect(&ray), Some(4.));
    }

    #[test]
    fn sphere_hit_from_inside_reports_exit() {
        let sphere = Sphere::new([0.; 3], 2.);
        let ray = Ray::new([0.; 3], [0., 3., 0.], 1e-7).unwrap();

        assert_eq!(sphere.intersect(&ray), Some(2.));
    }

    #[test]
    fn sphere_behind_ray_misses() {
        let sphere = Sphere::new([0.; 3], 1.);
        let ray = Ray::new([5., 0., 0.], [1., 0., 0.], 1e-7).unwrap();

        assert_eq!(sphere.intersect(&ray), None);
    }

    #[test]
    fn ray_rejects_zero_direction() {
        assert!(Ray::new([0.; 3], [0.; 3], 1e-7).is_err());
        assert!(Ray::new([f32::NAN, 0., 0.], [1., 0., 0.], 1e-7).is_err());
    }

    #[test]
    fn ray_normalizes_direction() {
        let ray = Ray::new([0.; 3], [0., 0., 10.], 1e-7).unwrap();

        assert_eq!(ray.dir, [0., 0., 1.]);
        assert_eq!(ray.at(2.), [0., 0., 2.]);
    }

    #[test]
    fn sphere_deserializes_from_json() {
        let sphere: Sphere = serde_json::from_str(r#"{
            "center": [1, 2, 3],
            "radius": 0.5,
            "colour": [1, 0, 0]
        }"#).unwrap();

        assert_eq!(sphere.center, [1., 2., 3.]);
        assert_eq!(sphere.colour, [1., 0., 0.]);
        assert_eq!(sphere.emission, 0.);

        let bad = serde_json::from_str::<Sphere>(r#"{ "center": [1, 2], "radius": 1 }"#);
        assert!(bad.is_err());
    }
}
