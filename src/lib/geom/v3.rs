// Points, directions and box corners are plain arrays, so they stay `Pod`
// and serialize as JSON lists. Arithmetic comes from the `V3Ops` extension
pub type V3<T> = [T; 3];

pub trait V3Ops {
    type Ty: Default + num_traits::Float;

    fn add(self, b: Self) -> Self;
    fn sub(self, b: Self) -> Self;
    fn dot(self, b: Self) -> Self::Ty;
    fn scale(self, s: Self::Ty) -> Self;
    fn mag(self) -> Self::Ty;
    fn normalize(self) -> Self;
    fn min(self, b: Self) -> Self;
    fn max(self, b: Self) -> Self;
    fn recip_or(self, eps: Self::Ty) -> Self;
    fn is_finite(self) -> bool;
}

fn zip_with<T: Copy>(a: V3<T>, b: V3<T>, f: impl Fn(T, T) -> T) -> V3<T> {
    [f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2])]
}

impl<T: Default + num_traits::Float> V3Ops for V3<T> {
    type Ty = T;

    fn add(self, b: Self) -> Self { zip_with(self, b, |a, b| a + b) }

    fn sub(self, b: Self) -> Self { zip_with(self, b, |a, b| a - b) }

    fn dot(self, b: Self) -> T {
        self[0] * b[0] + self[1] * b[1] + self[2] * b[2]
    }

    fn scale(self, s: T) -> Self { self.map(|c| c * s) }

    fn mag(self) -> T { self.dot(self).sqrt() }

    // Division rather than scaling by the reciprocal keeps axis-aligned
    // directions exact
    fn normalize(self) -> Self {
        let mag = self.mag();

        self.map(|c| c / mag)
    }

    fn min(self, b: Self) -> Self { zip_with(self, b, T::min) }

    fn max(self, b: Self) -> Self { zip_with(self, b, T::max) }

    // Zero components are swapped for `eps` so the slab test never divides by zero
    fn recip_or(mut self, eps: Self::Ty) -> Self {
        for c in self.iter_mut() {
            *c = if c.is_zero() { eps.recip() } else { c.recip() };
        }

        self
    }

    fn is_finite(self) -> bool {
        self.iter().all(|c| c.is_finite())
    }
}

// Every [f32; 3] in a JSON document comes in as a plain array,
// so the length check lives here instead of in each Deserialize impl
pub fn from_vec<E: serde::de::Error>(values: Vec<f32>) -> Result<V3<f32>, E> {
    match values.len() {
        3 => {
            let mut v = [0.; 3];

            v.copy_from_slice(&values);
            Ok(v)
        },
        len => Err(E::invalid_length(len, &"an array of len 3")),
    }
}
