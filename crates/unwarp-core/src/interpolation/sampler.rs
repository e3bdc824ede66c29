//! Convolution sampling on CPU slices.

/// Out-of-bounds policy for [`GridSampler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boundary {
    /// Treat everything outside the grid as a fixed fill value.
    Constant(f32),
    /// Reflect indices about the grid edges, duplicating the edge sample
    /// (`d c b a | a b c d | d c b a`).
    Reflect,
}

/// Interpolation kernel for [`GridSampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Trilinear, two taps per axis.
    Linear,
    /// Catmull-Rom cubic convolution, four taps per axis.
    Cubic,
}

/// Separable sampler over a `[Z, Y, X]` slice.
///
/// Both kernels are interpolating: sampling at an integer index reproduces
/// the stored value exactly. Runs on plain slices so resampling filters can
/// parallelise over output voxels with rayon.
#[derive(Debug, Clone, Copy)]
pub struct GridSampler<'a> {
    data: &'a [f32],
    /// Grid shape, `[Z, Y, X]`.
    shape: [usize; 3],
    boundary: Boundary,
    interpolation: Interpolation,
}

/// Linear weights for the two taps around a sample with fraction `t`.
#[inline]
fn linear_weights(t: f64) -> [f64; 2] {
    [1.0 - t, t]
}

/// Catmull-Rom weights for the four taps around a sample with fraction `t`.
#[inline]
fn cubic_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        -0.5 * t3 + t2 - 0.5 * t,
        1.5 * t3 - 2.5 * t2 + 1.0,
        -1.5 * t3 + 2.0 * t2 + 0.5 * t,
        0.5 * t3 - 0.5 * t2,
    ]
}

/// Reflect `index` into `0..len`, duplicating the edge sample.
#[inline]
fn reflect_index(index: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * len;
    let mut m = index.rem_euclid(period);
    if m >= len {
        m = period - 1 - m;
    }
    m as usize
}

impl<'a> GridSampler<'a> {
    /// Create a sampler over `data` with the given `[Z, Y, X]` shape.
    ///
    /// # Panics
    /// If `data.len()` does not match the shape.
    pub fn new(
        data: &'a [f32],
        shape: [usize; 3],
        boundary: Boundary,
        interpolation: Interpolation,
    ) -> Self {
        assert_eq!(
            data.len(),
            shape[0] * shape[1] * shape[2],
            "data length does not match shape"
        );
        Self {
            data,
            shape,
            boundary,
            interpolation,
        }
    }

    #[inline]
    fn value_at(&self, ix: i64, iy: i64, iz: i64) -> f64 {
        let [nz, ny, nx] = self.shape;
        match self.boundary {
            Boundary::Constant(fill) => {
                if ix < 0
                    || iy < 0
                    || iz < 0
                    || ix >= nx as i64
                    || iy >= ny as i64
                    || iz >= nz as i64
                {
                    fill as f64
                } else {
                    self.data[(iz as usize * ny + iy as usize) * nx + ix as usize] as f64
                }
            }
            Boundary::Reflect => {
                let x = reflect_index(ix, nx as i64);
                let y = reflect_index(iy, ny as i64);
                let z = reflect_index(iz, nz as i64);
                self.data[(z * ny + y) * nx + x] as f64
            }
        }
    }

    /// Sample the grid at a continuous `(x, y, z)` index.
    pub fn sample(&self, x: f64, y: f64, z: f64) -> f32 {
        match self.interpolation {
            Interpolation::Linear => self.sample_separable::<2>(x, y, z, linear_weights, 0),
            Interpolation::Cubic => self.sample_separable::<4>(x, y, z, cubic_weights, 1),
        }
    }

    fn sample_separable<const K: usize>(
        &self,
        x: f64,
        y: f64,
        z: f64,
        weights: fn(f64) -> [f64; K],
        support: i64,
    ) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let z0 = z.floor();
        let wx = weights(x - x0);
        let wy = weights(y - y0);
        let wz = weights(z - z0);
        let bx = x0 as i64 - support;
        let by = y0 as i64 - support;
        let bz = z0 as i64 - support;

        let mut acc = 0.0;
        for (kz, &wz_k) in wz.iter().enumerate() {
            for (ky, &wy_k) in wy.iter().enumerate() {
                let w_zy = wz_k * wy_k;
                for (kx, &wx_k) in wx.iter().enumerate() {
                    acc += w_zy
                        * wx_k
                        * self.value_at(bx + kx as i64, by + ky as i64, bz + kz as i64);
                }
            }
        }
        acc as f32
    }
}
