//! Integer-factor downsampling.

use crate::volume::Volume;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Downsample filter.
///
/// Keeps every Nth voxel along each axis and scales spacing to match. The
/// origin is unchanged: the first retained voxel keeps its physical position.
pub struct DownsampleFilter<B: Backend> {
    /// Shrink factors per `(x, y, z)` coordinate, each >= 1.
    factors: [usize; 3],
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> DownsampleFilter<B> {
    /// Create a filter with per-coordinate shrink factors.
    pub fn new(factors: [usize; 3]) -> Self {
        Self {
            factors,
            _b: std::marker::PhantomData,
        }
    }

    /// Uniform shrinking with a single factor.
    pub fn uniform(factor: usize) -> Self {
        Self::new([factor; 3])
    }

    /// Apply the filter to a volume.
    pub fn apply(&self, volume: &Volume<B>) -> Volume<B> {
        let mut data = volume.data().clone();
        let device = data.device();
        let dims = volume.shape();
        let mut new_spacing = *volume.spacing();

        // Tensor dim d holds coordinate axis 2 - d.
        for dim in 0..3 {
            let axis = 2 - dim;
            let factor = self.factors[axis];
            if factor <= 1 {
                continue;
            }

            let size = dims[dim];
            let indices_vec: Vec<i32> = (0..size).step_by(factor).map(|x| x as i32).collect();
            let indices =
                Tensor::<B, 1, burn::tensor::Int>::from_ints(indices_vec.as_slice(), &device);
            data = data.select(dim, indices);

            new_spacing[axis] *= factor as f64;
        }

        Volume::from_parts(data, *volume.origin(), new_spacing, *volume.direction())
    }
}
