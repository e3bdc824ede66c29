//! Separable Gaussian smoothing.

use crate::volume::Volume;
use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Shape, Tensor};

/// Gaussian smoothing filter.
///
/// Separable 1-D convolutions along each tensor axis. Sigmas are given in
/// physical units per `(x, y, z)` coordinate and divided by spacing to obtain
/// kernel widths in voxels.
pub struct GaussianFilter<B: Backend> {
    /// Standard deviations in physical units, `(x, y, z)`.
    sigmas: [f64; 3],
    max_kernel_width: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    /// Create a filter with per-coordinate sigmas in physical units.
    pub fn new(sigmas: [f64; 3]) -> Self {
        Self {
            sigmas,
            max_kernel_width: 32,
            _b: std::marker::PhantomData,
        }
    }

    /// Isotropic smoothing with a single sigma.
    pub fn isotropic(sigma: f64) -> Self {
        Self::new([sigma; 3])
    }

    /// Set the maximum kernel width.
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width;
        self
    }

    /// Smooth a volume, keeping its geometry.
    pub fn apply(&self, volume: &Volume<B>) -> Volume<B> {
        let mut data = volume.data().clone();
        let device = data.device();

        // Tensor dim d holds coordinate axis 2 - d ([Z, Y, X] vs (x, y, z)).
        for dim in 0..3 {
            let axis = 2 - dim;
            let sigma = self.sigmas[axis];
            if sigma <= 1e-6 {
                continue;
            }

            let voxel_sigma = sigma / volume.spacing()[axis];
            let radius = (3.0 * voxel_sigma).ceil() as usize;
            let width = (2 * radius + 1).min(self.max_kernel_width);
            let actual_radius = (width - 1) / 2;

            let kernel = generate_kernel(voxel_sigma, actual_radius);
            let kernel_tensor = Tensor::<B, 1>::from_floats(kernel.as_slice(), &device);
            data = convolve_1d::<B>(data, kernel_tensor, dim);
        }

        Volume::from_parts(data, *volume.origin(), *volume.spacing(), *volume.direction())
    }
}

fn generate_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    let mut sum = 0.0;
    let two_sigma2 = 2.0 * sigma * sigma;

    for i in 0..=(2 * radius) {
        let x = (i as f64) - (radius as f64);
        let val = (-x * x / two_sigma2).exp();
        kernel.push(val as f32);
        sum += val;
    }
    for val in &mut kernel {
        *val /= sum as f32;
    }
    kernel
}

fn convolve_1d<B: Backend>(input: Tensor<B, 3>, kernel: Tensor<B, 1>, dim: usize) -> Tensor<B, 3> {
    let dims: [usize; 3] = input.shape().dims();

    // Permute the target dimension to the last position.
    let mut permute_indices = [0isize; 3];
    let mut idx = 0;
    for i in 0..3 {
        if i != dim {
            permute_indices[idx] = i as isize;
            idx += 1;
        }
    }
    permute_indices[2] = dim as isize;
    let input_permuted = input.permute(permute_indices);

    // Flatten the other dimensions into batch: [Batch, 1, Length].
    let length = dims[dim];
    let batch_size: usize = (0..3).filter(|&i| i != dim).map(|i| dims[i]).product();
    let input_reshaped = input_permuted.reshape([batch_size, 1, length]);

    let kernel_size = kernel.dims()[0];
    let kernel_reshaped = kernel.reshape([1, 1, kernel_size]);
    let padding = kernel_size / 2;

    let options = ConvOptions::new([1], [padding], [1], 1);
    let output = burn::tensor::module::conv1d(input_reshaped, kernel_reshaped, None, options);

    // Restore the permuted shape, then invert the permutation.
    let mut permuted_shape = [0usize; 3];
    let mut p_idx = 0;
    for i in 0..3 {
        if i != dim {
            permuted_shape[p_idx] = dims[i];
            p_idx += 1;
        }
    }
    permuted_shape[2] = length;
    let output_permuted = output.reshape(Shape::new(permuted_shape));

    let mut inv_permute = [0isize; 3];
    for (new_pos, &old_pos) in permute_indices.iter().enumerate() {
        inv_permute[old_pos as usize] = new_pos as isize;
    }
    output_permuted.permute(inv_permute)
}
