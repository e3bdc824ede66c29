//! Transform-driven resampling onto a reference grid.

use crate::interpolation::trait_::Interpolator;
use crate::spatial::{Direction3, Point3, Spacing3};
use crate::transform::trait_::Transform;
use crate::volume::Volume;
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use std::marker::PhantomData;

/// Resample filter.
///
/// Evaluates the input volume on an output grid: each output index is mapped
/// to a physical point, pushed through the transform (output space to input
/// space), and interpolated in the input volume. Applying a registration
/// result uses the fixed grid as output and the moving volume as input.
pub struct ResampleFilter<B, T, I>
where
    B: Backend,
    T: Transform<B>,
    I: Interpolator<B>,
{
    /// Output grid shape, `[Z, Y, X]`.
    shape: [usize; 3],
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
    transform: T,
    interpolator: I,
    _phantom: PhantomData<B>,
}

impl<B, T, I> ResampleFilter<B, T, I>
where
    B: Backend,
    T: Transform<B>,
    I: Interpolator<B>,
{
    /// Create a filter targeting an explicit output grid.
    pub fn new(
        shape: [usize; 3],
        origin: Point3,
        spacing: Spacing3,
        direction: Direction3,
        transform: T,
        interpolator: I,
    ) -> Self {
        Self {
            shape,
            origin,
            spacing,
            direction,
            transform,
            interpolator,
            _phantom: PhantomData,
        }
    }

    /// Create a filter whose output grid copies `reference`.
    pub fn from_reference(reference: &Volume<B>, transform: T, interpolator: I) -> Self {
        Self::new(
            reference.shape(),
            *reference.origin(),
            *reference.spacing(),
            *reference.direction(),
            transform,
            interpolator,
        )
    }

    /// Resample `input` onto the output grid.
    pub fn apply(&self, input: &Volume<B>) -> Volume<B> {
        let device = input.device();

        let output_indices = self.generate_grid_indices(&device);
        let output_points = self.indices_to_physical(output_indices, &device);
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input.world_to_index_tensor(input_points);
        let sampled = self.interpolator.interpolate(input.data(), input_indices);

        let data = sampled.reshape(Shape::new(self.shape));
        Volume::from_parts(data, self.origin, self.spacing, self.direction)
    }

    /// All output voxel indices as an `[N, 3]` tensor in `(x, y, z)` order.
    fn generate_grid_indices(&self, device: &B::Device) -> Tensor<B, 2> {
        let [nz, ny, nx] = self.shape;
        let n = nz * ny * nx;

        let z_range = Tensor::<B, 1, burn::tensor::Int>::arange(0..nz as i64, device);
        let y_range = Tensor::<B, 1, burn::tensor::Int>::arange(0..ny as i64, device);
        let x_range = Tensor::<B, 1, burn::tensor::Int>::arange(0..nx as i64, device);

        let z_grid = z_range.reshape([nz, 1, 1]).repeat(&[1, ny, nx]).reshape([n]);
        let y_grid = y_range.reshape([1, ny, 1]).repeat(&[nz, 1, nx]).reshape([n]);
        let x_grid = x_range.reshape([1, 1, nx]).repeat(&[nz, ny, 1]).reshape([n]);

        Tensor::cat(
            vec![
                x_grid.float().unsqueeze_dim(1),
                y_grid.float().unsqueeze_dim(1),
                z_grid.float().unsqueeze_dim(1),
            ],
            1,
        )
    }

    /// Map output indices to physical points on the output grid.
    fn indices_to_physical(&self, indices: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
        // point = origin + Direction * (index * spacing)
        let origin_vec: Vec<f32> = (0..3).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(origin_vec, burn::tensor::Shape::new([3])),
            device,
        )
        .reshape([1, 3]);

        let spacing_vec: Vec<f32> = (0..3).map(|i| self.spacing[i] as f32).collect();
        let spacing_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(spacing_vec, burn::tensor::Shape::new([3])),
            device,
        )
        .reshape([1, 3]);

        let scaled = indices * spacing_tensor;

        // Direction transposed for row-vector matmul.
        let mut dir_data = Vec::with_capacity(9);
        for c in 0..3 {
            for r in 0..3 {
                dir_data.push(self.direction[(r, c)] as f32);
            }
        }
        let dir_t = Tensor::<B, 2>::from_data(
            TensorData::new(dir_data, burn::tensor::Shape::new([3, 3])),
            device,
        );

        origin_tensor + scaled.matmul(dir_t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::LinearInterpolator;
    use crate::transform::RigidTransform;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_identity_resample_preserves_values() {
        let device = Default::default();
        let data_vec: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let data = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(data_vec.clone(), burn::tensor::Shape::new([4, 4, 4])),
            &device,
        );
        let volume = Volume::new(
            data,
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap();

        let transform =
            RigidTransform::identity(Tensor::<TestBackend, 1>::zeros([3], &device), &device);
        let filter =
            ResampleFilter::from_reference(&volume, transform, LinearInterpolator::new());
        let result = filter.apply(&volume);

        let values: Vec<f32> = result.data().clone().into_data().to_vec().unwrap();
        for (a, b) in values.iter().zip(data_vec.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_translation_shifts_content() {
        let device = Default::default();
        // Single bright voxel at (x=4, y=5, z=5) in a 10^3 volume.
        let mut data_vec = vec![0.0f32; 1000];
        data_vec[(5 * 10 + 5) * 10 + 4] = 1.0;
        let data = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(data_vec, burn::tensor::Shape::new([10, 10, 10])),
            &device,
        );
        let volume = Volume::new(
            data,
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap();

        // Transform maps output point to input point x - 2: content appears
        // shifted by +2 along x.
        let transform = RigidTransform::<TestBackend>::from_physical_parameters(
            [0.0, 0.0, 0.0, -2.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            &device,
        );
        let filter =
            ResampleFilter::from_reference(&volume, transform, LinearInterpolator::new());
        let result = filter.apply(&volume);

        let values: Vec<f32> = result.data().clone().into_data().to_vec().unwrap();
        assert!(values[(5 * 10 + 5) * 10 + 6] > 0.9);
        assert!(values[(5 * 10 + 5) * 10 + 4] < 0.1);
    }
}
