//! Warping a volume by a dense displacement field.

use crate::error::GeometryError;
use crate::interpolation::{Boundary, GridSampler, Interpolation};
use crate::volume::{DisplacementField, Volume};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rayon::prelude::*;

/// Warper.
///
/// Pull-style warping: the output value at voxel `v` is the input sampled at
/// `v + d(v)`, with the displacement expressed in voxel units. Fields in
/// millimetres are converted using the field spacing before sampling. The
/// field must live on the same grid as the volume.
pub struct Warper {
    boundary: Boundary,
    interpolation: Interpolation,
}

impl Warper {
    /// Create a cubic warper with the given boundary policy.
    pub fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            interpolation: Interpolation::Cubic,
        }
    }

    /// Select another interpolation kernel.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Warp `volume` by `field`.
    ///
    /// # Errors
    /// [`GeometryError::ShapeMismatch`] if the field grid differs from the
    /// volume grid.
    pub fn warp<B: Backend>(
        &self,
        volume: &Volume<B>,
        field: &DisplacementField<B>,
    ) -> Result<Volume<B>, GeometryError> {
        let shape = volume.shape();
        if field.shape() != shape {
            return Err(GeometryError::ShapeMismatch {
                expected: shape,
                actual: field.shape(),
            });
        }

        let [nz, ny, nx] = shape;
        let device = volume.device();

        let source: Vec<f32> = volume
            .data()
            .clone()
            .into_data()
            .to_vec()
            .expect("volume data is f32");
        let displacements: Vec<f32> = field
            .in_voxel_units()
            .data()
            .clone()
            .into_data()
            .to_vec()
            .expect("field data is f32");

        let sampler = GridSampler::new(&source, shape, self.boundary, self.interpolation);

        let mut out = vec![0.0f32; nz * ny * nx];
        out.par_chunks_mut(ny * nx)
            .enumerate()
            .for_each(|(z, plane)| {
                for y in 0..ny {
                    for x in 0..nx {
                        let base = ((z * ny + y) * nx + x) * 3;
                        let dx = displacements[base] as f64;
                        let dy = displacements[base + 1] as f64;
                        let dz = displacements[base + 2] as f64;
                        plane[y * nx + x] =
                            sampler.sample(x as f64 + dx, y as f64 + dy, z as f64 + dz);
                    }
                }
            });

        let data = Tensor::<B, 3>::from_data(
            TensorData::new(out, burn::tensor::Shape::new([nz, ny, nx])),
            &device,
        );
        volume.with_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction3, Point3, Spacing3};
    use crate::volume::FieldUnit;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn ramp_volume(extent: [usize; 3]) -> Volume<TestBackend> {
        let [nx, ny, nz] = extent;
        let device = Default::default();
        let mut values = Vec::with_capacity(nx * ny * nz);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    values.push((x + 10 * y + 100 * z) as f32);
                }
            }
        }
        let data = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(values, burn::tensor::Shape::new([nz, ny, nx])),
            &device,
        );
        Volume::new(
            data,
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_field_is_identity() {
        let volume = ramp_volume([5, 5, 5]);
        let field = DisplacementField::zeros(&volume, FieldUnit::Voxels);
        let warped = Warper::new(Boundary::Reflect).warp(&volume, &field).unwrap();

        let before: Vec<f32> = volume.data().clone().into_data().to_vec().unwrap();
        let after: Vec<f32> = warped.data().clone().into_data().to_vec().unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_unit_displacement_along_single_axis() {
        let volume = ramp_volume([6, 6, 6]);
        let device = Default::default();
        // +1 voxel along z only
        let ones = Volume::new(
            Tensor::<TestBackend, 3>::ones([6, 6, 6], &device),
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap();
        let field = DisplacementField::from_scalar_axis(&ones, 2, FieldUnit::Voxels).unwrap();

        let warped = Warper::new(Boundary::Constant(0.0))
            .warp(&volume, &field)
            .unwrap();
        let values: Vec<f32> = warped.data().clone().into_data().to_vec().unwrap();

        // Interior: out(x, y, z) = in(x, y, z + 1) = value + 100
        for z in 2..4 {
            for y in 2..4 {
                for x in 2..4 {
                    let i = (z * 6 + y) * 6 + x;
                    let expected = (x + 10 * y + 100 * (z + 1)) as f32;
                    assert!(
                        (values[i] - expected).abs() < 1e-3,
                        "voxel ({x}, {y}, {z}): {} vs {expected}",
                        values[i]
                    );
                }
            }
        }
    }

    #[test]
    fn test_millimetre_field_uses_spacing() {
        let device = Default::default();
        let [nx, ny, nz] = [6usize, 6, 6];
        let mut values = Vec::with_capacity(nx * ny * nz);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    values.push((x + 10 * y + 100 * z) as f32);
                }
            }
        }
        // z spacing of 2 mm: a 2 mm displacement is one voxel.
        let volume = Volume::new(
            Tensor::<TestBackend, 3>::from_data(
                TensorData::new(values, burn::tensor::Shape::new([nz, ny, nx])),
                &device,
            ),
            Point3::origin(),
            Spacing3::new([1.0, 1.0, 2.0]),
            Direction3::identity(),
        )
        .unwrap();
        let twos = volume
            .with_data(Tensor::<TestBackend, 3>::full([6, 6, 6], 2.0, &device))
            .unwrap();
        let field =
            DisplacementField::from_scalar_axis(&twos, 2, FieldUnit::Millimeters).unwrap();

        let warped = Warper::new(Boundary::Constant(0.0))
            .warp(&volume, &field)
            .unwrap();
        let values: Vec<f32> = warped.data().clone().into_data().to_vec().unwrap();
        let i = (2 * 6 + 3) * 6 + 3;
        let expected = (3 + 10 * 3 + 100 * 3) as f32;
        assert!((values[i] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_linear_kernel_selectable() {
        // Half-voxel shift over an impulse: linear averages, cubic overshoots.
        let device = Default::default();
        let mut values = vec![0.0f32; 5 * 5 * 5];
        values[(2 * 5 + 2) * 5 + 2] = 1.0;
        let volume = Volume::<TestBackend>::new(
            Tensor::from_data(
                TensorData::new(values, burn::tensor::Shape::new([5, 5, 5])),
                &device,
            ),
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap();
        let halves = volume
            .with_data(Tensor::<TestBackend, 3>::full([5, 5, 5], 0.5, &device))
            .unwrap();
        let field = DisplacementField::from_scalar_axis(&halves, 0, FieldUnit::Voxels).unwrap();

        let linear = Warper::new(Boundary::Constant(0.0))
            .with_interpolation(Interpolation::Linear)
            .warp(&volume, &field)
            .unwrap();
        let values: Vec<f32> = linear.data().clone().into_data().to_vec().unwrap();
        // out(1, 2, 2) samples x = 1.5: the impulse contributes half.
        assert!((values[(2 * 5 + 2) * 5 + 1] - 0.5).abs() < 1e-6);

        let cubic = Warper::new(Boundary::Constant(0.0))
            .warp(&volume, &field)
            .unwrap();
        let values: Vec<f32> = cubic.data().clone().into_data().to_vec().unwrap();
        assert!((values[(2 * 5 + 2) * 5 + 1] - 0.5625).abs() < 1e-6);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let volume = ramp_volume([5, 5, 5]);
        let other = ramp_volume([4, 4, 4]);
        let field = DisplacementField::zeros(&other, FieldUnit::Voxels);
        assert!(matches!(
            Warper::new(Boundary::Reflect).warp(&volume, &field),
            Err(GeometryError::ShapeMismatch { .. })
        ));
    }
}
