//! Transform initialization from volume geometry.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use unwarp_core::transform::{AffineTransform, RigidTransform};
use unwarp_core::{Point3, Volume};

/// Builds starting transforms whose parameters are scaled so a unit optimizer
/// step produces a comparable physical shift.
///
/// The rotation center is the fixed volume's geometric center and the initial
/// translation aligns the two grid centers. Rotation and matrix parameters
/// are scaled by `1 / r`, where `r` is the distance from the center to the
/// farthest fixed corner: a small angle rotates the farthest voxel by roughly
/// `r * angle`, so this equalizes step sizes across parameter kinds.
pub struct TransformInitializer;

impl TransformInitializer {
    /// Rigid transform centered on the fixed volume, translating the fixed
    /// center onto the moving center.
    pub fn rigid_geometric<B: Backend>(fixed: &Volume<B>, moving: &Volume<B>) -> RigidTransform<B> {
        let device = fixed.device();
        let fixed_center = fixed.physical_center();
        let moving_center = moving.physical_center();
        let translation = moving_center - fixed_center;

        let r = Self::corner_radius(fixed, &fixed_center);
        let rot_scale = (1.0 / r) as f32;
        let scales = Tensor::<B, 1>::from_data(
            TensorData::new(
                vec![rot_scale, rot_scale, rot_scale, 1.0, 1.0, 1.0],
                burn::tensor::Shape::new([6]),
            ),
            &device,
        );

        RigidTransform::from_physical_parameters(
            [
                0.0,
                0.0,
                0.0,
                translation[0],
                translation[1],
                translation[2],
            ],
            fixed_center.to_array(),
            &device,
        )
        .with_scales(scales)
    }

    /// Affine transform centered on the fixed volume, translating the fixed
    /// center onto the moving center.
    pub fn affine_geometric<B: Backend>(
        fixed: &Volume<B>,
        moving: &Volume<B>,
    ) -> AffineTransform<B> {
        let device = fixed.device();
        let fixed_center = fixed.physical_center();
        let moving_center = moving.physical_center();
        let translation = moving_center - fixed_center;

        let r = Self::corner_radius(fixed, &fixed_center);
        let matrix_scale = (1.0 / r) as f32;
        let mut scale_values = vec![matrix_scale; 9];
        scale_values.extend_from_slice(&[1.0, 1.0, 1.0]);
        let scales = Tensor::<B, 1>::from_data(
            TensorData::new(scale_values, burn::tensor::Shape::new([12])),
            &device,
        );

        let mut parameters = [0.0; 12];
        parameters[9] = translation[0];
        parameters[10] = translation[1];
        parameters[11] = translation[2];

        AffineTransform::from_physical_parameters(parameters, fixed_center.to_array(), &device)
            .with_scales(scales)
    }

    /// Distance from `center` to the farthest corner of the volume, clamped
    /// away from zero for single-voxel grids.
    fn corner_radius<B: Backend>(volume: &Volume<B>, center: &Point3) -> f64 {
        let [nx, ny, nz] = volume.extent();
        let mut radius: f64 = 0.0;
        for &cx in &[0.0, nx as f64 - 1.0] {
            for &cy in &[0.0, ny as f64 - 1.0] {
                for &cz in &[0.0, nz as f64 - 1.0] {
                    let corner = volume
                        .transform_continuous_index_to_physical_point(&Point3::new([cx, cy, cz]));
                    radius = radius.max((corner - *center).norm());
                }
            }
        }
        radius.max(1.0)
    }
}
