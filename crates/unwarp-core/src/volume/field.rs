//! Dense displacement fields: one 3-vector per voxel.

use crate::error::GeometryError;
use crate::spatial::{Direction3, Point3, Spacing3};
use crate::volume::Volume;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

/// Unit of the displacement vectors stored in a field.
///
/// Fields derived from physical measurements carry millimetre displacements;
/// warping samples in index space and expects voxel displacements. Conversion
/// divides each component by the spacing of its axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUnit {
    /// Displacements in physical millimetres.
    Millimeters,
    /// Displacements in fractional voxel indices.
    Voxels,
}

/// A dense displacement field over a regular 3-D grid.
///
/// Stored as a `[Z, Y, X, 3]` tensor; the last axis holds the `(x, y, z)`
/// displacement components, so component `i` displaces coordinate `i` of an
/// `(x, y, z)` index or physical vector. The grid geometry mirrors
/// [`Volume`].
#[derive(Debug, Clone)]
pub struct DisplacementField<B: Backend> {
    /// Displacement vectors, `[Z, Y, X, 3]`.
    data: Tensor<B, 4>,
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
    unit: FieldUnit,
}

impl<B: Backend> DisplacementField<B> {
    /// Create a field, validating geometry and component count.
    ///
    /// # Errors
    /// Same geometry errors as [`Volume::new`]; additionally
    /// [`GeometryError::AxisOutOfRange`] if the last tensor axis does not
    /// hold exactly 3 components.
    pub fn new(
        data: Tensor<B, 4>,
        origin: Point3,
        spacing: Spacing3,
        direction: Direction3,
        unit: FieldUnit,
    ) -> Result<Self, GeometryError> {
        if !spacing.is_positive() {
            return Err(GeometryError::NonPositiveSpacing(spacing.to_array()));
        }
        if !direction.is_orthonormal() {
            return Err(GeometryError::NonOrthonormalDirection);
        }
        let dims: [usize; 4] = data
            .shape()
            .dims
            .try_into()
            .expect("Tensor rank mismatch");
        if dims[..3].iter().any(|&d| d == 0) {
            return Err(GeometryError::ZeroExtent([dims[0], dims[1], dims[2]]));
        }
        if dims[3] != 3 {
            return Err(GeometryError::AxisOutOfRange(dims[3]));
        }
        Ok(Self {
            data,
            origin,
            spacing,
            direction,
            unit,
        })
    }

    /// A zero field on the grid of `volume`, in the given unit.
    pub fn zeros(volume: &Volume<B>, unit: FieldUnit) -> Self {
        let [nz, ny, nx] = volume.shape();
        let data = Tensor::<B, 4>::zeros([nz, ny, nx, 3], &volume.device());
        Self {
            data,
            origin: *volume.origin(),
            spacing: *volume.spacing(),
            direction: *volume.direction(),
            unit,
        }
    }

    /// Build a field whose `axis` component is the given scalar volume and
    /// whose other components are zero.
    ///
    /// # Errors
    /// [`GeometryError::AxisOutOfRange`] if `axis >= 3`.
    pub fn from_scalar_axis(
        scalar: &Volume<B>,
        axis: usize,
        unit: FieldUnit,
    ) -> Result<Self, GeometryError> {
        if axis >= 3 {
            return Err(GeometryError::AxisOutOfRange(axis));
        }
        let [nz, ny, nx] = scalar.shape();
        let zeros = Tensor::<B, 4>::zeros([nz, ny, nx, 3], &scalar.device());
        let component = scalar.data().clone().unsqueeze_dim::<4>(3);
        let data = zeros.slice_assign([0..nz, 0..ny, 0..nx, axis..axis + 1], component);
        Ok(Self {
            data,
            origin: *scalar.origin(),
            spacing: *scalar.spacing(),
            direction: *scalar.direction(),
            unit,
        })
    }

    /// Displacement vectors, `[Z, Y, X, 3]`.
    pub fn data(&self) -> &Tensor<B, 4> {
        &self.data
    }

    /// Spatial grid shape as `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; 3] {
        let dims: [usize; 4] = self
            .data
            .shape()
            .dims
            .try_into()
            .expect("Tensor rank mismatch");
        [dims[0], dims[1], dims[2]]
    }

    /// Physical coordinate of voxel `(0, 0, 0)`.
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    /// Physical distance between adjacent voxels, `(x, y, z)`.
    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    /// Orientation of the grid axes.
    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    /// Unit of the stored displacement vectors.
    pub fn unit(&self) -> FieldUnit {
        self.unit
    }

    /// Device the data tensor lives on.
    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Extract a single displacement component as a scalar volume.
    ///
    /// # Errors
    /// [`GeometryError::AxisOutOfRange`] if `axis >= 3`.
    pub fn component(&self, axis: usize) -> Result<Volume<B>, GeometryError> {
        if axis >= 3 {
            return Err(GeometryError::AxisOutOfRange(axis));
        }
        let scalar = self.data.clone().narrow(3, axis, 1).squeeze::<3>(3);
        Ok(Volume::from_parts(
            scalar,
            self.origin,
            self.spacing,
            self.direction,
        ))
    }

    /// Convert displacements to voxel units.
    ///
    /// A no-op for fields already in voxel units; otherwise each component
    /// is divided by the spacing of its axis.
    pub fn in_voxel_units(&self) -> Self {
        match self.unit {
            FieldUnit::Voxels => self.clone(),
            FieldUnit::Millimeters => {
                let device = self.data.device();
                let inv: Vec<f32> = (0..3).map(|i| (1.0 / self.spacing[i]) as f32).collect();
                let scale = Tensor::<B, 1>::from_data(
                    TensorData::new(inv, burn::tensor::Shape::new([3])),
                    &device,
                )
                .reshape([1, 1, 1, 3]);
                Self {
                    data: self.data.clone() * scale,
                    origin: self.origin,
                    spacing: self.spacing,
                    direction: self.direction,
                    unit: FieldUnit::Voxels,
                }
            }
        }
    }

    /// Re-stamp the field with the geometry of `volume`.
    ///
    /// Used after resampling field data onto another grid; the spatial shape
    /// must already match.
    ///
    /// # Errors
    /// [`GeometryError::ShapeMismatch`] if the grids differ in shape.
    pub fn with_geometry_of(&self, volume: &Volume<B>) -> Result<Self, GeometryError> {
        let expected = volume.shape();
        let actual = self.shape();
        if actual != expected {
            return Err(GeometryError::ShapeMismatch { expected, actual });
        }
        Ok(Self {
            data: self.data.clone(),
            origin: *volume.origin(),
            spacing: *volume.spacing(),
            direction: *volume.direction(),
            unit: self.unit,
        })
    }

    /// Vector sum of two fields on the same grid.
    ///
    /// Both operands are converted to voxel units first, so fields measured
    /// in different units compose correctly.
    ///
    /// # Errors
    /// [`GeometryError::ShapeMismatch`] if the grids differ in shape.
    pub fn superpose(&self, other: &Self) -> Result<Self, GeometryError> {
        let expected = self.shape();
        let actual = other.shape();
        if actual != expected {
            return Err(GeometryError::ShapeMismatch { expected, actual });
        }
        let lhs = self.in_voxel_units();
        let rhs = other.in_voxel_units();
        Ok(Self {
            data: lhs.data + rhs.data,
            origin: self.origin,
            spacing: self.spacing,
            direction: self.direction,
            unit: FieldUnit::Voxels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    fn volume_of(value: f32, shape: [usize; 3], spacing: [f64; 3]) -> Volume<Backend> {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::full(shape, value, &device);
        Volume::new(
            data,
            Point3::origin(),
            Spacing3::new(spacing),
            Direction3::identity(),
        )
        .unwrap()
    }

    #[test]
    fn test_from_scalar_axis_places_component() {
        let scalar = volume_of(2.5, [2, 3, 4], [1.0, 1.0, 1.0]);
        let field = DisplacementField::from_scalar_axis(&scalar, 2, FieldUnit::Voxels).unwrap();

        let z = field.component(2).unwrap();
        let x = field.component(0).unwrap();
        let z_values: Vec<f32> = z.data().clone().into_data().to_vec().unwrap();
        let x_values: Vec<f32> = x.data().clone().into_data().to_vec().unwrap();
        assert!(z_values.iter().all(|&v| (v - 2.5).abs() < 1e-6));
        assert!(x_values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_scalar_axis_rejects_bad_axis() {
        let scalar = volume_of(1.0, [2, 2, 2], [1.0, 1.0, 1.0]);
        assert!(matches!(
            DisplacementField::from_scalar_axis(&scalar, 3, FieldUnit::Voxels),
            Err(GeometryError::AxisOutOfRange(3))
        ));
    }

    #[test]
    fn test_millimetre_to_voxel_conversion() {
        let scalar = volume_of(4.0, [2, 2, 2], [1.0, 1.0, 2.0]);
        let field =
            DisplacementField::from_scalar_axis(&scalar, 2, FieldUnit::Millimeters).unwrap();

        let voxels = field.in_voxel_units();
        assert_eq!(voxels.unit(), FieldUnit::Voxels);
        let z: Vec<f32> = voxels
            .component(2)
            .unwrap()
            .data()
            .clone()
            .into_data()
            .to_vec()
            .unwrap();
        // 4 mm over 2 mm spacing = 2 voxels
        assert!(z.iter().all(|&v| (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_voxel_units_is_noop_when_already_voxels() {
        let scalar = volume_of(1.0, [2, 2, 2], [1.0, 1.0, 2.0]);
        let field = DisplacementField::from_scalar_axis(&scalar, 0, FieldUnit::Voxels).unwrap();
        let converted = field.in_voxel_units();
        let before: Vec<f32> = field.data().clone().into_data().to_vec().unwrap();
        let after: Vec<f32> = converted.data().clone().into_data().to_vec().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_superpose_adds_in_voxel_units() {
        let a = volume_of(2.0, [2, 2, 2], [1.0, 1.0, 2.0]);
        let field_mm = DisplacementField::from_scalar_axis(&a, 2, FieldUnit::Millimeters).unwrap();
        let field_vox = DisplacementField::from_scalar_axis(&a, 2, FieldUnit::Voxels).unwrap();

        let sum = field_mm.superpose(&field_vox).unwrap();
        assert_eq!(sum.unit(), FieldUnit::Voxels);
        let z: Vec<f32> = sum
            .component(2)
            .unwrap()
            .data()
            .clone()
            .into_data()
            .to_vec()
            .unwrap();
        // 2 mm / 2 mm spacing + 2 voxels = 3 voxels
        assert!(z.iter().all(|&v| (v - 3.0).abs() < 1e-6));
    }

    #[test]
    fn test_superpose_rejects_shape_mismatch() {
        let a = volume_of(1.0, [2, 2, 2], [1.0, 1.0, 1.0]);
        let b = volume_of(1.0, [2, 2, 3], [1.0, 1.0, 1.0]);
        let fa = DisplacementField::from_scalar_axis(&a, 0, FieldUnit::Voxels).unwrap();
        let fb = DisplacementField::from_scalar_axis(&b, 0, FieldUnit::Voxels).unwrap();
        assert!(matches!(
            fa.superpose(&fb),
            Err(GeometryError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_zeros_matches_volume_grid() {
        let v = volume_of(0.0, [3, 4, 5], [1.0, 1.0, 1.0]);
        let field = DisplacementField::zeros(&v, FieldUnit::Voxels);
        assert_eq!(field.shape(), [3, 4, 5]);
    }
}
