//! Volume type with physical geometry and coordinate transformations.

use crate::error::GeometryError;
use crate::spatial::{Direction3, Point3, Spacing3, Vector3};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

/// A 3-D scalar volume with physical geometry.
///
/// Voxel data lives in a `[Z, Y, X]` tensor; geometry (origin, spacing,
/// direction) is expressed in `(x, y, z)` order, so `spacing[0]` is the step
/// along the fastest-varying tensor axis.
///
/// # Coordinate Systems
/// * **Index space**: continuous voxel indices `(i_x, i_y, i_z)`
/// * **Physical space**: millimetre coordinates, related by
///   `point = origin + direction * (index * spacing)`
///
/// Construction validates the geometry once; all downstream filters may then
/// rely on positive spacing and an orthonormal direction matrix.
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    /// Voxel data, `[Z, Y, X]`.
    data: Tensor<B, 3>,
    /// Physical coordinate of voxel `(0, 0, 0)`.
    origin: Point3,
    /// Physical distance between adjacent voxels, `(x, y, z)`.
    spacing: Spacing3,
    /// Orientation of the grid axes in physical space.
    direction: Direction3,
}

impl<B: Backend> Volume<B> {
    /// Create a volume, validating its geometry.
    ///
    /// # Errors
    /// * [`GeometryError::NonPositiveSpacing`] if any spacing component is <= 0
    /// * [`GeometryError::NonOrthonormalDirection`] if `direction * directionᵀ != I`
    /// * [`GeometryError::ZeroExtent`] if any tensor axis has length 0
    pub fn new(
        data: Tensor<B, 3>,
        origin: Point3,
        spacing: Spacing3,
        direction: Direction3,
    ) -> Result<Self, GeometryError> {
        if !spacing.is_positive() {
            return Err(GeometryError::NonPositiveSpacing(spacing.to_array()));
        }
        if !direction.is_orthonormal() {
            return Err(GeometryError::NonOrthonormalDirection);
        }
        let dims: [usize; 3] = data
            .shape()
            .dims
            .try_into()
            .expect("Tensor rank mismatch");
        if dims.iter().any(|&d| d == 0) {
            return Err(GeometryError::ZeroExtent(dims));
        }
        Ok(Self {
            data,
            origin,
            spacing,
            direction,
        })
    }

    /// Assemble a volume from pre-validated parts.
    ///
    /// Used by filters whose outputs inherit geometry from an already
    /// validated input.
    pub(crate) fn from_parts(
        data: Tensor<B, 3>,
        origin: Point3,
        spacing: Spacing3,
        direction: Direction3,
    ) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    /// Replace the voxel data, keeping the geometry.
    ///
    /// # Errors
    /// [`GeometryError::ShapeMismatch`] if the new tensor's shape differs.
    pub fn with_data(&self, data: Tensor<B, 3>) -> Result<Self, GeometryError> {
        let expected = self.shape();
        let actual: [usize; 3] = data
            .shape()
            .dims
            .try_into()
            .expect("Tensor rank mismatch");
        if actual != expected {
            return Err(GeometryError::ShapeMismatch { expected, actual });
        }
        Ok(Self::from_parts(data, self.origin, self.spacing, self.direction))
    }

    /// The voxel data tensor, `[Z, Y, X]`.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    /// Consume the volume, yielding its data tensor.
    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
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

    /// Tensor shape as `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data
            .shape()
            .dims
            .try_into()
            .expect("Tensor rank mismatch")
    }

    /// Grid extent in `(x, y, z)` order.
    pub fn extent(&self) -> [usize; 3] {
        let [nz, ny, nx] = self.shape();
        [nx, ny, nz]
    }

    /// Device the data tensor lives on.
    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Physical coordinate of the grid centre.
    pub fn physical_center(&self) -> Point3 {
        let [nx, ny, nz] = self.extent();
        let center_index = Point3::new([
            (nx as f64 - 1.0) / 2.0,
            (ny as f64 - 1.0) / 2.0,
            (nz as f64 - 1.0) / 2.0,
        ]);
        self.transform_continuous_index_to_physical_point(&center_index)
    }

    /// Convert a physical point to a continuous index.
    ///
    /// `index = directionᵀ * (point - origin) / spacing`; the direction
    /// matrix is orthonormal, so its inverse is the transpose.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point3) -> Point3 {
        let diff = *point - self.origin;
        let rotated = self.direction.0.transpose() * diff.0;

        let mut index = Point3::origin();
        for i in 0..3 {
            index[i] = rotated[i] / self.spacing[i];
        }
        index
    }

    /// Convert a continuous index to a physical point.
    ///
    /// `point = origin + direction * (index * spacing)`
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point3) -> Point3 {
        let mut scaled = Vector3::zeros();
        for i in 0..3 {
            scaled[i] = index[i] * self.spacing[i];
        }
        self.origin + self.direction * scaled
    }

    /// Batch transform physical points to continuous indices.
    ///
    /// `points` is `[N, 3]` in `(x, y, z)` order; the result has the same
    /// shape. Computed as `(P - O) @ T` with `T[r, c] = directionᵀ[c, r] / spacing[c]`.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();

        let origin_vec: Vec<f32> = (0..3).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(origin_vec, burn::tensor::Shape::new([3])),
            &device,
        )
        .reshape([1, 3]);

        let inv_dir = self.direction.0.transpose();
        let mut t_data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                t_data.push((inv_dir[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(t_data, burn::tensor::Shape::new([3, 3])),
            &device,
        );

        (points - origin_tensor).matmul(t_tensor)
    }

    /// Batch transform continuous indices to physical points.
    ///
    /// `indices` is `[N, 3]` in `(x, y, z)` order. Computed as
    /// `O + I @ M` with `M[r, c] = spacing[r] * direction[c, r]`.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();

        let origin_vec: Vec<f32> = (0..3).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 1>::from_data(
            TensorData::new(origin_vec, burn::tensor::Shape::new([3])),
            &device,
        )
        .reshape([1, 3]);

        let mut m_data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m_tensor = Tensor::<B, 2>::from_data(
            TensorData::new(m_data, burn::tensor::Shape::new([3, 3])),
            &device,
        );

        indices.matmul(m_tensor) + origin_tensor
    }
}
