//! Direction matrices: orientation of grid axes in physical space.

use super::Vector;
use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

/// Direction matrix mapping grid axes to physical axes.
///
/// Column `i` is the physical direction of coordinate axis `i`. Volumes
/// require this matrix to be orthonormal; see [`Direction::is_orthonormal`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    /// Identity direction (grid axes aligned with physical axes).
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Check orthonormality: `M Mᵀ == I` within tolerance.
    pub fn is_orthonormal(&self) -> bool {
        let product = self.0 * self.0.transpose();
        let identity = SMatrix::<f64, D, D>::identity();
        (0..D).all(|i| (0..D).all(|j| (product[(i, j)] - identity[(i, j)]).abs() < 1e-4))
    }

    /// Inverse, if the matrix is invertible.
    pub fn try_inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Wrap an nalgebra matrix.
    pub fn from_matrix(matrix: SMatrix<f64, D, D>) -> Self {
        Self(matrix)
    }

    /// Inner nalgebra matrix.
    pub fn inner(&self) -> &SMatrix<f64, D, D> {
        &self.0
    }
}

impl Direction<3> {
    /// Build from a row-major flat array.
    pub fn from_row_major(values: [f64; 9]) -> Self {
        Self(SMatrix::<f64, 3, 3>::from_row_slice(&values))
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<(usize, usize)> for Direction<D> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}
