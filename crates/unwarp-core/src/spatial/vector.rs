//! Vector type for physical displacements and offsets.

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

/// A vector in D-dimensional physical space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector<const D: usize>(pub SVector<f64, D>);

impl<const D: usize> Vector<D> {
    /// Create a new vector from components.
    pub fn new(components: [f64; D]) -> Self {
        Self(SVector::from(components))
    }

    /// Create a zero vector.
    pub fn zeros() -> Self {
        Self(SVector::zeros())
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.0.norm()
    }

    /// Components as a plain array.
    pub fn to_array(&self) -> [f64; D] {
        let mut out = [0.0; D];
        for i in 0..D {
            out[i] = self.0[i];
        }
        out
    }
}

impl<const D: usize> std::ops::Index<usize> for Vector<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Vector<D> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Add for Vector<D> {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self(self.0 + other.0)
    }
}

impl<const D: usize> std::ops::Sub for Vector<D> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self(self.0 - other.0)
    }
}

impl<const D: usize> std::ops::Mul<f64> for Vector<D> {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self(self.0 * scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Vector3 = Vector<3>;

    #[test]
    fn test_vector_arithmetic() {
        let a = Vector3::new([1.0, 2.0, 3.0]);
        let b = Vector3::new([4.0, 5.0, 6.0]);
        assert_eq!(a + b, Vector3::new([5.0, 7.0, 9.0]));
        assert_eq!(b - a, Vector3::new([3.0, 3.0, 3.0]));
        assert_eq!(a * 2.0, Vector3::new([2.0, 4.0, 6.0]));
    }

    #[test]
    fn test_vector_norm() {
        let v = Vector3::new([3.0, 4.0, 0.0]);
        assert!((v.norm() - 5.0).abs() < 1e-12);
    }
}
