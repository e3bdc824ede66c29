//! Spacing type: physical distance between adjacent voxels along each axis.

use super::Vector;

/// Spacing between adjacent voxels along each axis.
///
/// A type alias to [`Vector`] for semantic clarity. Component `i` is the
/// physical step along coordinate axis `i` of the `(x, y, z)` index vector.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    /// Create uniform spacing (same value on every axis).
    pub fn uniform(value: f64) -> Self {
        let mut spacing = Vector::zeros();
        for i in 0..D {
            spacing[i] = value;
        }
        spacing
    }

    /// True when every component is strictly positive.
    pub fn is_positive(&self) -> bool {
        (0..D).all(|i| self[i] > 0.0)
    }
}
