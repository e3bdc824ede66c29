//! Error types for volume and field construction and resampling.

use thiserror::Error;

/// Errors raised when grid geometry or grid shapes are invalid.
///
/// Geometry is validated when a [`crate::Volume`] or
/// [`crate::DisplacementField`] is constructed, so downstream filters can
/// assume positive spacing and an orthonormal direction matrix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Spacing must be strictly positive along every axis.
    #[error("non-positive spacing {0:?}")]
    NonPositiveSpacing([f64; 3]),

    /// The direction matrix must be orthonormal.
    #[error("direction matrix is not orthonormal")]
    NonOrthonormalDirection,

    /// A grid with a zero-length axis cannot be sampled.
    #[error("zero-extent grid {0:?}")]
    ZeroExtent([usize; 3]),

    /// Two grids were expected to have identical shapes.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// A displacement component index outside 0..3.
    #[error("distortion axis {0} out of range (expected 0..3)")]
    AxisOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, GeometryError>;
