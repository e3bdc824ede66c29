//! Interpolator trait for sampling volumes at continuous coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Sample a `[Z, Y, X]` volume at continuous indices.
///
/// Implementations must be expressible as tensor ops so gradients can flow
/// through sampled values during registration.
pub trait Interpolator<B: Backend> {
    /// Interpolate `data` at `indices`.
    ///
    /// # Arguments
    /// * `data` - Source volume `[Z, Y, X]`
    /// * `indices` - Continuous indices `[N, 3]` in `(x, y, z)` order
    ///
    /// # Returns
    /// Sampled values `[N]`
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
