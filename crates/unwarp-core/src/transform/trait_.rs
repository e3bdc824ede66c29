//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps physical points from one space to another.
///
/// The trait does not require `burn::module::Module`, but registration-driven
/// transforms implement both so their parameters can be optimized.
pub trait Transform<B: Backend> {
    /// Apply the transform to a batch of points.
    ///
    /// # Arguments
    /// * `points` - `[N, 3]` physical points in `(x, y, z)` order
    ///
    /// # Returns
    /// `[N, 3]` transformed points
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
