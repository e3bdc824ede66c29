//! Metric trait for volume similarity measurement.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use unwarp_core::transform::Transform;
use unwarp_core::Volume;

/// Dissimilarity between a fixed and a transformed moving volume.
///
/// Lower is better. The returned tensor must stay connected to the transform
/// parameters so `backward()` yields usable gradients.
pub trait Metric<B: Backend> {
    /// Evaluate the loss for the current transform.
    fn forward(
        &self,
        fixed: &Volume<B>,
        moving: &Volume<B>,
        transform: &impl Transform<B>,
    ) -> Tensor<B, 1>;

    /// Identifier used in logs.
    fn name(&self) -> &'static str;
}
