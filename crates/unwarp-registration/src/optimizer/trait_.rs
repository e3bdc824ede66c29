//! Optimizer trait for updating transform parameters.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;

/// Updates transform parameters from metric gradients.
///
/// # Type Parameters
/// * `M` - The transform module being optimized
/// * `B` - The autodiff backend
pub trait Optimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    /// Perform one update step and return the updated module.
    fn step(&mut self, module: M, gradients: GradientsParams) -> M;

    /// Current learning rate.
    fn learning_rate(&self) -> f64;

    /// Change the learning rate.
    fn set_learning_rate(&mut self, lr: f64);
}
