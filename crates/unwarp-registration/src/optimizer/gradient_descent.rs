//! Plain gradient descent built on burn's SGD.

use super::trait_::Optimizer;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{GradientsParams, Optimizer as BurnOptimizer, Sgd, SgdConfig};
use burn::tensor::backend::AutodiffBackend;

/// Gradient descent optimizer.
///
/// A thin wrapper over burn's `Sgd` without momentum, matching a regular
/// step-size gradient descent on the transform parameters.
pub struct GradientDescent<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    inner: OptimizerAdaptor<Sgd<B::InnerBackend>, M, B>,
    learning_rate: f64,
}

impl<M, B> GradientDescent<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    /// Create an optimizer with the given learning rate.
    pub fn new(learning_rate: f64) -> Self {
        Self {
            inner: SgdConfig::new().init(),
            learning_rate,
        }
    }
}

impl<M, B> Optimizer<M, B> for GradientDescent<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        self.inner.step(self.learning_rate, module, gradients)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
