//! Single-level registration loop.

use crate::convergence::ConvergenceMonitor;
use crate::error::{RegistrationError, Result};
use crate::metric::Metric;
use crate::optimizer::Optimizer;
use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use unwarp_core::transform::Transform;
use unwarp_core::Volume;

/// Settings for one optimization run.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Maximum number of iterations.
    pub iterations: usize,
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// Convergence tolerance on the mean loss change.
    pub convergence_tolerance: f64,
    /// Length of the convergence window.
    pub convergence_window: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            learning_rate: 1.0,
            convergence_tolerance: 1e-6,
            convergence_window: 10,
        }
    }
}

/// Result of an optimization run.
pub struct RegistrationOutcome<T> {
    /// Transform with the best loss seen during the run.
    pub transform: T,
    /// Loss of that transform.
    pub final_loss: f64,
    /// Iterations actually executed.
    pub iterations_run: usize,
    /// Whether the convergence criterion fired before the iteration cap.
    pub converged: bool,
}

/// Single-level registration driver.
///
/// Iterates metric evaluation, backward pass and optimizer step, tracking
/// the best transform seen. Degenerate inputs are rejected up front so the
/// metric itself can stay infallible.
pub struct Registration<B, O, M, T>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B>,
    T: Transform<B> + AutodiffModule<B>,
{
    optimizer: O,
    metric: M,
    cancel: Option<Arc<AtomicBool>>,
    _phantom: PhantomData<(B, T)>,
}

impl<B, O, M, T> Registration<B, O, M, T>
where
    B: AutodiffBackend,
    O: Optimizer<T, B>,
    M: Metric<B>,
    T: Transform<B> + AutodiffModule<B>,
{
    pub fn new(optimizer: O, metric: M) -> Self {
        Self {
            optimizer,
            metric,
            cancel: None,
            _phantom: PhantomData,
        }
    }

    /// Attach a cancellation flag checked before each iteration.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run the optimization.
    ///
    /// # Errors
    /// * [`RegistrationError::DegenerateInput`] for constant-intensity input
    /// * [`RegistrationError::NonFiniteMetric`] if the loss leaves the reals
    /// * [`RegistrationError::Cancelled`] if the cancel flag was raised
    pub fn execute(
        &mut self,
        fixed: &Volume<B>,
        moving: &Volume<B>,
        transform: T,
        config: &RegistrationConfig,
    ) -> Result<RegistrationOutcome<T>> {
        check_not_constant(fixed, "fixed")?;
        check_not_constant(moving, "moving")?;

        self.optimizer.set_learning_rate(config.learning_rate);
        let mut monitor =
            ConvergenceMonitor::new(config.convergence_tolerance, config.convergence_window);

        let mut current = transform;
        let mut best = current.clone();
        let mut best_loss = f64::INFINITY;
        let mut converged = false;
        let mut iterations_run = 0;

        for i in 0..config.iterations {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(RegistrationError::Cancelled);
                }
            }

            let loss = self.metric.forward(fixed, moving, &current);
            let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();
            if !loss_value.is_finite() {
                return Err(RegistrationError::NonFiniteMetric { iteration: i });
            }

            if loss_value < best_loss {
                best_loss = loss_value;
                best = current.clone();
            }

            if i % 10 == 0 {
                tracing::debug!(iteration = i, loss = loss_value, metric = self.metric.name());
            }

            iterations_run = i + 1;
            if monitor.push(loss_value) {
                converged = true;
                break;
            }

            let grads = loss.backward();
            let grads_params = GradientsParams::from_grads(grads, &current);
            current = self.optimizer.step(current, grads_params);
        }

        if !converged {
            tracing::warn!(
                iterations = iterations_run,
                best_loss,
                "registration stopped at iteration cap without converging"
            );
        }

        Ok(RegistrationOutcome {
            transform: best,
            final_loss: best_loss,
            iterations_run,
            converged,
        })
    }
}

/// Reject volumes whose intensities are all equal; mutual information is
/// undefined on them.
fn check_not_constant<B: AutodiffBackend>(volume: &Volume<B>, role: &str) -> Result<()> {
    let min: f64 = volume.data().clone().min().into_scalar().elem::<f64>();
    let max: f64 = volume.data().clone().max().into_scalar().elem::<f64>();
    if min == max {
        return Err(RegistrationError::degenerate(format!(
            "{role} volume has constant intensity {min}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MutualInformation;
    use crate::optimizer::GradientDescent;
    use burn::backend::Autodiff;
    use burn::tensor::{Tensor, TensorData};
    use burn_ndarray::NdArray;
    use unwarp_core::spatial::{Direction3, Point3, Spacing3};
    use unwarp_core::transform::RigidTransform;

    type B = Autodiff<NdArray<f32>>;

    fn gradient_volume(size: usize, origin: [f64; 3]) -> Volume<B> {
        let device = Default::default();
        let count = size * size * size;
        let data: Vec<f32> = (0..count).map(|x| (x as f32) / (count as f32)).collect();
        Volume::new(
            Tensor::from_data(
                TensorData::new(data, burn::tensor::Shape::new([size, size, size])),
                &device,
            ),
            Point3::new(origin),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap()
    }

    #[test]
    fn test_constant_volume_rejected() {
        let device = Default::default();
        let constant = Volume::<B>::new(
            Tensor::ones([6, 6, 6], &device),
            Point3::origin(),
            Spacing3::uniform(1.0),
            Direction3::identity(),
        )
        .unwrap();
        let other = gradient_volume(6, [0.0, 0.0, 0.0]);

        let transform = RigidTransform::identity(Tensor::<B, 1>::zeros([3], &device), &device);
        let mut registration = Registration::new(
            GradientDescent::new(0.1),
            MutualInformation::new(16, 0.5, 3),
        );
        let result = registration.execute(
            &constant,
            &other,
            transform,
            &RegistrationConfig::default(),
        );
        assert!(matches!(
            result,
            Err(RegistrationError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_cancel_flag_stops_run() {
        let device = Default::default();
        let volume = gradient_volume(6, [0.0, 0.0, 0.0]);
        let transform = RigidTransform::identity(Tensor::<B, 1>::zeros([3], &device), &device);

        let cancel = Arc::new(AtomicBool::new(true));
        let mut registration = Registration::new(
            GradientDescent::new(0.1),
            MutualInformation::new(16, 0.5, 3),
        )
        .with_cancel_flag(cancel);

        let result = registration.execute(
            &volume,
            &volume,
            transform,
            &RegistrationConfig::default(),
        );
        assert!(matches!(result, Err(RegistrationError::Cancelled)));
    }

    #[test]
    fn test_execute_returns_finite_parameters() {
        let device = Default::default();
        let volume = gradient_volume(8, [0.0, 0.0, 0.0]);
        let transform = RigidTransform::identity(Tensor::<B, 1>::zeros([3], &device), &device);

        let config = RegistrationConfig {
            iterations: 15,
            learning_rate: 0.05,
            ..Default::default()
        };
        let mut registration = Registration::new(
            GradientDescent::new(config.learning_rate),
            MutualInformation::new(16, 0.5, 11),
        );
        let outcome = registration
            .execute(&volume, &volume, transform, &config)
            .unwrap();

        assert!(outcome.final_loss.is_finite());
        assert!(outcome.iterations_run >= 1);
        let params = outcome.transform.physical_parameters();
        assert!(params.iter().all(|p| p.is_finite()));
    }
}
