//! Coarse-to-fine multi-resolution registration.

use crate::error::{RegistrationError, Result};
use crate::metric::Metric;
use crate::optimizer::Optimizer;
use crate::registration::{Registration, RegistrationConfig, RegistrationOutcome};
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use std::marker::PhantomData;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use unwarp_core::filter::VolumePyramid;
use unwarp_core::transform::Transform;
use unwarp_core::Volume;

/// Per-level schedule for multi-resolution registration.
#[derive(Debug, Clone)]
pub struct RegistrationSchedule {
    /// Uniform shrink factor per level, coarsest first.
    pub shrink_factors: Vec<usize>,
    /// Smoothing sigma per level, in physical units.
    pub smoothing_sigmas: Vec<f64>,
    /// Iteration cap per level.
    pub iterations: Vec<usize>,
    /// Learning rate per level.
    pub learning_rates: Vec<f64>,
    /// Convergence tolerance, shared across levels.
    pub convergence_tolerance: f64,
    /// Convergence window length, shared across levels.
    pub convergence_window: usize,
}

impl Default for RegistrationSchedule {
    /// Three levels shrinking 4/2/1 with sigmas 2/1/0.
    fn default() -> Self {
        Self {
            shrink_factors: vec![4, 2, 1],
            smoothing_sigmas: vec![2.0, 1.0, 0.0],
            iterations: vec![100, 100, 100],
            learning_rates: vec![1.0, 1.0, 1.0],
            convergence_tolerance: 1e-6,
            convergence_window: 10,
        }
    }
}

impl RegistrationSchedule {
    /// Replace the per-level iteration caps.
    pub fn with_iterations(mut self, iterations: Vec<usize>) -> Self {
        self.iterations = iterations;
        self
    }

    /// Replace the per-level learning rates.
    pub fn with_learning_rates(mut self, learning_rates: Vec<f64>) -> Self {
        self.learning_rates = learning_rates;
        self
    }

    fn validate(&self) -> Result<()> {
        let levels = self.shrink_factors.len();
        if levels == 0 {
            return Err(RegistrationError::invalid_configuration(
                "schedule has no levels",
            ));
        }
        if self.smoothing_sigmas.len() != levels
            || self.iterations.len() != levels
            || self.learning_rates.len() != levels
        {
            return Err(RegistrationError::invalid_configuration(format!(
                "schedule lengths differ: {} shrink factors, {} sigmas, {} iterations, {} learning rates",
                levels,
                self.smoothing_sigmas.len(),
                self.iterations.len(),
                self.learning_rates.len()
            )));
        }
        if self.shrink_factors.iter().any(|&f| f == 0) {
            return Err(RegistrationError::invalid_configuration(
                "shrink factor must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Multi-resolution registration driver.
///
/// Builds matching pyramids for both volumes and refines one transform from
/// the coarsest level to the finest. A rigid or affine transform is
/// resolution independent, so it carries over between levels unchanged.
pub struct MultiResolutionRegistration<B, M, T> {
    metric: M,
    cancel: Option<Arc<AtomicBool>>,
    _phantom: PhantomData<(B, T)>,
}

impl<B, M, T> MultiResolutionRegistration<B, M, T>
where
    B: AutodiffBackend,
    M: Metric<B> + Clone,
    T: Transform<B> + AutodiffModule<B>,
{
    pub fn new(metric: M) -> Self {
        Self {
            metric,
            cancel: None,
            _phantom: PhantomData,
        }
    }

    /// Attach a cancellation flag passed down to every level.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run the schedule.
    ///
    /// `optimizer_factory` builds a fresh optimizer per level from the
    /// level's learning rate.
    pub fn execute<F, O>(
        &self,
        fixed: &Volume<B>,
        moving: &Volume<B>,
        transform: T,
        optimizer_factory: F,
        schedule: &RegistrationSchedule,
    ) -> Result<RegistrationOutcome<T>>
    where
        F: Fn(f64) -> O,
        O: Optimizer<T, B>,
    {
        schedule.validate()?;

        let fixed_pyramid =
            VolumePyramid::new(fixed, &schedule.shrink_factors, &schedule.smoothing_sigmas);
        let moving_pyramid =
            VolumePyramid::new(moving, &schedule.shrink_factors, &schedule.smoothing_sigmas);

        let levels = schedule.shrink_factors.len();
        let mut current = transform;
        let mut last_outcome: Option<RegistrationOutcome<T>> = None;

        for level in 0..levels {
            let fixed_level = fixed_pyramid.level(level);
            let moving_level = moving_pyramid.level(level);
            let config = RegistrationConfig {
                iterations: schedule.iterations[level],
                learning_rate: schedule.learning_rates[level],
                convergence_tolerance: schedule.convergence_tolerance,
                convergence_window: schedule.convergence_window,
            };

            tracing::info!(
                level = level + 1,
                levels,
                shape = ?fixed_level.shape(),
                learning_rate = config.learning_rate,
                iterations = config.iterations,
                "starting registration level"
            );

            let optimizer = optimizer_factory(config.learning_rate);
            let mut registration = Registration::new(optimizer, self.metric.clone());
            if let Some(flag) = &self.cancel {
                registration = registration.with_cancel_flag(Arc::clone(flag));
            }

            let outcome = registration.execute(fixed_level, moving_level, current, &config)?;
            tracing::info!(
                level = level + 1,
                loss = outcome.final_loss,
                iterations = outcome.iterations_run,
                converged = outcome.converged,
                "finished registration level"
            );

            current = outcome.transform.clone();
            last_outcome = Some(outcome);
        }

        // validate() guarantees at least one level ran.
        last_outcome.ok_or_else(|| RegistrationError::invalid_configuration("schedule has no levels"))
    }
}
