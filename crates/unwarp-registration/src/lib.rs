//! Intensity-based rigid and affine registration of 3-D volumes.
//!
//! Coarse-to-fine optimization of a mutual-information metric with random
//! voxel sampling. The transform is a burn module; gradients of the metric
//! with respect to its parameters drive a gradient-descent optimizer.

pub mod convergence;
pub mod error;
pub mod initializer;
pub mod metric;
pub mod multires;
pub mod optimizer;
pub mod registration;

pub use convergence::ConvergenceMonitor;
pub use error::{RegistrationError, Result};
pub use initializer::TransformInitializer;
pub use metric::{Metric, MutualInformation};
pub use multires::{MultiResolutionRegistration, RegistrationSchedule};
pub use optimizer::{GradientDescent, Optimizer};
pub use registration::{Registration, RegistrationConfig, RegistrationOutcome};
