//! Interpolation of volume values at continuous indices.
//!
//! Two samplers with different jobs: [`LinearInterpolator`] runs on tensors
//! and stays differentiable for metric evaluation during registration;
//! [`GridSampler`] is a CPU convolution sampler with a selectable kernel,
//! used by the resampling filters, where boundary handling matters more than
//! gradients.

pub mod linear;
pub mod sampler;
pub mod trait_;

pub use linear::LinearInterpolator;
pub use sampler::{Boundary, GridSampler, Interpolation};
pub use trait_::Interpolator;
