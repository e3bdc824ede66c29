//! Optimizers for transform parameters.

pub mod gradient_descent;
pub mod trait_;

pub use gradient_descent::GradientDescent;
pub use trait_::Optimizer;
