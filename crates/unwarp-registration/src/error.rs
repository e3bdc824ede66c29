//! Error types for registration workflows.

use thiserror::Error;
use unwarp_core::GeometryError;

/// Errors raised while setting up or running a registration.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Invalid grid geometry on an input volume.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// An input volume cannot drive the metric (for instance constant
    /// intensity, which leaves mutual information undefined).
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// The metric produced a non-finite value.
    #[error("non-finite metric value at iteration {iteration}")]
    NonFiniteMetric { iteration: usize },

    /// Invalid configuration (empty schedule, mismatched level counts, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The registration was cancelled from another thread.
    #[error("registration cancelled")]
    Cancelled,
}

impl RegistrationError {
    /// Create a degenerate-input error.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }

    /// Create an invalid-configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;
