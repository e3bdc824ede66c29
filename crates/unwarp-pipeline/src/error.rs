//! Pipeline errors, identified by the stage that raised them.

use std::fmt;
use thiserror::Error;
use unwarp_core::GeometryError;
use unwarp_registration::RegistrationError;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Field-map intensity to physical displacement.
    Conversion,
    /// Rigid alignment of the field map onto the anatomical volume.
    Registration,
    /// Upsampling volumes and fields to the target grid.
    Resampling,
    /// Placing the scalar shift on the distortion axis.
    FieldAssembly,
    /// Warping the volume by the assembled field.
    Warping,
    /// Composing the externally measured second field.
    Composition,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Conversion => "conversion",
            Stage::Registration => "registration",
            Stage::Resampling => "resampling",
            Stage::FieldAssembly => "field assembly",
            Stage::Warping => "warping",
            Stage::Composition => "composition",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A geometry precondition failed inside a stage.
    #[error("{stage} stage failed")]
    Stage {
        stage: Stage,
        #[source]
        source: GeometryError,
    },

    /// The registration stage failed.
    #[error("registration stage failed")]
    Registration(#[from] RegistrationError),

    /// The configuration is unusable before any stage runs.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl PipelineError {
    /// Adapter attributing a geometry error to `stage`, for use with
    /// `map_err`.
    pub fn in_stage(stage: Stage) -> impl FnOnce(GeometryError) -> Self {
        move |source| Self::Stage { stage, source }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_names_the_stage() {
        let error = PipelineError::in_stage(Stage::Warping)(GeometryError::ShapeMismatch {
            expected: [2, 2, 2],
            actual: [3, 3, 3],
        });
        assert_eq!(error.to_string(), "warping stage failed");
        assert!(std::error::Error::source(&error).is_some());
    }
}
