//! Composition of displacement fields.

use super::warp::Warper;
use crate::error::GeometryError;
use crate::interpolation::{Boundary, Interpolation};
use crate::volume::{DisplacementField, Volume};
use burn::tensor::backend::Backend;

/// How two displacement fields are combined into one correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionStrategy {
    /// Sum the fields vectorwise, then warp once. Exact when the fields
    /// commute (for instance when they displace disjoint axes) and cheaper
    /// than two resamplings.
    Superposition,
    /// Warp by the first field, then warp the result by the second. Each
    /// step interpolates, so two resampling errors accumulate.
    Sequential,
}

/// Field composer.
///
/// Applies one or two displacement fields to a volume, either by vector
/// superposition or by sequential warping.
pub struct FieldComposer {
    boundary: Boundary,
    interpolation: Interpolation,
}

impl FieldComposer {
    /// Create a cubic composer with the given boundary policy for warping.
    pub fn new(boundary: Boundary) -> Self {
        Self {
            boundary,
            interpolation: Interpolation::Cubic,
        }
    }

    /// Select another interpolation kernel for the warps.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Warp `volume` by a single field.
    pub fn apply<B: Backend>(
        &self,
        volume: &Volume<B>,
        field: &DisplacementField<B>,
    ) -> Result<Volume<B>, GeometryError> {
        Warper::new(self.boundary)
            .with_interpolation(self.interpolation)
            .warp(volume, field)
    }

    /// Apply two fields to `volume` using `strategy`.
    pub fn compose<B: Backend>(
        &self,
        volume: &Volume<B>,
        first: &DisplacementField<B>,
        second: &DisplacementField<B>,
        strategy: CompositionStrategy,
    ) -> Result<Volume<B>, GeometryError> {
        match strategy {
            CompositionStrategy::Superposition => {
                let combined = first.superpose(second)?;
                self.apply(volume, &combined)
            }
            CompositionStrategy::Sequential => {
                let intermediate = self.apply(volume, first)?;
                self.apply(&intermediate, second)
            }
        }
    }
}
