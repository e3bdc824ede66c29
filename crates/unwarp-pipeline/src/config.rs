//! Configuration surface of the correction pipeline.

use crate::error::{PipelineError, Result};
use std::path::PathBuf;
use unwarp_core::filter::CompositionStrategy;
use unwarp_core::interpolation::{Boundary, Interpolation};
use unwarp_registration::RegistrationSchedule;

/// Registration stage settings.
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    /// Intensity histogram bins for the mutual-information metric.
    pub num_bins: usize,
    /// Fraction of voxels sampled per metric evaluation.
    pub sampling_fraction: f64,
    /// Seed for the voxel sampler; equal seeds reproduce equal runs.
    pub seed: u64,
    /// Multi-resolution shrink/smoothing/iteration schedule.
    pub schedule: RegistrationSchedule,
}

impl Default for RegistrationSettings {
    /// 50 bins, 1% sampling, seed 0, the default three-level schedule.
    fn default() -> Self {
        Self {
            num_bins: 50,
            sampling_fraction: 0.01,
            seed: 0,
            schedule: RegistrationSchedule::default(),
        }
    }
}

/// Full configuration of one correction run.
///
/// The three historical pipeline variants differ only in toggles: with or
/// without registration, with or without phantom composition. They are all
/// expressed by one config.
#[derive(Debug, Clone)]
pub struct CorrectionConfig {
    /// Scanner gradient factor `G`, a percentage expressed as a fraction.
    pub gradient_percent: f64,
    /// Gradient calibration constant `K`.
    pub gradient_calibration: f64,
    /// Target grid extent `(x, y, z)` all volumes and fields are upsampled to.
    pub target_extent: [usize; 3],
    /// Coordinate axis receiving the scalar field-map shift.
    pub distortion_axis: usize,
    /// Registration settings; `None` skips the stage entirely.
    pub registration: Option<RegistrationSettings>,
    /// Boundary policy for grid resampling.
    pub resample_boundary: Boundary,
    /// Interpolation kernel for grid resampling.
    pub resample_interpolation: Interpolation,
    /// Boundary policy for the correction warp.
    pub warp_boundary: Boundary,
    /// Interpolation kernel for the correction warp.
    pub warp_interpolation: Interpolation,
    /// Boundary policy for the phantom-composition warp.
    pub composition_boundary: Boundary,
    /// Interpolation kernel for the phantom-composition warps.
    pub composition_interpolation: Interpolation,
    /// How the correction and phantom fields combine.
    pub composition_strategy: CompositionStrategy,
    /// Directory for cached registration transforms; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
}

impl CorrectionConfig {
    /// Create a configuration from the values with no sensible default:
    /// the calibration constants and the target grid.
    ///
    /// Registration is enabled with [`RegistrationSettings::default`], the
    /// distortion axis is the z axis, every stage interpolates cubically,
    /// the correction warp fills with zero and the composition warp reflects.
    pub fn new(
        gradient_percent: f64,
        gradient_calibration: f64,
        target_extent: [usize; 3],
    ) -> Self {
        Self {
            gradient_percent,
            gradient_calibration,
            target_extent,
            distortion_axis: 2,
            registration: Some(RegistrationSettings::default()),
            resample_boundary: Boundary::Reflect,
            resample_interpolation: Interpolation::Cubic,
            warp_boundary: Boundary::Constant(0.0),
            warp_interpolation: Interpolation::Cubic,
            composition_boundary: Boundary::Reflect,
            composition_interpolation: Interpolation::Cubic,
            composition_strategy: CompositionStrategy::Superposition,
            cache_dir: None,
        }
    }

    /// Disable the registration stage; the field map is then assumed to be
    /// aligned with the anatomical volume already.
    pub fn without_registration(mut self) -> Self {
        self.registration = None;
        self
    }

    /// Place the scalar shift on another coordinate axis.
    pub fn with_distortion_axis(mut self, axis: usize) -> Self {
        self.distortion_axis = axis;
        self
    }

    /// Select how a phantom field composes with the correction field.
    pub fn with_composition_strategy(mut self, strategy: CompositionStrategy) -> Self {
        self.composition_strategy = strategy;
        self
    }

    /// Use one interpolation kernel for every resampling and warping stage.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.resample_interpolation = interpolation;
        self.warp_interpolation = interpolation;
        self.composition_interpolation = interpolation;
        self
    }

    /// Cache computed registration transforms under `dir`.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let product = self.gradient_percent * self.gradient_calibration;
        if product == 0.0 || !product.is_finite() {
            return Err(PipelineError::invalid_configuration(
                "gradient calibration product must be finite and nonzero",
            ));
        }
        if self.target_extent.iter().any(|&e| e == 0) {
            return Err(PipelineError::invalid_configuration(format!(
                "target extent has a zero axis: {:?}",
                self.target_extent
            )));
        }
        if self.distortion_axis >= 3 {
            return Err(PipelineError::invalid_configuration(format!(
                "distortion axis must be 0, 1 or 2, got {}",
                self.distortion_axis
            )));
        }
        if let Some(settings) = &self.registration {
            if settings.num_bins < 2 {
                return Err(PipelineError::invalid_configuration(
                    "histogram needs at least 2 bins",
                ));
            }
            if !(settings.sampling_fraction > 0.0 && settings.sampling_fraction <= 1.0) {
                return Err(PipelineError::invalid_configuration(format!(
                    "sampling fraction must be in (0, 1], got {}",
                    settings.sampling_fraction
                )));
            }
        }
        Ok(())
    }
}
