//! The staged correction driver.

use crate::cache::TransformCache;
use crate::config::{CorrectionConfig, RegistrationSettings};
use crate::error::{PipelineError, Result, Stage};
use crate::fieldmap::FieldMapConverter;
use burn::tensor::backend::AutodiffBackend;
use std::marker::PhantomData;
use unwarp_core::filter::{FieldComposer, GridResampler, ResampleFilter, Warper};
use unwarp_core::interpolation::LinearInterpolator;
use unwarp_core::transform::RigidTransform;
use unwarp_core::{DisplacementField, FieldUnit, Volume};
use unwarp_registration::{
    GradientDescent, MultiResolutionRegistration, MutualInformation, TransformInitializer,
};

/// Everything a correction run produces.
pub struct CorrectionOutput<B: AutodiffBackend> {
    /// The corrected volume on the target grid.
    pub corrected: Volume<B>,
    /// The displacement field that produced it, in millimetres.
    pub field: DisplacementField<B>,
    /// The corrected volume with the phantom field composed in, when a
    /// phantom field was supplied.
    pub composed: Option<Volume<B>>,
    /// The rigid transform aligning the field map, when registration ran.
    pub transform: Option<RigidTransform<B>>,
}

/// The distortion-correction pipeline.
///
/// Stages run strictly in sequence, each consuming immutable inputs:
/// convert, register (optional, cached), resample to the target grid,
/// assemble the field, warp, compose (optional). Which stages run is decided
/// by the configuration, not by call sites.
pub struct CorrectionPipeline<B: AutodiffBackend> {
    config: CorrectionConfig,
    _phantom: PhantomData<B>,
}

impl<B: AutodiffBackend> CorrectionPipeline<B> {
    /// Create a pipeline, validating the configuration up front.
    pub fn new(config: CorrectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            _phantom: PhantomData,
        })
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Run the correction.
    ///
    /// `field_map` is the raw B0 field map; when registration is disabled it
    /// must already be aligned with `anatomical`. `phantom` is an optional
    /// externally measured displacement field of arbitrary native resolution.
    pub fn correct(
        &self,
        anatomical: &Volume<B>,
        field_map: &Volume<B>,
        phantom: Option<&DisplacementField<B>>,
    ) -> Result<CorrectionOutput<B>> {
        let converter =
            FieldMapConverter::new(self.config.gradient_percent, self.config.gradient_calibration)?;
        let shift = converter.convert(field_map);
        tracing::info!(shape = ?shift.shape(), "converted field map to millimetre shifts");

        let resampler = GridResampler::new(self.config.resample_boundary)
            .with_interpolation(self.config.resample_interpolation);

        let (shift_aligned, transform) = match &self.config.registration {
            Some(settings) => {
                let aligned = self.align_field_map(anatomical, field_map, settings)?;
                let resampled =
                    ResampleFilter::from_reference(anatomical, aligned.clone(), LinearInterpolator::new())
                        .apply(&shift);
                (resampled, Some(aligned))
            }
            None => {
                let resampled = resampler
                    .resample(&shift, anatomical.extent())
                    .map_err(PipelineError::in_stage(Stage::Resampling))?;
                (resampled, None)
            }
        };

        let reference = resampler
            .resample(anatomical, self.config.target_extent)
            .map_err(PipelineError::in_stage(Stage::Resampling))?;
        let shift_target = resampler
            .resample(&shift_aligned, self.config.target_extent)
            .map_err(PipelineError::in_stage(Stage::Resampling))?;
        tracing::info!(target = ?self.config.target_extent, "upsampled to target grid");

        let field = DisplacementField::from_scalar_axis(
            &shift_target,
            self.config.distortion_axis,
            FieldUnit::Millimeters,
        )
        .and_then(|field| field.with_geometry_of(&reference))
        .map_err(PipelineError::in_stage(Stage::FieldAssembly))?;

        let corrected = Warper::new(self.config.warp_boundary)
            .with_interpolation(self.config.warp_interpolation)
            .warp(&reference, &field)
            .map_err(PipelineError::in_stage(Stage::Warping))?;
        tracing::info!(axis = self.config.distortion_axis, "applied correction warp");

        let composed = match phantom {
            Some(second) => {
                let second = resampler
                    .resample_field(second, &reference)
                    .map_err(PipelineError::in_stage(Stage::Composition))?;
                let composer = FieldComposer::new(self.config.composition_boundary)
                    .with_interpolation(self.config.composition_interpolation);
                let output = composer
                    .compose(&reference, &field, &second, self.config.composition_strategy)
                    .map_err(PipelineError::in_stage(Stage::Composition))?;
                tracing::info!(
                    strategy = ?self.config.composition_strategy,
                    "composed phantom field"
                );
                Some(output)
            }
            None => None,
        };

        Ok(CorrectionOutput {
            corrected,
            field,
            composed,
            transform,
        })
    }

    /// Rigid alignment of the field map onto the anatomical volume, served
    /// from the cache when an entry for these inputs and settings exists.
    fn align_field_map(
        &self,
        fixed: &Volume<B>,
        moving: &Volume<B>,
        settings: &RegistrationSettings,
    ) -> Result<RigidTransform<B>> {
        let cache = self.config.cache_dir.as_ref().map(TransformCache::new);
        let key = cache
            .as_ref()
            .map(|_| TransformCache::fingerprint(fixed, moving, settings));

        if let (Some(cache), Some(key)) = (&cache, &key) {
            if let Some(transform) = cache.load::<B>(key, &fixed.device()) {
                tracing::info!(key, "reusing cached registration transform");
                return Ok(transform);
            }
        }

        let metric = MutualInformation::new(settings.num_bins, settings.sampling_fraction, settings.seed);
        let initial = TransformInitializer::rigid_geometric(fixed, moving);
        let registration = MultiResolutionRegistration::new(metric);
        let outcome =
            registration.execute(fixed, moving, initial, GradientDescent::new, &settings.schedule)?;
        tracing::info!(
            loss = outcome.final_loss,
            converged = outcome.converged,
            "registration finished"
        );

        if let (Some(cache), Some(key)) = (&cache, &key) {
            cache.store(key, &outcome.transform);
        }
        Ok(outcome.transform)
    }
}
